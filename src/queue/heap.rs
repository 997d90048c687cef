//! Fixed-capacity binary min-heap of thread descriptors.
//!
//! One heap type serves all three ordered containers; the key selector is
//! fixed at construction (absolute deadline for the runnable and pending
//! queues, aged priority for the aperiodic queue). Capacity is `MAX_QUEUE`
//! and never grows.
//!
//! Deletion is lazy: a tombstoned descriptor stays in place until a pop
//! reaches it, at which point it is finalized and discarded.

use alloc::sync::Arc;

use crate::config::MAX_QUEUE;
use crate::error::{SchedError, SchedResult};
use crate::thread::{ContainerTag, RtThread};

fn deadline_key(thread: &RtThread) -> u64 {
    thread.deadline()
}

fn priority_key(thread: &RtThread) -> u64 {
    thread.priority()
}

pub struct ThreadHeap {
    tag: ContainerTag,
    key: fn(&RtThread) -> u64,
    slots: heapless::Vec<Arc<RtThread>, MAX_QUEUE>,
}

impl ThreadHeap {
    /// Runnable queue: earliest absolute deadline first.
    pub fn runnable() -> Self {
        Self::with_key(ContainerTag::Runnable, deadline_key)
    }

    /// Pending queue: earliest upcoming release first.
    pub fn pending() -> Self {
        Self::with_key(ContainerTag::Pending, deadline_key)
    }

    /// Aperiodic queue: smallest aged priority first.
    pub fn aperiodic() -> Self {
        Self::with_key(ContainerTag::Aperiodic, priority_key)
    }

    fn with_key(tag: ContainerTag, key: fn(&RtThread) -> u64) -> Self {
        Self {
            tag,
            key,
            slots: heapless::Vec::new(),
        }
    }

    pub fn tag(&self) -> ContainerTag {
        self.tag
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Root of the heap, tombstones included.
    pub fn peek(&self) -> Option<&Arc<RtThread>> {
        self.slots.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RtThread>> {
        self.slots.iter()
    }

    /// Insert, tagging the thread with this container.
    pub fn enqueue(&mut self, thread: Arc<RtThread>) -> SchedResult<()> {
        if self.slots.push(thread).is_err() {
            log::error!("{:?} queue full, dropping enqueue", self.tag);
            return Err(SchedError::QueueFull {
                container: self.tag,
                capacity: MAX_QUEUE,
            });
        }
        let pos = self.slots.len() - 1;
        self.slots[pos].set_container(self.tag);
        self.sift_up(pos);
        Ok(())
    }

    /// Pop the minimum-key live thread, discarding tombstones on the way.
    pub fn dequeue(&mut self) -> SchedResult<Arc<RtThread>> {
        while let Some(min) = self.pop_root() {
            if min.is_defunct() {
                min.finalize_removed();
                continue;
            }
            return Ok(min);
        }
        log::debug!("{:?} queue empty on dequeue", self.tag);
        Err(SchedError::QueueEmpty {
            container: self.tag,
        })
    }

    /// Extract a specific thread by identity.
    ///
    /// A tombstoned target is discarded instead of returned, matching the
    /// dequeue path.
    pub fn remove(&mut self, target: &Arc<RtThread>) -> SchedResult<Arc<RtThread>> {
        let found = self
            .slots
            .iter()
            .position(|t| Arc::ptr_eq(t, target))
            .ok_or(SchedError::ThreadNotFound {
                container: self.tag,
            })?;

        let last = self.slots.len() - 1;
        self.slots.swap(found, last);
        let thread = match self.slots.pop() {
            Some(thread) => thread,
            None => {
                return Err(SchedError::ThreadNotFound {
                    container: self.tag,
                })
            }
        };
        if found < self.slots.len() {
            self.sift_down(found);
        }

        if thread.is_defunct() {
            thread.finalize_removed();
            return Err(SchedError::ThreadNotFound {
                container: self.tag,
            });
        }
        Ok(thread)
    }

    fn pop_root(&mut self) -> Option<Arc<RtThread>> {
        let last = self.slots.len().checked_sub(1)?;
        self.slots.swap(0, last);
        let min = self.slots.pop()?;
        if !self.slots.is_empty() {
            self.sift_down(0);
        }
        Some(min)
    }

    fn key_at(&self, pos: usize) -> u64 {
        (self.key)(&self.slots[pos])
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.key_at(parent) <= self.key_at(pos) {
                break;
            }
            self.slots.swap(parent, pos);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        loop {
            let left = 2 * pos + 1;
            if left >= self.slots.len() {
                break;
            }
            let right = left + 1;
            // First child wins ties.
            let child = if right < self.slots.len() && self.key_at(right) < self.key_at(left) {
                right
            } else {
                left
            };
            if self.key_at(pos) <= self.key_at(child) {
                break;
            }
            self.slots.swap(pos, child);
            pos = child;
        }
    }

    #[cfg(test)]
    fn assert_heap_property(&self) {
        for pos in 1..self.slots.len() {
            let parent = (pos - 1) / 2;
            assert!(
                self.key_at(parent) <= self.key_at(pos),
                "heap order broken at {} (parent {})",
                pos,
                parent
            );
        }
    }
}
