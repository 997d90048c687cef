//! Fixed-capacity FIFO ring of thread descriptors.
//!
//! Backs the arrival, waiting, sleeping, and exited queues. Indices wrap
//! modulo `MAX_QUEUE`; `size == (tail - head) mod capacity` at all times.
//! Enqueueing onto the arrival, waiting, or sleeping ring also moves the
//! thread's status, mirroring what the container means for its lifecycle.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::config::MAX_QUEUE;
use crate::error::{SchedError, SchedResult};
use crate::thread::{ContainerTag, RtStatus, RtThread};

pub struct ThreadRing {
    tag: ContainerTag,
    head: usize,
    tail: usize,
    size: usize,
    slots: Box<[Option<Arc<RtThread>>]>,
}

impl ThreadRing {
    pub fn new(tag: ContainerTag) -> Self {
        let slots: Vec<Option<Arc<RtThread>>> = (0..MAX_QUEUE).map(|_| None).collect();
        Self {
            tag,
            head: 0,
            tail: 0,
            size: 0,
            slots: slots.into_boxed_slice(),
        }
    }

    pub fn tag(&self) -> ContainerTag {
        self.tag
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Append at the tail, tagging the thread and updating its status for
    /// the parking containers.
    pub fn enqueue(&mut self, thread: Arc<RtThread>) -> SchedResult<()> {
        if self.size == MAX_QUEUE {
            log::error!("{:?} queue full, dropping enqueue", self.tag);
            return Err(SchedError::QueueFull {
                container: self.tag,
                capacity: MAX_QUEUE,
            });
        }

        thread.set_container(self.tag);
        match self.tag {
            ContainerTag::Arrival => thread.set_status(RtStatus::Arrived),
            ContainerTag::Waiting => thread.set_status(RtStatus::Waiting),
            ContainerTag::Sleeping => thread.set_status(RtStatus::Sleeping),
            _ => {}
        }

        self.slots[self.tail] = Some(thread);
        self.tail = (self.tail + 1) % MAX_QUEUE;
        self.size += 1;
        Ok(())
    }

    /// Pop at the head, discarding tombstones on the way.
    pub fn dequeue(&mut self) -> SchedResult<Arc<RtThread>> {
        while let Some(thread) = self.take_head() {
            if thread.is_defunct() {
                thread.finalize_removed();
                continue;
            }
            return Ok(thread);
        }
        log::debug!("{:?} queue empty on dequeue", self.tag);
        Err(SchedError::QueueEmpty {
            container: self.tag,
        })
    }

    /// Pop at the head without the tombstone filter. Used when draining the
    /// exited queue, where every entry is by definition tombstoned.
    pub fn drain(&mut self) -> Option<Arc<RtThread>> {
        self.take_head()
    }

    /// Extract a specific thread by identity, shifting later entries back.
    pub fn remove(&mut self, target: &Arc<RtThread>) -> SchedResult<Arc<RtThread>> {
        let mut offset = None;
        for i in 0..self.size {
            let idx = (self.head + i) % MAX_QUEUE;
            if let Some(t) = &self.slots[idx] {
                if Arc::ptr_eq(t, target) {
                    offset = Some(i);
                    break;
                }
            }
        }
        let offset = offset.ok_or(SchedError::ThreadNotFound {
            container: self.tag,
        })?;

        let idx = (self.head + offset) % MAX_QUEUE;
        let thread = match self.slots[idx].take() {
            Some(thread) => thread,
            None => {
                return Err(SchedError::ThreadNotFound {
                    container: self.tag,
                })
            }
        };

        for i in offset..self.size - 1 {
            let to = (self.head + i) % MAX_QUEUE;
            let from = (self.head + i + 1) % MAX_QUEUE;
            self.slots[to] = self.slots[from].take();
        }
        self.tail = (self.tail + MAX_QUEUE - 1) % MAX_QUEUE;
        self.size -= 1;

        if thread.is_defunct() {
            thread.finalize_removed();
            return Err(SchedError::ThreadNotFound {
                container: self.tag,
            });
        }
        Ok(thread)
    }

    fn take_head(&mut self) -> Option<Arc<RtThread>> {
        if self.size == 0 {
            return None;
        }
        let thread = self.slots[self.head].take();
        self.head = (self.head + 1) % MAX_QUEUE;
        self.size -= 1;
        thread
    }

    #[cfg(test)]
    fn invariant_size(&self) -> usize {
        (self.tail + MAX_QUEUE - self.head) % MAX_QUEUE
    }
}
