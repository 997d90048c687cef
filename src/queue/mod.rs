//! Thread containers.
//!
//! Two storage shapes with one contract: `enqueue`, `dequeue`, and
//! `remove`, all tombstone-aware, all capped at `MAX_QUEUE` entries.

mod heap;
mod ring;

pub use heap::ThreadHeap;
pub use ring::ThreadRing;
