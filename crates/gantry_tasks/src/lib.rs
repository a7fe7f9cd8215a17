#![forbid(unsafe_code)]

//! Cooperative scheduling primitives for incremental asset imports.
//!
//! Long-running import work is expressed as [`Step`]s: explicit resumable
//! state machines with a single [`resume`](Step::resume) operation. A
//! [`TaskQueue`] drives steps in strict order under a shared [`TimeBudget`]
//! so that an import never stalls a real-time host loop; an
//! [`InterleavedSet`] progresses a set of same-shaped steps round-robin
//! (used for parallel texture decode, where interleaving, not threads,
//! provides the overlap).
//!
//! There is no executor and no background thread here: the host owns the
//! driving loop and calls [`TaskQueue::advance`] once per frame or poll
//! tick.

mod budget;
mod interleave;
mod queue;

pub use budget::TimeBudget;
pub use interleave::InterleavedSet;
pub use queue::{FnStep, Progress, QueueState, Step, TaskQueue};
