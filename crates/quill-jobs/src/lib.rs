//! Background classification jobs for quill.
//!
//! Notes are classified asynchronously: writes enqueue a durable task and
//! a single worker drains the queue in FIFO order, feeding each note
//! through the clustering engine. Durability lives in the store, so a
//! restart picks up where the worker left off.

pub mod queue;

pub use queue::{QueueEvent, TaskQueue};
