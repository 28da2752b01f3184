pub mod alert;
pub mod queue;
pub mod worker;

pub use queue::{NewJob, QueueStore};
pub use worker::{Worker, WorkerSettings};
