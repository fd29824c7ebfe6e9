pub mod error;
pub mod job;
pub mod message;
pub mod net;
pub mod task;
pub mod worker;

pub use error::ProtocolError;
pub use job::{Job, JobId, JobRequest};
pub use message::{MapTaskMessage, Message, ReduceTaskMessage};
pub use task::{Stage, Task, TaskId};
pub use worker::WorkerId;
