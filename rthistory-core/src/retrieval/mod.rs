//! Task-graph retrieval of one patient's treatment history.
//!
//! The scheduler seeds a queue with the patient's plans and drains it,
//! pushing whatever each handler discovers back onto the same queue until
//! nothing is left.

pub mod config;
pub(crate) mod handlers;
pub mod ports;
pub mod queue;
pub mod receive;
pub mod scheduler;
pub mod summary;
pub mod task;

pub use config::*;
pub use ports::*;
pub use queue::*;
pub use receive::*;
pub use scheduler::*;
pub use summary::*;
pub use task::*;
