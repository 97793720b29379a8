//! Worker process supervision.

pub mod command;
pub mod manager;

pub use command::WorkerCommand;
pub use manager::{
    LaunchOutcome, SupervisionMode, SupervisorError, WorkerStatus, WorkerSupervisor,
};
