pub mod config;
pub mod dispatch;
pub mod executor;
pub mod handler;
pub mod worker;

pub use config::WorkerConfig;
pub use dispatch::Dispatcher;
pub use handler::{HandlerRegistry, HandlerResult, JobHandler};
pub use worker::{JobReport, Worker};
