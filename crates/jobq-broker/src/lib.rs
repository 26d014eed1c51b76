pub mod broker;
pub mod config;
pub mod queue;
pub mod worker_registry;

pub use broker::Broker;
pub use config::BrokerConfig;
