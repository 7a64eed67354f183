//! Client implementation

pub mod config;
pub mod core;
pub mod operations;
pub mod registry;

pub use config::ClientConfig;
pub use self::core::{BatchRequest, Client};
pub use registry::{Delivery, PendingRegistry, PendingStatus};
