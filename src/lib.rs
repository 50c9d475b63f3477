// PLU Control - production line discovery, registry and topology

pub mod config;
pub mod context;
pub mod network;
pub mod registry;
pub mod roles;
pub mod server;
pub mod topology;

pub use config::{ConfigError, ControlConfig};
pub use context::{ControlCenter, ControlError};
