mod service;

pub use service::{ConfigError, ServerConfig};
