pub mod config;
pub mod password;
pub mod types;

pub use config::BrokerConfig;
pub use password::PasswordError;
pub use types::*;
