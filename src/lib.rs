pub mod clienv;
pub mod config;
pub mod daemon;
pub mod error;
pub mod user_config;

pub use config::{OptionLayer, ServerOptions};
pub use error::{DebugError, Result};
