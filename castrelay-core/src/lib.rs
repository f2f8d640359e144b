pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;

pub use bootstrap::load_config;
pub use config::Config;
pub use error::{Error, Result};
