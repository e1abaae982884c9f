pub mod blocking;
pub mod config;

pub use blocking::run_blocking;
pub use config::*;
