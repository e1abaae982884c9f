pub mod config;
pub mod mcp;
pub mod model;

pub use config::*;
pub use mcp::*;
pub use model::*;
