//! HyprCAT gateway: the HTTP surface over the protocol engine.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ErrorKind};
pub use routes::router;
pub use state::AppState;
