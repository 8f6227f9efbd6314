pub mod config;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod users;

pub use config::{AppConfig, StorageBackend};
pub use error::ApiError;
pub use observability::{LogHandle, init_tracing};
pub use server::{AppState, PermitdeskServer, build_app};
