//! Local HTTP/JSON API.
//!
//! Serves the dashboard status exchange and manual target management.

pub mod error;
pub mod routes;
pub mod server;
pub mod status;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerConfig, AppState};
pub use status::{Dashboard, QUERY_SELECTION, StatusBoard};
