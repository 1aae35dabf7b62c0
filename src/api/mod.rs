pub mod handlers;
pub mod requests;
pub mod responses;
pub mod routes;

pub use responses::{ApiError, ApiResponse};
pub use routes::{create_router, AppState};
