pub mod audit;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod orders;
pub mod routes;
pub mod stats;

pub use error::ApiError;
pub use routes::create_router;
