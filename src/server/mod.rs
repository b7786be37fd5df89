pub mod app;
pub mod error;
pub mod handlers;

pub use app::{create_router, AppState};
pub use error::{AppError, AppResult};
