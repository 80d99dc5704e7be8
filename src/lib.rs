pub mod app_state;
pub mod capture;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod models;
pub mod routes;
pub mod storage;

pub use app_state::AppState;
pub use routes::create_router;
