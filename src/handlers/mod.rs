pub mod health;
pub mod sos;
pub mod upload;
pub mod version;
