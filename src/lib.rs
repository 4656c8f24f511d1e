pub mod analytics;
pub mod api_router;
pub mod appointments;
pub mod auth;
pub mod boards;
pub mod companies;
pub mod knowledge;
pub mod monitoring;
pub mod portal;
pub mod shared;
pub mod teams;
pub mod tickets;
