pub mod config;
pub mod crud;
pub mod error;
pub mod response;
pub mod router_factory;
pub mod schema;
pub mod state;
pub mod utils;
