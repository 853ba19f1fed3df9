pub mod citations;
pub mod config;
pub mod file_search;
pub mod interaction;
pub mod models;
pub mod render;
pub mod sanitize;
pub mod search;
pub mod server;
pub mod session;

pub use config::AppConfig;
pub use server::run_server;
