pub mod auth;
pub mod cache;
pub mod db;
pub mod listing;
pub mod server;
pub mod settings;
pub mod telemetry;
pub mod transfer;
