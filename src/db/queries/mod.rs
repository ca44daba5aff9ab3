pub mod action_logs;
pub mod categories;
pub mod questions;
pub mod users;
