pub mod app;
pub mod deserializers;
pub mod error;
pub mod extract;
pub mod policy;
pub mod routes;
