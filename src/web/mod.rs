//! HTTP API over the mock federation

pub mod handlers;
pub mod models;
pub mod server;
