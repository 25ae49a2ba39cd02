//! HTTP API for triggering scans and reading memory

pub mod routes;
pub mod server;

pub use server::{create_app, AppState, ScanRefusal};
