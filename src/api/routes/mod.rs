//! API route handlers

pub mod opportunities;
pub mod scan;
