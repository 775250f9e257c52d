//! HTTP route handlers

pub mod api;
pub mod status;
