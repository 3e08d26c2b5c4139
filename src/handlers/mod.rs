//! HTTP handlers.

pub mod health_handlers;
pub mod resize_handlers;
