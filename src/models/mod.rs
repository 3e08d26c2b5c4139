//! Request-scoped data parsed from inbound URLs.

pub mod resize_request;
