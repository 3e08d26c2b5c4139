//! Storage access and image processing.

pub mod image_service;
pub mod storage_service;
