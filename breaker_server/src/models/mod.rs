//! Data models — build notifications and the CI-to-chat identity mapping.

pub mod build;
pub mod identity;
