//! Data access for the crate. Each sub-module owns one table; the rest of the
//! application goes through these instead of touching entities directly.

pub mod ping_result_service;

pub use ping_result_service::*;
