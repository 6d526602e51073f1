//! # Core Module
//!
//! Shared-state primitives used across the pipeline.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted value with read-write locking

pub mod mt_resource;

pub use mt_resource::MtResource;
