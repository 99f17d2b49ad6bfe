//! # Taskora Core
//!
//! Core types, traits, and error definitions for Taskora.
//! This crate provides the foundational abstractions shared by the
//! cache layer and any store implementation.

pub mod domain;
pub mod error;
pub mod pagination;
pub mod query;
pub mod result;
pub mod store;

pub use domain::*;
pub use error::*;
pub use pagination::*;
pub use query::*;
pub use result::*;
pub use store::*;
