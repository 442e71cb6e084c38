// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Common test utilities and fixtures shared across all test targets
//!
//! Builders for MariaDB and SqlJob objects plus in-memory stores, member
//! agents and a fixed clock for driving whole reconcile passes.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[path = "../common/mod.rs"]
//! mod common;
//! use common::*;
//! ```

mod fixtures;

#[allow(unused_imports)]
pub use fakes::*;
pub use fixtures::*;
