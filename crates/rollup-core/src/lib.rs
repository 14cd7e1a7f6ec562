//! Core types, pipeline stages and boundary traits for the rollup engine.
//!
//! This crate is free of database dependencies. It turns a window's worth of
//! [`fact::Fact`]s into deterministic [`row::RollupRow`]s; the storage
//! backends live behind the traits in [`store`].

pub mod aggregate;
pub mod dimension;
pub mod engine;
pub mod error;
pub mod fact;
pub mod fingerprint;
pub mod rank;
pub mod row;
pub mod store;
pub mod window;

pub use error::{BoxError, Error, Result};
