//! Core types and trait definitions for the arbovirus forecasting pipeline.
//!
//! This crate does no I/O. The ingestion, storage and forecasting crates all
//! depend on it.

// Backends implement the store trait with native `async fn`.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod feature;
pub mod forecast;
pub mod locality;
pub mod store;
pub mod week;
pub mod weekly;

pub use error::{Error, Result};
