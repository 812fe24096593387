//! Webhook load testing: concurrent batches, JSON snapshots, run comparison.
//!
//! A run dispatches one batch per concurrency level ([`runner::BatchRunner`]
//! over a [`dispatcher::Dispatch`] implementation), summarizes each batch and
//! writes a [`report::ResultSnapshot`] to a [`store::ResultStore`]. Two
//! snapshots are compared with [`compare::compare`].
pub mod compare;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod payload;
pub mod report;
pub mod runner;
pub mod stats;
pub mod store;

pub use error::{ Error, RequestError, Result };
