//! The benchd telemetry pipeline
//!
//! This library turns the raw worker event log of a benchd load test into
//! plot-ready time series. Lines are decoded by [`event`], assigned to
//! fixed-width buckets by [`bucket`], counted per series by [`aggregator`]
//! and smoothed by [`smooth`] into a [`report::Report`]. The [`cache`] module
//! memoizes bucketed send rates so that a log need only be parsed once.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod aggregator;
pub mod bucket;
pub mod cache;
pub mod config;
pub mod event;
pub mod report;
pub mod series;
pub mod smooth;
pub mod view;

pub use aggregator::Aggregator;
pub use config::{Config, PartialConfig};
pub use report::Report;
pub use view::View;

/// Errors produced by the pipeline
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A raw log line has worker arity but a malformed field
    #[error("Line {line}: {source}")]
    Line {
        /// 1-based line number
        line: usize,
        /// The decoding failure
        #[source]
        source: event::Error,
    },
    /// See [`cache::Error`]
    #[error(transparent)]
    Cache(#[from] cache::Error),
    /// See [`config::Error`]
    #[error(transparent)]
    Config(#[from] config::Error),
}
