//! Time-series storage and aggregation engine for solar device telemetry.
//!
//! The engine ingests periodic readings from field devices, keeps a bounded
//! window of raw history in 31 day-of-month segments, answers
//! granularity-bucketed dashboard queries, and compresses each month's
//! history into per-device statistics on a nightly schedule.
//!
//! Module boundaries (EMBP): `partition` owns the physical segment layout and
//! recycling, `writer` is the single write path, `query` the read-side
//! aggregator, `rollup` the scheduled batch job; `routes` is the thin HTTP
//! surface the external REST layer consumes.

pub mod config;
pub mod models;
pub mod partition;
pub mod query;
pub mod rollup;
pub mod routes;
pub mod schema;
pub mod writer;

pub use config::Config;
pub use models::{DeviceStatus, Granularity, HistoryRecord, MonthlyAggregate, TelemetryEvent};
pub use rollup::RollupEngine;
pub use writer::TelemetryWriter;
