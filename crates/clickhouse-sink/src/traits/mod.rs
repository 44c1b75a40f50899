//! Connector framework contract
//!
//! The pieces of the host connector API this crate implements:
//! - `Sink` - consume records and write them out
//! - `CheckResult` - step-by-step connection check report
//! - `ConnectorSpec` - connector description and config schema

pub mod check;
pub mod sink;
pub mod spec;

pub use check::{CheckDetail, CheckResult, CheckResultBuilder};
pub use sink::{Sink, SinkConfig, WriteResult};
pub use spec::ConnectorSpec;
