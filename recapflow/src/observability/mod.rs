//! Tracing subscriber setup and span timing.

mod tracing;

pub use self::tracing::{init_tracing, LogFormat, SpanTimer};
