//! Utility functions for identifiers, timestamps and date partitions.

mod ids;
pub mod timestamps;

pub use ids::{generate_run_id, stable_reference_id};
pub use timestamps::{date_partition, iso_timestamp, millis, Timestamp};
