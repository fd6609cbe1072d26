//! Date-partitioned path layout shared by artifacts, audit documents and
//! recovery records.

use crate::core::{folder_label_for, Recording};
use crate::utils::{date_partition, Timestamp};

/// `<root>/<YYYY>/<MM>` for the given timestamp.
#[must_use]
pub fn partitioned(root: &[String], at: &Timestamp) -> Vec<String> {
    let mut segments = root.to_vec();
    segments.extend(date_partition(at));
    segments
}

/// `<root>/<YYYY>/<MM>/<YYYY-MM-DD topic>` for a meeting.
#[must_use]
pub fn meeting_folder(root: &[String], start: &Timestamp, topic: &str) -> Vec<String> {
    let mut segments = partitioned(root, start);
    segments.push(folder_label_for(start, topic));
    segments
}

/// The meeting folder of a recording.
#[must_use]
pub fn recording_folder(root: &[String], recording: &Recording) -> Vec<String> {
    meeting_folder(root, &recording.start_time, &recording.topic)
}
