//! Recording and media types as known to the recording provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Audio-only track (usually M4A).
    Audio,
    /// Video track (usually MP4).
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Descriptor of a remote media file attached to a recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    /// Audio or video.
    pub kind: MediaKind,
    /// Size reported by the provider.
    pub size_bytes: u64,
    /// Provider handle used to download the file.
    pub remote_handle: String,
    /// Provider file type (e.g. "M4A", "MP4").
    pub file_type: String,
}

impl MediaFile {
    /// Creates a new media file descriptor.
    #[must_use]
    pub fn new(
        kind: MediaKind,
        size_bytes: u64,
        remote_handle: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            size_bytes,
            remote_handle: remote_handle.into(),
            file_type: file_type.into(),
        }
    }
}

/// One meeting's media artifact set. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    /// Meeting identifier.
    pub id: String,
    /// Unique session identifier.
    pub uuid: String,
    /// Meeting topic.
    pub topic: String,
    /// When the meeting started.
    pub start_time: DateTime<Utc>,
    /// Meeting length in minutes.
    pub duration_minutes: u32,
    /// Host identity.
    pub host_email: String,
    /// Media files attached to the recording.
    #[serde(default)]
    pub files: Vec<MediaFile>,
}

impl Recording {
    /// Creates a recording with no media files.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        uuid: impl Into<String>,
        topic: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            uuid: uuid.into(),
            topic: topic.into(),
            start_time,
            duration_minutes: 0,
            host_email: String::new(),
            files: Vec::new(),
        }
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_minutes(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }

    /// Sets the host.
    #[must_use]
    pub fn with_host(mut self, email: impl Into<String>) -> Self {
        self.host_email = email.into();
        self
    }

    /// Adds a media file.
    #[must_use]
    pub fn with_file(mut self, file: MediaFile) -> Self {
        self.files.push(file);
        self
    }

    /// Returns the first file of the given kind.
    #[must_use]
    pub fn file(&self, kind: MediaKind) -> Option<&MediaFile> {
        self.files.iter().find(|f| f.kind == kind)
    }

    /// Returns true if the recording has at least one media file.
    #[must_use]
    pub fn has_media(&self) -> bool {
        !self.files.is_empty()
    }

    /// Folder label used for the recording's artifacts: `YYYY-MM-DD topic`.
    #[must_use]
    pub fn folder_label(&self) -> String {
        folder_label_for(&self.start_time, &self.topic)
    }
}

/// Folder label for a meeting: `YYYY-MM-DD topic`.
#[must_use]
pub fn folder_label_for(start: &DateTime<Utc>, topic: &str) -> String {
    format!("{} {}", start.format("%Y-%m-%d"), sanitize_name(topic))
}

/// Replaces characters that are unsafe in blob names.
#[must_use]
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Downloaded media bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaPayload {
    /// Audio or video.
    pub kind: MediaKind,
    /// MIME type sent to the model provider.
    pub mime_type: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

impl MediaPayload {
    /// Creates a payload.
    #[must_use]
    pub fn new(kind: MediaKind, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Returns the payload size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension matching the MIME type.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
            "audio/mpeg" => "mp3",
            "audio/wav" | "audio/x-wav" => "wav",
            "video/mp4" => "mp4",
            _ => match self.kind {
                MediaKind::Audio => "m4a",
                MediaKind::Video => "mp4",
            },
        }
    }
}

impl fmt::Debug for MediaPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaPayload")
            .field("kind", &self.kind)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Media fetched for one recording.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaBundle {
    /// Audio track, if the provider had one.
    pub audio: Option<MediaPayload>,
    /// Video track, if the provider had one.
    pub video: Option<MediaPayload>,
}

impl MediaBundle {
    /// Returns the media to send for analysis: audio first, video otherwise.
    #[must_use]
    pub fn analysis_media(&self) -> Option<&MediaPayload> {
        self.audio
            .as_ref()
            .filter(|m| !m.is_empty())
            .or_else(|| self.video.as_ref().filter(|m| !m.is_empty()))
    }

    /// Returns true if nothing usable was fetched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.analysis_media().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn recording() -> Recording {
        Recording::new(
            "812345",
            "abc==",
            "Weekly sync: Acme",
            Utc.with_ymd_and_hms(2026, 3, 4, 9, 30, 0).unwrap(),
        )
    }

    #[test]
    fn test_folder_label_sanitizes_topic() {
        assert_eq!(recording().folder_label(), "2026-03-04 Weekly sync_ Acme");
    }

    #[test]
    fn test_sanitize_name_empty() {
        assert_eq!(sanitize_name("  ..  "), "untitled");
        assert_eq!(sanitize_name("a/b"), "a_b");
    }

    #[test]
    fn test_recording_file_lookup() {
        let rec = recording()
            .with_file(MediaFile::new(MediaKind::Video, 10, "v", "MP4"))
            .with_file(MediaFile::new(MediaKind::Audio, 5, "a", "M4A"));
        assert_eq!(rec.file(MediaKind::Audio).map(|f| f.remote_handle.as_str()), Some("a"));
        assert!(rec.has_media());
    }

    #[test]
    fn test_analysis_media_prefers_audio() {
        let bundle = MediaBundle {
            audio: Some(MediaPayload::new(MediaKind::Audio, "audio/mp4", vec![1])),
            video: Some(MediaPayload::new(MediaKind::Video, "video/mp4", vec![2])),
        };
        assert_eq!(bundle.analysis_media().map(|m| m.kind), Some(MediaKind::Audio));
    }

    #[test]
    fn test_analysis_media_falls_back_to_video() {
        let bundle = MediaBundle {
            audio: Some(MediaPayload::new(MediaKind::Audio, "audio/mp4", Vec::new())),
            video: Some(MediaPayload::new(MediaKind::Video, "video/mp4", vec![2])),
        };
        assert_eq!(bundle.analysis_media().map(|m| m.kind), Some(MediaKind::Video));
        assert!(MediaBundle::default().is_empty());
    }

    #[test]
    fn test_payload_debug_hides_bytes() {
        let payload = MediaPayload::new(MediaKind::Audio, "audio/mp4", vec![0; 1024]);
        let text = format!("{:?}", payload);
        assert!(text.contains("len: 1024"));
        assert_eq!(payload.extension(), "m4a");
    }
}
