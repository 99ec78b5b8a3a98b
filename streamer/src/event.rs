//! Broadcast events and where their media goes.

use crate::youtube_api::broadcasts::{BroadcastLifeCycleStatus, LiveBroadcast, PrivacyStatus};
use jiff::Timestamp;
use std::fmt;

/// Local view of a broadcast's progress.
///
/// Only ever moves forward: `Created → Bound → Live → Complete`, with `Bound → Complete`
/// allowed for sessions stopped before the service confirmed `live`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStatus {
    Created,
    Bound,
    Live,
    Complete,
}

impl EventStatus {
    /// Maps the service's lifecycle status, given whether the event's ingestion target is
    /// already known.
    pub fn from_remote(status: BroadcastLifeCycleStatus, ingestion_resolved: bool) -> Self {
        use BroadcastLifeCycleStatus as Remote;
        match status {
            Remote::Created | Remote::Ready | Remote::TestStarting | Remote::Testing => {
                if ingestion_resolved {
                    Self::Bound
                } else {
                    Self::Created
                }
            }
            Remote::LiveStarting | Remote::Live => Self::Live,
            Remote::Complete | Remote::Revoked => Self::Complete,
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Bound => write!(f, "bound"),
            Self::Live => write!(f, "live"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// One scheduled or live broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub scheduled_start_time: Option<Timestamp>,
    pub privacy_status: PrivacyStatus,
    pub bound_stream_id: Option<String>,
    pub thumbnail_url: Option<String>,
    pub status: EventStatus,
}

impl BroadcastEvent {
    /// Builds an event from an API resource. Missing parts fall back to defaults; the
    /// privacy status defaults to public.
    pub fn from_remote(broadcast: LiveBroadcast, ingestion_resolved: bool) -> Self {
        let snippet = broadcast.snippet;
        let status = broadcast.status;
        let life_cycle = status
            .as_ref()
            .and_then(|s| s.life_cycle_status)
            .unwrap_or(BroadcastLifeCycleStatus::Created);

        Self {
            title: snippet.as_ref().map(|s| s.title.clone()).unwrap_or_default(),
            description: snippet
                .as_ref()
                .map(|s| s.description.clone())
                .unwrap_or_default(),
            scheduled_start_time: snippet.as_ref().and_then(|s| s.scheduled_start_time),
            thumbnail_url: snippet
                .and_then(|s| s.thumbnails)
                .and_then(|t| t.default)
                .map(|t| normalize_thumbnail_url(t.url)),
            privacy_status: status
                .and_then(|s| s.privacy_status)
                .unwrap_or(PrivacyStatus::Public),
            bound_stream_id: broadcast.content_details.and_then(|c| c.bound_stream_id),
            status: EventStatus::from_remote(life_cycle, ingestion_resolved),
            id: broadcast.id,
        }
    }

    /// Public page for the broadcast.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.id)
    }
}

fn normalize_thumbnail_url(url: String) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url
    }
}

/// The RTMP endpoint a stream's media must be pushed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionTarget {
    pub ingestion_address: String,
    pub stream_name: String,
}

impl IngestionTarget {
    pub fn new(ingestion_address: impl Into<String>, stream_name: impl Into<String>) -> Self {
        Self {
            ingestion_address: ingestion_address.into(),
            stream_name: stream_name.into(),
        }
    }

    /// Splits a complete publish URL at its last `/` into address and stream name.
    ///
    /// A URL without a separator is kept whole as the address.
    pub fn from_url(url: &str) -> Self {
        match url.rsplit_once('/') {
            Some((address, name)) if !address.is_empty() && !address.ends_with('/') => {
                Self::new(address, name)
            }
            _ => Self::new(url, ""),
        }
    }

    /// `ingestion_address/stream_name`, or empty when both parts are empty.
    pub fn full_url(&self) -> String {
        match (self.ingestion_address.is_empty(), self.stream_name.is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.ingestion_address.clone(),
            _ => format!("{}/{}", self.ingestion_address, self.stream_name),
        }
    }
}

impl fmt::Display for IngestionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the stream name is a credential
        write!(f, "{}/<stream key>", self.ingestion_address)
    }
}

/// An upcoming broadcast and, when it has a bound stream that still exists, its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingEvent {
    pub event: BroadcastEvent,
    pub ingestion: Option<IngestionTarget>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn full_url_joins_address_and_name() {
        let target = IngestionTarget::new("rtmp://a.rtmp.youtube.com/live2", "key-123");
        assert_eq!(target.full_url(), "rtmp://a.rtmp.youtube.com/live2/key-123");
        assert_eq!(IngestionTarget::new("", "").full_url(), "");
    }

    #[test]
    fn from_url_splits_on_last_slash() {
        let target = IngestionTarget::from_url("rtmp://a.rtmp.youtube.com/live2/key-123");
        assert_eq!(target.ingestion_address, "rtmp://a.rtmp.youtube.com/live2");
        assert_eq!(target.stream_name, "key-123");
        assert_eq!(target.full_url(), "rtmp://a.rtmp.youtube.com/live2/key-123");

        assert_eq!(IngestionTarget::from_url("").full_url(), "");
    }

    #[test]
    fn display_hides_stream_key() {
        let target = IngestionTarget::new("rtmp://host/app", "secret");
        assert_eq!(target.to_string(), "rtmp://host/app/<stream key>");
    }

    #[test]
    fn event_from_remote_normalizes_thumbnail_and_status() {
        let broadcast: LiveBroadcast = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "snippet": {
                "title": "Morning",
                "thumbnails": { "default": { "url": "//i.ytimg.com/vi/abc/default.jpg" } }
            },
            "status": { "lifeCycleStatus": "ready", "privacyStatus": "unlisted" },
            "contentDetails": { "boundStreamId": "s1" }
        }))
        .unwrap();

        let event = BroadcastEvent::from_remote(broadcast, true);
        assert_eq!(event.status, EventStatus::Bound);
        assert_eq!(event.privacy_status, PrivacyStatus::Unlisted);
        assert_eq!(event.bound_stream_id.as_deref(), Some("s1"));
        assert_eq!(
            event.thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/abc/default.jpg")
        );
        assert_eq!(event.watch_url(), "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn remote_status_mapping() {
        use BroadcastLifeCycleStatus as Remote;
        assert_eq!(EventStatus::from_remote(Remote::Ready, false), EventStatus::Created);
        assert_eq!(EventStatus::from_remote(Remote::Ready, true), EventStatus::Bound);
        assert_eq!(EventStatus::from_remote(Remote::LiveStarting, true), EventStatus::Live);
        assert_eq!(EventStatus::from_remote(Remote::Revoked, false), EventStatus::Complete);
    }
}
