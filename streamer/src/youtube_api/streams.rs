//! `liveStreams` resources: the ingestion side of a live event.
//!
//! A stream describes where an encoder must push media (ingestion address plus stream
//! name) and in which format. It is bound to a broadcast to put that media in front of
//! viewers.

use crate::youtube_api::types::PageInfo;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Response of `liveStreams.list`.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams/list>
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamListResponse {
    #[serde(default)]
    pub items: VecDeque<LiveStream>,
    #[serde(default)]
    pub page_info: PageInfo,
    pub next_page_token: Option<String>,
}

/// A `liveStream` resource as returned by the API.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#resource>
#[derive(Debug, Clone, Deserialize)]
pub struct LiveStream {
    pub id: String,
    pub snippet: Option<LiveStreamSnippet>,
    pub cdn: Option<CdnSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveStreamSnippet {
    pub title: String,
}

/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#cdn>
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnSettings {
    pub ingestion_type: Option<String>,
    pub resolution: Option<String>,
    pub ingestion_info: Option<IngestionInfo>,
}

/// Where the encoder must send media for this stream.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#cdn.ingestionInfo>
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionInfo {
    pub ingestion_address: String,
    pub stream_name: String,
    pub backup_ingestion_address: Option<String>,
}

/// Body of `liveStreams.insert` (`part=snippet,cdn`).
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams/insert>
#[derive(Debug, Serialize)]
pub struct LiveStreamInsertRequest {
    pub snippet: LiveStreamInsertSnippet,
    pub cdn: CdnInsertSettings,
}

#[derive(Debug, Serialize)]
pub struct LiveStreamInsertSnippet {
    pub title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnInsertSettings {
    pub ingestion_type: String,
    pub resolution: String,
    pub frame_rate: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ingestion_info() {
        let response: LiveStreamListResponse = serde_json::from_value(serde_json::json!({
            "items": [{
                "id": "stream-1",
                "cdn": {
                    "ingestionType": "rtmp",
                    "resolution": "720p",
                    "ingestionInfo": {
                        "ingestionAddress": "rtmp://a.rtmp.youtube.com/live2",
                        "streamName": "abcd-efgh",
                        "backupIngestionAddress": "rtmp://b.rtmp.youtube.com/live2?backup=1"
                    }
                }
            }]
        }))
        .unwrap();
        let info = response.items[0]
            .cdn
            .as_ref()
            .and_then(|cdn| cdn.ingestion_info.as_ref())
            .unwrap();
        assert_eq!(info.ingestion_address, "rtmp://a.rtmp.youtube.com/live2");
        assert_eq!(info.stream_name, "abcd-efgh");
    }

    #[test]
    fn empty_list_has_no_items() {
        let response: LiveStreamListResponse =
            serde_json::from_value(serde_json::json!({ "kind": "youtube#liveStreamListResponse" }))
                .unwrap();
        assert!(response.items.is_empty());
    }
}
