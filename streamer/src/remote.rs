//! The broadcasting service as seen by the lifecycle manager.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::{BroadcastEvent, EventStatus, IngestionTarget, UpcomingEvent};
use crate::youtube_api::YouTubeClient;
use crate::youtube_api::broadcasts::{
    BroadcastStatus, LiveBroadcastInsertContentDetails, LiveBroadcastInsertRequest,
    LiveBroadcastInsertSnippet, LiveBroadcastInsertStatus, MonitorStreamInfo, PrivacyStatus,
};
use crate::youtube_api::streams::{
    CdnInsertSettings, LiveStreamInsertRequest, LiveStreamInsertSnippet,
};
use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use tokio_stream::StreamExt;

/// Operations against the remote broadcasting service.
#[async_trait]
pub trait RemoteBroadcastClient: Send + Sync + 'static {
    /// Schedules a new broadcast shortly in the future, creates an ingestion stream for it
    /// and binds the two. The returned event is [`EventStatus::Created`] with
    /// `bound_stream_id` set.
    async fn create_live_event(&self, description: &str, title: &str) -> Result<BroadcastEvent>;

    /// All upcoming broadcasts, each with its ingestion target when it has a bound stream.
    async fn list_upcoming_events(&self) -> Result<Vec<UpcomingEvent>>;

    /// The ingestion target of a stream, or `None` if the service knows no such stream (or
    /// has no ingestion info for it yet).
    async fn resolve_ingestion_target(&self, stream_id: &str) -> Result<Option<IngestionTarget>>;

    /// Requests a status transition for a broadcast. Returns as soon as the service accepts
    /// it; any warm-up delay is the caller's business.
    async fn transition_broadcast(&self, broadcast_id: &str, target: BroadcastStatus)
    -> Result<()>;
}

/// [`RemoteBroadcastClient`] backed by the YouTube Data API.
#[derive(Debug, Clone)]
pub struct YouTubeBroadcastClient {
    yt: YouTubeClient,
    start_offset: SignedDuration,
    privacy_status: PrivacyStatus,
    stream_resolution: String,
    stream_frame_rate: String,
    ingestion_type: String,
}

impl YouTubeBroadcastClient {
    pub fn new(yt: YouTubeClient, config: &Config) -> Result<Self> {
        config.validate()?;
        let start_offset = SignedDuration::try_from(config.scheduled_start_offset())
            .map_err(|e| Error::Configuration(format!("scheduled start offset: {e}")))?;
        let privacy_status = config
            .privacy_status
            .parse()
            .map_err(Error::Configuration)?;
        Ok(Self {
            yt,
            start_offset,
            privacy_status,
            stream_resolution: config.stream_resolution.clone(),
            stream_frame_rate: config.stream_frame_rate.clone(),
            ingestion_type: config.ingestion_type.clone(),
        })
    }

    pub fn youtube(&self) -> &YouTubeClient {
        &self.yt
    }

    fn scheduled_start(&self) -> Result<Timestamp> {
        Timestamp::now()
            .checked_add(self.start_offset)
            .map_err(|e| Error::Configuration(format!("scheduled start time: {e}")))
    }
}

#[async_trait]
impl RemoteBroadcastClient for YouTubeBroadcastClient {
    #[tracing::instrument(skip(self, description))]
    async fn create_live_event(&self, description: &str, title: &str) -> Result<BroadcastEvent> {
        let scheduled_start_time = self.scheduled_start()?;
        tracing::info!(%scheduled_start_time, "creating live event");

        let broadcast = self
            .yt
            .insert_live_broadcast(&LiveBroadcastInsertRequest {
                snippet: LiveBroadcastInsertSnippet {
                    title: title.to_string(),
                    description: description.to_string(),
                    scheduled_start_time,
                },
                status: LiveBroadcastInsertStatus {
                    privacy_status: self.privacy_status,
                },
                content_details: LiveBroadcastInsertContentDetails {
                    monitor_stream: MonitorStreamInfo {
                        enable_monitor_stream: false,
                    },
                },
            })
            .await?;

        let stream = self
            .yt
            .insert_live_stream(&LiveStreamInsertRequest {
                snippet: LiveStreamInsertSnippet {
                    title: title.to_string(),
                },
                cdn: CdnInsertSettings {
                    ingestion_type: self.ingestion_type.clone(),
                    resolution: self.stream_resolution.clone(),
                    frame_rate: self.stream_frame_rate.clone(),
                },
            })
            .await?;

        self.yt.bind_live_broadcast(&broadcast.id, &stream.id).await?;

        let mut event = BroadcastEvent::from_remote(broadcast, false);
        event.title = title.to_string();
        event.description = description.to_string();
        event.scheduled_start_time = Some(scheduled_start_time);
        event.privacy_status = self.privacy_status;
        event.bound_stream_id = Some(stream.id);
        event.status = EventStatus::Created;
        tracing::info!(broadcast_id = %event.id, "created live event");
        Ok(event)
    }

    #[tracing::instrument(skip(self))]
    async fn list_upcoming_events(&self) -> Result<Vec<UpcomingEvent>> {
        let broadcasts = self.yt.list_upcoming_live_broadcasts();
        let mut broadcasts = std::pin::pin!(broadcasts);

        let mut upcoming = Vec::new();
        while let Some(broadcast) = broadcasts.next().await {
            let broadcast = broadcast?;
            let stream_id = broadcast
                .content_details
                .as_ref()
                .and_then(|c| c.bound_stream_id.clone());
            let ingestion = match stream_id {
                Some(stream_id) => self.resolve_ingestion_target(&stream_id).await?,
                None => None,
            };
            upcoming.push(UpcomingEvent {
                event: BroadcastEvent::from_remote(broadcast, ingestion.is_some()),
                ingestion,
            });
        }
        tracing::debug!(count = upcoming.len(), "listed upcoming events");
        Ok(upcoming)
    }

    #[tracing::instrument(skip(self))]
    async fn resolve_ingestion_target(&self, stream_id: &str) -> Result<Option<IngestionTarget>> {
        let Some(stream) = self.yt.get_live_stream(stream_id).await? else {
            tracing::warn!(stream_id, "no such stream");
            return Ok(None);
        };
        let Some(info) = stream.cdn.and_then(|cdn| cdn.ingestion_info) else {
            tracing::warn!(stream_id, "stream has no ingestion info");
            return Ok(None);
        };
        Ok(Some(IngestionTarget::new(
            info.ingestion_address,
            info.stream_name,
        )))
    }

    async fn transition_broadcast(
        &self,
        broadcast_id: &str,
        target: BroadcastStatus,
    ) -> Result<()> {
        self.yt
            .transition_live_broadcast(broadcast_id, target)
            .await
            .map(|_| ())
    }
}
