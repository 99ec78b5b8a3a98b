//! Drives a single broadcast through `created → bound → live → complete`.

use crate::error::{Error, Result};
use crate::event::{BroadcastEvent, EventStatus, IngestionTarget};
use crate::remote::RemoteBroadcastClient;
use crate::youtube_api::BroadcastStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Owns the state machine over [`BroadcastEvent::status`].
///
/// Every operation checks the event's current status first and fails with
/// [`Error::InvalidState`] without touching the event or the remote service if the
/// operation is not allowed from there. A failed remote call also leaves the status as it
/// was; nothing is retried at this level.
pub struct BroadcastLifecycleManager<C> {
    remote: Arc<C>,
    go_live_delay: Duration,
}

impl<C> Clone for BroadcastLifecycleManager<C> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            go_live_delay: self.go_live_delay,
        }
    }
}

impl<C> std::fmt::Debug for BroadcastLifecycleManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastLifecycleManager")
            .field("go_live_delay", &self.go_live_delay)
            .finish_non_exhaustive()
    }
}

impl<C: RemoteBroadcastClient> BroadcastLifecycleManager<C> {
    /// `go_live_delay` is how long ingestion gets to warm up before the live transition
    /// is requested.
    pub fn new(remote: Arc<C>, go_live_delay: Duration) -> Self {
        Self {
            remote,
            go_live_delay,
        }
    }

    pub fn remote(&self) -> &C {
        &self.remote
    }

    /// Creates a new event on the remote service. The result is [`EventStatus::Created`].
    pub async fn create(&self, description: &str, title: &str) -> Result<BroadcastEvent> {
        let event = self.remote.create_live_event(description, title).await?;
        tracing::info!(broadcast_id = %event.id, status = %event.status, "broadcast created");
        Ok(event)
    }

    /// Resolves where media for `event` must be sent and moves it to
    /// [`EventStatus::Bound`].
    ///
    /// Only valid from `Created`. An event without a bound stream, or whose stream the
    /// service no longer knows, is a [`Error::Configuration`] error.
    #[instrument(skip_all, fields(broadcast_id = %event.id))]
    pub async fn bind(&self, event: &mut BroadcastEvent) -> Result<IngestionTarget> {
        if event.status != EventStatus::Created {
            return Err(Error::invalid_state("bind", event.status));
        }
        let Some(stream_id) = event.bound_stream_id.as_deref() else {
            return Err(Error::Configuration(format!(
                "broadcast {} has no bound stream",
                event.id
            )));
        };
        let Some(target) = self.remote.resolve_ingestion_target(stream_id).await? else {
            return Err(Error::Configuration(format!(
                "stream {stream_id} of broadcast {} has no ingestion target",
                event.id
            )));
        };

        event.status = EventStatus::Bound;
        tracing::info!(stream_id, %target, "broadcast bound");
        Ok(target)
    }

    /// Waits out the warm-up delay, then transitions `event` to live.
    ///
    /// Only valid from `Bound`. If `cancel` fires during the delay no transition is
    /// requested and [`Error::Cancelled`] is returned.
    #[instrument(skip_all, fields(broadcast_id = %event.id))]
    pub async fn go_live(
        &self,
        event: &mut BroadcastEvent,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if event.status != EventStatus::Bound {
            return Err(Error::invalid_state("go live", event.status));
        }

        tracing::debug!(delay = ?self.go_live_delay, "waiting for ingestion to warm up");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("go-live cancelled");
                return Err(Error::Cancelled);
            }
            _ = tokio::time::sleep(self.go_live_delay) => {}
        }

        self.remote
            .transition_broadcast(&event.id, BroadcastStatus::Live)
            .await?;
        event.status = EventStatus::Live;
        tracing::info!("broadcast is live");
        Ok(())
    }

    /// Transitions `event` to complete.
    ///
    /// Valid from `Live`, and from `Bound` for sessions stopped before the live
    /// transition went through.
    #[instrument(skip_all, fields(broadcast_id = %event.id))]
    pub async fn end(&self, event: &mut BroadcastEvent) -> Result<()> {
        if !matches!(event.status, EventStatus::Live | EventStatus::Bound) {
            return Err(Error::invalid_state("end", event.status));
        }

        self.remote
            .transition_broadcast(&event.id, BroadcastStatus::Complete)
            .await?;
        event.status = EventStatus::Complete;
        tracing::info!("broadcast complete");
        Ok(())
    }
}
