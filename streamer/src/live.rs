//! A publishing session tied to one broadcast.
//!
//! Starting a session begins publishing right away and takes the broadcast live in the
//! background once the warm-up delay has passed. Stopping it stops publishing, ends the
//! broadcast, and hands its id back to the host.

use crate::error::{Error, Result};
use crate::event::{BroadcastEvent, EventStatus, IngestionTarget};
use crate::lifecycle::BroadcastLifecycleManager;
use crate::notifications;
use crate::publisher::{Orientation, Publisher};
use crate::remote::RemoteBroadcastClient;
use crate::session::StreamSessionController;
use crate::youtube_api::PrivacyStatus;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

type GoLiveTask = JoinHandle<(Result<()>, BroadcastEvent)>;

pub struct LiveSession<P: Publisher, C> {
    controller: StreamSessionController<P>,
    lifecycle: BroadcastLifecycleManager<C>,
    /// The event as of session start, kept in case the go-live task is lost.
    snapshot: BroadcastEvent,
    go_live: GoLiveTask,
    cancel: CancellationToken,
    // cancels the go-live task if the session is dropped without `stop`
    _guard: DropGuard,
}

impl<P: Publisher, C> std::fmt::Debug for LiveSession<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("broadcast_id", &self.snapshot.id)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

impl<P: Publisher, C: RemoteBroadcastClient> LiveSession<P, C> {
    /// Starts publishing `event`'s media to `target` and schedules the live transition.
    ///
    /// `event` must already be bound. If publishing cannot start nothing is scheduled.
    /// Must be called from within a Tokio runtime.
    pub fn start(
        mut controller: StreamSessionController<P>,
        lifecycle: BroadcastLifecycleManager<C>,
        event: BroadcastEvent,
        target: &IngestionTarget,
    ) -> Result<Self> {
        if event.status != EventStatus::Bound {
            return Err(Error::invalid_state("start session", event.status));
        }
        controller.start_publish(target)?;

        let cancel = CancellationToken::new();
        let snapshot = event.clone();
        let go_live = {
            let lifecycle = lifecycle.clone();
            let cancel = cancel.clone();
            let notifier = controller.notifier();
            let mut event = event;
            tokio::spawn(async move {
                let result = lifecycle.go_live(&mut event, &cancel).await;
                match &result {
                    Ok(()) | Err(Error::Cancelled) => {}
                    Err(e) => {
                        tracing::error!(broadcast_id = %event.id, error = %e, "could not go live");
                        if notifier.send(notifications::go_live_failed(e)).is_err() {
                            tracing::trace!("notification dropped, nobody is listening");
                        }
                    }
                }
                (result, event)
            })
        };
        tracing::info!(broadcast_id = %snapshot.id, "live session started");

        Ok(Self {
            controller,
            lifecycle,
            snapshot,
            go_live,
            _guard: cancel.clone().drop_guard(),
            cancel,
        })
    }

    /// Starts a session for a broadcast that was created and bound elsewhere, given only its
    /// id and the complete RTMP publish URL.
    ///
    /// An empty `rtmp_url` is a [`Error::Configuration`] error.
    pub fn start_for(
        controller: StreamSessionController<P>,
        lifecycle: BroadcastLifecycleManager<C>,
        broadcast_id: impl Into<String>,
        rtmp_url: &str,
    ) -> Result<Self> {
        let target = IngestionTarget::from_url(rtmp_url);
        let event = BroadcastEvent {
            id: broadcast_id.into(),
            title: String::new(),
            description: String::new(),
            scheduled_start_time: None,
            privacy_status: PrivacyStatus::Public,
            bound_stream_id: None,
            thumbnail_url: None,
            status: EventStatus::Bound,
        };
        Self::start(controller, lifecycle, event, &target)
    }

    pub fn broadcast_id(&self) -> &str {
        &self.snapshot.id
    }

    pub fn controller(&self) -> &StreamSessionController<P> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut StreamSessionController<P> {
        &mut self.controller
    }

    /// Whether the live transition is still pending.
    pub fn go_live_pending(&self) -> bool {
        !self.go_live.is_finished()
    }

    pub fn on_orientation_changed(&mut self, orientation: Orientation) -> Result<()> {
        self.controller.on_orientation_changed(orientation)
    }

    /// Waits for the next publisher event and applies it. Returns `false` once the
    /// publisher has gone away.
    pub async fn process_next_event(&mut self) -> bool {
        let Some(event) = self.controller.next_event().await else {
            return false;
        };
        self.controller.handle_event(event);
        true
    }

    /// Stops publishing, cancels a pending live transition, ends the broadcast and returns
    /// its id.
    ///
    /// Publishing is always stopped and ending is attempted even if going live failed. That
    /// go-live failure is returned in preference to any error from ending.
    #[tracing::instrument(skip(self), fields(broadcast_id = %self.snapshot.id))]
    pub async fn stop(self) -> Result<String> {
        let Self {
            mut controller,
            lifecycle,
            snapshot,
            go_live,
            cancel,
            _guard,
        } = self;

        cancel.cancel();
        controller.stop_publish();

        let (went_live, mut event) = match go_live.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "go-live task failed");
                (Ok(()), snapshot)
            }
        };

        let ended = if matches!(event.status, EventStatus::Bound | EventStatus::Live) {
            lifecycle.end(&mut event).await
        } else {
            Ok(())
        };
        tracing::info!(status = %event.status, "live session stopped");

        match (went_live, ended) {
            (Err(Error::Cancelled) | Ok(()), ended) => ended.map(|()| event.id),
            (Err(e), ended) => {
                if let Err(end_error) = ended {
                    tracing::warn!(error = %end_error, "could not end broadcast either");
                }
                Err(e)
            }
        }
    }
}
