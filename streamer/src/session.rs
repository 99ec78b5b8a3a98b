//! Local capture and publish state, and the controller that drives the publisher library.

use crate::config::Resolution;
use crate::error::{Error, Fault, Result};
use crate::event::IngestionTarget;
use crate::notifications::{self, Notification};
use crate::publisher::{
    EncodeEvent, Orientation, Publisher, PublisherEvent, PublisherListeners, RecordEvent,
    RtmpEvent,
};
use std::fmt;
use tokio::sync::mpsc;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncoderMode {
    #[default]
    Hardware,
    Software,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PublishState {
    #[default]
    Idle,
    Publishing,
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Publishing => write!(f, "publishing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordState {
    #[default]
    Stopped,
    Recording,
    Paused,
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Recording => write!(f, "recording"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Last values reported by the RTMP layer. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StreamMetrics {
    pub video_fps: Option<f64>,
    pub video_bitrate: Option<f64>,
    pub audio_bitrate: Option<f64>,
}

/// Local capture/publish state.
///
/// `encoder_mode` never changes while `publish_state` is [`PublishState::Publishing`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamSession {
    /// Index of the active capture device.
    pub camera_facing: usize,
    pub camera_count: usize,
    pub encoder_mode: EncoderMode,
    pub publish_state: PublishState,
    pub record_state: RecordState,
    pub metrics: StreamMetrics,
}

/// Maps user intent to publisher commands and publisher events back to session state and
/// notifications.
///
/// The controller exclusively owns the publisher. Dropping it while publishing or
/// recording stops both.
pub struct StreamSessionController<P: Publisher> {
    publisher: P,
    session: StreamSession,
    events: mpsc::UnboundedReceiver<PublisherEvent>,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl<P: Publisher> fmt::Debug for StreamSessionController<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSessionController")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<P: Publisher> StreamSessionController<P> {
    /// Wires the publisher's listeners to this controller, applies the capture and output
    /// sizes, and starts the camera preview when a camera is present.
    pub fn new(
        mut publisher: P,
        preview: Resolution,
        output: Resolution,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        publisher.set_listeners(PublisherListeners::new(tx));
        publisher.set_preview_resolution(preview.width, preview.height);
        publisher.set_output_resolution(output.width, output.height);

        let camera_count = publisher.camera_count();
        if camera_count > 0 {
            publisher.start_camera()?;
        } else {
            tracing::warn!("no camera available, preview not started");
        }

        Ok(Self {
            publisher,
            session: StreamSession {
                camera_count,
                ..StreamSession::default()
            },
            events,
            notifications,
        })
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Another sender onto the host's notification channel.
    pub fn notifier(&self) -> mpsc::UnboundedSender<Notification> {
        self.notifications.clone()
    }

    fn notify(&self, notification: Notification) {
        tracing::debug!(id = notification.id, message = %notification.message, "notify");
        if self.notifications.send(notification).is_err() {
            tracing::trace!("notification dropped, nobody is listening");
        }
    }

    /// Runs a publisher command. A fault is handled like any other runtime fault and then
    /// returned.
    fn command(
        &mut self,
        name: &'static str,
        f: impl FnOnce(&mut P) -> std::result::Result<(), Fault>,
    ) -> Result<()> {
        if let Err(fault) = f(&mut self.publisher) {
            tracing::error!(command = name, %fault, "publisher command failed");
            self.handle_fault(fault.clone());
            return Err(fault.into());
        }
        Ok(())
    }

    /// Starts publishing to `target`.
    ///
    /// An empty URL is a [`Error::Configuration`] error and leaves the session idle.
    #[instrument(skip_all, fields(target = %target))]
    pub fn start_publish(&mut self, target: &IngestionTarget) -> Result<()> {
        if self.session.publish_state == PublishState::Publishing {
            return Err(Error::invalid_state(
                "start publishing",
                self.session.publish_state,
            ));
        }
        let url = target.full_url();
        if url.is_empty() {
            self.notify(notifications::empty_url());
            return Err(Error::Configuration(
                "ingestion URL must not be empty".to_string(),
            ));
        }

        self.command("start_publish", |p| p.start_publish(&url))?;
        if self.session.camera_count > 0 {
            self.command("start_camera", |p| p.start_camera())?;
        }

        self.session.publish_state = PublishState::Publishing;
        self.notify(notifications::encoder_in_use(self.session.encoder_mode));
        tracing::info!(encoder = ?self.session.encoder_mode, "publishing");
        Ok(())
    }

    /// Stops publishing and recording. Best effort: publisher faults are logged and the
    /// session ends up idle regardless.
    #[instrument(skip_all)]
    pub fn stop_publish(&mut self) {
        if let Err(fault) = self.publisher.stop_publish() {
            tracing::warn!(%fault, "stop publish failed");
        }
        if let Err(fault) = self.publisher.stop_record() {
            tracing::warn!(%fault, "stop record failed");
        }
        self.session.publish_state = PublishState::Idle;
        self.session.record_state = RecordState::Stopped;
        tracing::info!("publishing stopped");
    }

    /// Moves to the next capture device and returns its index.
    pub fn switch_camera(&mut self) -> Result<usize> {
        let count = self.publisher.camera_count();
        self.session.camera_count = count;
        if count == 0 {
            return Err(Error::NoCamera);
        }
        let next = (self.session.camera_facing + 1) % count;
        self.command("switch_camera_face", |p| p.switch_camera_face(next))?;
        self.session.camera_facing = next;
        tracing::debug!(camera = next, count, "switched camera");
        Ok(next)
    }

    /// Switches between hardware and software encoding. Not allowed while publishing.
    pub fn set_encoder_mode(&mut self, mode: EncoderMode) -> Result<()> {
        if self.session.publish_state == PublishState::Publishing {
            return Err(Error::invalid_state(
                "change encoder",
                self.session.publish_state,
            ));
        }
        if self.session.encoder_mode == mode {
            return Ok(());
        }
        match mode {
            EncoderMode::Hardware => {
                self.command("switch_to_hard_encoder", |p| p.switch_to_hard_encoder())?
            }
            EncoderMode::Software => {
                self.command("switch_to_soft_encoder", |p| p.switch_to_soft_encoder())?
            }
        }
        self.session.encoder_mode = mode;
        tracing::info!(?mode, "encoder changed");
        Ok(())
    }

    /// Reconfigures capture for a new screen orientation.
    ///
    /// The encoder is stopped before the orientation changes and only restarted after, so
    /// it never sees frames of the old geometry. Recording does not survive the change.
    #[instrument(skip(self))]
    pub fn on_orientation_changed(&mut self, orientation: Orientation) -> Result<()> {
        self.command("stop_encode", |p| p.stop_encode())?;
        self.command("stop_record", |p| p.stop_record())?;
        self.session.record_state = RecordState::Stopped;
        self.publisher.set_screen_orientation(orientation);
        if self.session.publish_state == PublishState::Publishing {
            self.command("start_encode", |p| p.start_encode())?;
        }
        if self.session.camera_count > 0 {
            self.command("start_camera", |p| p.start_camera())?;
        }
        Ok(())
    }

    /// Starts recording to a local file at `path`.
    pub fn start_record(&mut self, path: &str) -> Result<()> {
        if self.session.record_state != RecordState::Stopped {
            return Err(Error::invalid_state(
                "start recording",
                self.session.record_state,
            ));
        }
        self.command("start_record", |p| p.start_record(path))?;
        self.session.record_state = RecordState::Recording;
        Ok(())
    }

    /// The host went to the background: pause any recording.
    pub fn on_host_paused(&mut self) -> Result<()> {
        if self.session.record_state != RecordState::Recording {
            return Ok(());
        }
        self.command("pause_record", |p| p.pause_record())?;
        self.session.record_state = RecordState::Paused;
        Ok(())
    }

    /// The host is back in the foreground: resume a paused recording.
    pub fn on_host_resumed(&mut self) -> Result<()> {
        if self.session.record_state != RecordState::Paused {
            return Ok(());
        }
        self.command("resume_record", |p| p.resume_record())?;
        self.session.record_state = RecordState::Recording;
        Ok(())
    }

    /// Waits for the next event from the publisher. `None` once the publisher has dropped
    /// its listeners.
    pub async fn next_event(&mut self) -> Option<PublisherEvent> {
        self.events.recv().await
    }

    /// Handles every event that has already arrived and returns how many there were.
    pub fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Applies one publisher event to the session.
    pub fn handle_event(&mut self, event: PublisherEvent) {
        match event {
            PublisherEvent::Encode(EncodeEvent::NetworkWeak) => {
                tracing::warn!("network weak");
                self.notify(notifications::network_weak());
            }
            PublisherEvent::Encode(EncodeEvent::NetworkResume) => {
                tracing::info!("network resumed");
                self.notify(notifications::network_resume());
            }
            PublisherEvent::Rtmp(RtmpEvent::Connecting(message))
            | PublisherEvent::Rtmp(RtmpEvent::Connected(message)) => {
                tracing::info!(%message, "rtmp");
                self.notify(notifications::rtmp_status(&message));
            }
            PublisherEvent::Rtmp(RtmpEvent::VideoStreaming)
            | PublisherEvent::Rtmp(RtmpEvent::AudioStreaming) => {
                tracing::trace!("media streaming");
            }
            PublisherEvent::Rtmp(RtmpEvent::Stopped) => {
                tracing::info!("rtmp stopped");
                self.notify(notifications::rtmp_stopped());
            }
            PublisherEvent::Rtmp(RtmpEvent::Disconnected) => {
                tracing::info!("rtmp disconnected");
                self.notify(notifications::rtmp_disconnected());
            }
            PublisherEvent::Rtmp(RtmpEvent::VideoFpsChanged(fps)) => {
                tracing::trace!(fps, "video fps");
                self.session.metrics.video_fps = Some(fps);
            }
            PublisherEvent::Rtmp(RtmpEvent::VideoBitrateChanged(bitrate)) => {
                tracing::trace!(bitrate, "video bitrate");
                self.session.metrics.video_bitrate = Some(bitrate);
            }
            PublisherEvent::Rtmp(RtmpEvent::AudioBitrateChanged(bitrate)) => {
                tracing::trace!(bitrate, "audio bitrate");
                self.session.metrics.audio_bitrate = Some(bitrate);
            }
            PublisherEvent::Record(RecordEvent::Paused) => {
                if self.session.record_state == RecordState::Recording {
                    self.session.record_state = RecordState::Paused;
                }
                self.notify(notifications::record_paused());
            }
            PublisherEvent::Record(RecordEvent::Resumed) => {
                if self.session.record_state == RecordState::Paused {
                    self.session.record_state = RecordState::Recording;
                }
                self.notify(notifications::record_resumed());
            }
            PublisherEvent::Record(RecordEvent::Started(file)) => {
                tracing::info!(%file, "recording started");
                self.session.record_state = RecordState::Recording;
                self.notify(notifications::record_started(&file));
            }
            PublisherEvent::Record(RecordEvent::Finished(file)) => {
                tracing::info!(%file, "recording finished");
                self.session.record_state = RecordState::Stopped;
                self.notify(notifications::record_finished(&file));
            }
            faulted @ (PublisherEvent::Encode(EncodeEvent::IllegalArgument(_))
            | PublisherEvent::Rtmp(
                RtmpEvent::SocketFault(_)
                | RtmpEvent::IoFault(_)
                | RtmpEvent::IllegalArgument(_)
                | RtmpEvent::IllegalState(_),
            )
            | PublisherEvent::Record(
                RecordEvent::IoFault(_) | RecordEvent::IllegalArgument(_),
            )) => {
                if let Some(fault) = faulted.fault() {
                    self.handle_fault(fault);
                }
            }
        }
    }

    /// Recovers from a runtime fault: tells the user, then force-stops publishing and
    /// recording. Failures while stopping are logged and swallowed.
    pub fn handle_fault(&mut self, fault: Fault) {
        tracing::error!(kind = %fault.kind, message = %fault.message, "publisher fault");
        self.notify(notifications::fault(&fault));
        self.stop_publish();
    }
}

impl<P: Publisher> Drop for StreamSessionController<P> {
    fn drop(&mut self) {
        if self.session.publish_state == PublishState::Publishing
            || self.session.record_state != RecordState::Stopped
        {
            tracing::info!("tearing down active session");
            self.stop_publish();
        }
    }
}
