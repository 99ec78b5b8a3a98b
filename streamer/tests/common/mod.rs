#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use watchme_live::config::Resolution;
use watchme_live::notifications::Notification;
use watchme_live::publisher::{Orientation, Publisher, PublisherListeners};
use watchme_live::youtube_api::{BroadcastStatus, PrivacyStatus};
use watchme_live::{
    BroadcastEvent, Error, EventStatus, Fault, IngestionTarget, RemoteBroadcastClient, Result,
    StreamSessionController, UpcomingEvent,
};

pub const BROADCAST_ID: &str = "broadcast-1";
pub const STREAM_ID: &str = "stream-1";

/// Remote service that keeps everything in memory and records transitions.
#[derive(Default)]
pub struct InMemoryRemote {
    pub targets: HashMap<String, IngestionTarget>,
    pub transitions: Mutex<Vec<(String, BroadcastStatus)>>,
    /// Reject every transition to `live`.
    pub refuse_live: bool,
}

impl InMemoryRemote {
    pub fn with_stream() -> Self {
        Self {
            targets: HashMap::from([(
                STREAM_ID.to_string(),
                IngestionTarget::new("rtmp://a.rtmp.youtube.com/live2", "abcd-efgh"),
            )]),
            ..Self::default()
        }
    }

    pub fn refusing_live(self) -> Self {
        Self {
            refuse_live: true,
            ..self
        }
    }

    pub fn transitions(&self) -> Vec<(String, BroadcastStatus)> {
        self.transitions.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteBroadcastClient for InMemoryRemote {
    async fn create_live_event(&self, description: &str, title: &str) -> Result<BroadcastEvent> {
        Ok(BroadcastEvent {
            id: BROADCAST_ID.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            scheduled_start_time: Some(jiff::Timestamp::now()),
            privacy_status: PrivacyStatus::Public,
            bound_stream_id: Some(STREAM_ID.to_string()),
            thumbnail_url: None,
            status: EventStatus::Created,
        })
    }

    async fn list_upcoming_events(&self) -> Result<Vec<UpcomingEvent>> {
        Ok(Vec::new())
    }

    async fn resolve_ingestion_target(&self, stream_id: &str) -> Result<Option<IngestionTarget>> {
        Ok(self.targets.get(stream_id).cloned())
    }

    async fn transition_broadcast(
        &self,
        broadcast_id: &str,
        target: BroadcastStatus,
    ) -> Result<()> {
        if self.refuse_live && target == BroadcastStatus::Live {
            return Err(Error::RemoteService {
                code: 403,
                message: "Invalid transition".to_string(),
            });
        }
        self.transitions
            .lock()
            .unwrap()
            .push((broadcast_id.to_string(), target));
        Ok(())
    }
}

/// Handle onto what a [`RecordingPublisher`] was asked to do.
#[derive(Clone, Default)]
pub struct PublisherLog {
    calls: Arc<Mutex<Vec<String>>>,
    listeners: Arc<Mutex<Option<PublisherListeners>>>,
}

impl PublisherLog {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn listeners(&self) -> PublisherListeners {
        self.listeners
            .lock()
            .unwrap()
            .clone()
            .expect("listeners are set at construction")
    }

    fn push(&self, call: impl Into<String>) -> std::result::Result<(), Fault> {
        self.calls.lock().unwrap().push(call.into());
        Ok(())
    }
}

pub struct RecordingPublisher {
    pub cameras: usize,
    pub log: PublisherLog,
}

impl Publisher for RecordingPublisher {
    fn set_listeners(&mut self, listeners: PublisherListeners) {
        *self.log.listeners.lock().unwrap() = Some(listeners);
    }
    fn set_preview_resolution(&mut self, width: u32, height: u32) {
        let _ = self.log.push(format!("preview {width}x{height}"));
    }
    fn set_output_resolution(&mut self, width: u32, height: u32) {
        let _ = self.log.push(format!("output {width}x{height}"));
    }
    fn set_screen_orientation(&mut self, orientation: Orientation) {
        let _ = self.log.push(format!("orientation {orientation:?}"));
    }
    fn camera_count(&self) -> usize {
        self.cameras
    }
    fn switch_camera_face(&mut self, index: usize) -> std::result::Result<(), Fault> {
        self.log.push(format!("switch camera {index}"))
    }
    fn start_camera(&mut self) -> std::result::Result<(), Fault> {
        self.log.push("start camera")
    }
    fn switch_to_hard_encoder(&mut self) -> std::result::Result<(), Fault> {
        self.log.push("hard encoder")
    }
    fn switch_to_soft_encoder(&mut self) -> std::result::Result<(), Fault> {
        self.log.push("soft encoder")
    }
    fn start_encode(&mut self) -> std::result::Result<(), Fault> {
        self.log.push("start encode")
    }
    fn stop_encode(&mut self) -> std::result::Result<(), Fault> {
        self.log.push("stop encode")
    }
    fn start_publish(&mut self, url: &str) -> std::result::Result<(), Fault> {
        self.log.push(format!("start publish {url}"))
    }
    fn stop_publish(&mut self) -> std::result::Result<(), Fault> {
        self.log.push("stop publish")
    }
    fn start_record(&mut self, path: &str) -> std::result::Result<(), Fault> {
        self.log.push(format!("start record {path}"))
    }
    fn stop_record(&mut self) -> std::result::Result<(), Fault> {
        self.log.push("stop record")
    }
    fn pause_record(&mut self) -> std::result::Result<(), Fault> {
        self.log.push("pause record")
    }
    fn resume_record(&mut self) -> std::result::Result<(), Fault> {
        self.log.push("resume record")
    }
}

pub fn controller(
    cameras: usize,
) -> (
    StreamSessionController<RecordingPublisher>,
    PublisherLog,
    mpsc::UnboundedReceiver<Notification>,
) {
    let log = PublisherLog::default();
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = StreamSessionController::new(
        RecordingPublisher {
            cameras,
            log: log.clone(),
        },
        Resolution {
            width: 1280,
            height: 720,
        },
        Resolution {
            width: 720,
            height: 1280,
        },
        tx,
    )
    .expect("construct controller");
    (controller, log, rx)
}

pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}
