//! The capture/encode/RTMP library the session controller drives.
//!
//! The library runs its own capture, encode and network threads. Commands go in through
//! [`Publisher`]; everything it reports comes back as [`PublisherEvent`]s over a channel,
//! split into three narrow listener handles so an implementation only ever sees the
//! capability it reports on.

use crate::error::{Fault, FaultKind};
use tokio::sync::mpsc;

/// Commands understood by a publisher library.
///
/// Calls return as soon as the library has accepted them. A command that the library
/// rejects synchronously reports it as a [`Fault`]; asynchronous failures arrive as
/// events instead.
pub trait Publisher: Send + 'static {
    /// Hands the library its callback channels. Called once, before any other command.
    fn set_listeners(&mut self, listeners: PublisherListeners);

    fn set_preview_resolution(&mut self, width: u32, height: u32);
    fn set_output_resolution(&mut self, width: u32, height: u32);
    fn set_screen_orientation(&mut self, orientation: Orientation);

    /// Number of capture devices.
    fn camera_count(&self) -> usize;
    fn switch_camera_face(&mut self, index: usize) -> Result<(), Fault>;
    fn start_camera(&mut self) -> Result<(), Fault>;

    fn switch_to_hard_encoder(&mut self) -> Result<(), Fault>;
    fn switch_to_soft_encoder(&mut self) -> Result<(), Fault>;
    fn start_encode(&mut self) -> Result<(), Fault>;
    fn stop_encode(&mut self) -> Result<(), Fault>;

    fn start_publish(&mut self, url: &str) -> Result<(), Fault>;
    fn stop_publish(&mut self) -> Result<(), Fault>;

    fn start_record(&mut self, path: &str) -> Result<(), Fault>;
    fn stop_record(&mut self) -> Result<(), Fault>;
    fn pause_record(&mut self) -> Result<(), Fault>;
    fn resume_record(&mut self) -> Result<(), Fault>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Encoder callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeEvent {
    NetworkWeak,
    NetworkResume,
    IllegalArgument(String),
}

/// RTMP connection callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum RtmpEvent {
    Connecting(String),
    Connected(String),
    VideoStreaming,
    AudioStreaming,
    Stopped,
    Disconnected,
    VideoFpsChanged(f64),
    VideoBitrateChanged(f64),
    AudioBitrateChanged(f64),
    SocketFault(String),
    IoFault(String),
    IllegalArgument(String),
    IllegalState(String),
}

/// Local recording callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEvent {
    Paused,
    Resumed,
    Started(String),
    Finished(String),
    IoFault(String),
    IllegalArgument(String),
}

/// Anything a publisher library reports, tagged with the listener that reported it.
#[derive(Debug, Clone, PartialEq)]
pub enum PublisherEvent {
    Encode(EncodeEvent),
    Rtmp(RtmpEvent),
    Record(RecordEvent),
}

impl PublisherEvent {
    /// The runtime fault carried by this event, if it is one.
    pub fn fault(&self) -> Option<Fault> {
        let (kind, message) = match self {
            Self::Encode(EncodeEvent::IllegalArgument(m))
            | Self::Rtmp(RtmpEvent::IllegalArgument(m))
            | Self::Record(RecordEvent::IllegalArgument(m)) => (FaultKind::IllegalArgument, m),
            Self::Rtmp(RtmpEvent::IllegalState(m)) => (FaultKind::IllegalState, m),
            Self::Rtmp(RtmpEvent::SocketFault(m)) => (FaultKind::Socket, m),
            Self::Rtmp(RtmpEvent::IoFault(m)) | Self::Record(RecordEvent::IoFault(m)) => {
                (FaultKind::Io, m)
            }
            _ => return None,
        };
        Some(Fault::new(kind, message.clone()))
    }
}

macro_rules! listener {
    ($(#[$doc:meta])* $name:ident, $event:ty, $variant:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(mpsc::UnboundedSender<PublisherEvent>);

        impl $name {
            /// Reports `event`. Events sent after the session is gone are dropped.
            pub fn send(&self, event: $event) {
                if self.0.send(PublisherEvent::$variant(event)).is_err() {
                    tracing::trace!("publisher event after session teardown");
                }
            }
        }
    };
}

listener!(
    /// Capability to report encoder events.
    EncodeListener,
    EncodeEvent,
    Encode
);
listener!(
    /// Capability to report RTMP events.
    RtmpListener,
    RtmpEvent,
    Rtmp
);
listener!(
    /// Capability to report recording events.
    RecordListener,
    RecordEvent,
    Record
);

/// The three listener handles, all feeding the same session.
#[derive(Debug, Clone)]
pub struct PublisherListeners {
    pub encode: EncodeListener,
    pub rtmp: RtmpListener,
    pub record: RecordListener,
}

impl PublisherListeners {
    pub fn new(tx: mpsc::UnboundedSender<PublisherEvent>) -> Self {
        Self {
            encode: EncodeListener(tx.clone()),
            rtmp: RtmpListener(tx.clone()),
            record: RecordListener(tx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn listeners_tag_their_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listeners = PublisherListeners::new(tx);
        listeners.encode.send(EncodeEvent::NetworkWeak);
        listeners.rtmp.send(RtmpEvent::Connecting("connecting".into()));
        listeners.record.send(RecordEvent::Paused);

        assert_eq!(rx.try_recv().unwrap(), PublisherEvent::Encode(EncodeEvent::NetworkWeak));
        assert_eq!(
            rx.try_recv().unwrap(),
            PublisherEvent::Rtmp(RtmpEvent::Connecting("connecting".into()))
        );
        assert_eq!(rx.try_recv().unwrap(), PublisherEvent::Record(RecordEvent::Paused));
    }

    #[test]
    fn send_after_receiver_dropped_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        let listeners = PublisherListeners::new(tx);
        drop(rx);
        listeners.rtmp.send(RtmpEvent::Stopped);
    }

    #[test]
    fn fault_classification() {
        let socket = PublisherEvent::Rtmp(RtmpEvent::SocketFault("reset".into()));
        assert_eq!(socket.fault(), Some(Fault::new(FaultKind::Socket, "reset")));

        let io = PublisherEvent::Record(RecordEvent::IoFault("disk full".into()));
        assert_eq!(io.fault().map(|f| f.kind), Some(FaultKind::Io));

        let encode = PublisherEvent::Encode(EncodeEvent::IllegalArgument("bad size".into()));
        assert_eq!(encode.fault().map(|f| f.kind), Some(FaultKind::IllegalArgument));

        assert_eq!(PublisherEvent::Rtmp(RtmpEvent::VideoFpsChanged(29.97)).fault(), None);
        assert_eq!(PublisherEvent::Encode(EncodeEvent::NetworkWeak).fault(), None);
    }
}
