//! Short, transient messages for the user.
//!
//! One constructor per message so wording stays consistent wherever it is raised.

use crate::error::{Error, Fault};
use crate::session::EncoderMode;

/// A transient, non-blocking notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Stable identifier, e.g. for de-duplication by the host.
    pub id: &'static str,
    pub message: String,
}

impl Notification {
    fn new(id: &'static str, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
        }
    }
}

/// Publishing was requested without somewhere to publish to.
pub fn empty_url() -> Notification {
    Notification::new("wm_empty_url", "Publish address must not be empty.")
}

/// Which encoder a new publish runs on.
pub fn encoder_in_use(mode: EncoderMode) -> Notification {
    let message = match mode {
        EncoderMode::Hardware => "Using hardware encoder.",
        EncoderMode::Software => "Using software encoder.",
    };
    Notification::new("wm_encoder_in_use", message)
}

pub fn network_weak() -> Notification {
    Notification::new("wm_network_weak", "Network signal is weak.")
}

pub fn network_resume() -> Notification {
    Notification::new("wm_network_resume", "Network signal recovered.")
}

/// Status text from the RTMP layer, passed through as-is.
pub fn rtmp_status(message: &str) -> Notification {
    Notification::new("wm_rtmp_status", message)
}

pub fn rtmp_stopped() -> Notification {
    Notification::new("wm_rtmp_stopped", "Stopped.")
}

pub fn rtmp_disconnected() -> Notification {
    Notification::new("wm_rtmp_disconnected", "Not connected to the server.")
}

pub fn record_paused() -> Notification {
    Notification::new("wm_record_paused", "Record paused")
}

pub fn record_resumed() -> Notification {
    Notification::new("wm_record_resumed", "Record resumed")
}

pub fn record_started(file: &str) -> Notification {
    Notification::new("wm_record_started", format!("Recording file: {file}"))
}

pub fn record_finished(file: &str) -> Notification {
    Notification::new("wm_record_finished", format!("MP4 file saved: {file}"))
}

/// The broadcast could not be taken live.
pub fn go_live_failed(error: &Error) -> Notification {
    Notification::new("wm_go_live_failed", format!("Could not go live: {error}"))
}

/// A publisher fault; the message is the fault's own.
pub fn fault(fault: &Fault) -> Notification {
    Notification::new("wm_fault", fault.message.clone())
}
