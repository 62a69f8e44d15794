//! Signaling event decoding.
//!
//! Call frames are relayed verbatim between peers; the coordinator only
//! inspects them to mirror the handful of state-bearing events. A frame is
//! state-bearing when it is a JSON object whose `message` field equals one
//! of the known keywords. Everything else (SDP offers, ICE candidates,
//! chat) decodes to `None` and is relayed untouched.

use serde::Deserialize;

/// The state-bearing signaling events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    JoinedCall,
    LeftCall,
    StartedSharingScreen,
    StoppedSharingScreen,
    CameraOn,
    CameraOff,
}

#[derive(Deserialize)]
struct SignalFrame {
    message: Option<String>,
}

impl SignalEvent {
    /// Decode a raw frame payload. `None` means relay-only.
    pub fn decode(payload: &str) -> Option<Self> {
        let frame: SignalFrame = serde_json::from_str(payload).ok()?;
        match frame.message?.as_str() {
            "joined_call" => Some(Self::JoinedCall),
            "left_call" => Some(Self::LeftCall),
            "started_sharing_screen" => Some(Self::StartedSharingScreen),
            "stopped_sharing_screen" => Some(Self::StoppedSharingScreen),
            "camera_on" => Some(Self::CameraOn),
            "camera_off" => Some(Self::CameraOff),
            _ => None,
        }
    }

    /// Wire keyword, also used as the metrics label.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::JoinedCall => "joined_call",
            Self::LeftCall => "left_call",
            Self::StartedSharingScreen => "started_sharing_screen",
            Self::StoppedSharingScreen => "stopped_sharing_screen",
            Self::CameraOn => "camera_on",
            Self::CameraOff => "camera_off",
        }
    }
}
