//! Microphone capture: devices, end-of-utterance detection and sessions.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod detector;
pub mod device;
pub mod session;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use capture::CpalMicrophone;
pub use detector::{DetectorEvent, DetectorSettings, EndOfUtteranceDetector};
pub use device::{DeviceStream, Microphone, ScriptedMicrophone, StreamGuard};
pub use session::{
    CaptureCall, CaptureDriver, CapturePhase, CaptureSession, CaptureSignal, RecordingCapture,
    SessionId, TaskCapture, UtteranceAudio,
};
