//! Real microphone capture using CPAL (Cross-Platform Audio Library).

use crate::audio::detector::amplitude_level;
use crate::audio::device::{DeviceStream, Microphone};
use crate::audio::wav::{bytes_to_pcm, downmix, encode_wav, pcm_to_bytes, resample};
use crate::defaults;
use crate::error::{DeviceError, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// Map a backend error message onto the device error taxonomy.
fn classify_backend_error(message: &str) -> DeviceError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        DeviceError::Denied
    } else if lower.contains("busy") || lower.contains("in use") {
        DeviceError::Busy
    } else if lower.contains("not available") || lower.contains("no such device") {
        DeviceError::NotFound
    } else {
        DeviceError::Other(message.to_string())
    }
}

/// List usable input devices, preferred ones marked "\[recommended\]".
pub fn list_devices() -> std::result::Result<Vec<String>, DeviceError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| classify_backend_error(&e.to_string()))?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }
    Ok(device_names)
}

/// Get the best default input device, preferring PipeWire/PulseAudio.
fn get_best_default_device(host: &cpal::Host) -> std::result::Result<cpal::Device, DeviceError> {
    if let Ok(devices) = host.input_devices() {
        for device in devices {
            if let Ok(name) = device.name()
                && is_preferred_device(&name)
            {
                return Ok(device);
            }
        }
    }
    host.default_input_device().ok_or(DeviceError::NotFound)
}

fn find_device(device_name: Option<&str>) -> std::result::Result<cpal::Device, DeviceError> {
    let host = cpal::default_host();
    let Some(name) = device_name else {
        return get_best_default_device(&host);
    };

    let devices = host
        .input_devices()
        .map_err(|e| classify_backend_error(&e.to_string()))?;
    for device in devices {
        if let Ok(dev_name) = device.name()
            && dev_name == name
        {
            return Ok(device);
        }
    }
    Err(DeviceError::NotFound)
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched from the capture task that owns the
/// `CpalStream`, never concurrently.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Samples delivered by the device callback, shared with the stream handle.
#[derive(Default)]
struct Captured {
    pending: Vec<i16>,
    level_window: Vec<i16>,
}

impl Captured {
    fn push(&mut self, samples: &[i16]) {
        self.pending.extend_from_slice(samples);
        self.level_window.extend_from_slice(samples);
    }
}

/// Microphone backed by the system's default (or a named) input device.
///
/// Captures mono 16-bit PCM at the configured rate and seals utterances as WAV.
pub struct CpalMicrophone {
    device_name: Option<String>,
    sample_rate: u32,
}

impl CpalMicrophone {
    pub fn new(device_name: Option<String>, sample_rate: u32) -> Self {
        Self {
            device_name,
            sample_rate,
        }
    }
}

impl Default for CpalMicrophone {
    fn default() -> Self {
        Self::new(None, defaults::SAMPLE_RATE)
    }
}

#[async_trait]
impl Microphone for CpalMicrophone {
    async fn acquire(&self) -> std::result::Result<Box<dyn DeviceStream>, DeviceError> {
        let device_name = self.device_name.clone();
        let sample_rate = self.sample_rate;

        let opened = tokio::task::spawn_blocking(move || open_stream(device_name, sample_rate))
            .await
            .map_err(|e| DeviceError::Other(format!("capture thread failed: {}", e)))?;

        opened.map(|stream| Box::new(stream) as Box<dyn DeviceStream>)
    }
}

fn open_stream(
    device_name: Option<String>,
    sample_rate: u32,
) -> std::result::Result<CpalStream, DeviceError> {
    let device = find_device(device_name.as_deref())?;
    let captured = Arc::new(Mutex::new(Captured::default()));
    let stream = build_stream(&device, sample_rate, Arc::clone(&captured))?;
    stream
        .play()
        .map_err(|e| classify_backend_error(&e.to_string()))?;

    if let Ok(name) = device.name() {
        tracing::info!("Microphone opened: {}", name);
    }

    Ok(CpalStream {
        stream: Some(SendableStream(stream)),
        captured,
        sample_rate,
    })
}

/// Build the input stream.
///
/// Tries i16 then f32 at the target rate/mono, then falls back to the
/// device's native config with software downmix and resampling.
fn build_stream(
    device: &cpal::Device,
    sample_rate: u32,
    captured: Arc<Mutex<Captured>>,
) -> std::result::Result<cpal::Stream, DeviceError> {
    let preferred_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_callback = |err| {
        tracing::warn!("Audio stream error: {}", err);
    };

    let sink = Arc::clone(&captured);
    if let Ok(stream) = device.build_input_stream(
        &preferred_config,
        move |data: &[i16], _: &cpal::InputCallbackInfo| {
            if let Ok(mut buf) = sink.lock() {
                buf.push(data);
            }
        },
        err_callback,
        None,
    ) {
        return Ok(stream);
    }

    let sink = Arc::clone(&captured);
    if let Ok(stream) = device.build_input_stream(
        &preferred_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let converted = f32_to_i16(data);
            if let Ok(mut buf) = sink.lock() {
                buf.push(&converted);
            }
        },
        err_callback,
        None,
    ) {
        return Ok(stream);
    }

    build_stream_native(device, sample_rate, captured)
}

fn build_stream_native(
    device: &cpal::Device,
    target_rate: u32,
    captured: Arc<Mutex<Captured>>,
) -> std::result::Result<cpal::Stream, DeviceError> {
    use cpal::SampleFormat;

    let default_config = device
        .default_input_config()
        .map_err(|e| classify_backend_error(&e.to_string()))?;

    let native_rate = default_config.sample_rate().0;
    let native_channels = default_config.channels() as usize;
    let stream_config: cpal::StreamConfig = default_config.clone().into();

    tracing::info!(
        "Using native audio format ({}ch/{}Hz/{:?}), converting in software",
        native_channels,
        native_rate,
        default_config.sample_format(),
    );

    let err_callback = |err| {
        tracing::warn!("Audio stream error: {}", err);
    };

    let result = match default_config.sample_format() {
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let mono = resample(&downmix(data, native_channels), native_rate, target_rate);
                if let Ok(mut buf) = captured.lock() {
                    buf.push(&mono);
                }
            },
            err_callback,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = resample(
                    &downmix(&f32_to_i16(data), native_channels),
                    native_rate,
                    target_rate,
                );
                if let Ok(mut buf) = captured.lock() {
                    buf.push(&mono);
                }
            },
            err_callback,
            None,
        ),
        fmt => {
            return Err(DeviceError::Other(format!(
                "Unsupported native sample format: {:?}",
                fmt
            )));
        }
    };

    result.map_err(|e| classify_backend_error(&e.to_string()))
}

fn f32_to_i16(data: &[f32]) -> Vec<i16> {
    data.iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

struct CpalStream {
    stream: Option<SendableStream>,
    captured: Arc<Mutex<Captured>>,
    sample_rate: u32,
}

impl DeviceStream for CpalStream {
    fn mime(&self) -> &str {
        defaults::WAV_MIME
    }

    fn amplitude(&mut self) -> u8 {
        match self.captured.lock() {
            Ok(mut buf) => {
                let level = amplitude_level(&buf.level_window);
                buf.level_window.clear();
                level
            }
            Err(_) => 0,
        }
    }

    fn take_chunk(&mut self) -> Vec<u8> {
        match self.captured.lock() {
            Ok(mut buf) => pcm_to_bytes(&std::mem::take(&mut buf.pending)),
            Err(_) => Vec::new(),
        }
    }

    fn seal(&self, chunks: Vec<u8>) -> Result<Vec<u8>> {
        encode_wav(&bytes_to_pcm(&chunks), self.sample_rate)
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.0.pause() {
                tracing::debug!("Pausing audio stream failed: {}", e);
            }
            tracing::debug!("Microphone released");
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51"));
        assert!(should_filter_device("front:CARD=PCH"));
        assert!(should_filter_device("HDMI Output"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("Built-in Audio"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("PipeWire"));
        assert!(is_preferred_device("pulse"));
        assert!(!is_preferred_device("hw:0,0"));
    }

    #[test]
    fn test_classify_backend_error() {
        assert_eq!(
            classify_backend_error("Permission denied (os error 13)"),
            DeviceError::Denied
        );
        assert_eq!(
            classify_backend_error("Device or resource busy"),
            DeviceError::Busy
        );
        assert_eq!(
            classify_backend_error("The requested device is no longer available"),
            DeviceError::NotFound
        );
        assert_eq!(
            classify_backend_error("snd_pcm_open failed"),
            DeviceError::Other("snd_pcm_open failed".to_string())
        );
    }

    #[test]
    fn test_captured_feeds_chunks_and_levels_independently() {
        let mut captured = Captured::default();
        captured.push(&[i16::MAX; 4]);
        assert_eq!(captured.pending.len(), 4);
        assert_eq!(captured.level_window.len(), 4);
    }

    #[test]
    fn test_f32_conversion_clamps() {
        assert_eq!(f32_to_i16(&[2.0, -2.0, 0.0]), vec![i16::MAX, -i16::MAX, 0]);
    }

    #[tokio::test]
    #[ignore] // Requires audio hardware
    async fn test_acquire_default_device() {
        let mic = CpalMicrophone::default();
        let mut stream = mic.acquire().await.unwrap();
        let _ = stream.amplitude();
        stream.release();
    }

    #[tokio::test]
    async fn test_acquire_unknown_device_fails_cleanly() {
        let mic = CpalMicrophone::new(Some("NonExistentDevice12345".to_string()), 16000);
        assert!(mic.acquire().await.is_err());
    }
}
