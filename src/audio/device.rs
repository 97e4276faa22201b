use crate::defaults;
use crate::error::{DeviceError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for microphone devices.
///
/// This trait allows swapping implementations (real audio device vs scripted).
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Open the device and start recording.
    ///
    /// On failure no stream is left open.
    async fn acquire(&self) -> std::result::Result<Box<dyn DeviceStream>, DeviceError>;
}

/// A live, recording device stream.
pub trait DeviceStream: Send {
    /// Mime tag of the payload produced by [`DeviceStream::seal`].
    fn mime(&self) -> &str;

    /// Level (0-255) of the audio captured since the previous call.
    fn amplitude(&mut self) -> u8;

    /// Drain the audio recorded since the previous chunk.
    fn take_chunk(&mut self) -> Vec<u8>;

    /// Turn the concatenated chunks into the final payload.
    fn seal(&self, chunks: Vec<u8>) -> Result<Vec<u8>>;

    /// Stop recording and give the device back. Must be idempotent.
    fn release(&mut self);
}

/// Owns a device stream and releases it on every exit path.
pub struct StreamGuard {
    stream: Box<dyn DeviceStream>,
    released: bool,
}

impl StreamGuard {
    pub fn new(stream: Box<dyn DeviceStream>) -> Self {
        Self {
            stream,
            released: false,
        }
    }

    pub fn stream(&mut self) -> &mut dyn DeviceStream {
        self.stream.as_mut()
    }

    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stream.release();
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Scripted microphone for testing and for running without an input device.
///
/// Each frame pops the next scripted level; once the script runs out the
/// microphone reports silence.
#[derive(Debug, Clone)]
pub struct ScriptedMicrophone {
    levels: Vec<u8>,
    chunk: Vec<u8>,
    mime: String,
    failure: Option<DeviceError>,
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ScriptedMicrophone {
    /// Create a microphone that only ever hears silence
    pub fn silent() -> Self {
        Self {
            levels: Vec::new(),
            chunk: Vec::new(),
            mime: defaults::WAV_MIME.to_string(),
            failure: None,
            acquired: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the per-frame amplitude levels
    pub fn with_levels(mut self, levels: Vec<u8>) -> Self {
        self.levels = levels;
        self
    }

    /// Configure the bytes returned by every chunk flush
    pub fn with_chunk(mut self, chunk: Vec<u8>) -> Self {
        self.chunk = chunk;
        self
    }

    /// Configure the payload mime tag
    pub fn with_mime(mut self, mime: &str) -> Self {
        self.mime = mime.to_string();
        self
    }

    /// Configure the microphone to fail on acquire
    pub fn with_failure(mut self, error: DeviceError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Number of successful acquisitions
    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Number of streams released
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedMicrophone {
    fn default() -> Self {
        Self::silent()
    }
}

#[async_trait]
impl Microphone for ScriptedMicrophone {
    async fn acquire(&self) -> std::result::Result<Box<dyn DeviceStream>, DeviceError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            levels: self.levels.iter().copied().collect(),
            chunk: self.chunk.clone(),
            mime: self.mime.clone(),
            released: Arc::clone(&self.released),
            open: true,
        }))
    }
}

struct ScriptedStream {
    levels: VecDeque<u8>,
    chunk: Vec<u8>,
    mime: String,
    released: Arc<AtomicUsize>,
    open: bool,
}

impl DeviceStream for ScriptedStream {
    fn mime(&self) -> &str {
        &self.mime
    }

    fn amplitude(&mut self) -> u8 {
        self.levels.pop_front().unwrap_or(0)
    }

    fn take_chunk(&mut self) -> Vec<u8> {
        if self.open {
            self.chunk.clone()
        } else {
            Vec::new()
        }
    }

    fn seal(&self, chunks: Vec<u8>) -> Result<Vec<u8>> {
        Ok(chunks)
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}
