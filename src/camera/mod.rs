//! Camera lifecycle and still capture.
//!
//! A [`VideoBackend`] enumerates [`VideoInput`]s and opens them as
//! [`VideoStream`]s.  [`CaptureController`] is the only user of a backend: it
//! picks an input (rear-facing first), waits for the first decodable frame
//! and turns the current frame into a [`CapturedImage`].
//!
//! ```text
//! open()  → inputs() → rear … then others → open_input()
//! poll() → latest_frame(); ready once a frame decodes
//! snapshot() → data:image/jpeg;base64,…
//! close() → VideoStream::stop()
//! ```

pub mod file;

use std::sync::Arc;

use thiserror::Error;

use crate::audio::encode_base64;

pub use file::FileCamera;

const JPEG_MIME: &str = "image/jpeg";

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    /// No input exists, or every input refused to open.
    #[error("camera unavailable: {0}")]
    Unavailable(String),

    /// The stream is open but has not produced a decodable frame yet.
    #[error("camera is not ready yet")]
    NotReady,

    #[error("camera is not open")]
    NotOpen,
}

// ---------------------------------------------------------------------------
// Inputs and streams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Rear,
    Front,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInput {
    pub id: String,
    pub label: String,
    pub facing: Facing,
}

pub trait VideoBackend: Send + Sync {
    fn inputs(&self) -> Result<Vec<VideoInput>, CaptureError>;
    fn open_input(&self, input: &VideoInput) -> Result<Box<dyn VideoStream>, CaptureError>;
}

pub trait VideoStream: Send {
    /// Encoded bytes of the most recent frame, if the input has one.
    fn latest_frame(&mut self) -> Option<Vec<u8>>;

    /// Stop all tracks.  Idempotent.
    fn stop(&mut self);
}

// ---------------------------------------------------------------------------
// CapturedImage
// ---------------------------------------------------------------------------

/// A still frame, encoded as a data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub mime_type: String,
    pub data_url: String,
}

impl CapturedImage {
    pub fn from_jpeg(bytes: &[u8]) -> Self {
        Self {
            mime_type: JPEG_MIME.to_string(),
            data_url: format!("data:{JPEG_MIME};base64,{}", encode_base64(bytes)),
        }
    }

    /// The base64 payload without the `data:…;base64,` prefix.
    pub fn base64_data(&self) -> &str {
        self.data_url
            .split_once(',')
            .map(|(_, data)| data)
            .unwrap_or(&self.data_url)
    }
}

/// `true` for a complete JPEG: SOI marker at the start, EOI at the end.
pub fn is_decodable_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes.starts_with(&[0xFF, 0xD8]) && bytes.ends_with(&[0xFF, 0xD9])
}

// ---------------------------------------------------------------------------
// CaptureController
// ---------------------------------------------------------------------------

pub struct CaptureController {
    backend: Arc<dyn VideoBackend>,
    prefer_rear: bool,
    stream: Option<Box<dyn VideoStream>>,
    frame: Option<Vec<u8>>,
}

impl CaptureController {
    pub fn new(backend: Arc<dyn VideoBackend>, prefer_rear: bool) -> Self {
        Self {
            backend,
            prefer_rear,
            stream: None,
            frame: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Acquire a video input.  A no-op when already open.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Unavailable`] when there is no input or none opens.
    pub fn open(&mut self) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut inputs = self.backend.inputs()?;
        if inputs.is_empty() {
            return Err(CaptureError::Unavailable("no video input found".into()));
        }
        if self.prefer_rear {
            // Stable sort keeps enumeration order within each group.
            inputs.sort_by_key(|i| i.facing != Facing::Rear);
        }

        let mut last_error = None;
        for input in &inputs {
            match self.backend.open_input(input) {
                Ok(stream) => {
                    log::info!("camera: opened '{}' ({:?})", input.label, input.facing);
                    self.stream = Some(stream);
                    self.frame = None;
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("camera: failed to open '{}': {e}", input.label);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(CaptureError::Unavailable(reason)) => CaptureError::Unavailable(reason),
            Some(other) => CaptureError::Unavailable(other.to_string()),
            None => CaptureError::Unavailable("no video input could be opened".into()),
        })
    }

    /// Pull the latest frame from the stream.  Returns readiness.
    pub fn poll(&mut self) -> bool {
        if let Some(stream) = self.stream.as_mut() {
            if let Some(bytes) = stream.latest_frame() {
                if is_decodable_jpeg(&bytes) {
                    self.frame = Some(bytes);
                }
            }
        }
        self.is_ready()
    }

    /// `true` once a decodable frame has been seen on the open stream.
    pub fn is_ready(&self) -> bool {
        self.stream.is_some() && self.frame.is_some()
    }

    /// Encode the current frame.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NotOpen`] when closed, [`CaptureError::NotReady`]
    /// before the first decodable frame.
    pub fn snapshot(&mut self) -> Result<CapturedImage, CaptureError> {
        if self.stream.is_none() {
            return Err(CaptureError::NotOpen);
        }
        self.poll();
        self.frame
            .as_deref()
            .map(CapturedImage::from_jpeg)
            .ok_or(CaptureError::NotReady)
    }

    /// Stop all tracks.  Safe to call repeatedly or before `open()`.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            log::info!("camera: closed");
        }
        self.frame = None;
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
