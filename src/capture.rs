//! Client-side capture state: pending photos, the video recorder and the
//! location fix that go into one submission.
//!
//! A [`CaptureSession`] is owned by whoever drives the capture UI and is
//! cleared with [`CaptureSession::reset`] once a submission succeeds.

use std::fmt;
use std::time::{Duration, Instant};

use crate::ids;

pub const MAX_PENDING_PHOTOS: usize = 10;
pub const MAX_RECORDING: Duration = Duration::from_secs(30);
pub const GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("At most {0} photos can be attached to a report")]
    PhotoLimitReached(usize),
    #[error("A recording is already in progress")]
    AlreadyRecording,
    #[error("No recording in progress")]
    NotRecording,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("Geolocation not supported")]
    Unsupported,
    #[error("User denied Geolocation")]
    PermissionDenied,
    #[error("Timeout expired")]
    Timeout,
    #[error("{0}")]
    Unavailable(String),
}

/// A captured still or clip waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMedia {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// One-shot position lookup, in the manner of `getCurrentPosition`.
pub trait LocationProvider {
    fn current_position(&self, timeout: Duration) -> Result<Position, LocationError>;
}

/// A position supplied up front, e.g. from command-line arguments.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Position);

impl LocationProvider for FixedLocation {
    fn current_position(&self, _timeout: Duration) -> Result<Position, LocationError> {
        let Position { latitude, longitude } = self.0;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationError::Unavailable(format!(
                "Position out of range: {}, {}",
                latitude, longitude
            )));
        }
        Ok(self.0)
    }
}

/// What the location field of the form shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LocationStatus {
    #[default]
    Pending,
    Located(Position),
    Failed(LocationError),
    Unsupported,
}

impl LocationStatus {
    pub fn resolve(provider: Option<&dyn LocationProvider>) -> Self {
        match provider {
            None => LocationStatus::Unsupported,
            Some(p) => match p.current_position(GEOLOCATION_TIMEOUT) {
                Ok(position) => LocationStatus::Located(position),
                Err(LocationError::Unsupported) => LocationStatus::Unsupported,
                Err(e) => LocationStatus::Failed(e),
            },
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            LocationStatus::Located(p) => Some(*p),
            _ => None,
        }
    }
}

impl fmt::Display for LocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationStatus::Pending => Ok(()),
            LocationStatus::Located(p) => write!(f, "Lat: {}, Lng: {}", p.latitude, p.longitude),
            LocationStatus::Failed(e) => write!(f, "Unable to detect location: {}", e),
            LocationStatus::Unsupported => write!(f, "Geolocation not supported by your browser"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    User,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording { started: Instant, chunks: Vec<Vec<u8>> },
    Stopped { clip: PendingMedia, reason: StopReason },
}

/// Video recorder: Idle -> Recording -> Stopped. A manual stop and the
/// 30 second timeout go through the same transition.
#[derive(Debug, Clone)]
pub struct Recorder {
    state: RecorderState,
    max_duration: Duration,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(MAX_RECORDING)
    }
}

impl Recorder {
    pub fn new(max_duration: Duration) -> Self {
        Self {
            state: RecorderState::Idle,
            max_duration,
        }
    }

    pub fn state(&self) -> &RecorderState {
        &self.state
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording { .. })
    }

    pub fn start(&mut self, now: Instant) -> Result<(), CaptureError> {
        if self.is_recording() {
            return Err(CaptureError::AlreadyRecording);
        }
        self.state = RecorderState::Recording {
            started: now,
            chunks: Vec::new(),
        };
        Ok(())
    }

    /// Empty chunks are dropped.
    pub fn push_chunk(&mut self, chunk: Vec<u8>) -> Result<(), CaptureError> {
        match &mut self.state {
            RecorderState::Recording { chunks, .. } => {
                if !chunk.is_empty() {
                    chunks.push(chunk);
                }
                Ok(())
            }
            _ => Err(CaptureError::NotRecording),
        }
    }

    pub fn stop(&mut self, reason: StopReason) -> Result<&PendingMedia, CaptureError> {
        let chunks = match std::mem::replace(&mut self.state, RecorderState::Idle) {
            RecorderState::Recording { chunks, .. } => chunks,
            other => {
                self.state = other;
                return Err(CaptureError::NotRecording);
            }
        };

        let clip = PendingMedia {
            filename: format!("evidence-video-{}.webm", ids::new_id()),
            content_type: "video/webm".to_string(),
            bytes: chunks.concat(),
        };
        tracing::debug!(
            "Recording stopped ({:?}), clip {} is {} bytes",
            reason,
            clip.filename,
            clip.bytes.len()
        );
        self.state = RecorderState::Stopped { clip, reason };
        self.clip().ok_or(CaptureError::NotRecording)
    }

    /// The finished clip, once stopped.
    pub fn clip(&self) -> Option<&PendingMedia> {
        match &self.state {
            RecorderState::Stopped { clip, .. } => Some(clip),
            _ => None,
        }
    }

    /// Stops the recording once it has run for the maximum duration.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<&PendingMedia> {
        let expired = match &self.state {
            RecorderState::Recording { started, .. } => {
                now.saturating_duration_since(*started) >= self.max_duration
            }
            _ => false,
        };
        if !expired {
            return None;
        }
        tracing::info!("Automatically stopping video recording after {:?}", self.max_duration);
        self.stop(StopReason::Timeout).ok()
    }

    fn take_clip(&mut self) -> Option<PendingMedia> {
        match std::mem::replace(&mut self.state, RecorderState::Idle) {
            RecorderState::Stopped { clip, .. } => Some(clip),
            other => {
                self.state = other;
                None
            }
        }
    }
}

/// Everything pending for the next report submission.
#[derive(Debug, Default)]
pub struct CaptureSession {
    photos: Vec<PendingMedia>,
    video: Option<PendingMedia>,
    recorder: Recorder,
    location: LocationStatus,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn photos(&self) -> &[PendingMedia] {
        &self.photos
    }

    pub fn video(&self) -> Option<&PendingMedia> {
        self.video.as_ref()
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut Recorder {
        &mut self.recorder
    }

    pub fn location(&self) -> &LocationStatus {
        &self.location
    }

    pub fn set_location(&mut self, status: LocationStatus) {
        self.location = status;
    }

    /// Appends a captured frame, named `evidence-photo-<n>-<id>.<ext>`.
    pub fn add_photo(
        &mut self,
        bytes: Vec<u8>,
        extension: &str,
        content_type: &str,
    ) -> Result<&PendingMedia, CaptureError> {
        if self.photos.len() >= MAX_PENDING_PHOTOS {
            return Err(CaptureError::PhotoLimitReached(MAX_PENDING_PHOTOS));
        }
        let filename = format!(
            "evidence-photo-{}-{}.{}",
            self.photos.len() + 1,
            ids::new_id(),
            extension.trim_start_matches('.')
        );
        self.photos.push(PendingMedia {
            filename,
            content_type: content_type.to_string(),
            bytes,
        });
        Ok(&self.photos[self.photos.len() - 1])
    }

    /// Moves a stopped recorder's clip into the pending video slot,
    /// replacing any earlier clip.
    pub fn collect_clip(&mut self) -> Option<&PendingMedia> {
        let clip = self.recorder.take_clip()?;
        if let Some(previous) = self.video.replace(clip) {
            tracing::debug!("Replacing pending video {}", previous.filename);
        }
        self.video.as_ref()
    }

    /// Records `bytes` as a complete clip: start, feed in chunks, stop.
    pub fn record_clip(
        &mut self,
        bytes: &[u8],
        chunk_size: usize,
        now: Instant,
    ) -> Result<&PendingMedia, CaptureError> {
        self.recorder.start(now)?;
        for chunk in bytes.chunks(chunk_size.max(1)) {
            self.recorder.push_chunk(chunk.to_vec())?;
        }
        self.recorder.stop(StopReason::User)?;
        self.collect_clip().ok_or(CaptureError::NotRecording)
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty() && self.video.is_none()
    }

    /// Clears photos, the pending video, the recorder and the location.
    pub fn reset(&mut self) {
        self.photos.clear();
        self.video = None;
        self.recorder = Recorder::new(self.recorder.max_duration);
        self.location = LocationStatus::Pending;
    }
}
