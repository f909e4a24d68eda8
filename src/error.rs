use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackError {
    /// The video source cannot deliver frames yet. Retry later.
    #[error("video source is not ready")]
    NotReady,

    /// `track` was called before `init`
    #[error("optical flow used before initialization")]
    NotInitialized,

    /// Every box handed to the tracker was absent
    #[error("no points to track")]
    NoPoints,

    #[error("failed to decode frame at {time:.3}s: {message}")]
    Decode { time: f64, message: String },
}

pub type TrackResult<T> = std::result::Result<T, TrackError>;
