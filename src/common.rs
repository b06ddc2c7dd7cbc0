//! Error handling shared by every stage of the detection engine.
//!
//! All fallible operations in the crate return [`Result`], whose error side is
//! the single [`SceneDetectError`] enum. Timecode parsing, detector
//! configuration, frame-source contract checks and stats-file persistence all
//! report through it.

/// All possible errors from the scene detection system
#[derive(Debug, thiserror::Error)]
pub enum SceneDetectError {
    #[error("Invalid timecode '{input}': {reason}")]
    InvalidFormat { input: String, reason: String },

    #[error("Framerate must be positive and finite, got: {fps}")]
    InvalidFramerate { fps: f64 },

    #[error("Timecodes have incompatible framerates: {left} vs {right}")]
    IncompatibleRate { left: f64, right: f64 },

    #[error("Unsupported timecode operation: {operation}")]
    UnsupportedOperation { operation: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Frame processing failed at frame {frame}: {reason}")]
    FrameProcessingFailed { frame: u64, reason: String },

    #[error("Frames must arrive in order: expected frame {expected}, got {got}")]
    FrameOutOfOrder { expected: u64, got: u64 },

    #[error("Frame {frame} is {got:?} but the stream started at {expected:?} (width, height)")]
    FrameSizeMismatch {
        frame: u64,
        expected: (u32, u32),
        got: (u32, u32),
    },

    #[error("Unknown detector '{name}'")]
    UnknownDetector { name: String },

    #[error("Stats file is corrupt at line {line}: {reason}")]
    StatsFileCorrupt { line: usize, reason: String },

    #[error("Stats file framerate {found} does not match the video framerate {expected}")]
    StatsFileFramerateMismatch { expected: f64, found: f64 },

    #[error("Invalid annotation at line {line}: {reason}")]
    InvalidAnnotation { line: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCvError(#[from] opencv::Error),

    #[cfg(feature = "opencv")]
    #[error("Failed to open video file: {path}")]
    VideoOpenFailed { path: String },

    #[cfg(feature = "opencv")]
    #[error("Video file not found: {path}")]
    VideoNotFound { path: String },

    #[cfg(feature = "opencv")]
    #[error("Invalid video format or corrupted file: {path}")]
    InvalidVideoFormat { path: String },

    #[cfg(feature = "opencv")]
    #[error("No frames found in video")]
    EmptyVideo,

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl SceneDetectError {
    /// Create a configuration error with a descriptive message
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a frame processing error
    pub fn frame_error(frame: u64, reason: impl Into<String>) -> Self {
        Self::FrameProcessingFailed {
            frame,
            reason: reason.into(),
        }
    }

    /// Create a timecode format error for the given raw input
    pub fn invalid_format(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    pub(crate) fn stats_corrupt(line: usize, reason: impl Into<String>) -> Self {
        Self::StatsFileCorrupt {
            line,
            reason: reason.into(),
        }
    }

    /// Create an internal error (for unexpected conditions)
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

/// Convenient Result type for scene detection operations
pub type Result<T> = std::result::Result<T, SceneDetectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_helpers() {
        let error = SceneDetectError::config_error("Invalid threshold");
        assert!(matches!(error, SceneDetectError::InvalidConfig { .. }));

        let error = SceneDetectError::frame_error(42, "Processing failed");
        assert!(matches!(
            error,
            SceneDetectError::FrameProcessingFailed { frame: 42, .. }
        ));

        let error = SceneDetectError::unsupported("subtraction");
        assert!(matches!(error, SceneDetectError::UnsupportedOperation { .. }));

        let error = SceneDetectError::internal_error("Unexpected condition");
        assert!(matches!(error, SceneDetectError::InternalError { .. }));
    }

    #[test]
    fn test_error_display() {
        let error = SceneDetectError::invalid_format("00:61:00", "minutes must be below 60");
        assert_eq!(
            error.to_string(),
            "Invalid timecode '00:61:00': minutes must be below 60"
        );

        let error = SceneDetectError::config_error("Threshold must be positive");
        assert_eq!(
            error.to_string(),
            "Invalid configuration: Threshold must be positive"
        );

        let error = SceneDetectError::FrameOutOfOrder {
            expected: 3,
            got: 5,
        };
        assert_eq!(
            error.to_string(),
            "Frames must arrive in order: expected frame 3, got 5"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: SceneDetectError = io.into();
        assert!(matches!(error, SceneDetectError::Io(_)));
    }
}
