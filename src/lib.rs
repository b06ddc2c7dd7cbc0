//! Frame-accurate scene boundary detection
//!
//! Feeds decoded frames through one or more detectors and turns the cuts they
//! find into a list of scenes:
//!
//! * [`ContentDetector`] finds hard cuts from HSV differences between
//!   consecutive frames.
//! * [`ThresholdDetector`] finds fades to and from black from average frame
//!   intensity.
//!
//! Per-frame metrics are cached in a [`FrameMetricStore`] that can be saved
//! to and reloaded from a stats file, so a second run over the same video
//! skips the expensive work.
//!
//! # Quick Start
//!
//! ```rust
//! use scenecut::{detect_frames, ContentDetector, Frame};
//!
//! let frames: Vec<Frame> = (0..60)
//!     .map(|i| {
//!         let value = if i < 30 { 0 } else { 255 };
//!         Frame::filled(16, 16, [value, value, value])
//!     })
//!     .collect();
//!
//! let scenes = detect_frames(&frames, 30.0, ContentDetector::default())?;
//! assert_eq!(scenes.len(), 2);
//! assert_eq!(scenes[1].start_frame(), 30);
//! # Ok::<(), scenecut::SceneDetectError>(())
//! ```
//!
//! With the `opencv` feature, [`detect`] runs the same pipeline over a video
//! file.

pub mod benchmark;
mod common;
mod content_detector;
mod detector;
mod flash_filter;
mod frame;
mod metrics;
mod scene;
mod scene_manager;
mod threshold_detector;
mod timecode;
#[cfg(feature = "opencv")]
mod video_stream;

pub use common::{Result, SceneDetectError};
pub use content_detector::{
    bgr_to_hsv, ComponentWeights, ContentConfig, ContentDetector, DELTA_HSV_AVG, DELTA_HUE,
    DELTA_LUM, DELTA_SAT,
};
pub use detector::{available_detectors, create_detector, CutList, Detector};
pub use flash_filter::{FlashFilter, DEFAULT_MIN_SCENE_LEN};
pub use frame::Frame;
pub use metrics::FrameMetricStore;
pub use scene::{Scene, SceneAssembler};
pub use scene_manager::SceneManager;
pub use threshold_detector::{
    frame_average, FadeType, ThresholdConfig, ThresholdDetector, FRAME_AVG_METRIC,
};
pub use timecode::{FrameTimecode, TimecodeFormat, TimecodeOperand, TimecodeValue, MAX_FPS_DELTA};
#[cfg(feature = "opencv")]
pub use video_stream::VideoStream;

use tracing::{info, instrument};

/// Run one detector over in-memory frames and assemble the scenes
///
/// Frames are numbered from 0 in iteration order.
///
/// # Errors
/// * `InvalidFramerate` - fps is not positive and finite
/// * `FrameSizeMismatch` - frames do not all have the same dimensions
#[instrument(skip(frames, detector))]
pub fn detect_frames<I, F>(frames: I, fps: f64, detector: impl Into<Detector>) -> Result<Vec<Scene>>
where
    I: IntoIterator<Item = F>,
    F: AsRef<Frame>,
{
    let mut manager = SceneManager::new(fps)?;
    manager.add_detector(detector);
    manager.process_frames(frames)?;
    manager.finish()?;
    manager.scene_list(1)
}

/// Run a detector over a video file
///
/// When `stats_path` is given, metrics already stored there are reused and
/// any newly computed metrics are written back after detection.
///
/// # Errors
/// * `VideoNotFound` - If the video file doesn't exist
/// * `VideoOpenFailed` - If OpenCV can't open the video
/// * `FrameProcessingFailed` - If frame analysis fails
/// * `StatsFileCorrupt` / `StatsFileFramerateMismatch` - If the stats file
///   can't be reused
///
/// # Example
/// ```rust,no_run
/// use scenecut::{detect, ContentDetector};
///
/// let scenes = detect("my_video.mp4", ContentDetector::default(), None)?;
/// for (i, scene) in scenes.iter().enumerate() {
///     println!("Scene {}: {} - {}", i + 1, scene.start_timecode(), scene.end_timecode());
/// }
/// # Ok::<(), scenecut::SceneDetectError>(())
/// ```
#[cfg(feature = "opencv")]
#[instrument(skip(detector))]
pub fn detect(
    video_path: &str,
    detector: impl Into<Detector>,
    stats_path: Option<&std::path::Path>,
) -> Result<Vec<Scene>> {
    info!("Starting scene detection for: {}", video_path);

    let mut video_stream = VideoStream::open(video_path)?;
    let fps = video_stream.fps();

    let mut metrics = FrameMetricStore::new();
    if let Some(path) = stats_path {
        let loaded = metrics.load_from_path(path, fps)?;
        info!("Loaded metrics for {} frames from {}", loaded, path.display());
    }

    let mut manager = SceneManager::new(fps)?.with_metrics(metrics);
    manager.add_detector(detector);

    while let Some((frame_number, frame)) = video_stream.read_frame()? {
        manager.process_frame(frame_number, &frame)?;
        if frame_number > 0 && frame_number % 1000 == 0 {
            tracing::debug!(
                "Processed {} frames ({:.1}%)",
                frame_number,
                video_stream.progress_percent()
            );
        }
    }
    if manager.frames_processed() == 0 {
        return Err(SceneDetectError::EmptyVideo);
    }
    manager.finish()?;

    let scenes = manager.scene_list(1)?;
    info!(
        "Scene detection completed. Found {} cuts in {} frames",
        manager.cut_list().len(),
        manager.frames_processed()
    );

    if let Some(path) = stats_path {
        if manager.metrics().is_save_required() {
            manager.metrics_mut().save_to_path(path, fps)?;
            info!("Saved metrics to {}", path.display());
        }
    }

    Ok(scenes)
}

/// Cut frame numbers for a video using the default [`ContentDetector`]
#[cfg(feature = "opencv")]
#[instrument]
pub fn detect_scene_changes(video_path: &str) -> Result<Vec<u64>> {
    let scenes = detect(video_path, ContentDetector::default(), None)?;
    let frame_numbers: Vec<u64> = scenes.iter().skip(1).map(Scene::start_frame).collect();

    info!("Extracted {} scene change frame numbers", frame_numbers.len());
    Ok(frame_numbers)
}

/// Get video information without performing scene detection
#[cfg(feature = "opencv")]
#[instrument]
pub fn get_video_info(video_path: &str) -> Result<VideoInfo> {
    let video_stream = VideoStream::open(video_path)?;

    Ok(VideoInfo {
        path: video_path.to_string(),
        fps: video_stream.fps(),
        frame_count: video_stream.frame_count(),
        width: video_stream.width(),
        height: video_stream.height(),
        duration_seconds: video_stream.duration_seconds(),
    })
}

/// Video metadata information
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub path: String,
    pub fps: f64,
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
}

impl VideoInfo {
    /// Get a human-readable description of the video
    pub fn description(&self) -> String {
        format!(
            "{}x{} at {:.2}fps, {} frames ({} duration)",
            self.width,
            self.height,
            self.fps,
            self.frame_count,
            self.duration().format(1, true)
        )
    }

    /// Stream length as a timecode
    pub fn duration(&self) -> FrameTimecode {
        FrameTimecode::new(self.frame_count, self.fps)
    }

    /// Check if this appears to be a valid video configuration
    pub fn is_valid(&self) -> bool {
        self.fps > 0.0
            && self.frame_count > 0
            && self.width > 0
            && self.height > 0
            && self.duration_seconds > 0.0
    }
}

/// Initialize tracing for the library
///
/// Call this once at the start of your application to enable debug output.
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Arguments
/// * `level` - Tracing level filter (e.g., "debug", "info", "warn", "error")
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Scene detection tracing initialized at level: {}", level);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(value: u8) -> Frame {
        Frame::filled(8, 8, [value, value, value])
    }

    #[test]
    fn test_video_info_description() {
        let info = VideoInfo {
            path: "clip.mkv".to_string(),
            fps: 30.0,
            frame_count: 100,
            width: 640,
            height: 480,
            duration_seconds: 100.0 / 30.0,
        };

        assert_eq!(info.duration().as_frames(), 100);
        assert_eq!(info.duration().format(3, false), "00:00:03.333");
        assert_eq!(
            info.description(),
            "640x480 at 30.00fps, 100 frames (00:00:03.3 duration)"
        );
        assert!(!VideoInfo { frame_count: 0, ..info }.is_valid());
    }

    #[test]
    fn test_detect_frames_without_cuts() {
        let frames: Vec<Frame> = (0..10).map(|_| gray(100)).collect();
        let scenes = detect_frames(&frames, 24.0, ContentDetector::default()).unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].duration_frames(), 10);
    }

    #[test]
    fn test_detect_frames_empty_stream() {
        let frames: Vec<Frame> = Vec::new();
        let scenes = detect_frames(&frames, 24.0, ThresholdDetector::default()).unwrap();
        assert!(scenes.is_empty());
    }

    #[test]
    fn test_detect_frames_with_registry_detector() {
        let frames: Vec<Frame> = (0..40).map(|i| gray(if i < 20 { 10 } else { 240 })).collect();
        let detector = create_detector("content").unwrap();
        let scenes = detect_frames(&frames, 24.0, detector).unwrap();
        let starts: Vec<u64> = scenes.iter().map(Scene::start_frame).collect();
        assert_eq!(starts, vec![0, 20]);
    }

    #[test]
    fn test_detect_frames_rejects_bad_fps() {
        let frames = vec![gray(0)];
        assert!(detect_frames(&frames, 0.0, ContentDetector::default()).is_err());
    }
}
