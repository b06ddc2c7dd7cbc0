//! Video stream handling using OpenCV backend
//!
//! [`VideoStream`] wraps OpenCV's `VideoCapture` and hands out decoded frames
//! as [`Frame`] values numbered from 0, which is the input the
//! [`SceneManager`](crate::SceneManager) expects.

use std::path::Path;

use opencv::{core, core::Mat, prelude::*, videoio};
use tracing::{debug, info, instrument, warn};

use crate::common::{Result, SceneDetectError};
use crate::frame::Frame;

/// Wrapper around OpenCV VideoCapture for consistent video reading
pub struct VideoStream {
    cap: videoio::VideoCapture,
    fps: f64,
    frame_count: u64,
    next_frame: u64,
    width: u32,
    height: u32,
    path: String,
}

impl VideoStream {
    /// Open a video file for reading
    ///
    /// # Errors
    /// * `VideoNotFound` - If the file doesn't exist
    /// * `VideoOpenFailed` - If OpenCV can't open the file
    /// * `InvalidVideoFormat` - If the reported framerate or size is unusable
    /// * `EmptyVideo` - If the video has no frames
    #[instrument]
    pub fn open(path: &str) -> Result<Self> {
        info!("Opening video stream: {}", path);

        if !Path::new(path).exists() {
            return Err(SceneDetectError::VideoNotFound {
                path: path.to_string(),
            });
        }

        let open_failed = |e: opencv::Error| {
            warn!("Failed to open VideoCapture: {}", e);
            SceneDetectError::VideoOpenFailed {
                path: path.to_string(),
            }
        };
        let cap = videoio::VideoCapture::from_file(path, videoio::CAP_ANY).map_err(open_failed)?;
        if !cap.is_opened().map_err(open_failed)? {
            return Err(SceneDetectError::VideoOpenFailed {
                path: path.to_string(),
            });
        }

        let property = |id: i32, name: &str| {
            cap.get(id).map_err(|e| {
                warn!("Failed to get video {}: {}", name, e);
                SceneDetectError::InvalidVideoFormat {
                    path: path.to_string(),
                }
            })
        };
        let fps = property(videoio::CAP_PROP_FPS, "fps")?;
        let frame_count = property(videoio::CAP_PROP_FRAME_COUNT, "frame count")?;
        let width = property(videoio::CAP_PROP_FRAME_WIDTH, "width")?;
        let height = property(videoio::CAP_PROP_FRAME_HEIGHT, "height")?;

        if !fps.is_finite() || fps <= 0.0 || width <= 0.0 || height <= 0.0 {
            return Err(SceneDetectError::InvalidVideoFormat {
                path: path.to_string(),
            });
        }
        if frame_count <= 0.0 {
            return Err(SceneDetectError::EmptyVideo);
        }

        info!(
            "Video opened successfully - FPS: {}, Frames: {}, Size: {}x{}",
            fps, frame_count, width, height
        );

        Ok(Self {
            cap,
            fps,
            frame_count: frame_count as u64,
            next_frame: 0,
            width: width as u32,
            height: height as u32,
            path: path.to_string(),
        })
    }

    /// Read the next frame from the video
    ///
    /// Returns the frame together with its 0-based frame number, or `None`
    /// at the end of the stream.
    ///
    /// # Errors
    /// * `FrameProcessingFailed` - the read failed or the decoder produced
    ///   something other than 8-bit BGR
    #[instrument(skip(self))]
    pub fn read_frame(&mut self) -> Result<Option<(u64, Frame)>> {
        let frame_number = self.next_frame;
        let mut mat = Mat::default();

        let success = self.cap.read(&mut mat).map_err(|e| {
            SceneDetectError::frame_error(frame_number, format!("OpenCV read failed: {}", e))
        })?;
        if !success || mat.empty() {
            debug!("Reached end of video at frame {}", frame_number);
            return Ok(None);
        }

        let frame = mat_to_frame(&mat, frame_number)?;
        self.next_frame += 1;
        if frame_number % 1000 == 0 {
            debug!("Read frame {}/{}", frame_number, self.frame_count);
        }
        Ok(Some((frame_number, frame)))
    }

    /// Get the video framerate
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Frame count reported by the container (may be an estimate)
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Number of frames read so far
    pub fn frames_read(&self) -> u64 {
        self.next_frame
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the video duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.frame_count as f64 / self.fps
    }

    /// Get the progress as a percentage (0.0 to 100.0)
    pub fn progress_percent(&self) -> f64 {
        if self.frame_count == 0 {
            100.0
        } else {
            (self.next_frame as f64 / self.frame_count as f64 * 100.0).min(100.0)
        }
    }
}

/// Copy a decoded `Mat` into a packed BGR [`Frame`]
fn mat_to_frame(mat: &Mat, frame_number: u64) -> Result<Frame> {
    if mat.typ() != core::CV_8UC3 {
        return Err(SceneDetectError::frame_error(
            frame_number,
            format!("expected an 8-bit 3-channel image, got type {}", mat.typ()),
        ));
    }

    let (width, height) = (mat.cols() as u32, mat.rows() as u32);
    let data = if mat.is_continuous() {
        mat.data_bytes()?.to_vec()
    } else {
        mat.try_clone()?.data_bytes()?.to_vec()
    };
    Frame::new(width, height, data)
        .map_err(|e| SceneDetectError::frame_error(frame_number, e.to_string()))
}

// Implement Debug manually to avoid showing internal OpenCV state
impl std::fmt::Debug for VideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStream")
            .field("path", &self.path)
            .field("fps", &self.fps)
            .field("frame_count", &self.frame_count)
            .field("next_frame", &self.next_frame)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
