//! Turning a cut list into scenes
//!
//! A [`Scene`] is an inclusive frame range. The [`SceneAssembler`] splits
//! `[0, total_frames - 1]` at each cut, so the returned scenes always cover
//! the whole stream without gaps or overlaps.

use tracing::{debug, instrument, trace};

use crate::common::Result;
use crate::timecode::{validate_fps, FrameTimecode};

/// A contiguous range of frames between two scene boundaries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scene {
    start_frame: u64,
    end_frame: u64,
    fps: f64,
}

impl Scene {
    /// Create a scene spanning `start_frame..=end_frame`
    ///
    /// # Panics
    /// Panics if `end_frame < start_frame` or fps is not positive.
    pub fn new(start_frame: u64, end_frame: u64, fps: f64) -> Self {
        assert!(
            end_frame >= start_frame,
            "Scene end frame {} is before start frame {}",
            end_frame,
            start_frame
        );
        assert!(fps.is_finite() && fps > 0.0, "FPS must be positive, got: {}", fps);
        Self {
            start_frame,
            end_frame,
            fps,
        }
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    /// Last frame of the scene (inclusive)
    pub fn end_frame(&self) -> u64 {
        self.end_frame
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Number of frames in the scene, always at least 1
    pub fn duration_frames(&self) -> u64 {
        self.end_frame - self.start_frame + 1
    }

    pub fn start_timecode(&self) -> FrameTimecode {
        FrameTimecode::new(self.start_frame, self.fps)
    }

    /// Exclusive end: the first frame after the scene
    ///
    /// Consecutive scenes share this value as the next scene's start, so the
    /// rendered times add up.
    pub fn end_timecode(&self) -> FrameTimecode {
        FrameTimecode::new(self.end_frame + 1, self.fps)
    }

    pub fn duration(&self) -> FrameTimecode {
        FrameTimecode::new(self.duration_frames(), self.fps)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration().as_seconds()
    }

    pub fn contains(&self, frame_number: u64) -> bool {
        (self.start_frame..=self.end_frame).contains(&frame_number)
    }
}

/// Builds [`Scene`] lists from cut frame numbers
#[derive(Debug, Clone)]
pub struct SceneAssembler {
    fps: f64,
    min_scene_len: u64,
}

impl SceneAssembler {
    /// # Errors
    /// * `InvalidFramerate` - fps is not positive and finite
    pub fn new(fps: f64) -> Result<Self> {
        validate_fps(fps)?;
        Ok(Self {
            fps,
            min_scene_len: 1,
        })
    }

    /// Shortest scene the assembler will produce, in frames
    ///
    /// Values below 1 are raised to 1.
    pub fn min_scene_len(mut self, min_scene_len: u64) -> Self {
        self.min_scene_len = min_scene_len.max(1);
        self
    }

    /// Split `[0, total_frames - 1]` at every cut
    ///
    /// Cuts outside `(0, total_frames)` are ignored, unsorted or repeated cuts
    /// are tolerated. A cut that would leave a scene shorter than
    /// `min_scene_len` is dropped and the short piece stays in the scene
    /// before it. A short trailing scene is merged into its predecessor.
    #[instrument(skip(self, cuts), fields(cuts = cuts.len()))]
    pub fn assemble(&self, cuts: &[u64], total_frames: u64) -> Vec<Scene> {
        if total_frames == 0 {
            debug!("Empty stream, no scenes");
            return Vec::new();
        }

        let mut boundaries: Vec<u64> = cuts
            .iter()
            .copied()
            .filter(|&cut| cut > 0 && cut < total_frames)
            .collect();
        boundaries.sort_unstable();
        boundaries.dedup();

        let mut scenes = Vec::with_capacity(boundaries.len() + 1);
        let mut start = 0;
        for cut in boundaries {
            if cut - start < self.min_scene_len {
                trace!("Dropping cut at {} ({} frames after {})", cut, cut - start, start);
                continue;
            }
            scenes.push(Scene::new(start, cut - 1, self.fps));
            start = cut;
        }

        if total_frames - start < self.min_scene_len {
            if let Some(previous) = scenes.pop() {
                trace!(
                    "Merging short final scene at {} into scene at {}",
                    start,
                    previous.start_frame
                );
                start = previous.start_frame;
            }
        }
        scenes.push(Scene::new(start, total_frames - 1, self.fps));

        debug!("Assembled {} scenes from {} frames", scenes.len(), total_frames);
        scenes
    }
}
