//! Driving loop for one analysis run
//!
//! The [`SceneManager`] owns everything a run needs: the detectors, the
//! metric store and the cut list. It checks the frame source contract
//! (contiguous numbering from 0, constant frame size) before any detector
//! sees a frame.
//!
//! A run cannot be resumed once a detector has failed: detectors ahead of the
//! failing one have already consumed the frame, so the manager rejects any
//! further frames.

use tracing::{debug, info, instrument, warn};

use crate::common::{Result, SceneDetectError};
use crate::detector::{CutList, Detector};
use crate::frame::Frame;
use crate::metrics::FrameMetricStore;
use crate::scene::{Scene, SceneAssembler};
use crate::timecode::validate_fps;

/// Runs one or more detectors over a single frame stream
pub struct SceneManager {
    fps: f64,
    detectors: Vec<Detector>,
    metrics: FrameMetricStore,
    cuts: CutList,
    frames_processed: u64,
    frame_size: Option<(u32, u32)>,
    finished: bool,
    failed_frame: Option<u64>,
}

impl SceneManager {
    /// # Errors
    /// * `InvalidFramerate` - fps is not positive and finite
    #[instrument]
    pub fn new(fps: f64) -> Result<Self> {
        validate_fps(fps)?;
        Ok(Self {
            fps,
            detectors: Vec::new(),
            metrics: FrameMetricStore::new(),
            cuts: CutList::new(),
            frames_processed: 0,
            frame_size: None,
            finished: false,
            failed_frame: None,
        })
    }

    /// Add a detector; detectors see each frame in the order they were added
    pub fn add_detector(&mut self, detector: impl Into<Detector>) -> &mut Self {
        let detector = detector.into();
        debug!("Adding {} detector", detector.name());
        self.metrics.register_metrics(detector.metric_keys());
        self.detectors.push(detector);
        self
    }

    /// Start from an existing metric store, e.g. one loaded from a stats file
    pub fn with_metrics(mut self, metrics: FrameMetricStore) -> Self {
        self.metrics = metrics;
        for detector in &self.detectors {
            self.metrics.register_metrics(detector.metric_keys());
        }
        self
    }

    /// Feed the next frame to every detector
    ///
    /// Returns `true` if any detector added a cut.
    ///
    /// # Errors
    /// * `InvalidConfig` - no detector was added, `finish` was already called,
    ///   or a detector failed on an earlier frame
    /// * `FrameOutOfOrder` - `frame_number` is not the next expected frame
    /// * `FrameSizeMismatch` - the frame's dimensions differ from frame 0
    /// * `FrameProcessingFailed` - a detector failed on this frame
    #[instrument(skip(self, frame))]
    pub fn process_frame(&mut self, frame_number: u64, frame: &Frame) -> Result<bool> {
        if self.detectors.is_empty() {
            return Err(SceneDetectError::config_error("No detector configured"));
        }
        if self.finished {
            return Err(SceneDetectError::config_error(
                "Cannot process frames after finish()",
            ));
        }
        if let Some(failed) = self.failed_frame {
            return Err(SceneDetectError::config_error(format!(
                "Run aborted after a detector failed on frame {}",
                failed
            )));
        }
        if frame_number != self.frames_processed {
            return Err(SceneDetectError::FrameOutOfOrder {
                expected: self.frames_processed,
                got: frame_number,
            });
        }

        let size = frame.dimensions();
        match self.frame_size {
            None => self.frame_size = Some(size),
            Some(expected) if expected != size => {
                return Err(SceneDetectError::FrameSizeMismatch {
                    frame: frame_number,
                    expected,
                    got: size,
                });
            }
            Some(_) => {}
        }

        let mut cut_found = false;
        for detector in &mut self.detectors {
            match detector.process_frame(frame_number, frame, &mut self.metrics, &mut self.cuts) {
                Ok(found) => cut_found |= found,
                Err(e) => {
                    warn!(
                        "{} detector failed on frame {}: {}",
                        detector.name(),
                        frame_number,
                        e
                    );
                    self.failed_frame = Some(frame_number);
                    return Err(e);
                }
            }
        }
        self.frames_processed += 1;
        Ok(cut_found)
    }

    /// Feed a whole stream of frames, numbered from the current position
    ///
    /// Returns the number of frames processed by this call.
    pub fn process_frames<I, F>(&mut self, frames: I) -> Result<u64>
    where
        I: IntoIterator<Item = F>,
        F: AsRef<Frame>,
    {
        let start = self.frames_processed;
        for frame in frames {
            self.process_frame(self.frames_processed, frame.as_ref())?;
        }
        Ok(self.frames_processed - start)
    }

    /// End the stream and let every detector flush pending cuts
    ///
    /// Only the first call does anything.
    ///
    /// # Errors
    /// * `InvalidConfig` - a detector failed during the run
    #[instrument(skip(self))]
    pub fn finish(&mut self) -> Result<()> {
        if let Some(failed) = self.failed_frame {
            return Err(SceneDetectError::config_error(format!(
                "Cannot finish a run that failed on frame {}",
                failed
            )));
        }
        if self.finished {
            debug!("finish() called again, ignoring");
            return Ok(());
        }
        self.finished = true;

        for detector in &mut self.detectors {
            if detector.post_process(&mut self.cuts)? {
                debug!("{} detector added a trailing cut", detector.name());
            }
        }

        info!(
            "Detection finished: {} frames, {} cuts",
            self.frames_processed,
            self.cuts.len()
        );
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Cut frames found so far, in increasing order
    pub fn cut_list(&self) -> &[u64] {
        self.cuts.as_slice()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn detectors(&self) -> &[Detector] {
        &self.detectors
    }

    /// Assemble the cuts into scenes covering every processed frame
    pub fn scene_list(&self, min_scene_len: u64) -> Result<Vec<Scene>> {
        if !self.finished {
            warn!("Building a scene list before finish(), trailing cuts may be missing");
        }
        let assembler = SceneAssembler::new(self.fps)?.min_scene_len(min_scene_len);
        Ok(assembler.assemble(self.cuts.as_slice(), self.frames_processed))
    }

    pub fn metrics(&self) -> &FrameMetricStore {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut FrameMetricStore {
        &mut self.metrics
    }

    pub fn into_metrics(self) -> FrameMetricStore {
        self.metrics
    }
}

impl std::fmt::Debug for SceneManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneManager")
            .field("fps", &self.fps)
            .field(
                "detectors",
                &self.detectors.iter().map(Detector::name).collect::<Vec<_>>(),
            )
            .field("frames_processed", &self.frames_processed)
            .field("cuts", &self.cuts.len())
            .field("finished", &self.finished)
            .field("failed_frame", &self.failed_frame)
            .finish()
    }
}
