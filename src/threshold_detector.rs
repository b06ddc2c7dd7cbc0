//! ThresholdDetector - fade-based scene detection
//!
//! Detects fades to and from black (or any near-uniform dark frame). A frame
//! is "under threshold" when almost all of its channel samples are at or
//! below a fixed intensity. The detector tracks fade-out/fade-in phases and
//! places a cut between the fade-out frame and the following fade-in frame,
//! positioned by `fade_bias`.

use tracing::{debug, instrument, trace};

use crate::common::{Result, SceneDetectError};
use crate::detector::CutList;
use crate::flash_filter::{FlashFilter, DEFAULT_MIN_SCENE_LEN};
use crate::frame::Frame;
use crate::metrics::FrameMetricStore;

/// Average intensity over all channels of a frame
pub const FRAME_AVG_METRIC: &str = "frame_avg_rgb";

const METRIC_KEYS: &[&str] = &[FRAME_AVG_METRIC];

/// Settings for [`ThresholdDetector`]
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdConfig {
    /// Samples strictly above this value count as "lit"
    pub threshold: u8,
    /// Fraction of samples that must be at or below `threshold` (0.0-1.0)
    pub min_percent: f64,
    /// Minimum number of frames between emitted cuts
    pub min_scene_len: u64,
    /// Where to place the cut between fade-out (-1.0) and fade-in (+1.0)
    pub fade_bias: f64,
    /// Emit a trailing cut when the stream ends faded out
    pub add_final_scene: bool,
    /// Rows examined per step of the under-threshold test
    pub block_size: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            threshold: 12,
            min_percent: 0.95,
            min_scene_len: DEFAULT_MIN_SCENE_LEN,
            fade_bias: 0.0,
            add_final_scene: false,
            block_size: 8,
        }
    }
}

impl ThresholdConfig {
    pub fn threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn min_percent(mut self, min_percent: f64) -> Self {
        self.min_percent = min_percent;
        self
    }

    pub fn min_scene_len(mut self, min_scene_len: u64) -> Self {
        self.min_scene_len = min_scene_len;
        self
    }

    pub fn fade_bias(mut self, fade_bias: f64) -> Self {
        self.fade_bias = fade_bias;
        self
    }

    pub fn add_final_scene(mut self, add_final_scene: bool) -> Self {
        self.add_final_scene = add_final_scene;
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_percent) {
            return Err(SceneDetectError::config_error(format!(
                "min_percent must be in [0, 1], got {}",
                self.min_percent
            )));
        }
        if !(-1.0..=1.0).contains(&self.fade_bias) {
            return Err(SceneDetectError::config_error(format!(
                "fade_bias must be in [-1, 1], got {}",
                self.fade_bias
            )));
        }
        if self.min_scene_len == 0 {
            return Err(SceneDetectError::config_error(
                "min_scene_len must be at least 1 frame",
            ));
        }
        if self.block_size == 0 {
            return Err(SceneDetectError::config_error("block_size must be positive"));
        }
        Ok(())
    }
}

/// Direction of the most recent fade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeType {
    /// Scene content is visible; waiting for a fade out
    In,
    /// Faded out; waiting for content to come back
    Out,
}

#[derive(Debug, Clone, Copy)]
struct LastFade {
    kind: FadeType,
    frame: u64,
}

/// Sum of all samples divided by their count
pub fn frame_average(frame: &Frame) -> f64 {
    let sum: u64 = frame.data().iter().map(|&sample| u64::from(sample)).sum();
    sum as f64 / frame.sample_count() as f64
}

/// ThresholdDetector - detects fade-in/fade-out scene boundaries
#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    config: ThresholdConfig,
    last_fade: Option<LastFade>,
    flash_filter: FlashFilter,
    frame_count: u64,
}

impl Default for ThresholdDetector {
    fn default() -> Self {
        let config = ThresholdConfig::default();
        Self {
            flash_filter: FlashFilter::new(config.min_scene_len),
            config,
            last_fade: None,
            frame_count: 0,
        }
    }
}

impl ThresholdDetector {
    /// Create a ThresholdDetector from a validated config
    ///
    /// # Errors
    /// * `InvalidConfig` - any setting out of range
    #[instrument]
    pub fn new(config: ThresholdConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "Created ThresholdDetector: threshold={}, min_percent={}, min_scene_len={}, fade_bias={}",
            config.threshold, config.min_percent, config.min_scene_len, config.fade_bias
        );
        Ok(Self {
            flash_filter: FlashFilter::new(config.min_scene_len),
            config,
            last_fade: None,
            frame_count: 0,
        })
    }

    pub fn metric_keys() -> &'static [&'static str] {
        METRIC_KEYS
    }

    /// Process the next frame of the stream
    ///
    /// Frames must arrive in increasing order starting at 0. Returns `true`
    /// if a cut was added to `cuts`. The cut lies between the fade-out and
    /// the current frame, so it is usually behind `frame_number`.
    #[instrument(skip(self, frame, metrics, cuts))]
    pub fn process_frame(
        &mut self,
        frame_number: u64,
        frame: &Frame,
        metrics: &mut FrameMetricStore,
        cuts: &mut CutList,
    ) -> bool {
        self.frame_count += 1;

        let frame_avg = metrics.get_or_compute(frame_number, FRAME_AVG_METRIC, || {
            frame_average(frame)
        });
        let under_threshold = self.frame_under_threshold(frame);
        trace!(
            "Frame {} avg={:.3} under_threshold={}",
            frame_number,
            frame_avg,
            under_threshold
        );

        let Some(last_fade) = self.last_fade else {
            let kind = if under_threshold {
                FadeType::Out
            } else {
                FadeType::In
            };
            debug!("First frame ({}) starts faded {:?}", frame_number, kind);
            self.last_fade = Some(LastFade {
                kind,
                frame: frame_number,
            });
            return false;
        };

        match (last_fade.kind, under_threshold) {
            (FadeType::In, true) => {
                debug!("Fade out at frame {}", frame_number);
                self.last_fade = Some(LastFade {
                    kind: FadeType::Out,
                    frame: frame_number,
                });
                false
            }
            (FadeType::Out, false) => {
                let split = self.split_frame(last_fade.frame, frame_number);
                let emitted = cuts.has_room_for(split, self.config.min_scene_len)
                    && self.flash_filter.admit(split);
                if emitted {
                    cuts.insert(split);
                    debug!(
                        "Fade in at frame {} (faded out at {}), cut at {}",
                        frame_number, last_fade.frame, split
                    );
                }
                self.last_fade = Some(LastFade {
                    kind: FadeType::In,
                    frame: frame_number,
                });
                emitted
            }
            _ => false,
        }
    }

    /// Flush a pending fade-out once the stream has ended
    ///
    /// With `add_final_scene`, a stream that ends faded out gets one last cut
    /// at the fade-out frame (no bias, there was no fade in).
    #[instrument(skip(self, cuts))]
    pub fn post_process(&mut self, cuts: &mut CutList) -> bool {
        let Some(last_fade) = self.last_fade else {
            return false;
        };
        if last_fade.kind != FadeType::Out || !self.config.add_final_scene {
            return false;
        }
        if last_fade.frame == 0
            || !cuts.has_room_for(last_fade.frame, self.config.min_scene_len)
            || !self.flash_filter.admit(last_fade.frame)
        {
            return false;
        }

        debug!("Stream ended faded out, final cut at {}", last_fade.frame);
        cuts.insert(last_fade.frame)
    }

    /// Split point between a fade out at `f_out` and a fade in at `f_in`
    fn split_frame(&self, f_out: u64, f_in: u64) -> u64 {
        let span = (f_in - f_out) as f64;
        let split = ((f_in + f_out) as f64 + self.config.fade_bias * span) / 2.0;
        split as u64
    }

    /// True iff at most `(1 - min_percent)` of all channel samples exceed the threshold
    ///
    /// Rows are scanned in blocks of `block_size`, stopping as soon as the
    /// over-threshold count exceeds the allowance.
    pub fn frame_under_threshold(&self, frame: &Frame) -> bool {
        let allowed = ((1.0 - self.config.min_percent) * frame.sample_count() as f64) as usize;
        let threshold = self.config.threshold;
        let block_len = frame.row_len().saturating_mul(self.config.block_size);

        let mut over = 0usize;
        for block in frame.data().chunks(block_len) {
            over += block.iter().filter(|&&sample| sample > threshold).count();
            if over > allowed {
                return false;
            }
        }
        true
    }

    /// Current fade phase, `None` before the first frame
    pub fn fade_phase(&self) -> Option<FadeType> {
        self.last_fade.map(|fade| fade.kind)
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Reset the detector state (useful for processing multiple videos)
    pub fn reset(&mut self) {
        debug!("Resetting ThresholdDetector state");
        self.last_fade = None;
        self.flash_filter.reset();
        self.frame_count = 0;
    }
}
