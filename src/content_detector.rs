//! ContentDetector - HSV-based scene change detection algorithm
//!
//! Detects hard cuts by comparing each frame with the previous one in HSV
//! color space. The mean absolute difference of the hue, saturation and
//! luminance planes is averaged into a single content score; a score at or
//! above the threshold is a cut.

#[cfg(feature = "opencv")]
use opencv::{
    core::{self, Mat, Scalar, Vector, CV_8UC3},
    imgproc,
    prelude::*,
};
use tracing::{debug, instrument, trace};

use crate::common::{Result, SceneDetectError};
use crate::detector::CutList;
use crate::flash_filter::{FlashFilter, DEFAULT_MIN_SCENE_LEN};
use crate::frame::Frame;
use crate::metrics::FrameMetricStore;

/// Average of the three channel deltas
pub const DELTA_HSV_AVG: &str = "delta_hsv_avg";
pub const DELTA_HUE: &str = "delta_hue";
pub const DELTA_SAT: &str = "delta_sat";
pub const DELTA_LUM: &str = "delta_lum";

const METRIC_KEYS: &[&str] = &[DELTA_HSV_AVG, DELTA_HUE, DELTA_SAT, DELTA_LUM];

/// Default content score threshold
pub const DEFAULT_THRESHOLD: f64 = 27.0;

/// Component weights for frame score calculation
///
/// These weights determine how much each channel contributes to the content
/// score. The default weights give the plain average of the three deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentWeights {
    pub delta_hue: f64,
    pub delta_sat: f64,
    pub delta_lum: f64,
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            delta_hue: 1.0,
            delta_sat: 1.0,
            delta_lum: 1.0,
        }
    }
}

impl ComponentWeights {
    /// Create weights for luma-only detection (brightness changes only)
    pub fn luma_only() -> Self {
        Self {
            delta_hue: 0.0,
            delta_sat: 0.0,
            delta_lum: 1.0,
        }
    }

    /// Get the sum of absolute weights (for normalization)
    pub fn sum_abs(&self) -> f64 {
        self.delta_hue.abs() + self.delta_sat.abs() + self.delta_lum.abs()
    }

    /// Weighted mean of the channel deltas
    pub fn score(&self, delta_hue: f64, delta_sat: f64, delta_lum: f64) -> f64 {
        let weighted_sum =
            delta_hue * self.delta_hue + delta_sat * self.delta_sat + delta_lum * self.delta_lum;
        weighted_sum / self.sum_abs()
    }

    /// Validate that weights are reasonable
    fn validate(&self) -> Result<()> {
        let finite = [self.delta_hue, self.delta_sat, self.delta_lum]
            .iter()
            .all(|w| w.is_finite());
        if !finite {
            return Err(SceneDetectError::config_error(
                "Component weights must be finite",
            ));
        }
        if self.sum_abs() <= 0.0 {
            return Err(SceneDetectError::config_error(
                "All component weights cannot be zero",
            ));
        }
        Ok(())
    }
}

/// Settings for [`ContentDetector`]
#[derive(Debug, Clone, PartialEq)]
pub struct ContentConfig {
    /// Score threshold for detecting scene changes
    pub threshold: f64,
    /// Minimum number of frames between emitted cuts
    pub min_scene_len: u64,
    pub weights: ComponentWeights,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_scene_len: DEFAULT_MIN_SCENE_LEN,
            weights: ComponentWeights::default(),
        }
    }
}

impl ContentConfig {
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn min_scene_len(mut self, min_scene_len: u64) -> Self {
        self.min_scene_len = min_scene_len;
        self
    }

    pub fn weights(mut self, weights: ComponentWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Only react to brightness changes (useful for black and white footage)
    pub fn luma_only(self) -> Self {
        self.weights(ComponentWeights::luma_only())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(SceneDetectError::config_error(format!(
                "Threshold must be non-negative, got: {}",
                self.threshold
            )));
        }
        if self.min_scene_len == 0 {
            return Err(SceneDetectError::config_error(
                "min_scene_len must be at least 1 frame",
            ));
        }
        self.weights.validate()
    }
}

#[cfg(feature = "opencv")]
type Plane = Mat;
#[cfg(not(feature = "opencv"))]
type Plane = Vec<u8>;

/// Hue, saturation and value planes of one frame
struct HsvPlanes {
    width: u32,
    height: u32,
    hue: Plane,
    sat: Plane,
    lum: Plane,
}

impl HsvPlanes {
    /// Convert a BGR frame with OpenCV and split it into HSV planes
    #[cfg(feature = "opencv")]
    fn from_bgr_frame(frame: &Frame, frame_number: u64) -> Result<Self> {
        let conversion_failed = |e: opencv::Error| {
            SceneDetectError::frame_error(frame_number, format!("HSV conversion failed: {}", e))
        };

        let mut bgr = Mat::new_rows_cols_with_default(
            frame.height() as i32,
            frame.width() as i32,
            CV_8UC3,
            Scalar::all(0.0),
        )
        .map_err(conversion_failed)?;
        bgr.data_bytes_mut()
            .map_err(conversion_failed)?
            .copy_from_slice(frame.data());

        let mut hsv = Mat::default();
        imgproc::cvt_color_def(&bgr, &mut hsv, imgproc::COLOR_BGR2HSV)
            .map_err(conversion_failed)?;

        let mut channels = Vector::<Mat>::new();
        core::split(&hsv, &mut channels).map_err(|e| {
            SceneDetectError::frame_error(frame_number, format!("Channel split failed: {}", e))
        })?;
        if channels.len() != 3 {
            return Err(SceneDetectError::frame_error(
                frame_number,
                format!("Expected 3 HSV channels, got {}", channels.len()),
            ));
        }

        Ok(Self {
            width: frame.width(),
            height: frame.height(),
            hue: channels.get(0)?,
            sat: channels.get(1)?,
            lum: channels.get(2)?,
        })
    }

    /// Split a BGR frame into HSV planes
    #[cfg(not(feature = "opencv"))]
    fn from_bgr_frame(frame: &Frame, _frame_number: u64) -> Result<Self> {
        let pixel_count = frame.pixel_count();
        let mut hue = Vec::with_capacity(pixel_count);
        let mut sat = Vec::with_capacity(pixel_count);
        let mut lum = Vec::with_capacity(pixel_count);

        for pixel in frame.pixels() {
            let [h, s, v] = bgr_to_hsv(pixel[0], pixel[1], pixel[2]);
            hue.push(h);
            sat.push(s);
            lum.push(v);
        }

        Ok(Self {
            width: frame.width(),
            height: frame.height(),
            hue,
            sat,
            lum,
        })
    }

    fn pixel_count(&self) -> f64 {
        f64::from(self.width) * f64::from(self.height)
    }
}

/// Fixed-point precision of the HSV division tables
const HSV_SHIFT: u32 = 12;
const HSV_ROUND: i32 = 1 << (HSV_SHIFT - 1);

/// `round((255 << HSV_SHIFT) / v)`, indexed by V
static SAT_DIV_TABLE: [i32; 256] = division_table(255 << HSV_SHIFT, 1);
/// `round((180 << HSV_SHIFT) / (6 * diff))`, indexed by max - min
static HUE_DIV_TABLE: [i32; 256] = division_table(180 << HSV_SHIFT, 6);

const fn division_table(numerator: i32, scale: i32) -> [i32; 256] {
    let mut table = [0; 256];
    let mut i = 1;
    while i < 256 {
        let denominator = scale * i as i32;
        table[i] = (2 * numerator + denominator) / (2 * denominator);
        i += 1;
    }
    table
}

/// Convert one BGR pixel to 8-bit HSV (H in 0..180, S and V in 0..=255)
///
/// Bit-exact with OpenCV's `COLOR_BGR2HSV` for 8-bit images, including its
/// fixed-point rounding of hue and saturation.
pub fn bgr_to_hsv(b: u8, g: u8, r: u8) -> [u8; 3] {
    let (b, g, r) = (i32::from(b), i32::from(g), i32::from(r));
    let v = b.max(g).max(r);
    let diff = v - b.min(g).min(r);

    let s = (diff * SAT_DIV_TABLE[v as usize] + HSV_ROUND) >> HSV_SHIFT;

    let h = if v == r {
        g - b
    } else if v == g {
        b - r + 2 * diff
    } else {
        r - g + 4 * diff
    };
    let h = (h * HUE_DIV_TABLE[diff as usize] + HSV_ROUND) >> HSV_SHIFT;
    let h = if h < 0 { h + 180 } else { h };

    [h as u8, s as u8, v as u8]
}

/// What was kept from the previous frame
enum Previous {
    Planes(HsvPlanes),
    /// Conversion skipped because this frame's successor was already cached
    Skipped,
}

/// ContentDetector - detects scene changes using HSV color space analysis
///
/// This detector compares consecutive frames in the HSV color space and
/// calculates a score from the differences in hue, saturation and luminance.
/// When this score reaches the threshold, a scene cut is detected.
pub struct ContentDetector {
    config: ContentConfig,
    last: Option<Previous>,
    flash_filter: FlashFilter,
    frame_count: u64,
}

impl Default for ContentDetector {
    fn default() -> Self {
        let config = ContentConfig::default();
        Self {
            flash_filter: FlashFilter::new(config.min_scene_len),
            config,
            last: None,
            frame_count: 0,
        }
    }
}

impl ContentDetector {
    /// Create a ContentDetector with custom settings
    ///
    /// # Errors
    /// * `InvalidConfig` - negative threshold, zero `min_scene_len`, or all
    ///   weights zero
    #[instrument]
    pub fn new(config: ContentConfig) -> Result<Self> {
        config.validate()?;

        debug!(
            "Created ContentDetector: threshold={}, min_scene_len={}, weights={:?}",
            config.threshold, config.min_scene_len, config.weights
        );

        Ok(Self {
            flash_filter: FlashFilter::new(config.min_scene_len),
            config,
            last: None,
            frame_count: 0,
        })
    }

    /// Create a ContentDetector with the given threshold and default settings
    pub fn with_threshold(threshold: f64) -> Result<Self> {
        Self::new(ContentConfig::default().threshold(threshold))
    }

    pub fn metric_keys() -> &'static [&'static str] {
        METRIC_KEYS
    }

    /// Process the next frame of the stream
    ///
    /// Frames must arrive in increasing order starting at 0. Returns `true`
    /// if a cut at `frame_number` was added to `cuts`.
    ///
    /// # Errors
    /// * `FrameProcessingFailed` - the frame's dimensions differ from the
    ///   previous frame's
    #[instrument(skip(self, frame, metrics, cuts))]
    pub fn process_frame(
        &mut self,
        frame_number: u64,
        frame: &Frame,
        metrics: &mut FrameMetricStore,
        cuts: &mut CutList,
    ) -> Result<bool> {
        self.frame_count += 1;

        let mut current_planes = None;
        let emitted = match self.last.take() {
            None => {
                debug!("First frame ({}), nothing to compare", frame_number);
                false
            }
            Some(previous) => {
                let values = metrics.get_or_try_compute_all(frame_number, METRIC_KEYS, || {
                    // Planes are only dropped when this frame was already cached
                    let Previous::Planes(last_planes) = &previous else {
                        return Err(SceneDetectError::internal_error(
                            "previous frame planes missing",
                        ));
                    };
                    let planes = HsvPlanes::from_bgr_frame(frame, frame_number)?;
                    let deltas = Self::frame_deltas(&planes, last_planes, frame_number)?;
                    current_planes = Some(planes);
                    Ok(deltas)
                })?;

                let score = self.config.weights.score(values[1], values[2], values[3]);
                trace!(
                    "Frame {} components: hue={:.3}, sat={:.3}, lum={:.3}, score={:.3}",
                    frame_number,
                    values[1],
                    values[2],
                    values[3],
                    score
                );

                if score >= self.config.threshold
                    && cuts.has_room_for(frame_number, self.config.min_scene_len)
                    && self.flash_filter.admit(frame_number)
                {
                    debug!(
                        "Scene cut at frame {} (score {:.3} >= {})",
                        frame_number, score, self.config.threshold
                    );
                    cuts.insert(frame_number);
                    true
                } else {
                    false
                }
            }
        };

        // Keep this frame's planes for the next comparison unless the next
        // frame's metrics are already known.
        self.last = Some(if metrics.metrics_exist(frame_number + 1, METRIC_KEYS) {
            Previous::Skipped
        } else {
            match current_planes {
                Some(planes) => Previous::Planes(planes),
                None => Previous::Planes(HsvPlanes::from_bgr_frame(frame, frame_number)?),
            }
        });

        Ok(emitted)
    }

    /// Nothing is ever pending: cuts are emitted as soon as they are seen.
    pub fn post_process(&mut self, _cuts: &mut CutList) -> bool {
        false
    }

    /// `[average, hue, sat, lum]` deltas between two frames
    fn frame_deltas(current: &HsvPlanes, last: &HsvPlanes, frame_number: u64) -> Result<Vec<f64>> {
        if (current.width, current.height) != (last.width, last.height) {
            return Err(SceneDetectError::frame_error(
                frame_number,
                format!(
                    "Frame size changed from {}x{} to {}x{}",
                    last.width, last.height, current.width, current.height
                ),
            ));
        }

        let pixel_count = current.pixel_count();
        let delta_hue = mean_pixel_distance(&current.hue, &last.hue, pixel_count)?;
        let delta_sat = mean_pixel_distance(&current.sat, &last.sat, pixel_count)?;
        let delta_lum = mean_pixel_distance(&current.lum, &last.lum, pixel_count)?;
        let delta_avg = (delta_hue + delta_sat + delta_lum) / 3.0;

        Ok(vec![delta_avg, delta_hue, delta_sat, delta_lum])
    }

    /// Get the current threshold setting
    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// Get the current component weights
    pub fn weights(&self) -> &ComponentWeights {
        &self.config.weights
    }

    /// Get the number of frames processed so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn min_scene_len(&self) -> u64 {
        self.flash_filter.min_scene_len()
    }

    /// Reset the detector state (useful for processing multiple videos)
    pub fn reset(&mut self) {
        debug!("Resetting ContentDetector state");
        self.last = None;
        self.flash_filter.reset();
        self.frame_count = 0;
    }
}

/// Mean absolute difference between two equally sized planes
#[cfg(feature = "opencv")]
fn mean_pixel_distance(left: &Mat, right: &Mat, pixel_count: f64) -> Result<f64> {
    let mut diff = Mat::default();
    core::absdiff(left, right, &mut diff).map_err(|e| {
        SceneDetectError::internal_error(format!("Failed to calculate absolute difference: {}", e))
    })?;
    let sum = core::sum_elems(&diff)
        .map_err(|e| SceneDetectError::internal_error(format!("Failed to calculate sum: {}", e)))?;
    Ok(sum[0] / pixel_count)
}

/// Mean absolute difference between two equally sized planes
#[cfg(not(feature = "opencv"))]
fn mean_pixel_distance(left: &[u8], right: &[u8], pixel_count: f64) -> Result<f64> {
    let sum: u64 = left
        .iter()
        .zip(right)
        .map(|(&a, &b)| u64::from(a.abs_diff(b)))
        .sum();
    Ok(sum as f64 / pixel_count)
}

// Implement Debug manually to avoid dumping the cached planes
impl std::fmt::Debug for ContentDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentDetector")
            .field("threshold", &self.config.threshold)
            .field("min_scene_len", &self.config.min_scene_len)
            .field("weights", &self.config.weights)
            .field("frame_count", &self.frame_count)
            .field("has_last_frame", &self.last.is_some())
            .finish()
    }
}
