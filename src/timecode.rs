//! Frame-accurate timecodes.
//!
//! A [`FrameTimecode`] is a frame number paired with the stream framerate.
//! The frame number is the source of truth: every time-based input is
//! converted to frames by truncation, and every time-based output is derived
//! from the frame number, so repeated conversions never drift.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign};

use tracing::{instrument, trace};

use crate::common::{Result, SceneDetectError};

/// Two framerates closer than this are considered equal.
pub const MAX_FPS_DELTA: f64 = 0.001;

/// Largest supported number of digits after the decimal point in [`FrameTimecode::format`].
const MAX_PRECISION: usize = 9;

/// Represents a specific point in time within a video
///
/// This type encapsulates both the frame number and framerate information,
/// allowing for precise temporal calculations and conversions.
#[derive(Debug, Clone, Copy)]
pub struct FrameTimecode {
    frame_number: u64,
    fps: f64,
}

/// Any value a [`FrameTimecode`] can be parsed from.
#[derive(Debug, Clone, PartialEq)]
pub enum TimecodeValue {
    /// An exact frame count.
    Frames(u64),
    /// A signed frame count; negative values are rejected.
    Signed(i64),
    /// Seconds since the start of the stream.
    Seconds(f64),
    /// `HH:MM:SS[.nnn]`, a bare frame count (`"1234"`) or seconds (`"12.5s"`).
    Text(String),
    /// Hours, minutes and seconds.
    Hms(i64, i64, f64),
    /// Another timecode at the same framerate.
    Timecode(FrameTimecode),
}

impl From<u64> for TimecodeValue {
    fn from(value: u64) -> Self {
        Self::Frames(value)
    }
}

impl From<u32> for TimecodeValue {
    fn from(value: u32) -> Self {
        Self::Frames(u64::from(value))
    }
}

impl From<usize> for TimecodeValue {
    fn from(value: usize) -> Self {
        Self::Frames(value as u64)
    }
}

impl From<i64> for TimecodeValue {
    fn from(value: i64) -> Self {
        Self::Signed(value)
    }
}

impl From<i32> for TimecodeValue {
    fn from(value: i32) -> Self {
        Self::Signed(i64::from(value))
    }
}

impl From<f64> for TimecodeValue {
    fn from(value: f64) -> Self {
        Self::Seconds(value)
    }
}

impl From<&str> for TimecodeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TimecodeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<(i64, i64, f64)> for TimecodeValue {
    fn from((hours, minutes, seconds): (i64, i64, f64)) -> Self {
        Self::Hms(hours, minutes, seconds)
    }
}

impl From<FrameTimecode> for TimecodeValue {
    fn from(value: FrameTimecode) -> Self {
        Self::Timecode(value)
    }
}

/// Right-hand side of [`FrameTimecode::checked_add`] and [`FrameTimecode::checked_sub`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimecodeOperand {
    Frames(i64),
    Timecode(FrameTimecode),
    Seconds(f64),
}

impl From<i64> for TimecodeOperand {
    fn from(value: i64) -> Self {
        Self::Frames(value)
    }
}

impl From<FrameTimecode> for TimecodeOperand {
    fn from(value: FrameTimecode) -> Self {
        Self::Timecode(value)
    }
}

impl From<f64> for TimecodeOperand {
    fn from(value: f64) -> Self {
        Self::Seconds(value)
    }
}

/// Check that a framerate can back a timecode.
pub(crate) fn validate_fps(fps: f64) -> Result<()> {
    if fps.is_finite() && fps > 0.0 {
        Ok(())
    } else {
        Err(SceneDetectError::InvalidFramerate { fps })
    }
}

impl FrameTimecode {
    /// Create a new FrameTimecode
    ///
    /// # Arguments
    /// * `frame_number` - The frame number (0-indexed)
    /// * `fps` - Frames per second of the video
    ///
    /// # Panics
    /// Panics if fps is not positive (fail-fast approach). Use
    /// [`FrameTimecode::parse`] for untrusted input.
    pub fn new(frame_number: u64, fps: f64) -> Self {
        assert!(
            fps.is_finite() && fps > 0.0,
            "FPS must be positive, got: {}",
            fps
        );
        Self { frame_number, fps }
    }

    /// Build a timecode from any supported representation.
    ///
    /// Time-based inputs are truncated (never rounded) to a whole frame.
    ///
    /// # Errors
    /// * `InvalidFramerate` - `fps` is not a positive finite number
    /// * `InvalidFormat` - negative values, out-of-range or non-numeric
    ///   `HH:MM:SS` components, unparseable strings
    /// * `IncompatibleRate` - copying a timecode that uses another framerate
    #[instrument(level = "trace", skip(value))]
    pub fn parse(value: impl Into<TimecodeValue>, fps: f64) -> Result<Self> {
        validate_fps(fps)?;

        let frame_number = match value.into() {
            TimecodeValue::Frames(frames) => frames,
            TimecodeValue::Signed(frames) => u64::try_from(frames).map_err(|_| {
                SceneDetectError::invalid_format(frames.to_string(), "frame number cannot be negative")
            })?,
            TimecodeValue::Seconds(seconds) => {
                seconds_to_frames(seconds, fps, &seconds.to_string())?
            }
            TimecodeValue::Text(text) => parse_text(&text, fps)?,
            TimecodeValue::Hms(hours, minutes, seconds) => {
                let raw = format!("({}, {}, {})", hours, minutes, seconds);
                hms_to_frames(hours, minutes, seconds, fps, &raw)?
            }
            TimecodeValue::Timecode(other) => {
                if !other.equal_framerate(fps) {
                    return Err(SceneDetectError::IncompatibleRate {
                        left: fps,
                        right: other.fps,
                    });
                }
                other.frame_number
            }
        };

        trace!("Parsed timecode: frame={}, fps={}", frame_number, fps);
        Ok(Self { frame_number, fps })
    }

    /// Get the frame number
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Same as [`FrameTimecode::frame_number`].
    pub fn as_frames(&self) -> u64 {
        self.frame_number
    }

    /// Get the framerate
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Convert to seconds since start of video
    pub fn as_seconds(&self) -> f64 {
        self.frame_number as f64 / self.fps
    }

    /// Convert to milliseconds since start of video
    pub fn as_milliseconds(&self) -> f64 {
        self.as_seconds() * 1000.0
    }

    pub fn equal_framerate(&self, fps: f64) -> bool {
        (self.fps - fps).abs() < MAX_FPS_DELTA
    }

    /// Format as `HH:MM:SS[.nnn]` with `precision` digits after the decimal point.
    ///
    /// With `round` the fractional seconds are rounded to the nearest unit,
    /// otherwise truncated. A rounded value carries into minutes and hours, so
    /// the seconds field never reads `60`.
    pub fn format(&self, precision: usize, round: bool) -> String {
        let precision = precision.min(MAX_PRECISION);
        let scale = 10u64.pow(precision as u32);

        // One division keeps exact values exact before rounding/truncating.
        let scaled = (self.frame_number as f64 * scale as f64) / self.fps;
        let units = (if round { scaled.round() } else { scaled.floor() }) as u64;

        let whole_seconds = units / scale;
        let fraction = units % scale;
        let hours = whole_seconds / 3600;
        let minutes = (whole_seconds % 3600) / 60;
        let seconds = whole_seconds % 60;

        if precision > 0 {
            format!(
                "{:02}:{:02}:{:02}.{:0width$}",
                hours,
                minutes,
                seconds,
                fraction,
                width = precision
            )
        } else {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        }
    }

    /// Render in one of the registered output formats.
    pub fn render(&self, format: TimecodeFormat) -> String {
        match format {
            TimecodeFormat::Frames => self.frame_number.to_string(),
            TimecodeFormat::Seconds => format!("{:.3}", self.as_seconds()),
            TimecodeFormat::Timecode => self.format(3, true),
        }
    }

    /// Add frames, another timecode, or seconds.
    ///
    /// Frame offsets may be negative; the result is clamped at frame 0.
    ///
    /// # Errors
    /// * `IncompatibleRate` - the other timecode uses a different framerate
    /// * `UnsupportedOperation` - adding a bare seconds value; convert it with
    ///   [`FrameTimecode::parse`] first
    pub fn checked_add(&self, rhs: impl Into<TimecodeOperand>) -> Result<Self> {
        match rhs.into() {
            TimecodeOperand::Frames(frames) => Ok(self.shifted(frames)),
            TimecodeOperand::Timecode(other) => {
                if !self.equal_framerate(other.fps) {
                    return Err(SceneDetectError::IncompatibleRate {
                        left: self.fps,
                        right: other.fps,
                    });
                }
                Ok(Self {
                    frame_number: self.frame_number.saturating_add(other.frame_number),
                    fps: self.fps,
                })
            }
            TimecodeOperand::Seconds(_) => Err(SceneDetectError::unsupported(
                "adding seconds to a timecode; convert to frames first",
            )),
        }
    }

    /// Subtraction is deliberately not provided.
    ///
    /// Whether `a - b` should produce a frame delta or a clamped timecode has
    /// not been settled, so every operand is rejected.
    pub fn checked_sub(&self, rhs: impl Into<TimecodeOperand>) -> Result<Self> {
        let operation = match rhs.into() {
            TimecodeOperand::Frames(_) => "subtracting frames from a timecode",
            TimecodeOperand::Timecode(_) => "subtracting timecodes",
            TimecodeOperand::Seconds(_) => "subtracting seconds from a timecode",
        };
        Err(SceneDetectError::unsupported(operation))
    }

    fn shifted(&self, frames: i64) -> Self {
        let frame_number = if frames >= 0 {
            self.frame_number.saturating_add(frames as u64)
        } else {
            self.frame_number.saturating_sub(frames.unsigned_abs())
        };
        Self {
            frame_number,
            fps: self.fps,
        }
    }
}

fn seconds_to_frames(seconds: f64, fps: f64, raw: &str) -> Result<u64> {
    if !seconds.is_finite() {
        return Err(SceneDetectError::invalid_format(raw, "seconds must be finite"));
    }
    if seconds < 0.0 {
        return Err(SceneDetectError::invalid_format(raw, "seconds cannot be negative"));
    }
    frames_at(seconds, fps, raw)
}

fn hms_to_frames(hours: i64, minutes: i64, seconds: f64, fps: f64, raw: &str) -> Result<u64> {
    if hours < 0 {
        return Err(SceneDetectError::invalid_format(raw, "hours cannot be negative"));
    }
    if !(0..60).contains(&minutes) {
        return Err(SceneDetectError::invalid_format(raw, "minutes must be in 0..60"));
    }
    if !seconds.is_finite() || !(0.0..60.0).contains(&seconds) {
        return Err(SceneDetectError::invalid_format(raw, "seconds must be in 0..60"));
    }
    let whole_seconds = hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60))
        .ok_or_else(|| SceneDetectError::invalid_format(raw, "hours out of range"))?;
    frames_at(whole_seconds as f64 + seconds, fps, raw)
}

/// Truncated frame number at `seconds`, rejecting values past `u64::MAX`
fn frames_at(seconds: f64, fps: f64, raw: &str) -> Result<u64> {
    let frames = seconds * fps;
    // u64::MAX as f64 rounds up to 2^64, which is already out of range
    if frames.is_nan() || frames >= u64::MAX as f64 {
        return Err(SceneDetectError::invalid_format(raw, "timecode out of range"));
    }
    Ok(frames as u64)
}

fn parse_text(text: &str, fps: f64) -> Result<u64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SceneDetectError::invalid_format(text, "empty timecode"));
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed
            .parse::<u64>()
            .map_err(|e| SceneDetectError::invalid_format(text, e.to_string()));
    }

    if let Some(seconds) = trimmed.strip_suffix('s') {
        if !is_decimal(seconds) {
            return Err(SceneDetectError::invalid_format(text, "expected seconds like '12.5s'"));
        }
        let seconds: f64 = seconds
            .parse()
            .map_err(|_| SceneDetectError::invalid_format(text, "unparseable seconds"))?;
        return seconds_to_frames(seconds, fps, text);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() != 3 {
        return Err(SceneDetectError::invalid_format(text, "expected HH:MM:SS[.nnn]"));
    }

    let hours = parse_component(parts[0], text, "hours")?;
    let minutes = parse_component(parts[1], text, "minutes")?;
    if !is_decimal(parts[2]) {
        return Err(SceneDetectError::invalid_format(text, "seconds must be numeric"));
    }
    let seconds: f64 = parts[2]
        .parse()
        .map_err(|_| SceneDetectError::invalid_format(text, "seconds must be numeric"))?;

    hms_to_frames(hours, minutes, seconds, fps, text)
}

fn parse_component(part: &str, text: &str, name: &str) -> Result<i64> {
    let digits = part.strip_prefix('-').unwrap_or(part);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SceneDetectError::invalid_format(
            text,
            format!("{} must be numeric", name),
        ));
    }
    part.parse::<i64>()
        .map_err(|e| SceneDetectError::invalid_format(text, e.to_string()))
}

/// Digits with at most one decimal point.
fn is_decimal(value: &str) -> bool {
    !value.is_empty()
        && value.bytes().any(|b| b.is_ascii_digit())
        && value.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && value.bytes().filter(|&b| b == b'.').count() <= 1
}

impl fmt::Display for FrameTimecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(3, true))
    }
}

impl PartialEq for FrameTimecode {
    fn eq(&self, other: &Self) -> bool {
        self.frame_number == other.frame_number && self.equal_framerate(other.fps)
    }
}

impl PartialEq<u64> for FrameTimecode {
    fn eq(&self, other: &u64) -> bool {
        self.frame_number == *other
    }
}

impl PartialOrd for FrameTimecode {
    /// Timecodes at different framerates are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.equal_framerate(other.fps) {
            Some(self.frame_number.cmp(&other.frame_number))
        } else {
            None
        }
    }
}

impl PartialOrd<u64> for FrameTimecode {
    fn partial_cmp(&self, other: &u64) -> Option<Ordering> {
        Some(self.frame_number.cmp(other))
    }
}

impl Add<i64> for FrameTimecode {
    type Output = FrameTimecode;

    fn add(self, frames: i64) -> Self::Output {
        self.shifted(frames)
    }
}

impl AddAssign<i64> for FrameTimecode {
    fn add_assign(&mut self, frames: i64) {
        *self = self.shifted(frames);
    }
}

/// Output formats a timecode can be rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimecodeFormat {
    Frames,
    Seconds,
    Timecode,
}

const TIMECODE_FORMATS: &[(&str, TimecodeFormat)] = &[
    ("frames", TimecodeFormat::Frames),
    ("seconds", TimecodeFormat::Seconds),
    ("timecode", TimecodeFormat::Timecode),
];

impl TimecodeFormat {
    /// Registered format names, in display order.
    pub fn available() -> impl Iterator<Item = &'static str> {
        TIMECODE_FORMATS.iter().map(|(name, _)| *name)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        TIMECODE_FORMATS
            .iter()
            .find(|(registered, _)| registered.eq_ignore_ascii_case(name))
            .map(|(_, format)| *format)
    }
}
