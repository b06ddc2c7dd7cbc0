//! Detector dispatch and the shared cut list
//!
//! [`Detector`] is a closed set of detection algorithms behind one
//! `process_frame` / `post_process` interface. Detectors are created either
//! directly from their configs or by name through the static registry
//! ([`available_detectors`], [`create_detector`]).

use tracing::debug;

use crate::common::{Result, SceneDetectError};
use crate::content_detector::ContentDetector;
use crate::frame::Frame;
use crate::metrics::FrameMetricStore;
use crate::threshold_detector::ThresholdDetector;

/// Ordered set of cut frame numbers
///
/// Always strictly increasing. Inserting a frame that is already present is
/// a no-op, and frames that arrive behind the current tail (a fade split
/// point) are placed in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CutList {
    frames: Vec<u64>,
}

impl CutList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cut, returning `false` if it was already present
    pub fn insert(&mut self, frame_number: u64) -> bool {
        match self.frames.binary_search(&frame_number) {
            Ok(_) => false,
            Err(position) => {
                self.frames.insert(position, frame_number);
                true
            }
        }
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.frames
    }

    /// Highest cut frame, if any
    pub fn last(&self) -> Option<u64> {
        self.frames.last().copied()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Nearest cut at or before `frame_number`
    pub fn last_at_or_before(&self, frame_number: u64) -> Option<u64> {
        let end = self.frames.partition_point(|&cut| cut <= frame_number);
        end.checked_sub(1).map(|index| self.frames[index])
    }

    /// Nearest cut strictly after `frame_number`
    pub fn first_after(&self, frame_number: u64) -> Option<u64> {
        let start = self.frames.partition_point(|&cut| cut <= frame_number);
        self.frames.get(start).copied()
    }

    /// True if a cut at `candidate` would be at least `min_gap` frames from
    /// its neighbours on both sides
    pub fn has_room_for(&self, candidate: u64, min_gap: u64) -> bool {
        let clear_before = self
            .last_at_or_before(candidate)
            .map_or(true, |previous| candidate - previous >= min_gap);
        let clear_after = self
            .first_after(candidate)
            .map_or(true, |next| next - candidate >= min_gap);
        clear_before && clear_after
    }

    pub fn contains(&self, frame_number: u64) -> bool {
        self.frames.binary_search(&frame_number).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.frames.iter().copied()
    }

    pub fn into_vec(self) -> Vec<u64> {
        self.frames
    }
}

impl From<CutList> for Vec<u64> {
    fn from(cuts: CutList) -> Self {
        cuts.frames
    }
}

impl FromIterator<u64> for CutList {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut cuts = CutList::new();
        for frame_number in iter {
            cuts.insert(frame_number);
        }
        cuts
    }
}

/// One of the available detection algorithms
#[derive(Debug)]
pub enum Detector {
    /// Fade in / fade out detection on average frame intensity
    Threshold(ThresholdDetector),
    /// Hard cut detection on HSV frame differences
    Content(ContentDetector),
}

impl Detector {
    /// Registry name of this detector
    pub fn name(&self) -> &'static str {
        match self {
            Detector::Threshold(_) => "threshold",
            Detector::Content(_) => "content",
        }
    }

    /// Metric keys this detector writes to the metric store
    pub fn metric_keys(&self) -> &'static [&'static str] {
        match self {
            Detector::Threshold(_) => ThresholdDetector::metric_keys(),
            Detector::Content(_) => ContentDetector::metric_keys(),
        }
    }

    /// Feed the next frame; returns `true` if a cut was added to `cuts`
    pub fn process_frame(
        &mut self,
        frame_number: u64,
        frame: &Frame,
        metrics: &mut FrameMetricStore,
        cuts: &mut CutList,
    ) -> Result<bool> {
        match self {
            Detector::Threshold(detector) => {
                Ok(detector.process_frame(frame_number, frame, metrics, cuts))
            }
            Detector::Content(detector) => detector.process_frame(frame_number, frame, metrics, cuts),
        }
    }

    /// Flush any pending cut once the stream has ended
    pub fn post_process(&mut self, cuts: &mut CutList) -> Result<bool> {
        match self {
            Detector::Threshold(detector) => Ok(detector.post_process(cuts)),
            Detector::Content(detector) => Ok(detector.post_process(cuts)),
        }
    }

    /// Number of frames seen since creation or the last reset
    pub fn frame_count(&self) -> u64 {
        match self {
            Detector::Threshold(detector) => detector.frame_count(),
            Detector::Content(detector) => detector.frame_count(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Detector::Threshold(detector) => detector.reset(),
            Detector::Content(detector) => detector.reset(),
        }
    }
}

impl From<ThresholdDetector> for Detector {
    fn from(detector: ThresholdDetector) -> Self {
        Detector::Threshold(detector)
    }
}

impl From<ContentDetector> for Detector {
    fn from(detector: ContentDetector) -> Self {
        Detector::Content(detector)
    }
}

fn default_content() -> Detector {
    Detector::Content(ContentDetector::default())
}

fn default_threshold() -> Detector {
    Detector::Threshold(ThresholdDetector::default())
}

/// Name to constructor table, fixed at compile time
static DETECTORS: &[(&str, fn() -> Detector)] = &[
    ("content", default_content),
    ("threshold", default_threshold),
];

/// Names accepted by [`create_detector`]
pub fn available_detectors() -> impl Iterator<Item = &'static str> {
    DETECTORS.iter().map(|(name, _)| *name)
}

/// Build a detector with default settings from its registry name
///
/// Lookup is case-insensitive.
///
/// # Errors
/// * `UnknownDetector` - no detector is registered under `name`
pub fn create_detector(name: &str) -> Result<Detector> {
    let (_, constructor) = DETECTORS
        .iter()
        .find(|(registered, _)| registered.eq_ignore_ascii_case(name))
        .ok_or_else(|| SceneDetectError::UnknownDetector {
            name: name.to_string(),
        })?;
    debug!("Creating detector '{}' with default settings", name);
    Ok(constructor())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold_detector::ThresholdConfig;

    #[test]
    fn test_cut_list_keeps_order() {
        let mut cuts = CutList::new();
        assert!(cuts.insert(50));
        assert!(cuts.insert(20));
        assert!(cuts.insert(80));
        assert!(!cuts.insert(50));

        assert_eq!(cuts.as_slice(), &[20, 50, 80]);
        assert_eq!(cuts.len(), 3);
        assert_eq!(cuts.last(), Some(80));
        assert!(cuts.contains(20));
        assert!(!cuts.contains(21));
    }

    #[test]
    fn test_cut_list_neighbours() {
        let cuts: CutList = [20, 50, 70].into_iter().collect();
        assert_eq!(cuts.last_at_or_before(10), None);
        assert_eq!(cuts.last_at_or_before(50), Some(50));
        assert_eq!(cuts.last_at_or_before(60), Some(50));
        assert_eq!(cuts.first_after(50), Some(70));
        assert_eq!(cuts.first_after(70), None);

        assert!(cuts.has_room_for(60, 10));
        assert!(!cuts.has_room_for(60, 15));
        // Too close to the following cut only
        assert!(!cuts.has_room_for(10, 15));
        assert!(cuts.has_room_for(100, 30));
        assert!(!cuts.has_room_for(50, 1));
        assert!(CutList::new().has_room_for(0, 15));
    }

    #[test]
    fn test_cut_list_from_iter() {
        let cuts: CutList = [9, 3, 3, 6].into_iter().collect();
        assert_eq!(Vec::from(cuts), vec![3, 6, 9]);
        assert!(CutList::new().is_empty());
    }

    #[test]
    fn test_registry_lookup() {
        let names: Vec<_> = available_detectors().collect();
        assert_eq!(names, vec!["content", "threshold"]);

        let detector = create_detector("content").unwrap();
        assert_eq!(detector.name(), "content");
        assert_eq!(detector.metric_keys().len(), 4);

        let detector = create_detector("Threshold").unwrap();
        assert_eq!(detector.name(), "threshold");
        assert_eq!(detector.metric_keys(), &["frame_avg_rgb"]);
    }

    #[test]
    fn test_registry_unknown_name() {
        let error = create_detector("motion").unwrap_err();
        assert!(matches!(error, SceneDetectError::UnknownDetector { name } if name == "motion"));
    }

    #[test]
    fn test_dispatch_threshold() {
        let config = ThresholdConfig::default().min_scene_len(1);
        let mut detector = Detector::from(ThresholdDetector::new(config).unwrap());
        let mut metrics = FrameMetricStore::new();
        let mut cuts = CutList::new();

        let bright = Frame::filled(4, 4, [200, 200, 200]);
        let black = Frame::filled(4, 4, [0, 0, 0]);
        let frames = [&bright, &bright, &black, &black, &bright];
        for (number, frame) in frames.iter().enumerate() {
            detector
                .process_frame(number as u64, frame, &mut metrics, &mut cuts)
                .unwrap();
        }
        assert!(!detector.post_process(&mut cuts).unwrap());
        // Fade out at 2, fade in at 4
        assert_eq!(cuts.as_slice(), &[3]);
        assert_eq!(detector.frame_count(), 5);

        detector.reset();
        assert_eq!(detector.frame_count(), 0);
    }
}
