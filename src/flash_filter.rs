//! Minimum scene length enforcement
//!
//! Both detectors route every candidate cut through a [`FlashFilter`], which
//! suppresses any cut closer than `min_scene_len` frames to the previously
//! admitted one. This filters out camera flashes, flicker and other transient
//! changes that should not split a scene. Cuts added by other detectors are
//! checked separately against the shared list with
//! [`CutList::has_room_for`](crate::CutList::has_room_for).

use tracing::{debug, trace};

/// Default minimum scene length in frames
pub const DEFAULT_MIN_SCENE_LEN: u64 = 15;

/// Suppresses scene cuts that follow the previous cut too closely
#[derive(Debug, Clone)]
pub struct FlashFilter {
    min_scene_len: u64,
    last_cut_frame: Option<u64>,
}

impl FlashFilter {
    /// Create a new FlashFilter
    ///
    /// # Arguments
    /// * `min_scene_len` - Minimum number of frames between scene cuts
    ///
    /// # Panics
    /// Panics if min_scene_len is 0 (fail-fast approach); detector configs
    /// validate this before building a filter.
    pub fn new(min_scene_len: u64) -> Self {
        assert!(
            min_scene_len > 0,
            "Minimum scene length must be positive, got: {}",
            min_scene_len
        );
        Self {
            min_scene_len,
            last_cut_frame: None,
        }
    }

    /// Would a cut at `candidate` be admitted?
    pub fn would_admit(&self, candidate: u64) -> bool {
        match self.last_cut_frame {
            None => true,
            Some(last) => candidate.saturating_sub(last) >= self.min_scene_len,
        }
    }

    /// Admit a cut at `candidate` if it is far enough from the last admitted cut.
    ///
    /// Returns `true` and records the cut when admitted.
    pub fn admit(&mut self, candidate: u64) -> bool {
        if !self.would_admit(candidate) {
            debug!(
                "Suppressing cut at frame {} ({} frames since last cut at {:?}, need {})",
                candidate,
                self.last_cut_frame
                    .map_or(0, |last| candidate.saturating_sub(last)),
                self.last_cut_frame,
                self.min_scene_len
            );
            return false;
        }

        trace!("Cut admitted at frame {}", candidate);
        self.last_cut_frame = Some(candidate);
        true
    }

    /// Get the minimum scene length setting
    pub fn min_scene_len(&self) -> u64 {
        self.min_scene_len
    }

    /// Get the frame number of the last admitted cut (if any)
    pub fn last_cut_frame(&self) -> Option<u64> {
        self.last_cut_frame
    }

    /// Reset the filter state (useful for processing multiple videos)
    pub fn reset(&mut self) {
        self.last_cut_frame = None;
    }
}
