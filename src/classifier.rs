//! Finger counting heuristic.
//!
//! A finger is considered raised when its tip lies above its base joint in the image (smaller
//! `y`, since Y points down). The thumb moves sideways instead, so it is raised when its tip lies
//! to the *left* of its IP joint (smaller `x`).
//!
//! # Limitations
//!
//! The thumb rule only holds for one hand orientation: a right hand seen through a mirrored,
//! front-facing camera (or a left hand through an unmirrored one). The other hand will have its
//! thumb counted exactly inverted. There is no smoothing across frames and no confidence check
//! beyond what the detector already applied.

use std::fmt;

use crate::landmark::{Finger, Landmark, LandmarkIdx, NUM_LANDMARKS};
use crate::Error;

/// Number of raised fingers, in range `0..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FingerCount(u8);

impl FingerCount {
    pub const MAX: Self = Self(5);

    /// Returns `None` if `count` exceeds [`FingerCount::MAX`].
    pub fn new(count: u8) -> Option<Self> {
        (count <= Self::MAX.0).then_some(Self(count))
    }

    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for FingerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<FingerCount> for u8 {
    fn from(count: FingerCount) -> Self {
        count.0
    }
}

/// Per-finger result of the heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandPose {
    extended: [bool; 5],
}

impl HandPose {
    /// Returns whether `finger` was classified as raised.
    pub fn is_extended(&self, finger: Finger) -> bool {
        self.extended[finger as usize]
    }

    /// Returns an iterator over the raised fingers.
    pub fn extended_fingers(&self) -> impl Iterator<Item = Finger> + '_ {
        Finger::ALL
            .into_iter()
            .filter(move |finger| self.is_extended(*finger))
    }

    pub fn count(&self) -> FingerCount {
        FingerCount(self.extended.iter().filter(|ext| **ext).count() as u8)
    }
}

/// Counts the raised fingers of a hand.
///
/// `landmarks` must contain exactly 21 landmarks, otherwise [`Error::InvalidInput`] is returned.
pub fn count_fingers(landmarks: &[Landmark]) -> Result<FingerCount, Error> {
    classify(landmarks).map(|pose| pose.count())
}

/// Classifies each finger of a hand as raised or not.
///
/// Fails with [`Error::InvalidInput`] if `landmarks` doesn't contain exactly 21 landmarks or if a
/// landmark consulted by the heuristic has a non-finite coordinate.
pub fn classify(landmarks: &[Landmark]) -> Result<HandPose, Error> {
    if landmarks.len() != NUM_LANDMARKS {
        return Err(Error::invalid_input(format!(
            "expected {} landmarks, got {}",
            NUM_LANDMARKS,
            landmarks.len()
        )));
    }

    let lm = |idx: LandmarkIdx| -> Result<Landmark, Error> {
        let lm = landmarks[idx as usize];
        if lm.x().is_finite() && lm.y().is_finite() {
            Ok(lm)
        } else {
            Err(Error::invalid_input(format!(
                "landmark {:?} has non-finite position ({}, {})",
                idx,
                lm.x(),
                lm.y()
            )))
        }
    };

    let mut extended = [false; 5];
    for finger in Finger::ALL {
        let (tip, base) = (lm(finger.tip())?, lm(finger.base())?);
        extended[finger as usize] = match finger {
            Finger::Thumb => tip.x() < base.x(),
            _ => tip.y() < base.y(),
        };
    }

    Ok(HandPose { extended })
}
