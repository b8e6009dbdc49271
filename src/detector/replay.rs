//! Replays recorded hand landmarks.
//!
//! The recording format is one JSON document per line, one line per frame:
//!
//! ```text
//! {"hands":[{"handedness":"Right","score":0.97,"landmarks":[{"x":0.51,"y":0.82,"z":0.0}, ...]}]}
//! ```
//!
//! This is what a landmarker subprocess writes to its stdout, so [`Replay`] can also sit directly
//! on top of such a process' output. A line may carry an `"error"` string instead of (or in
//! addition to) hands; it is logged and the frame is treated as having no hand.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::Context;
use serde::Deserialize;

use crate::landmark::{Landmark, LandmarkSet};

use super::{HandCandidate, HandDetector, Handedness};

#[derive(Deserialize, Debug)]
struct LandmarkJson {
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
}

#[derive(Deserialize, Debug)]
struct HandJson {
    #[serde(default)]
    handedness: Option<String>,
    score: f32,
    landmarks: Vec<LandmarkJson>,
}

#[derive(Deserialize, Debug)]
struct FrameJson {
    #[serde(default)]
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

impl HandJson {
    fn into_candidate(self) -> HandCandidate {
        let landmarks = self
            .landmarks
            .into_iter()
            .map(|lm| Landmark::new(lm.x, lm.y).with_z(lm.z))
            .collect::<LandmarkSet>();
        let candidate = HandCandidate::new(landmarks, self.score);
        match self.handedness.as_deref() {
            Some("Left") => candidate.with_handedness(Handedness::Left),
            Some("Right") => candidate.with_handedness(Handedness::Right),
            Some(other) => {
                log::debug!("unknown handedness '{other}'");
                candidate
            }
            None => candidate,
        }
    }
}

/// A [`HandDetector`] reading one recorded frame per call to [`HandDetector::detect`].
///
/// The frame passed to `detect` is ignored. Once the recording is exhausted, `detect` returns an
/// error.
pub struct Replay<R> {
    reader: R,
    line: String,
    frames: usize,
}

impl Replay<BufReader<File>> {
    /// Opens a recording file.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open landmark recording '{}'", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> Replay<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            frames: 0,
        }
    }

    /// Returns the number of frames replayed so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    fn next_frame(&mut self) -> anyhow::Result<FrameJson> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                anyhow::bail!("landmark recording ended after {} frames", self.frames);
            }
            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }
            self.frames += 1;
            return serde_json::from_str(line)
                .with_context(|| format!("malformed landmarks in frame {}", self.frames));
        }
    }
}

impl<R: BufRead> HandDetector for Replay<R> {
    fn detect(&mut self, _frame: &crate::image::Image) -> anyhow::Result<Vec<HandCandidate>> {
        let frame = self.next_frame()?;
        if let Some(error) = frame.error {
            log::warn!("landmarker error in frame {}: {}", self.frames, error);
            return Ok(Vec::new());
        }
        let mut hands = frame
            .hands
            .into_iter()
            .map(HandJson::into_candidate)
            .collect::<Vec<_>>();
        hands.sort_by(|a, b| b.score().total_cmp(&a.score()));
        Ok(hands)
    }
}
