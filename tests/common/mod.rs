//! In-memory stand-ins for the camera and the landmark source.

#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    sync::Arc,
};

use fingercount::{
    detector::{DetectorOptions, LandmarkSource, ResultSink},
    image::Image,
    landmark::{Landmark, LandmarkIdx, LandmarkSet, NUM_LANDMARKS},
    video::{CaptureDevice, MediaStream, MediaTrack, TrackKind, VideoConstraints},
};

pub const FRAME_WIDTH: u32 = 64;
pub const FRAME_HEIGHT: u32 = 48;

/// Observable camera state, shared between the test and the fakes.
#[derive(Default)]
pub struct CameraLog {
    pub acquired: Cell<u32>,
    pub live_tracks: Cell<i32>,
    pub frames: Cell<u32>,
}

#[derive(Default)]
pub struct FakeCamera {
    pub log: Rc<CameraLog>,
    pub deny: bool,
    pub broken_stream: bool,
}

impl FakeCamera {
    pub fn new() -> (Self, Rc<CameraLog>) {
        let cam = Self::default();
        let log = cam.log.clone();
        (cam, log)
    }
}

impl CaptureDevice for FakeCamera {
    type Stream = FakeStream;

    fn request_video_stream(&mut self, _: &VideoConstraints) -> anyhow::Result<FakeStream> {
        if self.deny {
            anyhow::bail!("Permission denied");
        }
        self.log.acquired.set(self.log.acquired.get() + 1);
        self.log.live_tracks.set(self.log.live_tracks.get() + 1);
        Ok(FakeStream {
            tracks: [FakeTrack {
                live: true,
                log: self.log.clone(),
            }],
            broken: self.broken_stream,
        })
    }
}

pub struct FakeTrack {
    live: bool,
    log: Rc<CameraLog>,
}

impl MediaTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.log.live_tracks.set(self.log.live_tracks.get() - 1);
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

pub struct FakeStream {
    tracks: [FakeTrack; 1],
    broken: bool,
}

impl MediaStream for FakeStream {
    type Track = FakeTrack;

    fn tracks_mut(&mut self) -> &mut [FakeTrack] {
        &mut self.tracks
    }

    fn read_frame(&mut self) -> anyhow::Result<Image> {
        if self.broken || !self.tracks[0].live {
            anyhow::bail!("device unplugged");
        }
        let log = &self.tracks[0].log;
        log.frames.set(log.frames.get() + 1);
        Ok(Image::new(FRAME_WIDTH, FRAME_HEIGHT))
    }
}

/// A landmark source that answers from a script, either right away or when the test says so.
#[derive(Default)]
pub struct FakeSource {
    pub script: VecDeque<Option<LandmarkSet>>,
    pub deferred: bool,
    pub pending: Rc<RefCell<Vec<ResultSink>>>,
    pub fail_configure: bool,
    pub fail_submit: bool,
    pub configured: Rc<Cell<u32>>,
}

impl FakeSource {
    pub fn scripted<I: IntoIterator<Item = Option<LandmarkSet>>>(script: I) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl LandmarkSource for FakeSource {
    fn configure(&mut self, options: &DetectorOptions) -> anyhow::Result<()> {
        if self.fail_configure {
            anyhow::bail!("model failed to load");
        }
        options.validate()?;
        self.configured.set(self.configured.get() + 1);
        Ok(())
    }

    fn submit_frame(&mut self, _frame: Arc<Image>, sink: ResultSink) -> anyhow::Result<()> {
        if self.fail_submit {
            anyhow::bail!("inference failed");
        }
        if self.deferred {
            self.pending.borrow_mut().push(sink);
        } else {
            sink.deliver(self.script.pop_front().flatten());
        }
        Ok(())
    }
}

/// Builds a hand with the given fingers raised, in `[thumb, index, middle, ring, pinky]` order.
pub fn hand(raised: [bool; 5]) -> LandmarkSet {
    let mut lms = vec![Landmark::new(0.5, 0.5); NUM_LANDMARKS];
    lms[LandmarkIdx::ThumbIp as usize] = Landmark::new(0.4, 0.6);
    lms[LandmarkIdx::ThumbTip as usize] = Landmark::new(if raised[0] { 0.3 } else { 0.5 }, 0.6);
    let fingers = [
        (LandmarkIdx::IndexFingerPip, LandmarkIdx::IndexFingerTip, 0.45),
        (LandmarkIdx::MiddleFingerPip, LandmarkIdx::MiddleFingerTip, 0.5),
        (LandmarkIdx::RingFingerPip, LandmarkIdx::RingFingerTip, 0.55),
        (LandmarkIdx::PinkyPip, LandmarkIdx::PinkyTip, 0.6),
    ];
    for (i, (base, tip, x)) in fingers.into_iter().enumerate() {
        lms[base as usize] = Landmark::new(x, 0.5);
        lms[tip as usize] = Landmark::new(x, if raised[i + 1] { 0.2 } else { 0.7 });
    }
    LandmarkSet::new(lms)
}
