//! Hand landmark sources.
//!
//! Landmark detection itself is done by an external hand tracker. This module defines how the
//! rest of the crate talks to it:
//!
//! - [`LandmarkSource`] is the asynchronous per-frame interface used by the session: every
//!   submitted frame comes with a [`ResultSink`], through which the source delivers zero or one
//!   [`LandmarkSet`] whenever it is done.
//! - [`HandDetector`] is a simpler, synchronous interface for detectors that return all hand
//!   candidates of a frame. [`Inline`] and [`Threaded`] turn it into a [`LandmarkSource`],
//!   applying the [`DetectorOptions`].
//! - [`replay::Replay`] is a [`HandDetector`] that reads recorded landmarks.

pub mod replay;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crossbeam::channel::Sender;

use crate::image::Image;
use crate::landmark::LandmarkSet;
use crate::worker::Worker;
use crate::Error;

/// Detector configuration.
///
/// The defaults track a single hand with the full landmark model and require a confidence of
/// 0.8 for both detection and tracking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorOptions {
    max_hands: u32,
    model_complexity: u8,
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_hands: 1,
            model_complexity: 1,
            min_detection_confidence: 0.8,
            min_tracking_confidence: 0.8,
        }
    }
}

impl DetectorOptions {
    /// Sets the maximum number of hands to report per frame.
    ///
    /// Only the first reported hand is used for counting.
    pub fn max_hands(self, max_hands: u32) -> Self {
        Self { max_hands, ..self }
    }

    /// Selects the landmark model: 0 is the lite model, 1 the full one.
    pub fn model_complexity(self, model_complexity: u8) -> Self {
        Self {
            model_complexity,
            ..self
        }
    }

    /// Sets the minimum confidence for a hand to be reported when no hand was present in the
    /// previous frame.
    pub fn min_detection_confidence(self, confidence: f32) -> Self {
        Self {
            min_detection_confidence: confidence,
            ..self
        }
    }

    /// Sets the minimum confidence for a hand to keep being reported after it was present in the
    /// previous frame.
    pub fn min_tracking_confidence(self, confidence: f32) -> Self {
        Self {
            min_tracking_confidence: confidence,
            ..self
        }
    }

    #[inline]
    pub fn get_max_hands(&self) -> u32 {
        self.max_hands
    }

    #[inline]
    pub fn get_model_complexity(&self) -> u8 {
        self.model_complexity
    }

    #[inline]
    pub fn get_min_detection_confidence(&self) -> f32 {
        self.min_detection_confidence
    }

    #[inline]
    pub fn get_min_tracking_confidence(&self) -> f32 {
        self.min_tracking_confidence
    }

    /// Checks that all options are within their valid ranges.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_hands == 0 {
            return Err(Error::InvalidOptions("`max_hands` must be at least 1".into()));
        }
        if self.model_complexity > 1 {
            return Err(Error::InvalidOptions(format!(
                "`model_complexity` must be 0 or 1, got {}",
                self.model_complexity
            )));
        }
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidOptions(format!(
                    "`{name}` must be in range 0.0..=1.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// One detector result, tagged with the subscription it belongs to.
pub(crate) struct Delivery {
    pub(crate) generation: u64,
    pub(crate) result: anyhow::Result<Option<LandmarkSet>>,
}

/// Handle through which a [`LandmarkSource`] delivers the result for one submitted frame.
///
/// A sink may be kept around and used later, from any thread. Results delivered after the
/// session that submitted the frame was stopped are discarded.
pub struct ResultSink {
    generation: u64,
    cancelled: Arc<AtomicBool>,
    sender: Sender<Delivery>,
}

impl ResultSink {
    pub(crate) fn new(generation: u64, cancelled: Arc<AtomicBool>, sender: Sender<Delivery>) -> Self {
        Self {
            generation,
            cancelled,
            sender,
        }
    }

    /// Returns whether the session this sink belongs to has ended.
    ///
    /// Sources may use this to skip work for frames nobody is waiting for anymore.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Delivers the landmarks of the hand found in the frame, or `None` if there was no hand.
    pub fn deliver(self, hand: Option<LandmarkSet>) {
        self.send(Ok(hand));
    }

    /// Reports that the frame could not be processed.
    pub fn fail(self, error: anyhow::Error) {
        self.send(Err(error));
    }

    fn send(self, result: anyhow::Result<Option<LandmarkSet>>) {
        if self.is_cancelled() {
            log::trace!("dropping result for cancelled session {}", self.generation);
            return;
        }
        // The receiving controller may already be gone, which is fine.
        self.sender
            .send(Delivery {
                generation: self.generation,
                result,
            })
            .ok();
    }
}

/// An asynchronous source of hand landmarks.
pub trait LandmarkSource {
    /// Applies `options`. Called when a session starts, before any frame is submitted.
    fn configure(&mut self, options: &DetectorOptions) -> anyhow::Result<()>;

    /// Submits a frame for landmark detection.
    ///
    /// The result must be delivered through `sink`, either before returning or at any later
    /// point. Dropping the sink without delivering means the frame yields no result.
    fn submit_frame(&mut self, frame: Arc<Image>, sink: ResultSink) -> anyhow::Result<()>;
}

/// Estimated handedness of a detected hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// A hand found by a [`HandDetector`], before [`DetectorOptions`] are applied.
#[derive(Debug, Clone)]
pub struct HandCandidate {
    landmarks: LandmarkSet,
    score: f32,
    handedness: Option<Handedness>,
}

impl HandCandidate {
    pub fn new(landmarks: LandmarkSet, score: f32) -> Self {
        Self {
            landmarks,
            score,
            handedness: None,
        }
    }

    pub fn with_handedness(self, handedness: Handedness) -> Self {
        Self {
            handedness: Some(handedness),
            ..self
        }
    }

    pub fn landmarks(&self) -> &LandmarkSet {
        &self.landmarks
    }

    /// Confidence that this is a hand, in range `0.0..=1.0`.
    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn handedness(&self) -> Option<Handedness> {
        self.handedness
    }
}

/// A synchronous hand detector.
pub trait HandDetector {
    /// Selects the landmark model to use. See [`DetectorOptions::model_complexity`].
    ///
    /// Detectors with only one model can ignore this.
    fn set_model_complexity(&mut self, complexity: u8) -> anyhow::Result<()> {
        log::debug!("detector has a single model, ignoring complexity {complexity}");
        Ok(())
    }

    /// Finds all hands in `frame`, in descending order of confidence.
    fn detect(&mut self, frame: &Image) -> anyhow::Result<Vec<HandCandidate>>;
}

/// Applies [`DetectorOptions`] to the candidates of consecutive frames.
#[derive(Debug)]
struct HandSelector {
    options: DetectorOptions,
    tracking: bool,
}

impl HandSelector {
    fn new(options: DetectorOptions) -> Self {
        Self {
            options,
            tracking: false,
        }
    }

    fn select(&mut self, candidates: Vec<HandCandidate>) -> Option<LandmarkSet> {
        let threshold = if self.tracking {
            self.options.min_tracking_confidence
        } else {
            self.options.min_detection_confidence
        };
        let hand = candidates
            .into_iter()
            .filter(|hand| hand.score >= threshold)
            .take(self.options.max_hands as usize)
            .next();
        if let Some(hand) = &hand {
            log::trace!(
                "selected {:?} hand with score {:.2} (threshold {:.2})",
                hand.handedness,
                hand.score,
                threshold
            );
        }
        self.tracking = hand.is_some();
        hand.map(|hand| hand.landmarks)
    }
}

fn configure_detector<D: HandDetector>(
    detector: &mut D,
    options: &DetectorOptions,
) -> anyhow::Result<HandSelector> {
    options.validate()?;
    detector.set_model_complexity(options.model_complexity)?;
    Ok(HandSelector::new(*options))
}

/// Runs a [`HandDetector`] on the submitting thread and delivers its result right away.
pub struct Inline<D> {
    detector: D,
    selector: Option<HandSelector>,
}

impl<D: HandDetector> Inline<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            selector: None,
        }
    }
}

impl<D: HandDetector> LandmarkSource for Inline<D> {
    fn configure(&mut self, options: &DetectorOptions) -> anyhow::Result<()> {
        self.selector = Some(configure_detector(&mut self.detector, options)?);
        Ok(())
    }

    fn submit_frame(&mut self, frame: Arc<Image>, sink: ResultSink) -> anyhow::Result<()> {
        let Some(selector) = &mut self.selector else {
            anyhow::bail!("frame submitted before the detector was configured");
        };
        let candidates = self.detector.detect(&frame)?;
        sink.deliver(selector.select(candidates));
        Ok(())
    }
}

enum Job {
    Configure(DetectorOptions, Sender<anyhow::Result<()>>),
    Frame(Arc<Image>, ResultSink),
}

/// Runs a [`HandDetector`] on a background thread.
///
/// Frames submitted while the detector is still busy with the previous one are skipped, so a
/// slow detector lowers the result rate instead of adding latency. Detection errors are
/// delivered through the frame's [`ResultSink`].
///
/// Configuration is synchronous: [`LandmarkSource::configure`] returns only once the detector
/// has accepted the options, and fails if it didn't.
pub struct Threaded<D: HandDetector + Send + 'static> {
    detector: Option<D>,
    worker: Option<Worker<Job>>,
}

impl<D: HandDetector + Send + 'static> Threaded<D> {
    /// Creates the source. The worker thread is spawned once it is first configured successfully.
    pub fn new(detector: D) -> Self {
        Self {
            detector: Some(detector),
            worker: None,
        }
    }

    fn spawn(mut detector: D, mut selector: HandSelector) -> anyhow::Result<Worker<Job>> {
        let worker = Worker::builder()
            .name("hand detector")
            .spawn(move |job: Job| match job {
                Job::Configure(options, reply) => {
                    let res = configure_detector(&mut detector, &options).map(|sel| {
                        selector = sel;
                    });
                    reply.send(res).ok();
                }
                Job::Frame(frame, sink) => {
                    if sink.is_cancelled() {
                        return;
                    }
                    match detector.detect(&frame) {
                        Ok(candidates) => sink.deliver(selector.select(candidates)),
                        Err(e) => sink.fail(e),
                    }
                }
            })?;
        Ok(worker)
    }
}

impl<D: HandDetector + Send + 'static> LandmarkSource for Threaded<D> {
    fn configure(&mut self, options: &DetectorOptions) -> anyhow::Result<()> {
        if let Some(worker) = &mut self.worker {
            let (reply, result) = crossbeam::channel::bounded(1);
            worker.send(Job::Configure(*options, reply));
            return match result.recv() {
                Ok(res) => res,
                Err(_) => Err(anyhow::anyhow!("hand detector worker has exited")),
            };
        }

        let Some(mut detector) = self.detector.take() else {
            anyhow::bail!("hand detector worker has exited");
        };
        // The first configuration runs here, so that failures reach the caller.
        let selector = match configure_detector(&mut detector, options) {
            Ok(selector) => selector,
            Err(e) => {
                self.detector = Some(detector);
                return Err(e);
            }
        };
        self.worker = Some(Self::spawn(detector, selector)?);
        Ok(())
    }

    fn submit_frame(&mut self, frame: Arc<Image>, sink: ResultSink) -> anyhow::Result<()> {
        let Some(worker) = &mut self.worker else {
            anyhow::bail!("frame submitted before the detector was configured");
        };
        if let Err(Job::Frame(_, sink)) = worker.try_send(Job::Frame(frame, sink)) {
            log::trace!("hand detector busy, skipping frame");
            drop(sink);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam::channel::{self, Receiver};

    use super::*;
    use crate::landmark::{Landmark, NUM_LANDMARKS};

    fn hand(x: f32) -> LandmarkSet {
        LandmarkSet::new(vec![Landmark::new(x, 0.5); NUM_LANDMARKS])
    }

    struct Scripted(Vec<Vec<HandCandidate>>);

    impl HandDetector for Scripted {
        fn detect(&mut self, _frame: &Image) -> anyhow::Result<Vec<HandCandidate>> {
            if self.0.is_empty() {
                anyhow::bail!("script exhausted");
            }
            Ok(self.0.remove(0))
        }
    }

    fn sink() -> (ResultSink, Arc<AtomicBool>, Receiver<Delivery>) {
        let (tx, rx) = channel::unbounded();
        let cancelled = Arc::new(AtomicBool::new(false));
        (ResultSink::new(7, cancelled.clone(), tx), cancelled, rx)
    }

    fn frame() -> Arc<Image> {
        Arc::new(Image::new(4, 4))
    }

    #[test]
    fn default_options() {
        let opts = DetectorOptions::default();
        assert_eq!(opts.get_max_hands(), 1);
        assert_eq!(opts.get_model_complexity(), 1);
        assert_eq!(opts.get_min_detection_confidence(), 0.8);
        assert_eq!(opts.get_min_tracking_confidence(), 0.8);
        opts.validate().unwrap();
    }

    #[test]
    fn invalid_options() {
        for opts in [
            DetectorOptions::default().max_hands(0),
            DetectorOptions::default().model_complexity(2),
            DetectorOptions::default().min_detection_confidence(1.5),
            DetectorOptions::default().min_tracking_confidence(f32::NAN),
        ] {
            assert!(
                matches!(opts.validate(), Err(Error::InvalidOptions(_))),
                "{opts:?}"
            );
        }
    }

    #[test]
    fn selector_thresholds() {
        let opts = DetectorOptions::default()
            .min_detection_confidence(0.8)
            .min_tracking_confidence(0.5);
        let mut sel = HandSelector::new(opts);

        // Not tracking yet: 0.6 is too low.
        assert_eq!(sel.select(vec![HandCandidate::new(hand(0.1), 0.6)]), None);
        assert_eq!(
            sel.select(vec![HandCandidate::new(hand(0.2), 0.9)]),
            Some(hand(0.2))
        );
        // Tracking now: 0.6 suffices.
        assert_eq!(
            sel.select(vec![HandCandidate::new(hand(0.3), 0.6)]),
            Some(hand(0.3))
        );
        assert_eq!(sel.select(vec![]), None);
        assert_eq!(sel.select(vec![HandCandidate::new(hand(0.4), 0.6)]), None);
    }

    #[test]
    fn selector_skips_weak_candidates() {
        let mut sel = HandSelector::new(DetectorOptions::default());
        let candidates = vec![
            HandCandidate::new(hand(0.1), 0.3),
            HandCandidate::new(hand(0.2), 0.85).with_handedness(Handedness::Right),
            HandCandidate::new(hand(0.3), 0.95),
        ];
        assert_eq!(sel.select(candidates), Some(hand(0.2)));
    }

    #[test]
    fn inline_delivers() {
        let mut source = Inline::new(Scripted(vec![
            vec![HandCandidate::new(hand(0.5), 0.9)],
            vec![],
        ]));

        let (s, _, rx) = sink();
        source.submit_frame(frame(), s).unwrap_err();

        source.configure(&DetectorOptions::default()).unwrap();
        let (s, _, rx2) = sink();
        source.submit_frame(frame(), s).unwrap();
        let delivery = rx2.try_recv().unwrap();
        assert_eq!(delivery.generation, 7);
        assert_eq!(delivery.result.unwrap(), Some(hand(0.5)));

        let (s, _, rx3) = sink();
        source.submit_frame(frame(), s).unwrap();
        assert_eq!(rx3.try_recv().unwrap().result.unwrap(), None);

        let (s, _, _rx4) = sink();
        source.submit_frame(frame(), s).unwrap_err();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn cancelled_sink_drops_result() {
        let (s, cancelled, rx) = sink();
        cancelled.store(true, Ordering::Release);
        assert!(s.is_cancelled());
        s.deliver(Some(hand(0.5)));
        assert!(rx.try_recv().is_err());
    }

    /// Submits frames until one is accepted by the worker and answered.
    fn submit_until_delivered<D: HandDetector + Send + 'static>(
        source: &mut Threaded<D>,
    ) -> Delivery {
        loop {
            let (s, _, rx) = sink();
            source.submit_frame(frame(), s).unwrap();
            if let Ok(delivery) = rx.recv_timeout(Duration::from_millis(100)) {
                return delivery;
            }
        }
    }

    #[test]
    fn threaded_delivers() {
        let mut source = Threaded::new(Scripted(vec![
            vec![HandCandidate::new(hand(0.5), 0.9)],
            vec![],
        ]));
        source.configure(&DetectorOptions::default()).unwrap();

        let delivery = submit_until_delivered(&mut source);
        assert_eq!(delivery.generation, 7);
        assert_eq!(delivery.result.unwrap(), Some(hand(0.5)));

        let delivery = submit_until_delivered(&mut source);
        assert_eq!(delivery.result.unwrap(), None);

        // Script exhausted: the error travels through the sink.
        let delivery = submit_until_delivered(&mut source);
        assert!(delivery.result.is_err());
    }

    /// A detector that only ships the lite model.
    struct LiteOnly;

    impl HandDetector for LiteOnly {
        fn set_model_complexity(&mut self, complexity: u8) -> anyhow::Result<()> {
            if complexity != 0 {
                anyhow::bail!("full landmark model is not available");
            }
            Ok(())
        }

        fn detect(&mut self, _frame: &Image) -> anyhow::Result<Vec<HandCandidate>> {
            Ok(vec![HandCandidate::new(hand(0.5), 0.9)])
        }
    }

    #[test]
    fn threaded_reports_model_failure() {
        let mut source = Threaded::new(LiteOnly);
        let err = source.configure(&DetectorOptions::default()).unwrap_err();
        assert!(err.to_string().contains("not available"), "{err}");
        assert!(source.worker.is_none());

        // The detector is kept, so a later attempt with usable options works.
        source
            .configure(&DetectorOptions::default().model_complexity(0))
            .unwrap();
        assert!(source.worker.is_some());

        // Reconfiguring a running worker reports failures too.
        source.configure(&DetectorOptions::default()).unwrap_err();
        source
            .configure(&DetectorOptions::default().model_complexity(0))
            .unwrap();
        let delivery = submit_until_delivered(&mut source);
        assert_eq!(delivery.result.unwrap(), Some(hand(0.5)));
    }

    #[test]
    fn threaded_rejects_invalid_options() {
        let mut source = Threaded::new(Scripted(vec![]));
        source
            .configure(&DetectorOptions::default().max_hands(0))
            .unwrap_err();
        assert!(source.worker.is_none());
    }
}
