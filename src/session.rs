//! Camera and detector lifecycle.
//!
//! A [`SessionController`] is driven by its host: [`start`] acquires the camera and brings up the
//! landmark source, [`pump`] moves one frame through the pipeline and applies every result that
//! has arrived since, [`stop`] releases everything again. All user-visible state goes through the
//! [`Ui`] trait.
//!
//! [`start`]: SessionController::start
//! [`pump`]: SessionController::pump
//! [`stop`]: SessionController::stop

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crossbeam::channel::{self, Receiver, Sender};

use crate::classifier::{self, FingerCount};
use crate::detector::{Delivery, DetectorOptions, LandmarkSource, ResultSink};
use crate::image::{Image, Resolution};
use crate::landmark::LandmarkSet;
use crate::overlay::{self, OverlayStyle};
use crate::timer::{FpsCounter, Timer};
use crate::video::{CaptureDevice, MediaStream, VideoConstraints};
use crate::Error;

pub const STATUS_TRACKING: &str = "Tracking Hand Gestures...";
pub const STATUS_STOPPED: &str = "Camera stopped.";

/// Lifecycle state of a [`SessionController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

/// What the UI shows for one detector result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Fingers(FingerCount),
    NoHand,
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Fingers(count) => write!(f, "Fingers: {count}"),
            Reading::NoHand => f.write_str("No hand detected"),
        }
    }
}

/// The user-facing surface of a session.
pub trait Ui {
    /// Enables or disables the start and stop controls.
    fn set_controls(&mut self, start_enabled: bool, stop_enabled: bool);

    fn show_reading(&mut self, reading: &Reading);

    fn show_status(&mut self, status: &str);

    /// Tells the user that something went wrong.
    fn report_error(&mut self, error: &Error);
}

/// A [`Ui`] that just keeps the latest texts around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUi {
    start_enabled: bool,
    stop_enabled: bool,
    reading: String,
    status: String,
    errors: Vec<String>,
}

impl Default for TextUi {
    fn default() -> Self {
        Self {
            start_enabled: true,
            stop_enabled: false,
            reading: String::new(),
            status: String::new(),
            errors: Vec::new(),
        }
    }
}

impl TextUi {
    pub fn start_enabled(&self) -> bool {
        self.start_enabled
    }

    pub fn stop_enabled(&self) -> bool {
        self.stop_enabled
    }

    pub fn reading(&self) -> &str {
        &self.reading
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Returns all reported error messages, oldest first.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

impl Ui for TextUi {
    fn set_controls(&mut self, start_enabled: bool, stop_enabled: bool) {
        self.start_enabled = start_enabled;
        self.stop_enabled = stop_enabled;
    }

    fn show_reading(&mut self, reading: &Reading) {
        self.reading = reading.to_string();
    }

    fn show_status(&mut self, status: &str) {
        self.status = status.to_string();
    }

    fn report_error(&mut self, error: &Error) {
        self.errors.push(error.to_string());
    }
}

/// Handle to the result stream of one active session.
///
/// Cancelling it ends the session at the next [`SessionController::pump`]. From the moment it is
/// cancelled, no detector result belonging to it will be applied.
#[derive(Debug, Clone)]
pub struct Subscription {
    generation: u64,
    cancelled: Arc<AtomicBool>,
}

impl Subscription {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns a number identifying the session, increasing with every start.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn sink(&self, sender: &Sender<Delivery>) -> ResultSink {
        ResultSink::new(self.generation, self.cancelled.clone(), sender.clone())
    }
}

/// Configuration of a [`SessionController`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    constraints: VideoConstraints,
    detector: DetectorOptions,
    overlay: OverlayStyle,
}

impl SessionOptions {
    /// Sets the constraints used to request the camera. Defaults to the user-facing camera.
    pub fn constraints(self, constraints: VideoConstraints) -> Self {
        Self {
            constraints,
            ..self
        }
    }

    /// Sets the options the landmark source is configured with.
    pub fn detector(self, detector: DetectorOptions) -> Self {
        Self { detector, ..self }
    }

    pub fn overlay(self, overlay: OverlayStyle) -> Self {
        Self { overlay, ..self }
    }

    pub fn get_constraints(&self) -> &VideoConstraints {
        &self.constraints
    }

    pub fn get_detector(&self) -> &DetectorOptions {
        &self.detector
    }

    pub fn get_overlay(&self) -> &OverlayStyle {
        &self.overlay
    }
}

/// Drives the capture → detection → counting pipeline.
pub struct SessionController<C: CaptureDevice, D: LandmarkSource, U: Ui> {
    capture: C,
    detector: D,
    ui: U,
    options: SessionOptions,
    state: SessionState,
    stream: Option<C::Stream>,
    subscription: Option<Subscription>,
    detector_ready: bool,
    generation: u64,
    sender: Sender<Delivery>,
    results: Receiver<Delivery>,
    frame_res: Option<Resolution>,
    overlay: Option<Image>,
    reading: Option<Reading>,
    t_render: Timer,
    t_classify: Timer,
    fps: FpsCounter,
}

impl<C: CaptureDevice, D: LandmarkSource, U: Ui> SessionController<C, D, U> {
    /// Creates an idle controller with default [`SessionOptions`].
    pub fn new(capture: C, detector: D, ui: U) -> Self {
        Self::with_options(capture, detector, ui, SessionOptions::default())
    }

    pub fn with_options(capture: C, detector: D, mut ui: U, options: SessionOptions) -> Self {
        ui.set_controls(true, false);
        let (sender, results) = channel::unbounded();
        Self {
            capture,
            detector,
            ui,
            options,
            state: SessionState::Idle,
            stream: None,
            subscription: None,
            detector_ready: false,
            generation: 0,
            sender,
            results,
            frame_res: None,
            overlay: None,
            reading: None,
            t_render: Timer::new("render"),
            t_classify: Timer::new("classify"),
            fps: FpsCounter::new("hand results"),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Returns the subscription of the active session.
    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    /// Returns the most recently published reading.
    pub fn reading(&self) -> Option<Reading> {
        self.reading
    }

    /// Returns the landmark overlay, once a frame has been read.
    ///
    /// The overlay has the size of the camera frames and shows the most recently detected hand.
    pub fn overlay(&self) -> Option<&Image> {
        self.overlay.as_ref()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut U {
        &mut self.ui
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Returns the attached camera stream, if the session is active.
    pub fn stream(&self) -> Option<&C::Stream> {
        self.stream.as_ref()
    }

    /// Starts a session.
    ///
    /// Acquires a camera stream, configures the landmark source (only on the first successful
    /// start) and switches to [`SessionState::Active`]. On failure the error is reported to the
    /// UI and returned, and the controller stays idle without holding the camera.
    ///
    /// Starting an active session does nothing and returns the current subscription.
    pub fn start(&mut self) -> Result<Subscription, Error> {
        if let Some(subscription) = self.active_subscription() {
            log::warn!("session {} is already active", subscription.generation);
            return Ok(subscription.clone());
        }
        if self.stream.is_some() {
            // Cancelled through its subscription but not pumped since.
            self.stop();
        }

        let mut stream = match self
            .capture
            .request_video_stream(&self.options.constraints)
        {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail_start(Error::Device(e))),
        };

        if !self.detector_ready {
            if let Err(e) = self.detector.configure(&self.options.detector) {
                stream.stop_all();
                return Err(self.fail_start(Error::Detector(e)));
            }
            self.detector_ready = true;
        }

        self.generation += 1;
        let subscription = Subscription::new(self.generation);
        self.stream = Some(stream);
        self.subscription = Some(subscription.clone());
        self.state = SessionState::Active;
        self.ui.set_controls(false, true);
        self.ui.show_status(STATUS_TRACKING);
        log::debug!("session {} started", self.generation);
        Ok(subscription)
    }

    fn active_subscription(&self) -> Option<&Subscription> {
        self.subscription
            .as_ref()
            .filter(|sub| self.is_active() && !sub.is_cancelled())
    }

    fn fail_start(&mut self, error: Error) -> Error {
        log::error!("{error}");
        self.ui.report_error(&error);
        self.ui.set_controls(true, false);
        error
    }

    /// Stops the session, releasing the camera.
    ///
    /// Results the landmark source delivers afterwards are discarded. Calling this while idle only
    /// resets the UI.
    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        match self.stream.take() {
            Some(mut stream) => {
                stream.stop_all();
                log::debug!("session {} stopped", self.generation);
            }
            None => log::debug!("stop requested while idle"),
        }
        self.state = SessionState::Idle;
        self.ui.set_controls(true, false);
        self.ui.show_status(STATUS_STOPPED);
    }

    /// Reads one frame, submits it to the landmark source and applies all results received so far.
    ///
    /// Returns the number of results applied. Does nothing while idle. If the subscription was
    /// cancelled, the session is stopped instead.
    ///
    /// Camera and detector failures are reported to the UI, stop the session and are returned.
    /// A malformed landmark set is reported and skipped without ending the session.
    pub fn pump(&mut self) -> Result<usize, Error> {
        let Some(subscription) = self.subscription.clone() else {
            return Ok(0);
        };
        if subscription.is_cancelled() {
            log::debug!("subscription {} cancelled", subscription.generation);
            self.stop();
            return Ok(0);
        }
        let Some(stream) = &mut self.stream else {
            return Ok(0);
        };

        let frame = match stream.read_frame() {
            Ok(frame) => frame,
            Err(e) => return Err(self.fail_session(Error::Device(e))),
        };
        self.frame_res = Some(frame.resolution());

        let sink = subscription.sink(&self.sender);
        if let Err(e) = self.detector.submit_frame(Arc::new(frame), sink) {
            return Err(self.fail_session(Error::Detector(e)));
        }

        self.dispatch()
    }

    /// Applies all results that have arrived, without reading a new frame.
    ///
    /// Useful with a landmark source that delivers from another thread.
    pub fn dispatch(&mut self) -> Result<usize, Error> {
        let mut applied = 0;
        while let Ok(delivery) = self.results.try_recv() {
            let current = self
                .active_subscription()
                .map_or(false, |sub| sub.generation == delivery.generation);
            if !current {
                log::trace!("dropping late result of session {}", delivery.generation);
                continue;
            }

            match delivery.result {
                Ok(hand) => {
                    self.apply(hand.as_ref());
                    applied += 1;
                }
                Err(e) => return Err(self.fail_session(Error::Detector(e))),
            }
        }
        Ok(applied)
    }

    fn apply(&mut self, hand: Option<&LandmarkSet>) {
        let Some(landmarks) = hand else {
            log::trace!("no hand");
            self.publish(Reading::NoHand);
            return;
        };

        // A malformed set is rejected before it can reach the overlay.
        let count = match self
            .t_classify
            .time(|| classifier::count_fingers(landmarks.as_slice()))
        {
            Ok(count) => count,
            Err(e) => {
                log::error!("{e}");
                self.ui.report_error(&e);
                return;
            }
        };

        let res = self.frame_res.unwrap_or(Resolution::new(1, 1));
        if self.overlay.as_ref().map_or(false, |image| image.resolution() != res) {
            self.overlay = None;
        }
        let overlay = self
            .overlay
            .get_or_insert_with(|| Image::new(res.width(), res.height()));
        let style = &self.options.overlay;
        self.t_render
            .time(|| overlay::render_styled(landmarks, overlay, style));

        log::trace!("{count} fingers");
        self.publish(Reading::Fingers(count));
        self.fps.tick_with([&self.t_render, &self.t_classify]);
    }

    fn publish(&mut self, reading: Reading) {
        self.reading = Some(reading);
        self.ui.show_reading(&reading);
    }

    fn fail_session(&mut self, error: Error) -> Error {
        log::error!("{error}");
        self.ui.report_error(&error);
        self.stop();
        error
    }
}

impl<C: CaptureDevice, D: LandmarkSource, U: Ui> Drop for SessionController<C, D, U> {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_all();
        }
    }
}
