//! Finger counting on top of an external hand tracker.
//!
//! A [`SessionController`] acquires a camera through a [`CaptureDevice`], feeds every frame to a
//! [`LandmarkSource`] and, for each hand the source reports, draws the landmarks onto an overlay
//! and counts the raised fingers.
//!
//! # Coordinates
//!
//! Landmarks are normalized to the frame: `(0, 0)` is the top-left corner, `(1, 1)` the
//! bottom-right one. Y points *down*, as in the camera image.
//!
//! # Environment Variables
//!
//! * `FINGERCOUNT_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s opened without an
//!   explicit device name. If unset, the first device that supports a compatible image format
//!   will be used.
//!
//! [`SessionController`]: session::SessionController
//! [`CaptureDevice`]: video::CaptureDevice
//! [`LandmarkSource`]: detector::LandmarkSource
//! [`Webcam`]: video::webcam::Webcam

use log::LevelFilter;

pub mod classifier;
pub mod detector;
mod drop;
mod error;
pub mod image;
pub mod landmark;
pub mod overlay;
pub mod session;
pub mod timer;
pub mod video;
pub mod worker;

pub use error::Error;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and `fingercount` will log at *debug* level. `RUST_LOG` is honored on top of
/// that.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
