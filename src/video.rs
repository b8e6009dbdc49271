//! Camera capture.
//!
//! The [`CaptureDevice`] trait is the entry point: it hands out a [`MediaStream`] of frames
//! matching a set of [`VideoConstraints`]. A stream consists of [`MediaTrack`]s; stopping all of
//! them releases the camera.
//!
//! [`webcam`] implements these traits for V4L2 devices.

pub mod webcam;

use crate::image::Image;

/// Which way the requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    /// The camera facing the user (front camera, typical laptop webcam).
    #[default]
    User,
    /// The camera facing away from the user.
    Environment,
}

/// Requirements for the video stream to open.
///
/// The facing mode is a preference that backends without a notion of camera placement ignore.
/// A device `name` is binding. Frame size and rate are whatever the device is set up to deliver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoConstraints {
    pub(crate) facing_mode: FacingMode,
    pub(crate) name: Option<String>,
}

impl VideoConstraints {
    /// Sets the preferred camera direction. Defaults to [`FacingMode::User`].
    #[inline]
    pub fn facing_mode(self, facing_mode: FacingMode) -> Self {
        Self {
            facing_mode,
            ..self
        }
    }

    /// Sets the name of the camera device to open.
    ///
    /// If no camera with the given name can be found, opening the stream will result in an error.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    #[inline]
    pub fn get_facing_mode(&self) -> FacingMode {
        self.facing_mode
    }

    #[inline]
    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// The kind of media carried by a [`MediaTrack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// One track of a [`MediaStream`].
pub trait MediaTrack {
    fn kind(&self) -> TrackKind;

    /// Stops the track, releasing the underlying device once all tracks are stopped.
    ///
    /// Stopping a track twice does nothing.
    fn stop(&mut self);

    /// Returns `false` once the track has been stopped.
    fn is_live(&self) -> bool;
}

/// A stream of camera frames.
pub trait MediaStream {
    type Track: MediaTrack;

    fn tracks_mut(&mut self) -> &mut [Self::Track];

    /// Reads the next frame.
    ///
    /// This may block until a frame is available. Fails if the video track was stopped.
    fn read_frame(&mut self) -> anyhow::Result<Image>;

    /// Stops every track of this stream.
    fn stop_all(&mut self) {
        for track in self.tracks_mut() {
            track.stop();
        }
    }
}

/// A capture API that can open video streams.
pub trait CaptureDevice {
    type Stream: MediaStream;

    /// Requests exclusive access to a camera matching `constraints`.
    ///
    /// Fails if no camera is present, access is denied, or no camera satisfies the binding
    /// constraints.
    fn request_video_stream(&mut self, constraints: &VideoConstraints)
        -> anyhow::Result<Self::Stream>;
}
