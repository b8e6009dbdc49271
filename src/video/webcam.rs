//! V4L2 webcam access.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported. The
//! device is opened at the frame size it is currently configured for.

use std::env;

use anyhow::bail;
use linuxvideo::{
    format::{Format, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device,
};

use crate::image::{Image, Resolution};
use crate::timer::{FpsCounter, Timer};
use crate::video::{
    CaptureDevice, FacingMode, MediaStream, MediaTrack, TrackKind, VideoConstraints,
};

const ENV_VAR_WEBCAM_NAME: &str = "FINGERCOUNT_WEBCAM_NAME";

/// [`CaptureDevice`] opening V4L2 webcams.
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2;

impl CaptureDevice for V4l2 {
    type Stream = Webcam;

    fn request_video_stream(&mut self, constraints: &VideoConstraints) -> anyhow::Result<Webcam> {
        Webcam::open(constraints)
    }
}

/// Returns the first pixel format we can decode, in the device's order of preference.
fn pick_pixel_format<I: IntoIterator<Item = PixelFormat>>(formats: I) -> Option<PixelFormat> {
    formats
        .into_iter()
        .find(|&fmt| fmt == PixelFormat::JPEG || fmt == PixelFormat::MJPG)
}

/// The single video track of a [`Webcam`].
///
/// Stopping it closes the V4L2 stream and frees the device for other users.
pub struct WebcamTrack {
    label: String,
    stream: Option<ReadStream>,
}

impl WebcamTrack {
    /// Returns the device name of the camera.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl MediaTrack for WebcamTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn stop(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("stopped video track of '{}'", self.label);
        }
    }

    fn is_live(&self) -> bool {
        self.stream.is_some()
    }
}

/// A webcam yielding a stream of [`Image`]s.
pub struct Webcam {
    tracks: [WebcamTrack; 1],
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
    fps: FpsCounter,
}

impl Webcam {
    /// Opens the first supported webcam found.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(constraints: &VideoConstraints) -> anyhow::Result<Self> {
        let name_override = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = &name_override {
            log::debug!("webcam override: `{ENV_VAR_WEBCAM_NAME}` is set to '{name}'");
        }
        if constraints.facing_mode != FacingMode::User {
            // V4L2 has no notion of camera placement.
            log::debug!(
                "ignoring facing mode {:?}, opening first matching device",
                constraints.facing_mode
            );
        }
        let wanted = constraints.name.as_deref().or(name_override.as_deref());

        for res in linuxvideo::list()? {
            match res {
                Ok(dev) => match Self::open_device(dev, wanted) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => log::debug!("{e}"),
                },
                Err(e) => log::warn!("{e}"),
            }
        }

        match wanted {
            Some(name) => bail!("no supported webcam named '{name}' found"),
            None => bail!("no supported webcam device found"),
        }
    }

    fn open_device(dev: Device, wanted: Option<&str>) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        if wanted.map_or(false, |name| caps.card() != name) {
            return Ok(None);
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );
        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let mut formats = Vec::new();
        for desc in dev.formats(BufType::VIDEO_CAPTURE) {
            formats.push(desc?.pixel_format());
        }
        let Some(pixel_format) = pick_pixel_format(formats) else {
            bail!("{} offers no JPEG or MJPG format", caps.card());
        };

        // Keep whatever frame size the device is currently set up for.
        let (width, height) = match dev.format(BufType::VIDEO_CAPTURE)? {
            Format::VideoCapture(current) => (current.width(), current.height()),
            other => bail!("unexpected capture format {other:?}"),
        };

        let capture = dev.video_capture(PixFormat::new(width, height, pixel_format))?;
        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());
        log::info!("opened {} ({}) at {}", caps.card(), path.display(), resolution);

        let stream = capture.into_stream()?;
        let label = caps.card().to_string();

        Ok(Some(Self {
            fps: FpsCounter::new(format!("webcam '{label}'")),
            tracks: [WebcamTrack {
                label,
                stream: Some(stream),
            }],
            resolution,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    /// Returns the resolution frames are captured at.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let track = &mut self.tracks[0];
        let Some(stream) = track.stream.as_mut() else {
            bail!("video track of '{}' has been stopped", track.label);
        };

        let res = self.resolution;
        let t_decode = &mut self.t_decode;
        let dequeue_guard = self.t_dequeue.start();
        let image = stream.dequeue(|buf| {
            drop(dequeue_guard);
            let image = match t_decode.time(|| Image::decode_jpeg(&buf)) {
                Ok(image) => image,
                Err(e) => {
                    // Webcams produce the occasional corrupted MJPG frame. A blank frame keeps
                    // the frame cadence intact.
                    log::error!("webcam decode error: {e}");
                    Image::new(res.width(), res.height())
                }
            };
            Ok(image)
        })?;

        self.fps.tick_with([&self.t_dequeue, &self.t_decode]);
        Ok(image)
    }
}

impl MediaStream for Webcam {
    type Track = WebcamTrack;

    fn tracks_mut(&mut self) -> &mut [WebcamTrack] {
        &mut self.tracks
    }

    fn read_frame(&mut self) -> anyhow::Result<Image> {
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_jpeg_format() {
        assert_eq!(
            pick_pixel_format([PixelFormat::YUYV, PixelFormat::MJPG, PixelFormat::JPEG]),
            Some(PixelFormat::MJPG)
        );
        assert_eq!(
            pick_pixel_format([PixelFormat::JPEG, PixelFormat::MJPG]),
            Some(PixelFormat::JPEG)
        );
    }

    #[test]
    fn no_decodable_format() {
        assert_eq!(pick_pixel_format([PixelFormat::YUYV, PixelFormat::RGB3]), None);
        assert_eq!(pick_pixel_format([]), None);
    }
}
