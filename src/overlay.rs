//! Landmark overlay drawing.
//!
//! The overlay is a transparent [`Image`] the size of the camera frame that gets composited on
//! top of the video by the host. It shows the landmarks of the current hand as one connected
//! line visiting them in index order. That is *not* the hand skeleton (the line jumps from each
//! fingertip to the base of the next finger), only a quick visual check that tracking works.

use crate::image::{draw, Color, Image};
use crate::landmark::LandmarkSet;

/// Line style of the overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    color: Color,
    stroke_width: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: Color::TOMATO,
            stroke_width: 5,
        }
    }
}

impl OverlayStyle {
    pub fn color(self, color: Color) -> Self {
        Self { color, ..self }
    }

    pub fn stroke_width(self, stroke_width: u32) -> Self {
        Self {
            stroke_width,
            ..self
        }
    }

    #[inline]
    pub fn line_color(&self) -> Color {
        self.color
    }

    #[inline]
    pub fn line_width(&self) -> u32 {
        self.stroke_width
    }
}

/// Clears `surface` and draws `landmarks` onto it with the default [`OverlayStyle`].
pub fn render(landmarks: &LandmarkSet, surface: &mut Image) {
    render_styled(landmarks, surface, &OverlayStyle::default());
}

/// Clears `surface` and draws `landmarks` onto it.
///
/// Normalized landmark coordinates are scaled by the surface's width and height. Everything drawn
/// by previous calls is erased first.
pub fn render_styled(landmarks: &LandmarkSet, surface: &mut Image, style: &OverlayStyle) {
    surface.clear(Color::NULL);

    let (width, height) = (surface.width(), surface.height());
    let points = landmarks
        .iter()
        .map(|lm| lm.to_pixel(width, height))
        .collect::<Vec<_>>();
    draw::polyline(surface, &points)
        .color(style.color)
        .stroke_width(style.stroke_width);
}
