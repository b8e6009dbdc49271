//! Drawing primitives.
//!
//! Every function returns a guard object that performs the drawing when dropped and allows
//! customizing the style beforehand:
//!
//! ```
//! # use fingercount::image::{draw, Color, Image};
//! let mut image = Image::new(16, 16);
//! draw::polyline(&mut image, &[(1.0, 1.0), (14.0, 1.0), (14.0, 14.0)])
//!     .color(Color::GREEN)
//!     .stroke_width(3);
//! ```

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    prelude::*,
    primitives::{Line, PrimitiveStyle, Polyline, Rectangle},
};

use crate::image::{Color, Image};

/// Guard returned by [`polyline`]; draws the polyline when dropped and allows customization.
pub struct DrawPolyline<'a> {
    image: &'a mut Image,
    points: Vec<Point>,
    color: Color,
    stroke_width: u32,
}

impl<'a> DrawPolyline<'a> {
    /// Sets the line color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the stroke width.
    ///
    /// By default, a stroke width of 1 is used.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl<'a> Drop for DrawPolyline<'a> {
    fn drop(&mut self) {
        let style = PrimitiveStyle::with_stroke(self.color, self.stroke_width);
        let res = match self.points.as_slice() {
            [] => Ok(()),
            // A single point makes an empty polyline, draw it as a zero-length line instead.
            [point] => Line::new(*point, *point)
                .into_styled(style)
                .draw(&mut Target(&mut *self.image)),
            points => Polyline::new(points)
                .into_styled(style)
                .draw(&mut Target(&mut *self.image)),
        };
        match res {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Draws a connected line through `points`, in order, onto an image.
///
/// Points are given in pixel coordinates and rounded to the nearest pixel. Parts of the line
/// outside of the image are clipped.
pub fn polyline<'a>(image: &'a mut Image, points: &[(f32, f32)]) -> DrawPolyline<'a> {
    DrawPolyline {
        image,
        points: points
            .iter()
            .map(|&(x, y)| Point::new(to_pixel(x), to_pixel(y)))
            .collect(),
        color: Color::from_rgb8(0, 0, 255),
        stroke_width: 1,
    }
}

/// Far-away points are clamped so that line rasterization can't overflow.
fn to_pixel(coord: f32) -> i32 {
    const LIMIT: f32 = 65536.0;
    coord.round().clamp(-LIMIT, LIMIT) as i32
}

struct Target<'a>(&'a mut Image);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        let (width, height) = (self.0.width(), self.0.height());

        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size { width, height },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0
                && (point.x as u32) < self.0.width()
                && point.y >= 0
                && (point.y as u32) < self.0.height()
            {
                self.0.set(point.x as _, point.y as _, color);
            }
        }

        Ok(())
    }
}
