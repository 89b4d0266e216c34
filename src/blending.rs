//! Alpha blending of glyph coverage onto a surface.
//!
//! Text is composited with the source-over operator:
//! `out = alpha * color + (1 - alpha) * background`
//!
//! where `alpha = coverage * opacity`. Destination alpha is honored, so
//! transparent sources stay correct.

use image::{Rgba, RgbaImage};

use crate::glyphs::GlyphMask;
use crate::layout::{Placement, Point};
use crate::params::Rgb;

/// Alpha threshold: below this a fill cannot change an 8-bit channel.
const ALPHA_THRESHOLD: f32 = 0.002;

/// Composite `color` at `alpha` over one pixel.
pub fn blend_pixel(dst: &mut Rgba<u8>, color: Rgb, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let dst_alpha = f32::from(dst[3]) / 255.0;
    let out_alpha = alpha + dst_alpha * (1.0 - alpha);

    if out_alpha <= f32::EPSILON {
        *dst = Rgba([0, 0, 0, 0]);
        return;
    }

    let src = [color.r, color.g, color.b];
    for ch in 0..3 {
        let s = f32::from(src[ch]) / 255.0;
        let d = f32::from(dst[ch]) / 255.0;
        let out = (s * alpha + d * dst_alpha * (1.0 - alpha)) / out_alpha;
        dst[ch] = to_u8(out);
    }
    dst[3] = to_u8(out_alpha);
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Draw one placement of a rasterized run onto `surface`.
///
/// Every destination pixel inside the placement's bounds is mapped back into
/// run-local space and the mask is sampled bilinearly, so rotation never
/// leaves holes. Pixels outside the surface are clipped.
pub fn draw_run(
    surface: &mut RgbaImage,
    mask: &GlyphMask,
    placement: &Placement,
    color: Rgb,
    opacity: f32,
) {
    let (min, max) = mask.extent();
    let (lo, hi) = placement.bounds(min, max);

    let (w, h) = (f64::from(surface.width()), f64::from(surface.height()));
    let x0 = lo.x.floor().clamp(0.0, w);
    let y0 = lo.y.floor().clamp(0.0, h);
    let x1 = hi.x.ceil().clamp(0.0, w);
    let y1 = hi.y.ceil().clamp(0.0, h);

    if x0 >= x1 || y0 >= y1 {
        return;
    }

    // the inverse map is affine: step once per column and once per row
    let origin = placement.to_local(Point::new(x0 + 0.5, y0 + 0.5));
    let right = placement.to_local(Point::new(x0 + 1.5, y0 + 0.5));
    let down = placement.to_local(Point::new(x0 + 0.5, y0 + 1.5));
    let step_x = Point::new(right.x - origin.x, right.y - origin.y);
    let step_y = Point::new(down.x - origin.x, down.y - origin.y);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (x0, y0, x1, y1) = (x0 as u32, y0 as u32, x1 as u32, y1 as u32);

    for py in y0..y1 {
        let row = f64::from(py - y0);
        for px in x0..x1 {
            let col = f64::from(px - x0);
            let lx = origin.x + col * step_x.x + row * step_y.x;
            let ly = origin.y + col * step_x.y + row * step_y.y;

            #[allow(clippy::cast_possible_truncation)]
            let alpha = mask.sample(lx as f32, ly as f32) * opacity;
            if alpha < ALPHA_THRESHOLD {
                continue;
            }
            blend_pixel(surface.get_pixel_mut(px, py), color, alpha);
        }
    }
}
