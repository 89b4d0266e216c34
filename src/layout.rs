//! Placement geometry for single and tiled watermarks.
//!
//! All coordinates are canvas pixels with `y` growing downwards. A glyph run
//! is described in run-local coordinates whose origin is the start of its
//! baseline; a [`Placement`] maps those onto the canvas.
//!
//! # Tiling
//!
//! Every run occupies the axis-aligned bounding box of its rotated
//! `text_width x text_height` rectangle:
//!
//! ```text
//! rotated_width  = w·|cos θ| + h·|sin θ|
//! rotated_height = w·|sin θ| + h·|cos θ|
//! ```
//!
//! Cells add a gap of `rotated_width · spacing%` on both axes, so adjacent
//! boxes never overlap. The grid is padded by two cells per axis, centered on
//! the canvas, and shifted by the user offset.

use crate::error::{Error, Result};
use crate::params::{Position, WatermarkParameters};

/// Inset from the canvas edge for corner positions.
pub const EDGE_MARGIN_PX: f64 = 20.0;

/// Upper bound on placements per render.
pub const MAX_TILES: u64 = 100_000;

/// Smallest cell pitch on either axis.
const MIN_CELL_PX: f64 = 1.0;

/// A point on the canvas or in run-local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate, growing downwards.
    pub y: f64,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn rotate(self, sin: f64, cos: f64) -> Self {
        Self::new(
            self.x * cos - self.y * sin,
            self.x * sin + self.y * cos,
        )
    }
}

/// Dimensions of the output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CanvasSize {
    /// Create a canvas size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn w(self) -> f64 {
        f64::from(self.width)
    }

    fn h(self) -> f64 {
        f64::from(self.height)
    }
}

/// Measured size of the glyph run.
///
/// `height` is the font size in pixels rather than true ascent plus descent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    /// Advance width of the run.
    pub width: f64,
    /// Nominal run height (the font size).
    pub height: f64,
}

/// Maps run-local coordinates onto the canvas.
///
/// `canvas = pivot + R(angle) · (local + origin)`, where `R` rotates clockwise
/// on screen for positive angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Canvas point the run rotates around.
    pub pivot: Point,
    /// Baseline origin of the run relative to the pivot, before rotation.
    pub origin: Point,
    /// Rotation in radians.
    pub angle: f64,
}

impl Placement {
    /// Canvas position of a run-local point.
    #[must_use]
    pub fn to_canvas(&self, local: Point) -> Point {
        let (sin, cos) = self.angle.sin_cos();
        let r = Point::new(local.x + self.origin.x, local.y + self.origin.y).rotate(sin, cos);
        Point::new(self.pivot.x + r.x, self.pivot.y + r.y)
    }

    /// Run-local position of a canvas point.
    #[must_use]
    pub fn to_local(&self, canvas: Point) -> Point {
        let (sin, cos) = (-self.angle).sin_cos();
        let r = Point::new(canvas.x - self.pivot.x, canvas.y - self.pivot.y).rotate(sin, cos);
        Point::new(r.x - self.origin.x, r.y - self.origin.y)
    }

    /// Canvas position of the baseline origin.
    #[must_use]
    pub fn anchor(&self) -> Point {
        self.to_canvas(Point::new(0.0, 0.0))
    }

    /// Axis-aligned canvas bounds of a run-local rectangle.
    #[must_use]
    pub fn bounds(&self, min: Point, max: Point) -> (Point, Point) {
        let corners = [
            self.to_canvas(min),
            self.to_canvas(Point::new(max.x, min.y)),
            self.to_canvas(Point::new(min.x, max.y)),
            self.to_canvas(max),
        ];
        corners.iter().fold(
            (
                Point::new(f64::INFINITY, f64::INFINITY),
                Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            ),
            |(lo, hi), c| {
                (
                    Point::new(lo.x.min(c.x), lo.y.min(c.y)),
                    Point::new(hi.x.max(c.x), hi.y.max(c.y)),
                )
            },
        )
    }
}

/// Unshifted baseline anchor for a single placement.
#[must_use]
pub fn single_anchor(position: Position, canvas: CanvasSize, text: TextMetrics) -> Point {
    let (w, h) = (canvas.w(), canvas.h());
    let (tw, th) = (text.width, text.height);
    let m = EDGE_MARGIN_PX;

    match position {
        Position::Center => Point::new((w - tw) / 2.0, (h + th) / 2.0),
        Position::TopLeft => Point::new(m, m + th),
        Position::TopRight => Point::new(w - tw - m, m + th),
        Position::BottomLeft => Point::new(m, h - m),
        Position::BottomRight => Point::new(w - tw - m, h - m),
    }
}

/// Placement for [`Mode::Single`](crate::Mode::Single).
///
/// The anchor is shifted by the offsets, and the run rotates around its own
/// visual center `(x + w/2, y - h/2)`.
#[must_use]
pub fn single_placement(
    params: &WatermarkParameters,
    canvas: CanvasSize,
    text: TextMetrics,
) -> Placement {
    let anchor = single_anchor(params.position, canvas, text);
    let x = anchor.x + params.offset_x_percent / 100.0 * canvas.w();
    let y = anchor.y + params.offset_y_percent / 100.0 * canvas.h();

    Placement {
        pivot: Point::new(x + text.width / 2.0, y - text.height / 2.0),
        origin: Point::new(-text.width / 2.0, text.height / 2.0),
        angle: params.rotation_deg.to_radians(),
    }
}

/// Grid of tile cells for [`Mode::Tile`](crate::Mode::Tile).
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    /// Width of the rotated run's bounding box.
    pub rotated_width: f64,
    /// Height of the rotated run's bounding box.
    pub rotated_height: f64,
    /// Horizontal cell pitch.
    pub cell_width: f64,
    /// Vertical cell pitch.
    pub cell_height: f64,
    /// Column count before the leading pad column.
    pub cols: u32,
    /// Row count before the leading pad row.
    pub rows: u32,
    /// Left edge of column 0.
    pub start_x: f64,
    /// Top edge of row 0.
    pub start_y: f64,
    angle: f64,
    text: TextMetrics,
}

impl TileGrid {
    /// Lay out the grid for a canvas.
    ///
    /// The offset shift is reduced modulo the cell pitch. Tiles land on the
    /// same lattice as the unreduced shift would give, but the padded grid
    /// stays over the canvas even at the ±50% extremes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DegenerateTiling`] when the grid needs more than
    /// [`MAX_TILES`] placements.
    pub fn new(
        params: &WatermarkParameters,
        canvas: CanvasSize,
        text: TextMetrics,
    ) -> Result<Self> {
        let angle = params.rotation_deg.to_radians();
        let (sin, cos) = (angle.sin().abs(), angle.cos().abs());

        let rotated_width = text.width * cos + text.height * sin;
        let rotated_height = text.width * sin + text.height * cos;

        let gap = rotated_width * (params.spacing_percent / 100.0);
        let cell_width = (rotated_width + gap).max(MIN_CELL_PX);
        let cell_height = (rotated_height + gap).max(MIN_CELL_PX);

        let cols = (canvas.w() / cell_width).ceil() + 2.0;
        let rows = (canvas.h() / cell_height).ceil() + 2.0;

        // the leading -1 row/col adds one more of each
        let tiles = (cols + 1.0) * (rows + 1.0);
        #[allow(clippy::cast_precision_loss)]
        let max_tiles = MAX_TILES as f64;
        if !tiles.is_finite() || tiles > max_tiles {
            return Err(Error::DegenerateTiling {
                cols: saturating_u64(cols),
                rows: saturating_u64(rows),
                max: MAX_TILES,
            });
        }
        #[allow(clippy::cast_possible_truncation)]
        let (cols, rows) = (saturating_u64(cols) as u32, saturating_u64(rows) as u32);

        let start_x = (canvas.w() - f64::from(cols - 1) * cell_width) / 2.0
            + wrap(params.offset_x_percent / 100.0 * canvas.w(), cell_width);
        let start_y = (canvas.h() - f64::from(rows - 1) * cell_height) / 2.0
            + wrap(params.offset_y_percent / 100.0 * canvas.h(), cell_height);

        tracing::debug!(
            rotated_width,
            rotated_height,
            cell_width,
            cell_height,
            cols,
            rows,
            "tile grid"
        );

        Ok(Self {
            rotated_width,
            rotated_height,
            cell_width,
            cell_height,
            cols,
            rows,
            start_x,
            start_y,
            angle,
            text,
        })
    }

    /// Number of placements drawn, including the leading pad row and column.
    #[must_use]
    pub fn tile_count(&self) -> u64 {
        (u64::from(self.cols) + 1) * (u64::from(self.rows) + 1)
    }

    /// Center of the cell at `(col, row)`; both start at `-1`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn center(&self, col: i64, row: i64) -> Point {
        Point::new(
            self.start_x + col as f64 * self.cell_width + self.rotated_width / 2.0,
            self.start_y + row as f64 * self.cell_height + self.rotated_height / 2.0,
        )
    }

    /// Cell centers in row-major order, from `(-1, -1)` to `(cols-1, rows-1)`.
    pub fn centers(&self) -> impl Iterator<Item = Point> + '_ {
        (-1..i64::from(self.rows))
            .flat_map(move |row| (-1..i64::from(self.cols)).map(move |col| self.center(col, row)))
    }

    /// One placement per cell. Runs are centered on the cell with the
    /// baseline dropped by a quarter of the run height.
    pub fn placements(&self) -> impl Iterator<Item = Placement> + '_ {
        let origin = Point::new(-self.text.width / 2.0, self.text.height / 4.0);
        self.centers().map(move |pivot| Placement {
            pivot,
            origin,
            angle: self.angle,
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn saturating_u64(value: f64) -> u64 {
    value as u64
}

/// Reduce `shift` into `[-pitch/2, pitch/2]`.
fn wrap(shift: f64, pitch: f64) -> f64 {
    shift - pitch * (shift / pitch).round()
}
