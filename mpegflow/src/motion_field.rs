//! # Fixed size motion field

use crate::decoder::RawImage;
use nalgebra::*;

/// Presentation timestamp reserved for the end of stream (or error) sentinel.
pub const END_OF_STREAM_PTS: i64 = -1;

/// Downsampled motion field of a single decoded frame.
///
/// Grids are stored with rows indexing the vertical cell position.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionField {
    /// Ordinal of the decoded frame, starting from 0.
    pub index: usize,
    /// Presentation timestamp in stream time base units.
    pub pts: i64,
    /// Decode time in seconds.
    pub timestamp: f64,
    /// The decoded frame did not carry any motion vector side data.
    pub has_no_motion_vectors: bool,
    /// Full resolution image, if requested.
    pub raw_image: Option<RawImage>,
    dx: DMatrix<f32>,
    dy: DMatrix<f32>,
    missing: DMatrix<bool>,
}

impl MotionField {
    /// Create a new zero-filled motion field.
    ///
    /// # Arguments
    ///
    /// * `width` - width of the field.
    /// * `height` - height of the field.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            index: 0,
            pts: 0,
            timestamp: 0.0,
            has_no_motion_vectors: false,
            raw_image: None,
            dx: DMatrix::zeros(height, width),
            dy: DMatrix::zeros(height, width),
            missing: DMatrix::from_element(height, width, false),
        }
    }

    /// Create the end of stream sentinel.
    ///
    /// Grid contents of the sentinel carry no meaning.
    pub fn end_of_stream(width: usize, height: usize) -> Self {
        Self {
            pts: END_OF_STREAM_PTS,
            timestamp: -1.0,
            ..Self::new(width, height)
        }
    }

    /// Whether this is the end of stream sentinel.
    pub fn is_end_of_stream(&self) -> bool {
        self.pts == END_OF_STREAM_PTS
    }

    /// Get width and height of the motion field.
    pub fn dim(&self) -> (usize, usize) {
        (self.dx.ncols(), self.dx.nrows())
    }

    /// Get size of the motion field.
    ///
    /// This is the same as `width * height`
    pub fn size(&self) -> usize {
        self.dx.len()
    }

    /// Whether the field has no cells at all.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Horizontal displacement grid.
    pub fn dx(&self) -> &DMatrix<f32> {
        &self.dx
    }

    /// Vertical displacement grid.
    pub fn dy(&self) -> &DMatrix<f32> {
        &self.dy
    }

    /// Missing data mask.
    pub fn missing(&self) -> &DMatrix<bool> {
        &self.missing
    }

    /// Set motion at given position.
    ///
    /// # Arguments
    ///
    /// * `x` - horizontal coordinate to set at.
    /// * `y` - vertical coordinate to set at.
    /// * `motion` - motion to set.
    pub fn set_motion(&mut self, x: usize, y: usize, motion: Vector2<f32>) {
        self.dx[(y, x)] = motion.x;
        self.dy[(y, x)] = motion.y;
    }

    /// Mark cell at given position as missing.
    pub fn set_missing(&mut self, x: usize, y: usize) {
        self.missing[(y, x)] = true;
    }

    /// Get motion at coordinates.
    ///
    /// # Arguments
    ///
    /// * `x` - horizontal coordinate.
    /// * `y` - vertical coordinate.
    pub fn get_motion(&self, x: usize, y: usize) -> Vector2<f32> {
        Vector2::new(self.dx[(y, x)], self.dy[(y, x)])
    }

    pub fn is_missing(&self, x: usize, y: usize) -> bool {
        self.missing[(y, x)]
    }

    /// Number of cells marked missing.
    pub fn missing_count(&self) -> usize {
        self.missing.iter().filter(|&&m| m).count()
    }

    /// Iterate every element of the motion field.
    ///
    /// The resulting iterator yields `(x, y, motion)` entries in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, Vector2<f32>)> + '_ {
        let (width, height) = self.dim();
        (0..height).flat_map(move |y| (0..width).map(move |x| (x, y, self.get_motion(x, y))))
    }

    /// Iterate every non-missing element of the motion field.
    ///
    /// Positions are normalised to 0-1 range.
    pub fn motion_iter(&self) -> impl Iterator<Item = (Point2<f32>, Vector2<f32>)> + '_ {
        let (width, height) = self.dim();
        self.iter()
            .filter(move |&(x, y, _)| !self.is_missing(x, y))
            .map(move |(x, y, motion)| {
                (
                    Point2::new(x as f32 / width as f32, y as f32 / height as f32),
                    motion,
                )
            })
    }
}
