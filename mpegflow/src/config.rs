//! # Reader configuration

/// Default size of a motion field cell, in pixels.
///
/// Matches the macroblock size of MPEG-2/4 and H.264.
pub const GRID_STEP: usize = 16;

/// Configuration of a [`FrameReader`](crate::reader::FrameReader).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReaderConfig {
    /// Size of a single grid cell in pixels.
    pub grid_step: usize,
    /// Also decode full resolution RGBA images.
    pub raw_images: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            grid_step: GRID_STEP,
            raw_images: false,
        }
    }
}

impl ReaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the grid cell size. Zero is treated as 1.
    pub fn grid_step(mut self, grid_step: usize) -> Self {
        self.grid_step = grid_step.max(1);
        self
    }

    pub fn raw_images(mut self, raw_images: bool) -> Self {
        self.raw_images = raw_images;
        self
    }

    /// Compute motion field dimensions for a frame of given size.
    pub fn downsampled_size(&self, (width, height): (usize, usize)) -> (usize, usize) {
        let step = self.grid_step.max(1);
        (width / step, height / step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsampled_size_truncates() {
        let config = ReaderConfig::default();
        assert_eq!(config.downsampled_size((1920, 1080)), (120, 67));
        assert_eq!(config.downsampled_size((352, 288)), (22, 18));
        assert_eq!(config.downsampled_size((15, 15)), (0, 0));
    }

    #[test]
    fn zero_grid_step() {
        let config = ReaderConfig::new().grid_step(0).raw_images(true);
        assert_eq!(config.grid_step, 1);
        assert!(config.raw_images);
        assert_eq!(config.downsampled_size((4, 3)), (4, 3));
    }
}
