//! # Grid projection
//!
//! Macroblock vectors sit at arbitrary pixel positions. The projector snaps them onto the
//! regular grid of a [`MotionField`].

use crate::motion_field::MotionField;
use crate::motion_vector::MotionVector;
use nalgebra as na;

/// Projects macroblock vectors onto fixed-stride grid cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridProjector {
    grid_step: usize,
}

impl Default for GridProjector {
    fn default() -> Self {
        Self::new(crate::config::GRID_STEP)
    }
}

impl GridProjector {
    pub fn new(grid_step: usize) -> Self {
        Self {
            grid_step: grid_step.max(1),
        }
    }

    pub fn grid_step(&self) -> usize {
        self.grid_step
    }

    /// Compute the cell `(x, y)` a vector falls into, clipped to the field bounds.
    ///
    /// Returns `None` only when the field has no cells.
    pub fn cell(&self, mv: &MotionVector, (width, height): (usize, usize)) -> Option<(usize, usize)> {
        if width == 0 || height == 0 {
            return None;
        }

        let step = self.grid_step as i64;
        let i = (mv.source_y as i64).div_euclid(step);
        let j = (mv.source_x as i64).div_euclid(step);

        // Border macroblocks may land outside the grid due to padding. They are clipped, not
        // dropped.
        let i = i.clamp(0, height as i64 - 1) as usize;
        let j = j.clamp(0, width as i64 - 1) as usize;

        Some((j, i))
    }

    /// Write a single vector into the field.
    ///
    /// Missing vectors only set the mask. Several vectors hitting the same cell overwrite each
    /// other, the last one wins.
    pub fn project(&self, mv: &MotionVector, field: &mut MotionField) {
        if let Some((x, y)) = self.cell(mv, field.dim()) {
            if mv.no_motion_vector() {
                field.set_missing(x, y);
            } else {
                field.set_motion(x, y, na::Vector2::new(mv.dx, mv.dy));
            }
        }
    }

    /// Project every vector in order.
    pub fn project_all<'a>(
        &self,
        vectors: impl IntoIterator<Item = &'a MotionVector>,
        field: &mut MotionField,
    ) {
        for mv in vectors {
            self.project(mv, field);
        }
    }
}
