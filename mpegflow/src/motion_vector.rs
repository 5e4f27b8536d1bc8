//! # Macroblock motion vectors
//!
//! Decoders export motion vectors as a side data array of fixed size records, one per
//! macroblock (or sub-block) partition. This module parses that array and converts the records
//! into optical flow style displacements.

use bytemuck::{Pod, Zeroable};
use log::*;

/// Binary motion vector record, laid out like libav's `AVMotionVector`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawMotionVector {
    /// Where the current macroblock comes from; negative value when it comes from the past,
    /// positive value when it comes from the future.
    pub source: i32,
    /// Width of the block.
    pub w: u8,
    /// Height of the block.
    pub h: u8,
    /// Absolute source position.
    pub src_x: i16,
    pub src_y: i16,
    /// Absolute destination position.
    pub dst_x: i16,
    pub dst_y: i16,
    _pad0: u16,
    /// Extra flag information, currently unused by the decoders.
    pub flags: u64,
    /// Motion vector in `motion_scale` units.
    pub motion_x: i32,
    pub motion_y: i32,
    pub motion_scale: u16,
    _pad1: [u8; 6],
}

/// Size of a single side data record in bytes.
pub const RAW_MOTION_VECTOR_SIZE: usize = std::mem::size_of::<RawMotionVector>();

impl RawMotionVector {
    pub fn new(src: (i16, i16), dst: (i16, i16)) -> Self {
        Self {
            source: -1,
            w: 16,
            h: 16,
            src_x: src.0,
            src_y: src.1,
            dst_x: dst.0,
            dst_y: dst.1,
            motion_scale: 1,
            ..Default::default()
        }
    }
}

/// Parse a motion vector side data array.
///
/// Records are read in native byte order, `data` does not need to be aligned. A trailing
/// partial record is ignored.
pub fn parse_side_data(data: &[u8]) -> Vec<RawMotionVector> {
    let chunks = data.chunks_exact(RAW_MOTION_VECTOR_SIZE);

    if !chunks.remainder().is_empty() {
        warn!(
            "Motion vector side data has {} trailing bytes",
            chunks.remainder().len()
        );
    }

    chunks.map(bytemuck::pod_read_unaligned).collect()
}

/// Single macroblock displacement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionVector {
    /// Horizontal pixel position of the motion search origin.
    pub source_x: i32,
    /// Vertical pixel position of the motion search origin.
    pub source_y: i32,
    /// Horizontal displacement in optical flow direction.
    pub dx: f32,
    /// Vertical displacement in optical flow direction.
    pub dy: f32,
    pub block_x: i32,
    pub block_y: i32,
    pub type_code: char,
    pub segment_code: char,
}

impl MotionVector {
    /// Displacement value marking a block without a motion vector.
    pub const NO_MV: f32 = -10000.0;

    /// Create a motion vector from origin and codec displacement (`dst - src`).
    ///
    /// The codec's vector points from the destination back to the source, so both axes are
    /// negated to match optical flow directions.
    pub fn new(source_x: i32, source_y: i32, delta_x: i32, delta_y: i32) -> Self {
        Self {
            source_x,
            source_y,
            dx: -(delta_x as f32),
            dy: -(delta_y as f32),
            block_x: -1,
            block_y: -1,
            type_code: '?',
            segment_code: '?',
        }
    }

    /// Whether this entry marks a block without a motion vector.
    ///
    /// Both signs are checked, since the marker may have gone through the sign inversion.
    pub fn no_motion_vector(&self) -> bool {
        (self.dx == Self::NO_MV && self.dy == Self::NO_MV)
            || (self.dx == -Self::NO_MV && self.dy == -Self::NO_MV)
    }

    /// Whether the originating block was intra coded.
    pub fn is_intra(&self) -> bool {
        matches!(self.type_code, 'P' | 'A' | 'i' | 'I')
    }
}

impl From<&RawMotionVector> for MotionVector {
    fn from(mv: &RawMotionVector) -> Self {
        Self::new(
            mv.src_x as i32,
            mv.src_y as i32,
            mv.dst_x as i32 - mv.src_x as i32,
            mv.dst_y as i32 - mv.src_y as i32,
        )
    }
}
