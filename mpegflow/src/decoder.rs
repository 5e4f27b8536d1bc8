//! # Media source abstraction
//!
//! A media source is a demuxer and decoder pair for a single selected video stream. It exposes
//! the raw submit/receive protocol of the underlying codec library, while
//! [`DecodeEngine`](crate::engine::DecodeEngine) drives it.

use crate::error::Result;
use bytemuck::{Pod, Zeroable};

/// RGBA colour structure.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RGBA {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Full resolution decoded picture.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawImage {
    pub width: usize,
    pub height: usize,
    /// Pixels in row-major order.
    pub pixels: Vec<RGBA>,
}

impl RawImage {
    /// Create a transparent black image.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![RGBA::default(); width * height],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Pixel bytes for filling the image, 4 per pixel with a row stride of `width * 4`.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.pixels)
    }
}

/// Static information about the selected video stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamInfo {
    /// Index of the selected stream within the container.
    pub index: usize,
    /// Name of the codec decoding the stream.
    pub codec: String,
    pub width: usize,
    pub height: usize,
    /// Stream time base as a `(numerator, denominator)` pair.
    pub time_base: (i32, i32),
    /// Real base frame rate as a `(numerator, denominator)` pair.
    pub frame_rate: (i32, i32),
    /// Number of frames reported by the container, 0 if unknown.
    pub frame_count: u64,
    /// Stream duration in time base units, 0 if unknown.
    pub duration: i64,
}

/// Convert a rational to a real number, returning 0 on zero denominator.
pub fn rational_to_f64((num, den): (i32, i32)) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Compressed packet read from the container.
pub trait Packet {
    /// Index of the stream this packet belongs to.
    fn stream_index(&self) -> usize;

    /// Decode timestamp, if known.
    fn dts(&self) -> Option<i64>;
}

/// Frame produced by the decoder.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedFrame {
    /// Decode timestamp of the packet the frame came from.
    pub dts: Option<i64>,
    /// Presentation timestamp.
    pub pts: Option<i64>,
    /// Motion vector side data array, if the frame carries one.
    pub motion_side_data: Option<Vec<u8>>,
    /// RGBA snapshot, present when raw images were requested.
    pub raw_image: Option<RawImage>,
}

/// Outcome of requesting a frame from the decoder.
#[derive(Clone, Debug, PartialEq)]
pub enum Receive {
    /// A frame is available.
    Frame(DecodedFrame),
    /// The decoder needs another packet before it can output anything.
    NeedsInput,
    /// The decoder has been flushed and will not output anything else.
    Drained,
}

/// Demuxer and decoder of a single video stream.
pub trait MediaSource {
    type Packet: Packet;

    /// Get information about the selected stream.
    fn stream_info(&self) -> &StreamInfo;

    /// Read the next packet of any stream.
    ///
    /// Returns `Ok(None)` once the container is exhausted.
    fn read_packet(&mut self) -> Result<Option<Self::Packet>>;

    /// Submit a packet to the decoder.
    ///
    /// `None` signals end of input, after which the decoder outputs its delayed frames.
    fn send_packet(&mut self, packet: Option<&Self::Packet>) -> Result<()>;

    /// Request a decoded frame.
    ///
    /// # Arguments
    ///
    /// * `raw_image` - also convert the picture into an RGBA image.
    fn receive_frame(&mut self, raw_image: bool) -> Result<Receive>;
}

impl<T: MediaSource + ?Sized> MediaSource for Box<T> {
    type Packet = T::Packet;

    fn stream_info(&self) -> &StreamInfo {
        (**self).stream_info()
    }

    fn read_packet(&mut self) -> Result<Option<Self::Packet>> {
        (**self).read_packet()
    }

    fn send_packet(&mut self, packet: Option<&Self::Packet>) -> Result<()> {
        (**self).send_packet(packet)
    }

    fn receive_frame(&mut self, raw_image: bool) -> Result<Receive> {
        (**self).receive_frame(raw_image)
    }
}
