//! # Time window scanning
//!
//! Helpers used by descriptor extraction front-ends. Motion fields inside a `[start, end]` time
//! window are handed to a [`DescriptorSink`], which appends its descriptors to a flat list of
//! scalars. The list is terminated with a numeric [`Marker`] telling why the scan stopped.

use crate::decoder::MediaSource;
use crate::motion_field::MotionField;
use crate::reader::FrameReader;
use log::*;

/// Out-of-band values appended to the descriptor list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    /// The stream ended, or failed to decode.
    EndOfStream,
    /// A frame past the end of the window was reached.
    WindowEnd,
    /// The stream ended before the start of the window.
    StartNotReached,
}

impl Marker {
    pub fn value(self) -> f64 {
        match self {
            Self::EndOfStream => -1.0,
            Self::WindowEnd => -2.0,
            Self::StartNotReached => -3.0,
        }
    }

    /// Interpret a scalar as a marker.
    pub fn from_value(value: f64) -> Option<Self> {
        match value {
            v if v == -1.0 => Some(Self::EndOfStream),
            v if v == -2.0 => Some(Self::WindowEnd),
            v if v == -3.0 => Some(Self::StartNotReached),
            _ => None,
        }
    }
}

/// Consumer of motion fields, producing descriptor scalars.
pub trait DescriptorSink {
    /// Process the next usable motion field.
    ///
    /// # Arguments
    ///
    /// * `field` - motion field of the frame.
    /// * `time` - decode time of the frame in seconds.
    /// * `out` - descriptor list to append to.
    fn update(&mut self, field: &MotionField, time: f64, out: &mut Vec<f64>);
}

impl<F: FnMut(&MotionField, f64, &mut Vec<f64>)> DescriptorSink for F {
    fn update(&mut self, field: &MotionField, time: f64, out: &mut Vec<f64>) {
        self(field, time, out)
    }
}

fn next_field<S: MediaSource>(reader: &mut FrameReader<S>) -> Option<MotionField> {
    match reader.read() {
        Ok(field) => field,
        Err(e) => {
            warn!("Stopping scan: {}", e);
            None
        }
    }
}

/// Feed motion fields of a time window into `sink`.
///
/// Frames are discarded while the reader's time is below `start`; the frame that reaches it is
/// discarded too. Frames without motion vectors, or without an image when raw images are
/// enabled, are skipped. `end` of `None` scans until the end of the stream.
///
/// The returned list always ends with [`Marker::EndOfStream`] or [`Marker::WindowEnd`], and
/// contains [`Marker::StartNotReached`] before it when the stream ended before `start`.
pub fn scan_window<S: MediaSource>(
    reader: &mut FrameReader<S>,
    start: f64,
    end: Option<f64>,
    sink: &mut impl DescriptorSink,
) -> Vec<f64> {
    let mut out = vec![];
    let mut time = -1.0;

    while time < start {
        if next_field(reader).is_none() {
            out.push(Marker::StartNotReached.value());
            break;
        }
        time = reader.time();
    }

    let raw_images = reader.config().raw_images;

    loop {
        let field = match next_field(reader) {
            Some(field) => field,
            None => {
                out.push(Marker::EndOfStream.value());
                break;
            }
        };

        if matches!(end, Some(end) if reader.time() > end) {
            out.push(Marker::WindowEnd.value());
            break;
        }

        if field.has_no_motion_vectors
            || (raw_images && field.raw_image.as_ref().map_or(true, |i| i.is_empty()))
        {
            continue;
        }

        sink.update(&field, reader.time(), &mut out);
    }

    out
}

/// Length of the video in seconds, computed as `frame_count / fps`.
///
/// Returns 0 if the frame rate is unknown.
pub fn video_length<S: MediaSource>(reader: &FrameReader<S>) -> f64 {
    if reader.fps() > 0.0 {
        reader.frame_count() as f64 / reader.fps()
    } else {
        0.0
    }
}
