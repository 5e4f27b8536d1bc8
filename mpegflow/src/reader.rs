//! # Motion field reader
//!
//! [`FrameReader`] is the main entry point of the crate. It owns a media source, pulls decoded
//! frames through the [`DecodeEngine`] and projects their motion vectors onto a fixed grid.

use crate::config::ReaderConfig;
use crate::decoder::{rational_to_f64, MediaSource, StreamInfo};
use crate::engine::DecodeEngine;
use crate::error::Result;
use crate::motion_field::MotionField;
use crate::projector::GridProjector;
use log::*;
use std::iter::FusedIterator;

/// Pull-based reader of per-frame motion fields.
pub struct FrameReader<S> {
    engine: DecodeEngine<S>,
    projector: GridProjector,
    config: ReaderConfig,
    original_size: (usize, usize),
    downsampled_size: (usize, usize),
    fps: f64,
    frame_scale: f64,
    frame_count: u64,
    frame_count_is_estimated: bool,
    frame_index: usize,
    time: f64,
    iter_done: bool,
}

impl<S: MediaSource> FrameReader<S> {
    /// Create a reader over an opened media source.
    pub fn new(source: S, config: ReaderConfig) -> Self {
        let engine = DecodeEngine::new(source, config.raw_images);
        let info = engine.stream_info();

        let original_size = (info.width, info.height);
        let downsampled_size = config.downsampled_size(original_size);
        let frame_scale = rational_to_f64(info.time_base);
        let fps = rational_to_f64(info.frame_rate);

        // The fallback yields the stream duration in seconds rather than a frame count.
        // Consumers size their buffers off this value, so it is kept as is.
        let (frame_count, frame_count_is_estimated) = if info.frame_count > 0 {
            (info.frame_count, false)
        } else {
            ((info.duration as f64 * frame_scale) as u64, true)
        };

        debug!(
            "{}x{} -> {}x{} grid, {:.3} fps, {} frames{}",
            original_size.0,
            original_size.1,
            downsampled_size.0,
            downsampled_size.1,
            fps,
            frame_count,
            if frame_count_is_estimated {
                " (estimated)"
            } else {
                ""
            }
        );

        Self {
            engine,
            projector: GridProjector::new(config.grid_step),
            config,
            original_size,
            downsampled_size,
            fps,
            frame_scale,
            frame_count,
            frame_count_is_estimated,
            frame_index: 0,
            time: -1.0,
            iter_done: false,
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn stream_info(&self) -> &StreamInfo {
        self.engine.stream_info()
    }

    pub fn source_mut(&mut self) -> Option<&mut S> {
        self.engine.source_mut()
    }

    /// Width and height of decoded frames.
    pub fn original_frame_size(&self) -> (usize, usize) {
        self.original_size
    }

    /// Width and height of every returned motion field.
    pub fn downsampled_frame_size(&self) -> (usize, usize) {
        self.downsampled_size
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Seconds per stream time base tick.
    pub fn frame_scale(&self) -> f64 {
        self.frame_scale
    }

    /// Frame count reported by the container.
    ///
    /// When the container does not report it, this is `duration * frame_scale`, which is the
    /// duration in seconds. See [`frame_count_is_estimated`](Self::frame_count_is_estimated).
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn frame_count_is_estimated(&self) -> bool {
        self.frame_count_is_estimated
    }

    /// Decode time of the last returned frame in seconds, `-1` before the first one.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of motion fields returned so far.
    pub fn frames_read(&self) -> usize {
        self.frame_index
    }

    /// Read the motion field of the next decoded frame.
    ///
    /// Returns `Ok(None)` at the end of the stream. Once the end is reached, or an error is
    /// returned, every subsequent call returns the same outcome.
    pub fn read(&mut self) -> Result<Option<MotionField>> {
        let frame = match self.engine.next_decoded_frame()? {
            Some(frame) => frame,
            None => return Ok(None),
        };

        let (width, height) = self.downsampled_size;
        let mut field = MotionField::new(width, height);

        field.index = self.frame_index;
        field.timestamp = frame.dts.unwrap_or(0) as f64 * self.frame_scale;
        field.pts = frame.pts.or(frame.dts).unwrap_or(self.frame_index as i64);

        match &frame.motion_vectors {
            Some(vectors) => self.projector.project_all(vectors, &mut field),
            None => field.has_no_motion_vectors = true,
        }

        field.raw_image = frame.raw_image;

        trace!(
            "Frame {} at {:.3}s, {} missing cells",
            field.index,
            field.timestamp,
            field.missing_count()
        );

        self.frame_index += 1;
        self.time = field.timestamp;

        Ok(Some(field))
    }

    /// Read the next motion field, returning the end of stream sentinel on end or error.
    ///
    /// The sentinel has `pts == -1`, see [`MotionField::is_end_of_stream`]. End of stream and
    /// decode errors are indistinguishable here, use [`read`](Self::read) to tell them apart.
    pub fn read_or_sentinel(&mut self) -> MotionField {
        match self.read() {
            Ok(Some(field)) => field,
            Ok(None) => {
                let (width, height) = self.downsampled_size;
                MotionField::end_of_stream(width, height)
            }
            Err(e) => {
                debug!("Returning sentinel after error: {}", e);
                let (width, height) = self.downsampled_size;
                MotionField::end_of_stream(width, height)
            }
        }
    }

    /// Release the decoder and demuxer.
    ///
    /// Safe to call multiple times. Reads after closing fail with [`Error::Closed`](crate::Error::Closed).
    pub fn close(&mut self) {
        self.engine.close();
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }
}

impl<S: MediaSource> Iterator for FrameReader<S> {
    type Item = Result<MotionField>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.iter_done {
            return None;
        }

        match self.read() {
            Ok(Some(field)) => Some(Ok(field)),
            Ok(None) => {
                self.iter_done = true;
                None
            }
            Err(e) => {
                self.iter_done = true;
                Some(Err(e))
            }
        }
    }
}

impl<S: MediaSource> FusedIterator for FrameReader<S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mock::*;
    use crate::motion_vector::{MotionVector, RawMotionVector};
    use assert_approx_eq::assert_approx_eq;
    use nalgebra as na;

    fn intra_stream(frames: usize) -> MockSource {
        (0..frames).fold(MockSource::new(176, 144), |s, i| {
            s.packet(0, Some(i as i64), vec![frame(Some(i as i64))])
        })
    }

    #[test]
    fn stream_properties() {
        let source = MockSource::new(1280, 720).info(|i| {
            i.time_base = (1, 90000);
            i.frame_rate = (30000, 1001);
            i.frame_count = 300;
        });
        let reader = FrameReader::new(source, Default::default());

        assert_eq!(reader.original_frame_size(), (1280, 720));
        assert_eq!(reader.downsampled_frame_size(), (80, 45));
        assert_approx_eq!(reader.fps(), 29.97, 0.001);
        assert_approx_eq!(reader.frame_scale(), 1.0 / 90000.0);
        assert_eq!(reader.frame_count(), 300);
        assert!(!reader.frame_count_is_estimated());
        assert_eq!(reader.time(), -1.0);
    }

    #[test]
    fn frame_count_fallback_is_duration() {
        // 250 frames at 25 fps, container does not report the count.
        let source = MockSource::new(320, 240).info(|i| {
            i.time_base = (1, 90000);
            i.duration = 900000;
        });
        let reader = FrameReader::new(source, Default::default());

        assert!(reader.frame_count_is_estimated());
        assert_eq!(reader.frame_count(), 10);
    }

    #[test]
    fn all_intra_stream() {
        let mut reader = FrameReader::new(intra_stream(10), Default::default());

        for i in 0..10 {
            let field = reader.read().unwrap().unwrap();
            assert_eq!(field.index, i);
            assert!(field.has_no_motion_vectors);
            assert_eq!(field.dim(), (11, 9));
            assert_eq!(field.missing_count(), 0);
        }

        assert_eq!(reader.read(), Ok(None));
        assert!(reader.read_or_sentinel().is_end_of_stream());
        assert_eq!(reader.frames_read(), 10);
    }

    #[test]
    fn projected_motion() {
        let source = MockSource::new(320, 240)
            .packet(0, Some(0), vec![frame(Some(0))])
            .packet(0, Some(1), vec![frame(Some(1))])
            .packet(0, Some(2), vec![frame(Some(2))])
            .packet(
                0,
                Some(3),
                vec![frame_with_mvs(
                    Some(3),
                    &[
                        RawMotionVector::new((17, 33), (21, 31)),
                        RawMotionVector::new((400, 300), (401, 300)),
                    ],
                )],
            );
        let mut reader = FrameReader::new(source, Default::default());

        for _ in 0..3 {
            assert!(reader.read().unwrap().unwrap().has_no_motion_vectors);
        }

        let field = reader.read().unwrap().unwrap();
        assert_eq!(field.index, 3);
        assert!(!field.has_no_motion_vectors);
        assert_eq!(field.dim(), (20, 15));
        assert_eq!(field.get_motion(1, 2), na::Vector2::new(-4.0, 2.0));
        assert!(!field.is_missing(1, 2));
        // Out of frame vector clipped into the bottom right cell.
        assert_eq!(field.get_motion(19, 14), na::Vector2::new(-1.0, 0.0));
    }

    #[test]
    fn missing_vectors() {
        let no_mv = MotionVector::NO_MV as i16;
        let source = MockSource::new(64, 64).packet(
            0,
            Some(0),
            vec![frame_with_mvs(
                Some(0),
                &[RawMotionVector::new((0, 0), (no_mv, no_mv))],
            )],
        );
        let mut reader = FrameReader::new(source, Default::default());

        let field = reader.read().unwrap().unwrap();
        assert!(field.is_missing(0, 0));
        assert_eq!(field.get_motion(0, 0), na::Vector2::zeros());
    }

    #[test]
    fn timestamps_scale_dts() {
        let source = intra_stream(5).info(|i| i.time_base = (1001, 30000));
        let mut reader = FrameReader::new(source, Default::default());

        for dts in 0..5 {
            let field = reader.read().unwrap().unwrap();
            assert_approx_eq!(field.timestamp, dts as f64 * 1001.0 / 30000.0);
            assert_eq!(field.pts, dts);
            assert_eq!(reader.time(), field.timestamp);
            assert!(field.timestamp >= 0.0);
        }
    }

    #[test]
    fn end_of_stream_is_sticky() {
        let mut reader = FrameReader::new(intra_stream(1), Default::default());

        assert!(!reader.read_or_sentinel().is_end_of_stream());
        for _ in 0..5 {
            assert_eq!(reader.read(), Ok(None));
            assert_eq!(reader.read_or_sentinel().pts, -1);
        }
    }

    #[test]
    fn decode_error_is_sticky() {
        let source = intra_stream(4).fail_send_at(2);
        let mut reader = FrameReader::new(source, Default::default());

        assert!(reader.read().unwrap().is_some());
        assert!(reader.read().unwrap().is_some());
        let err = reader.read().unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert_eq!(reader.read(), Err(err));
        assert!(reader.read_or_sentinel().is_end_of_stream());
        assert_eq!(reader.frames_read(), 2);
    }

    #[test]
    fn iterator_is_fused() {
        let reader = FrameReader::new(intra_stream(3), Default::default());
        let fields = reader.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(
            fields.iter().map(|f| f.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let mut reader = FrameReader::new(intra_stream(3).fail_receive_after(1), Default::default());
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
    }

    #[test]
    fn raw_images() {
        let config = ReaderConfig::default().raw_images(true);
        let mut reader = FrameReader::new(intra_stream(1), config);

        let field = reader.read().unwrap().unwrap();
        let image = field.raw_image.unwrap();
        assert_eq!((image.width, image.height), (176, 144));

        let mut reader = FrameReader::new(intra_stream(1), Default::default());
        assert!(reader.read().unwrap().unwrap().raw_image.is_none());
    }

    #[test]
    fn custom_grid_step() {
        let config = ReaderConfig::default().grid_step(8);
        let reader = FrameReader::new(MockSource::new(64, 40), config);
        assert_eq!(reader.downsampled_frame_size(), (8, 5));
    }

    #[test]
    fn close_is_idempotent() {
        let source = intra_stream(3);
        let releases = source.release_counter();
        let mut reader = FrameReader::new(source, Default::default());

        reader.read().unwrap();
        assert!(reader.source_mut().is_some());
        reader.close();
        reader.close();
        assert!(reader.source_mut().is_none());
        assert!(reader.is_closed());
        assert_eq!(releases.get(), 1);
        assert_eq!(reader.read(), Err(Error::Closed));
        assert!(reader.read_or_sentinel().is_end_of_stream());

        drop(reader);
        assert_eq!(releases.get(), 1);

        let source = intra_stream(3);
        let releases = source.release_counter();
        drop(FrameReader::new(source, Default::default()));
        assert_eq!(releases.get(), 1);
    }
}
