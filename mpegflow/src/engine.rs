//! # Decode state machine
//!
//! Codecs buffer internally, so a submitted packet may produce zero, one or several frames.
//! [`DecodeEngine`] models the loop as two explicit phases: submit a packet, then drain frames
//! until the decoder asks for more input. Once the container runs out of packets the decoder is
//! flushed and its delayed frames are drained the same way.

use crate::decoder::{DecodedFrame, MediaSource, Packet, RawImage, Receive, StreamInfo};
use crate::error::{Error, Result};
use crate::motion_vector::{parse_side_data, MotionVector};
use log::*;

/// State of the decode loop.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineState {
    /// Next step reads a packet from the container.
    Streaming,
    /// A packet was submitted, frames are being pulled out of the decoder.
    Draining,
    /// End of input was signalled, delayed frames are being pulled out.
    Flushing,
    /// Nothing more to decode.
    Eof,
    /// Decoding failed. The error is reported on every subsequent call.
    Errored(Error),
    /// The media source was released.
    Closed,
}

/// Decoded frame with its extracted motion vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineFrame {
    /// Motion vectors in optical flow direction, `None` if the frame carried no side data.
    pub motion_vectors: Option<Vec<MotionVector>>,
    pub dts: Option<i64>,
    pub pts: Option<i64>,
    pub raw_image: Option<RawImage>,
}

/// Drives a [`MediaSource`] through the submit/drain protocol.
pub struct DecodeEngine<S> {
    source: Option<S>,
    info: StreamInfo,
    state: EngineState,
    raw_images: bool,
    last_packet_dts: Option<i64>,
}

impl<S: MediaSource> DecodeEngine<S> {
    pub fn new(source: S, raw_images: bool) -> Self {
        let info = source.stream_info().clone();

        debug!(
            "Decoding stream {} ({}, {}x{})",
            info.index, info.codec, info.width, info.height
        );

        Self {
            source: Some(source),
            info,
            state: EngineState::Streaming,
            raw_images,
            last_packet_dts: None,
        }
    }

    pub fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    /// Access the media source, `None` once closed.
    pub fn source_mut(&mut self) -> Option<&mut S> {
        self.source.as_mut()
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Whether no more frames will be produced.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            EngineState::Eof | EngineState::Errored(_) | EngineState::Closed
        )
    }

    /// Pull the next decoded frame.
    ///
    /// Returns `Ok(None)` at the end of the stream. After an error, the same error is returned
    /// on every call.
    pub fn next_decoded_frame(&mut self) -> Result<Option<EngineFrame>> {
        match &self.state {
            EngineState::Eof => return Ok(None),
            EngineState::Errored(e) => return Err(e.clone()),
            EngineState::Closed => return Err(Error::Closed),
            _ => {}
        }

        match self.pump() {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => {
                debug!("Reached end of stream");
                self.state = EngineState::Eof;
                Ok(None)
            }
            Err(e) => {
                error!("{}", e);
                self.state = EngineState::Errored(e.clone());
                Err(e)
            }
        }
    }

    fn pump(&mut self) -> Result<Option<EngineFrame>> {
        let source = self.source.as_mut().ok_or(Error::Closed)?;

        loop {
            match self.state {
                EngineState::Streaming => match source.read_packet()? {
                    Some(packet) => {
                        if packet.stream_index() != self.info.index {
                            trace!("Skip packet of stream {}", packet.stream_index());
                            continue;
                        }

                        trace!("Send packet dts={:?}", packet.dts());

                        if let Some(dts) = packet.dts() {
                            self.last_packet_dts = Some(dts);
                        }

                        source.send_packet(Some(&packet))?;
                        self.state = EngineState::Draining;
                    }
                    None => {
                        debug!("Container exhausted, flushing decoder");
                        source.send_packet(None)?;
                        self.state = EngineState::Flushing;
                    }
                },
                EngineState::Draining | EngineState::Flushing => {
                    match source.receive_frame(self.raw_images)? {
                        Receive::Frame(frame) => {
                            return Ok(Some(extract_frame(frame, self.last_packet_dts)))
                        }
                        Receive::NeedsInput if self.state == EngineState::Draining => {
                            self.state = EngineState::Streaming
                        }
                        // A flushed decoder asking for input has nothing left.
                        Receive::NeedsInput | Receive::Drained => return Ok(None),
                    }
                }
                EngineState::Eof => return Ok(None),
                EngineState::Errored(ref e) => return Err(e.clone()),
                EngineState::Closed => return Err(Error::Closed),
            }
        }
    }

    /// Release the media source.
    ///
    /// Calling this more than once has no effect.
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            debug!("Released media source");
        }
        self.state = EngineState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }
}

fn extract_frame(frame: DecodedFrame, last_packet_dts: Option<i64>) -> EngineFrame {
    let motion_vectors = frame.motion_side_data.as_deref().map(|data| {
        let vectors = parse_side_data(data)
            .iter()
            .map(MotionVector::from)
            .collect::<Vec<_>>();
        trace!("Got {} motion vectors", vectors.len());
        vectors
    });

    EngineFrame {
        motion_vectors,
        dts: frame.dts.or(last_packet_dts),
        pts: frame.pts,
        raw_image: frame.raw_image,
    }
}
