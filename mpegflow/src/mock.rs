//! Scripted media source for tests.

use crate::decoder::*;
use crate::error::{DecodeStage, Error, Result};
use crate::motion_vector::RawMotionVector;
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

pub struct MockPacket {
    stream_index: usize,
    dts: Option<i64>,
    frames: Vec<DecodedFrame>,
}

impl Packet for MockPacket {
    fn stream_index(&self) -> usize {
        self.stream_index
    }

    fn dts(&self) -> Option<i64> {
        self.dts
    }
}

/// Decoder simulation.
///
/// Every packet carries the frames the decoder outputs once that packet is submitted. Delayed
/// frames are only output after the end of input is signalled.
pub struct MockSource {
    info: StreamInfo,
    packets: VecDeque<MockPacket>,
    pending: VecDeque<DecodedFrame>,
    delayed: VecDeque<DecodedFrame>,
    flushed: bool,
    send_attempts: usize,
    received: usize,
    fail_send_at: Option<usize>,
    fail_receive_after: Option<usize>,
    sent: Rc<Cell<usize>>,
    releases: Rc<Cell<usize>>,
}

impl MockSource {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            info: StreamInfo {
                index: 0,
                codec: "mock".into(),
                width,
                height,
                time_base: (1, 25),
                frame_rate: (25, 1),
                frame_count: 0,
                duration: 0,
            },
            packets: Default::default(),
            pending: Default::default(),
            delayed: Default::default(),
            flushed: false,
            send_attempts: 0,
            received: 0,
            fail_send_at: None,
            fail_receive_after: None,
            sent: Default::default(),
            releases: Default::default(),
        }
    }

    pub fn info(mut self, f: impl FnOnce(&mut StreamInfo)) -> Self {
        f(&mut self.info);
        self
    }

    pub fn packet(mut self, stream_index: usize, dts: Option<i64>, frames: Vec<DecodedFrame>) -> Self {
        self.packets.push_back(MockPacket {
            stream_index,
            dts,
            frames,
        });
        self
    }

    pub fn delayed(mut self, frame: DecodedFrame) -> Self {
        self.delayed.push_back(frame);
        self
    }

    /// Fail the n-th (0-based) packet submission.
    pub fn fail_send_at(mut self, n: usize) -> Self {
        self.fail_send_at = Some(n);
        self
    }

    /// Fail frame retrieval after `n` frames were output.
    pub fn fail_receive_after(mut self, n: usize) -> Self {
        self.fail_receive_after = Some(n);
        self
    }

    /// Counter of successful packet submissions, including the flush.
    pub fn sent_counter(&self) -> Rc<Cell<usize>> {
        self.sent.clone()
    }

    /// Counter incremented when the source is dropped.
    pub fn release_counter(&self) -> Rc<Cell<usize>> {
        self.releases.clone()
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.releases.set(self.releases.get() + 1);
    }
}

impl MediaSource for MockSource {
    type Packet = MockPacket;

    fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<Option<MockPacket>> {
        Ok(self.packets.pop_front())
    }

    fn send_packet(&mut self, packet: Option<&MockPacket>) -> Result<()> {
        let attempt = self.send_attempts;
        self.send_attempts += 1;

        if self.fail_send_at == Some(attempt) {
            return Err(Error::decode(DecodeStage::SendPacket, -22, "Invalid argument"));
        }

        match packet {
            Some(packet) => self.pending.extend(packet.frames.iter().cloned()),
            None => self.flushed = true,
        }

        self.sent.set(self.sent.get() + 1);

        Ok(())
    }

    fn receive_frame(&mut self, raw_image: bool) -> Result<Receive> {
        if matches!(self.fail_receive_after, Some(n) if self.received >= n) {
            return Err(Error::decode(
                DecodeStage::ReceiveFrame,
                -1094995529,
                "Invalid data found when processing input",
            ));
        }

        let frame = match self.pending.pop_front() {
            Some(frame) => Some(frame),
            None if self.flushed => self.delayed.pop_front(),
            None => return Ok(Receive::NeedsInput),
        };

        Ok(match frame {
            Some(mut frame) => {
                self.received += 1;
                if raw_image && frame.raw_image.is_none() {
                    frame.raw_image = Some(RawImage::new(self.info.width, self.info.height));
                }
                Receive::Frame(frame)
            }
            None => Receive::Drained,
        })
    }
}

/// Frame without motion vector side data.
pub fn frame(dts: Option<i64>) -> DecodedFrame {
    DecodedFrame {
        dts,
        pts: dts,
        ..Default::default()
    }
}

/// Frame carrying the given motion vectors.
pub fn frame_with_mvs(dts: Option<i64>, mvs: &[RawMotionVector]) -> DecodedFrame {
    DecodedFrame {
        motion_side_data: Some(bytemuck::cast_slice(mvs).to_vec()),
        ..frame(dts)
    }
}
