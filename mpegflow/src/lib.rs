//! # Compressed domain motion fields
//!
//! This library extracts motion vectors that video codecs already store for motion
//! compensation, and turns them into fixed size per-frame motion fields. These act as a cheap
//! substitute for dense optical flow.
//!
//! The crate is backend agnostic. A [`MediaSource`](decoder::MediaSource) provides packets and
//! decoded frames, [`FrameReader`](reader::FrameReader) drives it and produces
//! [`MotionField`](motion_field::MotionField) values. The libav backend lives in the
//! `av-decoder` crate.
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use mpegflow::prelude::v1::*;
//! ```

pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod motion_field;
pub mod motion_vector;
pub mod mvec;
pub mod projector;
pub mod reader;
pub mod window;

#[cfg(test)]
pub(crate) mod mock;

pub use error::{Error, Result};

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            config::{ReaderConfig, GRID_STEP},
            decoder::{DecodedFrame, MediaSource, Packet, RawImage, Receive, StreamInfo, RGBA},
            engine::{DecodeEngine, EngineFrame, EngineState},
            error::{DecodeStage, Error, Result},
            motion_field::{MotionField, END_OF_STREAM_PTS},
            motion_vector::{MotionVector, RawMotionVector},
            mvec::{MvecReader, MvecWriter},
            projector::GridProjector,
            reader::FrameReader,
            window::{scan_window, video_length, DescriptorSink, Marker},
        };
    }
}
