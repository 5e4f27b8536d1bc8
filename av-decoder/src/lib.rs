//! FFMPEG's AV motion vector source

use ::core::ops::{Deref, DerefMut};
use ::core::{ptr, slice};
use c_str_macro::c_str;
use ffmpeg_sys_next::*;
use libc::c_int;
use log::*;
use mpegflow::prelude::v1::*;
use std::ffi::{CStr, CString};
use std::path::Path;

// Side data records are parsed by `mpegflow`, the layouts must agree.
const _: () = assert!(std::mem::size_of::<AVMotionVector>() == mpegflow::motion_vector::RAW_MOTION_VECTOR_SIZE);

/// Motion field reader backed by libav.
pub type AvFrameReader = FrameReader<AvSource>;

/// Describe a libav error code.
pub fn av_error_string(code: c_int) -> String {
    let mut buf = [0u8; 128];

    if unsafe { av_strerror(code, buf.as_mut_ptr() as *mut _, buf.len()) } < 0 {
        return format!("Unknown error ({})", code);
    }

    CStr::from_bytes_until_nul(&buf)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| format!("Unknown error ({})", code))
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().into()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    match path.to_string_lossy() {
        std::borrow::Cow::Borrowed(s) => s.as_bytes().into(),
        std::borrow::Cow::Owned(s) => s.into_bytes().into(),
    }
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    CString::new(path_bytes(path)).map_err(|_| Error::Open {
        path: path.display().to_string(),
        reason: "path contains a NUL byte".into(),
    })
}

struct FormatContext(&'static mut AVFormatContext);

impl Drop for FormatContext {
    fn drop(&mut self) {
        // SAFETY: the reference will be dangling,
        // but after the drop nobody will read it.
        unsafe { avformat_close_input(&mut (self.0 as *mut _)) };
    }
}

impl FormatContext {
    fn open(path: &Path) -> Result<Self> {
        let c_path = path_to_cstring(path)?;
        let mut fmt_ctx: *mut AVFormatContext = ptr::null_mut();

        // On failure the context is freed by libav.
        match unsafe {
            avformat_open_input(&mut fmt_ctx, c_path.as_ptr(), ptr::null(), ptr::null_mut())
        } {
            e if e < 0 => Err(Error::Open {
                path: path.display().to_string(),
                reason: av_error_string(e),
            }),
            _ => unsafe { fmt_ctx.as_mut() }.map(Self).ok_or_else(|| Error::Open {
                path: path.display().to_string(),
                reason: "Failed to allocate AVFormatContext".into(),
            }),
        }
    }

    fn as_mut_ptr(&mut self) -> *mut AVFormatContext {
        &mut *self.0
    }
}

struct CodecContext(&'static mut AVCodecContext);

impl Drop for CodecContext {
    fn drop(&mut self) {
        unsafe { avcodec_free_context(&mut (self.0 as *mut _)) };
    }
}

impl CodecContext {
    fn as_mut_ptr(&mut self) -> *mut AVCodecContext {
        &mut *self.0
    }

    fn codec_name(&self) -> String {
        unsafe { CStr::from_ptr(avcodec_get_name(self.0.codec_id)) }
            .to_string_lossy()
            .into_owned()
    }
}

struct AvFrame(&'static mut AVFrame);

impl Drop for AvFrame {
    fn drop(&mut self) {
        unsafe { av_frame_free(&mut (self.0 as *mut _)) };
    }
}

/// Demuxed packet.
pub struct AvPacket(&'static mut AVPacket);

impl Drop for AvPacket {
    fn drop(&mut self) {
        unsafe { av_packet_free(&mut (self.0 as *mut _)) };
    }
}

impl AvPacket {
    fn try_new() -> Result<Self> {
        unsafe { av_packet_alloc().as_mut() }
            .map(Self)
            .ok_or_else(|| {
                Error::decode(
                    DecodeStage::ReadPacket,
                    AVERROR(libc::ENOMEM),
                    "Failed to allocate packet",
                )
            })
    }
}

impl Packet for AvPacket {
    fn stream_index(&self) -> usize {
        self.0.stream_index as usize
    }

    fn dts(&self) -> Option<i64> {
        timestamp(self.0.dts)
    }
}

fn timestamp(ts: i64) -> Option<i64> {
    if ts == AV_NOPTS_VALUE {
        None
    } else {
        Some(ts)
    }
}

/// Holds a reference to decoded frame data, released on drop.
struct RefFrame<'a> {
    frame: &'a mut AVFrame,
}

impl<'a> Drop for RefFrame<'a> {
    fn drop(&mut self) {
        unsafe { av_frame_unref(self.frame) };
    }
}

impl<'a> Deref for RefFrame<'a> {
    type Target = AVFrame;

    fn deref(&self) -> &Self::Target {
        self.frame
    }
}

impl<'a> DerefMut for RefFrame<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.frame
    }
}

/// Converts decoded pictures to RGBA.
struct Scaler {
    ctx: *mut SwsContext,
}

impl Default for Scaler {
    fn default() -> Self {
        Self {
            ctx: ptr::null_mut(),
        }
    }
}

impl Drop for Scaler {
    fn drop(&mut self) {
        if !self.ctx.is_null() {
            unsafe { sws_freeContext(self.ctx) };
        }
    }
}

impl Scaler {
    fn convert(&mut self, frame: &AVFrame) -> Result<RawImage> {
        let (width, height) = (frame.width, frame.height);
        let conversion_error = |code| {
            Error::decode(
                DecodeStage::ReceiveFrame,
                code,
                "Failed to convert frame to RGBA",
            )
        };

        if width <= 0 || height <= 0 {
            return Err(conversion_error(AVERROR(libc::EINVAL)));
        }

        // SAFETY: decoders only output valid pixel formats.
        let format: AVPixelFormat = unsafe { std::mem::transmute(frame.format) };

        self.ctx = unsafe {
            sws_getCachedContext(
                self.ctx,
                width,
                height,
                format,
                width,
                height,
                AVPixelFormat::AV_PIX_FMT_RGBA,
                SWS_BILINEAR as c_int,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null(),
            )
        };

        if self.ctx.is_null() {
            return Err(conversion_error(AVERROR(libc::ENOMEM)));
        }

        let mut image = RawImage::new(width as usize, height as usize);
        let dst = [image.as_bytes_mut().as_mut_ptr()];
        let dst_stride = [width * 4];

        match unsafe {
            sws_scale(
                self.ctx,
                frame.data.as_ptr() as *const *const u8,
                frame.linesize.as_ptr(),
                0,
                height,
                dst.as_ptr(),
                dst_stride.as_ptr(),
            )
        } {
            e if e < 0 => Err(conversion_error(e)),
            _ => Ok(image),
        }
    }
}

/// libav demuxer and decoder of the best video stream of a file.
pub struct AvSource {
    // Fields drop in order: decoder state first, demuxer last.
    scaler: Scaler,
    av_frame: AvFrame,
    codec_ctx: CodecContext,
    fmt_ctx: FormatContext,
    path: CString,
    info: StreamInfo,
}

impl AvSource {
    /// Open a video file and its decoder with motion vector export enabled.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let mut fmt_ctx = FormatContext::open(path)?;

        match unsafe { avformat_find_stream_info(fmt_ctx.as_mut_ptr(), ptr::null_mut()) } {
            e if e < 0 => {
                return Err(Error::Open {
                    path: display,
                    reason: format!("Could not find stream information ({})", av_error_string(e)),
                })
            }
            _ => {}
        }

        let mut decoder: *const AVCodec = ptr::null();

        let stream_idx = match unsafe {
            av_find_best_stream(
                fmt_ctx.as_mut_ptr(),
                AVMediaType::AVMEDIA_TYPE_VIDEO,
                -1,
                -1,
                &mut decoder,
                0,
            )
        } {
            e if e == AVERROR_DECODER_NOT_FOUND => {
                return Err(Error::CodecOpen {
                    codec: "video".into(),
                    reason: av_error_string(e),
                })
            }
            e if e < 0 => {
                return Err(Error::StreamNotFound {
                    path: display,
                    reason: av_error_string(e),
                })
            }
            i => i as usize,
        };

        let stream = unsafe { (*fmt_ctx.0.streams.add(stream_idx)).as_ref() }.ok_or_else(|| {
            Error::StreamNotFound {
                path: display.clone(),
                reason: "Stream info null".into(),
            }
        })?;

        let codec_error = |reason: String| Error::CodecOpen {
            codec: unsafe { decoder.as_ref() }
                .map(|d| unsafe { CStr::from_ptr(d.name) }.to_string_lossy().into_owned())
                .unwrap_or_else(|| "video".into()),
            reason,
        };

        let mut codec_ctx = unsafe { avcodec_alloc_context3(decoder).as_mut() }
            .map(CodecContext)
            .ok_or_else(|| codec_error("Failed to allocate codec context".into()))?;

        match unsafe { avcodec_parameters_to_context(codec_ctx.as_mut_ptr(), stream.codecpar) } {
            e if e < 0 => {
                return Err(codec_error(format!(
                    "Failed to copy codec parameters ({})",
                    av_error_string(e)
                )))
            }
            _ => {}
        }

        let mut av_opts: *mut AVDictionary = ptr::null_mut();

        let ret = unsafe {
            av_dict_set(
                &mut av_opts,
                c_str!("flags2").as_ptr(),
                c_str!("+export_mvs").as_ptr(),
                0,
            );
            let ret = avcodec_open2(codec_ctx.as_mut_ptr(), decoder, &mut av_opts);
            av_dict_free(&mut av_opts);
            ret
        };

        if ret < 0 {
            return Err(codec_error(av_error_string(ret)));
        }

        let av_frame = unsafe { av_frame_alloc().as_mut() }
            .map(AvFrame)
            .ok_or_else(|| codec_error("Unable to allocate frame".into()))?;

        let info = StreamInfo {
            index: stream_idx,
            codec: codec_ctx.codec_name(),
            width: codec_ctx.0.width.max(0) as usize,
            height: codec_ctx.0.height.max(0) as usize,
            time_base: (stream.time_base.num, stream.time_base.den),
            frame_rate: (stream.r_frame_rate.num, stream.r_frame_rate.den),
            frame_count: stream.nb_frames.max(0) as u64,
            duration: timestamp(stream.duration).unwrap_or(0),
        };

        debug!("Opened {}: {:?}", display, info);

        Ok(Self {
            scaler: Scaler::default(),
            av_frame,
            codec_ctx,
            fmt_ctx,
            path: path_to_cstring(path)?,
            info,
        })
    }

    /// Print container information to stderr.
    pub fn dump_format(&mut self) {
        unsafe {
            av_dump_format(
                self.fmt_ctx.as_mut_ptr(),
                self.info.index as c_int,
                self.path.as_ptr(),
                0,
            )
        };
    }
}

impl MediaSource for AvSource {
    type Packet = AvPacket;

    fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<Option<AvPacket>> {
        let mut packet = AvPacket::try_new()?;

        match unsafe { av_read_frame(self.fmt_ctx.as_mut_ptr(), &mut *packet.0) } {
            e if e == AVERROR_EOF => Ok(None),
            e if e < 0 => Err(Error::decode(
                DecodeStage::ReadPacket,
                e,
                av_error_string(e),
            )),
            _ => {
                trace!("Read packet: {} {}", packet.0.stream_index, packet.0.size);
                Ok(Some(packet))
            }
        }
    }

    fn send_packet(&mut self, packet: Option<&AvPacket>) -> Result<()> {
        let pkt = packet.map_or(ptr::null(), |p| &*p.0 as *const AVPacket);

        match unsafe { avcodec_send_packet(self.codec_ctx.as_mut_ptr(), pkt) } {
            // Flushing an already flushed decoder.
            e if e == AVERROR_EOF && packet.is_none() => Ok(()),
            e if e < 0 => Err(Error::decode(
                DecodeStage::SendPacket,
                e,
                av_error_string(e),
            )),
            _ => Ok(()),
        }
    }

    fn receive_frame(&mut self, raw_image: bool) -> Result<Receive> {
        match unsafe { avcodec_receive_frame(self.codec_ctx.as_mut_ptr(), &mut *self.av_frame.0) } {
            e if e == AVERROR(libc::EAGAIN) => return Ok(Receive::NeedsInput),
            e if e == AVERROR_EOF => return Ok(Receive::Drained),
            e if e < 0 => {
                return Err(Error::decode(
                    DecodeStage::ReceiveFrame,
                    e,
                    av_error_string(e),
                ))
            }
            _ => {}
        }

        let frame = RefFrame {
            frame: &mut *self.av_frame.0,
        };

        let motion_side_data = unsafe {
            av_frame_get_side_data(&*frame, AVFrameSideDataType::AV_FRAME_DATA_MOTION_VECTORS)
                .as_ref()
        }
        .map(|side_data| {
            if side_data.data.is_null() {
                vec![]
            } else {
                unsafe { slice::from_raw_parts(side_data.data, side_data.size as usize) }.to_vec()
            }
        });

        if motion_side_data.is_none() {
            trace!("No motion vectors in frame");
        }

        let raw_image = if raw_image {
            Some(self.scaler.convert(&frame)?)
        } else {
            None
        };

        Ok(Receive::Frame(DecodedFrame {
            dts: timestamp(frame.pkt_dts),
            pts: timestamp(frame.pts).or_else(|| timestamp(frame.best_effort_timestamp)),
            motion_side_data,
            raw_image,
        }))
    }
}

/// Open a motion field reader over a video file.
pub fn open(path: impl AsRef<Path>, config: ReaderConfig) -> Result<AvFrameReader> {
    AvSource::open(path).map(|source| FrameReader::new(source, config))
}

/// Check whether the container opens.
///
/// Returns 0 on success, 1 otherwise.
pub fn open_file(path: impl AsRef<Path>) -> i32 {
    match FormatContext::open(path.as_ref()) {
        Ok(_) => 0,
        Err(e) => {
            debug!("{}", e);
            1
        }
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if std::fs::File::open(path).is_err() {
        return Err(Error::Open {
            path: path.display().to_string(),
            reason: "Video doesn't exist or can't be opened".into(),
        });
    }
    Ok(())
}

/// Compute descriptors of the `[start, end]` window of a video.
///
/// The returned list is terminated by the markers described in [`scan_window`].
pub fn run(
    path: impl AsRef<Path>,
    config: ReaderConfig,
    start: f64,
    end: Option<f64>,
    sink: &mut impl DescriptorSink,
) -> Result<Vec<f64>> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let mut reader = open(path, config)?;
    Ok(scan_window(&mut reader, start, end, sink))
}

/// Length of a video in seconds.
pub fn get_video_length(path: impl AsRef<Path>) -> Result<f64> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let reader = open(path, Default::default())?;
    Ok(video_length(&reader))
}
