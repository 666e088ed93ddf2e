//! FFmpeg sample reader
//!
//! Opens a container, decodes its first video stream (hardware accelerated
//! where the platform allows) and delivers frames in the negotiated pixel
//! format as tightly packed rows.

use std::path::Path;
use std::ptr;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame;

use super::error::VideoError;
use super::format::FormatFamily;
use super::reader::{OutputType, ReadOutcome, SampleBuffer, SampleReader, StagingSurface};
use crate::settings::VideoSettings;

/// `AV_HWFRAME_MAP_READ`
const HWFRAME_MAP_READ: i32 = 1;

/// Packets fed in one read before reporting a stream tick
const MAX_PACKETS_PER_READ: usize = 64;

/// Frames decoded and dropped while landing on an accurate seek target
const MAX_SEEK_SKIP: usize = 600;

/// Reader behavior derived from settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    pub hardware_decode: bool,
    /// Allow pixel format conversion and scaling inside the reader
    pub software_conversion: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            hardware_decode: true,
            software_conversion: true,
        }
    }
}

impl From<&VideoSettings> for ReaderOptions {
    fn from(settings: &VideoSettings) -> Self {
        Self {
            hardware_decode: settings.hardware_decode,
            software_conversion: settings.software_conversion,
        }
    }
}

/// Hardware acceleration method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwAccelMethod {
    /// Software decoding
    None,
    /// macOS VideoToolbox
    VideoToolbox,
    /// Windows Direct3D 11
    D3d11va,
    /// NVIDIA
    Nvdec,
    /// Linux VA-API
    Vaapi,
}

impl std::fmt::Display for HwAccelMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HwAccelMethod::None => write!(f, "software"),
            HwAccelMethod::VideoToolbox => write!(f, "videotoolbox"),
            HwAccelMethod::D3d11va => write!(f, "d3d11va"),
            HwAccelMethod::Nvdec => write!(f, "nvdec"),
            HwAccelMethod::Vaapi => write!(f, "vaapi"),
        }
    }
}

impl HwAccelMethod {
    /// Methods worth trying on this platform, in order
    pub fn platform_methods() -> &'static [HwAccelMethod] {
        #[cfg(target_os = "macos")]
        const METHODS: &[HwAccelMethod] = &[HwAccelMethod::VideoToolbox];

        #[cfg(target_os = "windows")]
        const METHODS: &[HwAccelMethod] = &[HwAccelMethod::D3d11va, HwAccelMethod::Nvdec];

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        const METHODS: &[HwAccelMethod] = &[HwAccelMethod::Vaapi, HwAccelMethod::Nvdec];

        METHODS
    }

    pub fn is_hardware(self) -> bool {
        self != HwAccelMethod::None
    }

    fn device_type(self) -> Option<ffi::AVHWDeviceType> {
        match self {
            HwAccelMethod::None => None,
            HwAccelMethod::VideoToolbox => Some(ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX),
            HwAccelMethod::D3d11va => Some(ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA),
            HwAccelMethod::Nvdec => Some(ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA),
            HwAccelMethod::Vaapi => Some(ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI),
        }
    }
}

/// Owned reference to a hardware device context
struct HwDevice {
    ptr: *mut ffi::AVBufferRef,
}

impl HwDevice {
    fn create(method: HwAccelMethod) -> Result<Self, String> {
        let Some(device_type) = method.device_type() else {
            return Err("no device for software decoding".to_string());
        };

        let mut ptr: *mut ffi::AVBufferRef = ptr::null_mut();
        let ret = unsafe {
            ffi::av_hwdevice_ctx_create(&mut ptr, device_type, ptr::null(), ptr::null_mut(), 0)
        };
        if ret < 0 || ptr.is_null() {
            return Err(ffmpeg::Error::from(ret).to_string());
        }
        Ok(Self { ptr })
    }
}

impl Drop for HwDevice {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { ffi::av_buffer_unref(&mut self.ptr) };
        }
    }
}

/// Packs decoded frames into the negotiated family and size
struct FormatAdapter {
    family: FormatFamily,
    width: u32,
    height: u32,
    /// Scaler keyed by the source format and size it was built for
    scaler: Option<((Pixel, u32, u32), scaling::Context)>,
    scaled: frame::Video,
}

impl FormatAdapter {
    fn new(family: FormatFamily, width: u32, height: u32) -> Self {
        Self {
            family,
            width,
            height,
            scaler: None,
            scaled: frame::Video::empty(),
        }
    }

    fn stride(&self) -> usize {
        self.family.default_stride(self.width)
    }

    /// Write `source` into `out` as contiguous rows of [`FormatAdapter::stride`] bytes.
    fn pack(&mut self, source: &frame::Video, out: &mut Vec<u8>) -> Result<(), VideoError> {
        out.clear();
        let key = (source.format(), source.width(), source.height());
        if key == (self.family.pixel(), self.width, self.height) {
            write_planes(source, self.family, self.width, self.height, out);
            return Ok(());
        }

        if self.scaler.as_ref().map_or(true, |(built_for, _)| *built_for != key) {
            let context = scaling::Context::get(
                key.0,
                key.1,
                key.2,
                self.family.pixel(),
                self.width,
                self.height,
                scaling::Flags::BILINEAR,
            )
            .map_err(|e| VideoError::sample_read("scaling::Context::get", e))?;
            tracing::debug!(
                "Converting {:?} {}x{} to {} {}x{}",
                key.0,
                key.1,
                key.2,
                self.family,
                self.width,
                self.height
            );
            self.scaler = Some((key, context));
            self.scaled = frame::Video::empty();
        }

        if let Some((_, scaler)) = self.scaler.as_mut() {
            scaler
                .run(source, &mut self.scaled)
                .map_err(|e| VideoError::sample_read("sws_scale", e))?;
        }
        write_planes(&self.scaled, self.family, self.width, self.height, out);
        Ok(())
    }
}

fn write_planes(frame: &frame::Video, family: FormatFamily, width: u32, height: u32, out: &mut Vec<u8>) {
    let stride = family.default_stride(width);
    let rows = height as usize;
    match family {
        FormatFamily::Nv12 => {
            copy_plane(frame, 0, rows, width as usize, stride, out);
            copy_plane(frame, 1, rows.div_ceil(2), stride, stride, out);
        }
        _ => copy_plane(frame, 0, rows, stride, stride, out),
    }
}

/// Append `rows` rows of one plane, each padded or cut to `stride` bytes.
fn copy_plane(
    frame: &frame::Video,
    plane: usize,
    rows: usize,
    row_bytes: usize,
    stride: usize,
    out: &mut Vec<u8>,
) {
    if plane >= frame.planes() {
        out.resize(out.len() + rows * stride, 0);
        return;
    }

    let data = frame.data(plane);
    let linesize = frame.stride(plane);
    for y in 0..rows {
        let row = data.get(y * linesize..).unwrap_or(&[]);
        let copied = row_bytes.min(stride).min(row.len());
        out.extend_from_slice(&row[..copied]);
        out.resize(out.len() + stride - copied, 0);
    }
}

fn is_hardware_frame(frame: &frame::Video) -> bool {
    unsafe { !(*frame.as_ptr()).hw_frames_ctx.is_null() }
}

enum Decoded {
    Frame,
    Tick,
    End,
}

/// Sample reader backed by FFmpeg
pub struct FfmpegReader {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    /// Keeps the hardware device alive while the decoder references it
    _device: Option<HwDevice>,
    hwaccel: HwAccelMethod,
    codec_name: String,
    options: ReaderOptions,
    time_base: f64,
    /// Stream start in seconds; reported timestamps are relative to it
    start_time: f64,
    frame_rate: Option<(u32, u32)>,
    duration: f64,
    adapter: Option<FormatAdapter>,
    decoded: frame::Video,
    scratch: Vec<u8>,
    /// EOF was sent to the decoder
    draining: bool,
    eof: bool,
    seek_target: Option<f64>,
    skipped: usize,
}

impl FfmpegReader {
    /// Open `path` and prepare a decoder for its first video stream.
    pub fn open(path: &Path, options: ReaderOptions) -> Result<Self, VideoError> {
        let mut input =
            ffmpeg::format::input(&path).map_err(|e| VideoError::reader_open("format::input", e))?;

        let stream_index = first_video_stream(
            input
                .streams()
                .map(|s| (s.index(), s.parameters().medium())),
        )
        .ok_or_else(|| VideoError::reader_open("stream selection", "no video stream"))?;
        let stream = input
            .stream(stream_index)
            .ok_or_else(|| VideoError::reader_open("stream selection", "no video stream"))?;

        let time_base = stream.time_base();
        let time_base = if time_base.denominator() != 0 {
            f64::from(time_base.numerator()) / f64::from(time_base.denominator())
        } else {
            0.0
        };
        let start_time = start_offset(stream.start_time(), time_base);

        let rate = stream.avg_frame_rate();
        let frame_rate = (rate.numerator() > 0 && rate.denominator() > 0)
            .then(|| (rate.numerator() as u32, rate.denominator() as u32));

        let duration = if stream.duration() > 0 {
            stream.duration() as f64 * time_base
        } else if input.duration() > 0 {
            input.duration() as f64 / ffi::AV_TIME_BASE as f64
        } else {
            0.0
        };

        let codec_name = ffmpeg::decoder::find(stream.parameters().id())
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let others: Vec<usize> = input
            .streams()
            .map(|s| s.index())
            .filter(|&index| index != stream_index)
            .collect();
        for index in others {
            if let Some(mut other) = input.stream_mut(index) {
                unsafe { (*other.as_mut_ptr()).discard = ffi::AVDiscard::AVDISCARD_ALL };
            }
        }

        let (decoder, device, hwaccel) = Self::create_decoder(&input, stream_index, options)?;

        tracing::info!(
            "Opened video: {}x{} @ {:?}, duration: {:.2}s, codec: {}, hwaccel: {}",
            decoder.width(),
            decoder.height(),
            frame_rate,
            duration,
            codec_name,
            hwaccel
        );

        Ok(Self {
            input,
            stream_index,
            decoder,
            _device: device,
            hwaccel,
            codec_name,
            options,
            time_base,
            start_time,
            frame_rate,
            duration,
            adapter: None,
            decoded: frame::Video::empty(),
            scratch: Vec::new(),
            draining: false,
            eof: false,
            seek_target: None,
            skipped: 0,
        })
    }

    fn create_decoder(
        input: &ffmpeg::format::context::Input,
        stream_index: usize,
        options: ReaderOptions,
    ) -> Result<(ffmpeg::decoder::Video, Option<HwDevice>, HwAccelMethod), VideoError> {
        let parameters = || {
            input
                .stream(stream_index)
                .map(|stream| stream.parameters())
                .ok_or_else(|| VideoError::reader_open("stream selection", "video stream vanished"))
        };

        if options.hardware_decode {
            for &method in HwAccelMethod::platform_methods() {
                match Self::create_hwaccel_decoder(parameters()?, method) {
                    Ok((decoder, device)) => {
                        tracing::info!("Hardware acceleration enabled: {}", method);
                        return Ok((decoder, Some(device), method));
                    }
                    Err(e) => {
                        tracing::debug!("Hardware acceleration {} not available: {}", method, e);
                    }
                }
            }
        }

        let context = ffmpeg::codec::context::Context::from_parameters(parameters()?)
            .map_err(|e| VideoError::reader_open("codec context", e))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| VideoError::reader_open("open video decoder", e))?;
        Ok((decoder, None, HwAccelMethod::None))
    }

    fn create_hwaccel_decoder(
        parameters: ffmpeg::codec::Parameters,
        method: HwAccelMethod,
    ) -> Result<(ffmpeg::decoder::Video, HwDevice), String> {
        let device = HwDevice::create(method)?;
        let mut context =
            ffmpeg::codec::context::Context::from_parameters(parameters).map_err(|e| e.to_string())?;
        unsafe {
            (*context.as_mut_ptr()).hw_device_ctx = ffi::av_buffer_ref(device.ptr);
        }
        let decoder = context.decoder().video().map_err(|e| e.to_string())?;
        Ok((decoder, device))
    }

    pub fn hwaccel(&self) -> HwAccelMethod {
        self.hwaccel
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    /// Pixel format the decoder emits for software frames
    fn software_format(&self) -> Pixel {
        match self.decoder.format() {
            Pixel::None => Pixel::YUV420P,
            format if self.hwaccel.is_hardware() && FormatFamily::from_pixel(format).is_none() => {
                Pixel::NV12
            }
            format => format,
        }
    }

    fn decode_next(&mut self) -> Result<Decoded, VideoError> {
        if self.eof {
            return Ok(Decoded::End);
        }

        let mut packets = 0;
        loop {
            match self.decoder.receive_frame(&mut self.decoded) {
                Ok(()) => {
                    packets = 0;
                    if let Some(target) = self.seek_target {
                        let pts = self.frame_seconds().unwrap_or(target);
                        if pts < target - self.half_frame() && self.skip_budget() {
                            continue;
                        }
                        self.seek_target = None;
                    }
                    return Ok(Decoded::Frame);
                }
                Err(ffmpeg::Error::Eof) => {
                    self.eof = true;
                    return Ok(Decoded::End);
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    if self.draining {
                        self.eof = true;
                        return Ok(Decoded::End);
                    }
                    if packets >= MAX_PACKETS_PER_READ {
                        return Ok(Decoded::Tick);
                    }
                    packets += 1;
                    self.feed_packet()?;
                }
                Err(e) => return Err(VideoError::sample_read("receive_frame", e)),
            }
        }
    }

    fn feed_packet(&mut self) -> Result<(), VideoError> {
        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            return self
                .decoder
                .send_packet(&packet)
                .map_err(|e| VideoError::sample_read("send_packet", e));
        }

        self.draining = true;
        self.decoder
            .send_eof()
            .map_err(|e| VideoError::sample_read("send_eof", e))
    }

    fn skip_budget(&mut self) -> bool {
        self.skipped += 1;
        self.skipped <= MAX_SEEK_SKIP
    }

    fn half_frame(&self) -> f64 {
        self.frame_rate
            .map_or(0.0, |(num, den)| f64::from(den) / f64::from(num) / 2.0)
    }

    fn frame_seconds(&self) -> Option<f64> {
        self.decoded
            .timestamp()
            .or(self.decoded.pts())
            .map(|ts| ts as f64 * self.time_base - self.start_time)
    }
}

/// Index of the first video stream in container order.
fn first_video_stream(
    streams: impl IntoIterator<Item = (usize, ffmpeg::media::Type)>,
) -> Option<usize> {
    streams
        .into_iter()
        .find(|&(_, medium)| medium == ffmpeg::media::Type::Video)
        .map(|(index, _)| index)
}

/// Stream start time in seconds, zero when the container does not set one.
fn start_offset(start_time: i64, time_base: f64) -> f64 {
    if start_time == ffi::AV_NOPTS_VALUE {
        0.0
    } else {
        start_time as f64 * time_base
    }
}

/// Container seek timestamp in `AV_TIME_BASE` units for a position relative
/// to the stream start.
fn seek_timestamp(seconds: f64, start_time: f64) -> i64 {
    ((seconds + start_time) * ffi::AV_TIME_BASE as f64) as i64
}

impl SampleReader for FfmpegReader {
    type Sample<'a>
        = FfmpegSample<'a>
    where
        Self: 'a;

    fn native_size(&mut self) -> Option<(u32, u32)> {
        let (width, height) = (self.decoder.width(), self.decoder.height());
        (width > 0 && height > 0).then_some((width, height))
    }

    fn try_output(
        &mut self,
        family: FormatFamily,
        size: Option<(u32, u32)>,
    ) -> Result<(), VideoError> {
        let native = self
            .native_size()
            .ok_or_else(|| VideoError::negotiation(family.label(), "decoder reports no frame size"))?;
        let (width, height) = size.unwrap_or(native);

        if !self.options.software_conversion {
            let emitted = self.software_format();
            if size.is_some_and(|s| s != native) || emitted != family.pixel() {
                return Err(VideoError::negotiation(
                    family.label(),
                    format!("decoder emits {:?} at {}x{}", emitted, native.0, native.1),
                ));
            }
        } else {
            scaling::Context::get(
                self.software_format(),
                native.0,
                native.1,
                family.pixel(),
                width,
                height,
                scaling::Flags::BILINEAR,
            )
            .map_err(|e| VideoError::negotiation(family.label(), e))?;
        }

        self.adapter = Some(FormatAdapter::new(family, width, height));
        Ok(())
    }

    fn current_output(&self) -> Result<OutputType, VideoError> {
        let adapter = self
            .adapter
            .as_ref()
            .ok_or_else(|| VideoError::negotiation("current output", "no output selected"))?;
        Ok(OutputType {
            family: Some(adapter.family),
            width: adapter.width,
            height: adapter.height,
            stride: Some(adapter.stride() as isize),
            frame_rate: self.frame_rate,
        })
    }

    fn duration_seconds(&self) -> f64 {
        self.duration
    }

    fn read_sample(&mut self) -> Result<ReadOutcome<FfmpegSample<'_>>, VideoError> {
        if self.adapter.is_none() {
            return Err(VideoError::sample_read("read_sample", "no output selected"));
        }

        match self.decode_next()? {
            Decoded::End => return Ok(ReadOutcome::EndOfStream),
            Decoded::Tick => return Ok(ReadOutcome::StreamTick),
            Decoded::Frame => {}
        }

        let pts = self.frame_seconds();
        let Some(adapter) = self.adapter.as_mut() else {
            return Err(VideoError::sample_read("read_sample", "no output selected"));
        };
        Ok(ReadOutcome::Sample(FfmpegSample {
            frame: &self.decoded,
            pts,
            adapter,
            scratch: &mut self.scratch,
            mapped: None,
        }))
    }

    fn seek(&mut self, seconds: f64) -> Result<(), VideoError> {
        let seconds = seconds.max(0.0);
        let timestamp = seek_timestamp(seconds, self.start_time);
        let result = if seconds > 0.0 && timestamp > 0 {
            self.input.seek(timestamp, ..timestamp)
        } else {
            self.input.seek(0, ..)
        };
        result.map_err(|e| VideoError::seek(seconds, e))?;

        self.decoder.flush();
        self.draining = false;
        self.eof = false;
        self.skipped = 0;
        self.seek_target = (seconds > 0.0).then_some(seconds);
        tracing::debug!("Seeked to {:.3}s", seconds);
        Ok(())
    }
}

/// One decoded FFmpeg frame, borrowed from its reader
pub struct FfmpegSample<'a> {
    frame: &'a frame::Video,
    pts: Option<f64>,
    adapter: &'a mut FormatAdapter,
    scratch: &'a mut Vec<u8>,
    /// CPU mapping of a hardware frame, held until unlock
    mapped: Option<frame::Video>,
}

impl SampleBuffer for FfmpegSample<'_> {
    fn presentation_time(&self) -> Option<f64> {
        self.pts
    }

    fn has_gpu_surface(&self) -> bool {
        is_hardware_frame(self.frame)
    }

    fn copy_to_staging(&mut self) -> Result<StagingSurface, VideoError> {
        if !self.has_gpu_surface() {
            return Err(VideoError::sample_read("copy_to_staging", "frame is in system memory"));
        }

        let mut software = frame::Video::empty();
        let ret = unsafe { ffi::av_hwframe_transfer_data(software.as_mut_ptr(), self.frame.as_ptr(), 0) };
        if ret < 0 {
            return Err(VideoError::sample_read(
                "av_hwframe_transfer_data",
                ffmpeg::Error::from(ret),
            ));
        }

        let mut data = Vec::new();
        self.adapter.pack(&software, &mut data)?;
        Ok(StagingSurface::new(data, self.adapter.stride()))
    }

    fn lock(&mut self) -> Result<&[u8], VideoError> {
        if self.has_gpu_surface() {
            let mut mapped = frame::Video::empty();
            let ret = unsafe {
                ffi::av_hwframe_map(mapped.as_mut_ptr(), self.frame.as_ptr(), HWFRAME_MAP_READ)
            };
            if ret < 0 {
                return Err(VideoError::sample_read("av_hwframe_map", ffmpeg::Error::from(ret)));
            }
            self.adapter.pack(&mapped, self.scratch)?;
            self.mapped = Some(mapped);
        } else {
            self.adapter.pack(self.frame, self.scratch)?;
        }
        Ok(self.scratch.as_slice())
    }

    fn unlock(&mut self) {
        self.mapped = None;
    }
}
