use crate::core::{CodecId, Packet, PlayerError, Result, StreamHints, StreamKind};
use crate::player::reader::MediaReader;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, media};
use log::{debug, info, warn};
use std::process;
use std::thread;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// FFmpeg 解封装读取器
///
/// 打开媒体、分离音视频流并把压缩包（时间戳统一为微秒）交给调度循环。
pub struct FfmpegReader {
    input_ctx: Option<format::context::Input>,
    video_stream_index: Option<usize>,
    audio_stream_index: Option<usize>,
    video_streams: usize,
    audio_streams: usize,
    video_hints: Option<StreamHints>,
    audio_hints: Option<StreamHints>,
    eof: bool,
    rewound: bool,
    speed: i32,
    seekable: bool,
    source_path: String,
}

impl FfmpegReader {
    pub fn new() -> Self {
        Self {
            input_ctx: None,
            video_stream_index: None,
            audio_stream_index: None,
            video_streams: 0,
            audio_streams: 0,
            video_hints: None,
            audio_hints: None,
            eof: false,
            rewound: false,
            speed: crate::core::clock::NORMAL_PLAY_SPEED,
            seekable: true,
            source_path: String::new(),
        }
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_network_url(path: &str) -> bool {
    path.starts_with("http://")
        || path.starts_with("https://")
        || path.starts_with("rtsp://")
        || path.starts_with("rtmp://")
        || path.contains(".m3u8")
}

fn codec_id_of(id: codec::Id) -> CodecId {
    match id {
        codec::Id::H264 => CodecId::H264,
        codec::Id::MPEG4 => CodecId::Mpeg4,
        codec::Id::HEVC => CodecId::Hevc,
        codec::Id::AC3 => CodecId::Ac3,
        codec::Id::EAC3 => CodecId::Eac3,
        codec::Id::DTS => CodecId::Dts,
        codec::Id::MP3 => CodecId::Mp3,
        codec::Id::AAC => CodecId::Aac,
        codec::Id::FLAC => CodecId::Flac,
        codec::Id::VORBIS => CodecId::Vorbis,
        other => {
            if other.name().starts_with("pcm_") {
                CodecId::Pcm
            } else {
                CodecId::Unknown
            }
        }
    }
}

/// 把流时间基下的时间戳换算成微秒
fn to_micros(ts: Option<i64>, time_base: f64) -> Option<i64> {
    ts.map(|t| (t as f64 * time_base * 1_000_000.0) as i64)
}

fn video_hints_of(stream: &format::stream::Stream) -> Result<StreamHints> {
    let params = stream.parameters();
    let codec_id = codec_id_of(params.id());
    let context = codec::context::Context::from_parameters(params)?;
    let decoder = context.decoder().video()?;

    let fps = stream.avg_frame_rate();
    let fps = if fps.denominator() != 0 {
        fps.numerator() as f32 / fps.denominator() as f32
    } else {
        0.0
    };

    Ok(StreamHints {
        codec: codec_id,
        width: decoder.width(),
        height: decoder.height(),
        fps,
        nb_frames: stream.frames(),
        ..StreamHints::default()
    })
}

fn audio_hints_of(stream: &format::stream::Stream) -> Result<StreamHints> {
    let params = stream.parameters();
    let codec_id = codec_id_of(params.id());
    let context = codec::context::Context::from_parameters(params)?;
    let decoder = context.decoder().audio()?;

    Ok(StreamHints {
        codec: codec_id,
        channels: decoder.channels(),
        samplerate: decoder.rate(),
        bitspersample: 16,
        bitrate: decoder.bit_rate() as u32,
        ..StreamHints::default()
    })
}

impl MediaReader for FfmpegReader {
    fn open(&mut self, path: &str, skip_probe: bool) -> Result<()> {
        info!("{} 📄 正在打开媒体: {} (skip_probe={})", log_ctx(), path, skip_probe);

        let is_network = is_network_url(path);
        let mut options = ffmpeg::Dictionary::new();

        if skip_probe {
            // 快速路径：压缩探测窗口，失败时调用方会换完整探测重试
            options.set("probesize", "131072");
            options.set("analyzeduration", "500000");
        }

        if is_network {
            info!("{} 🌐 检测到网络流，应用网络优化选项", log_ctx());
            // discardcorrupt: 丢弃损坏的帧
            // genpts: 生成 PTS，防止时间戳缺失
            // nobuffer: 减少缓冲延迟
            options.set("fflags", "+discardcorrupt+genpts+nobuffer");
            options.set("timeout", "15000000");
            options.set("rw_timeout", "8000000");
            options.set("reconnect", "1");
            options.set("reconnect_streamed", "1");
            options.set("reconnect_delay_max", "4");
            if path.contains(".m3u8") {
                options.set("live_start_index", "-1");
                options.set("http_persistent", "1");
            }
        }

        let input_ctx = format::input_with_dictionary(&path, options)
            .map_err(|e| PlayerError::OpenError(format!("{}: {}", path, e)))?;

        self.video_stream_index = input_ctx
            .streams()
            .best(media::Type::Video)
            .map(|s| s.index());
        self.audio_stream_index = input_ctx
            .streams()
            .best(media::Type::Audio)
            .map(|s| s.index());
        self.video_streams = input_ctx
            .streams()
            .filter(|s| s.parameters().medium() == media::Type::Video)
            .count();
        self.audio_streams = input_ctx
            .streams()
            .filter(|s| s.parameters().medium() == media::Type::Audio)
            .count();

        debug!(
            "{} 视频流 {}（活动 {:?}），音频流 {}（活动 {:?}）",
            log_ctx(),
            self.video_streams,
            self.video_stream_index,
            self.audio_streams,
            self.audio_stream_index
        );

        self.input_ctx = Some(input_ctx);
        self.eof = false;
        self.rewound = false;
        self.source_path = path.to_string();
        // RTSP/RTMP 直播流不可定位，HTTP 点播和本地文件可以
        self.seekable = !(path.starts_with("rtsp://") || path.starts_with("rtmp://"));

        self.video_hints = match self.video_stream_index {
            Some(idx) => {
                let input = self.input_ctx.as_ref().ok_or(PlayerError::NoVideoStream)?;
                let stream = input.stream(idx).ok_or(PlayerError::NoVideoStream)?;
                Some(video_hints_of(&stream)?)
            }
            None => None,
        };

        let mut audio_failed = false;
        self.audio_hints = match self.audio_stream_index {
            Some(idx) => match self.input_ctx.as_ref().and_then(|input| input.stream(idx)) {
                Some(stream) => match audio_hints_of(&stream) {
                    Ok(hints) => Some(hints),
                    Err(e) => {
                        warn!("{} ⚠ 音频流参数解析失败，按无音频处理: {}", log_ctx(), e);
                        audio_failed = true;
                        None
                    }
                },
                None => None,
            },
            None => None,
        };
        if audio_failed {
            self.audio_stream_index = None;
            self.audio_streams = 0;
        }

        Ok(())
    }

    fn read(&mut self) -> Option<Packet> {
        let input = self.input_ctx.as_mut()?;
        match input.packets().next() {
            Some((stream, packet)) => {
                let index = stream.index();
                let tb = stream.time_base();
                let time_base = tb.numerator() as f64 / tb.denominator() as f64;

                let (kind, hints) = if Some(index) == self.video_stream_index {
                    (StreamKind::Video, self.video_hints.unwrap_or_default())
                } else if Some(index) == self.audio_stream_index {
                    (StreamKind::Audio, self.audio_hints.unwrap_or_default())
                } else {
                    (StreamKind::Unknown, StreamHints::default())
                };

                Some(Packet {
                    data: packet.data().map(|d| d.to_vec()).unwrap_or_default(),
                    pts: to_micros(packet.pts(), time_base),
                    dts: to_micros(packet.dts(), time_base),
                    stream_index: index,
                    kind,
                    hints,
                })
            }
            None => {
                self.eof = true;
                None
            }
        }
    }

    fn hints(&self, kind: StreamKind) -> Option<StreamHints> {
        match kind {
            StreamKind::Video => self.video_hints,
            StreamKind::Audio => self.audio_hints,
            StreamKind::Unknown => None,
        }
    }

    fn num_streams(&self, kind: StreamKind) -> usize {
        match kind {
            StreamKind::Video => self.video_streams,
            StreamKind::Audio => self.audio_streams,
            StreamKind::Unknown => 0,
        }
    }

    fn is_active(&self, kind: StreamKind, stream_index: usize) -> bool {
        match kind {
            StreamKind::Video => self.video_stream_index == Some(stream_index),
            StreamKind::Audio => self.audio_stream_index == Some(stream_index),
            StreamKind::Unknown => false,
        }
    }

    fn seek_time(&mut self, position_ms: i64, backward: bool) -> Result<i64> {
        let input = self
            .input_ctx
            .as_mut()
            .ok_or_else(|| PlayerError::SeekError("媒体未打开".to_string()))?;
        let timestamp = position_ms * 1000;
        let result = if backward {
            input.seek(timestamp, ..timestamp)
        } else {
            input.seek(timestamp, timestamp..)
        };
        result.map_err(|e| PlayerError::SeekError(format!("{}ms: {}", position_ms, e)))?;

        self.eof = false;
        if position_ms <= 0 {
            self.rewound = true;
        }
        debug!("{} ⏩ seek 到 {}ms (backward={})", log_ctx(), position_ms, backward);
        Ok(timestamp)
    }

    fn can_seek(&self) -> bool {
        self.seekable
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    fn set_speed(&mut self, speed: i32) {
        // 变速由共享时钟驱动，这里只记录当前值供诊断
        self.speed = speed;
        debug!("{} 读取速度设为 {}", log_ctx(), self.speed);
    }

    fn take_rewound(&mut self) -> bool {
        let rewound = self.rewound;
        self.rewound = false;
        rewound
    }

    fn codec_name(&self, kind: StreamKind) -> String {
        let index = match kind {
            StreamKind::Video => self.video_stream_index,
            StreamKind::Audio => self.audio_stream_index,
            StreamKind::Unknown => None,
        };
        index
            .and_then(|idx| self.input_ctx.as_ref().and_then(|input| input.stream(idx)))
            .map(|stream| stream.parameters().id().name().to_string())
            .unwrap_or_default()
    }

    fn close(&mut self) {
        if self.input_ctx.take().is_some() {
            info!("{} 🧹 关闭媒体: {}", log_ctx(), self.source_path);
        }
        self.eof = false;
        self.rewound = false;
    }
}
