use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::error::Result;

/// 设备音量范围下限（百分之一分贝）
pub const DEVICE_VOLUME_MIN: i64 = -6000;

/// 设备音量范围上限（百分之一分贝）
pub const DEVICE_VOLUME_MAX: i64 = 6000;

/// 流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// 视频流
    Video,
    /// 音频流
    Audio,
    /// 未识别的流（丢弃）
    Unknown,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
            StreamKind::Unknown => "unknown",
        }
    }
}

/// 编解码器标识
///
/// 音频重配置比较、直通判定和硬解判定都以此为键。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    // 视频
    H264,
    Mpeg4,
    Hevc,
    // 音频
    Ac3,
    Eac3,
    Dts,
    Mp3,
    Aac,
    Flac,
    Vorbis,
    Pcm,
    /// 未识别的编解码器
    Unknown,
}

impl CodecId {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecId::H264 => "h264",
            CodecId::Mpeg4 => "mpeg4",
            CodecId::Hevc => "hevc",
            CodecId::Ac3 => "ac3",
            CodecId::Eac3 => "eac3",
            CodecId::Dts => "dts",
            CodecId::Mp3 => "mp3",
            CodecId::Aac => "aac",
            CodecId::Flac => "flac",
            CodecId::Vorbis => "vorbis",
            CodecId::Pcm => "pcm",
            CodecId::Unknown => "unknown",
        }
    }

    /// 码率变化是否触发重配置
    ///
    /// 只有 DTS / AC-3 / E-AC-3 的码率变化有意义，其他编码忽略码率漂移。
    pub fn is_bitrate_sensitive(&self) -> bool {
        matches!(self, CodecId::Dts | CodecId::Ac3 | CodecId::Eac3)
    }

    /// 对应的 IEC 61937 直通模式（不在白名单内返回 None 模式）
    pub fn passthrough_mode(&self) -> PassthroughMode {
        match self {
            CodecId::Ac3 => PassthroughMode::Iec61937Ac3,
            CodecId::Eac3 => PassthroughMode::Iec61937Eac3,
            CodecId::Dts => PassthroughMode::Iec61937Dts,
            _ => PassthroughMode::None,
        }
    }

    /// 固件音频解码器支持的编码
    pub fn supports_hw_decode(&self) -> bool {
        matches!(self, CodecId::Mp3 | CodecId::Aac)
    }
}

/// 音频直通模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughMode {
    /// 不直通（PCM 输出）
    None,
    Iec61937Ac3,
    Iec61937Eac3,
    Iec61937Dts,
}

impl PassthroughMode {
    pub fn is_active(&self) -> bool {
        !matches!(self, PassthroughMode::None)
    }
}

/// PCM 声道位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmChannel {
    FrontLeft,
    FrontRight,
    FrontCenter,
    LowFrequency,
    BackLeft,
    BackRight,
    SideLeft,
    SideRight,
}

impl PcmChannel {
    /// 按声道数给出标准布局
    pub fn default_map(channels: u16) -> Vec<PcmChannel> {
        use PcmChannel::*;
        match channels {
            1 => vec![FrontCenter],
            2 => vec![FrontLeft, FrontRight],
            3 => vec![FrontLeft, FrontRight, LowFrequency],
            4 => vec![FrontLeft, FrontRight, BackLeft, BackRight],
            5 => vec![FrontLeft, FrontRight, FrontCenter, BackLeft, BackRight],
            6 => vec![FrontLeft, FrontRight, FrontCenter, LowFrequency, BackLeft, BackRight],
            8 => vec![
                FrontLeft,
                FrontRight,
                FrontCenter,
                LowFrequency,
                BackLeft,
                BackRight,
                SideLeft,
                SideRight,
            ],
            _ => vec![FrontLeft, FrontRight],
        }
    }
}

/// 音频输出设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDevice {
    /// HDMI 输出（支持直通）
    Hdmi,
    /// 本地模拟输出（不支持直通）
    Local,
}

impl AudioDevice {
    pub fn name(&self) -> &'static str {
        match self {
            AudioDevice::Hdmi => "hdmi",
            AudioDevice::Local => "local",
        }
    }
}

/// 流参数快照
///
/// 解封装器和解码管线之间交换的值对象，用于检测流内配置变化。
/// 视频相关字段只在打开阶段使用。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamHints {
    pub codec: CodecId,
    /// 声道数
    pub channels: u16,
    /// 采样率 (Hz)
    pub samplerate: u32,
    /// 位深
    pub bitspersample: u32,
    /// 码率 (bit/s)
    pub bitrate: u32,
    /// 视频宽度（像素）
    pub width: u32,
    /// 视频高度（像素）
    pub height: u32,
    /// 视频帧率
    pub fps: f32,
    /// 容器报告的总帧数（可能为 0）
    pub nb_frames: i64,
}

impl Default for StreamHints {
    fn default() -> Self {
        Self {
            codec: CodecId::Unknown,
            channels: 0,
            samplerate: 0,
            bitspersample: 0,
            bitrate: 0,
            width: 0,
            height: 0,
            fps: 0.0,
            nb_frames: 0,
        }
    }
}

/// 解封装出的数据包
///
/// 单一所有者：数据包要么在某个队列里，要么在一次解码调用手中，
/// 用完即 drop，不存在跨线程共享引用。
#[derive(Debug, Clone)]
pub struct Packet {
    /// 压缩数据
    pub data: Vec<u8>,
    /// 显示时间戳（微秒，None 表示未知）
    pub pts: Option<i64>,
    /// 解码时间戳（微秒，None 表示未知）
    pub dts: Option<i64>,
    /// 所属流索引
    pub stream_index: usize,
    /// 流类型
    pub kind: StreamKind,
    /// 读取时的流参数快照
    pub hints: StreamHints,
}

impl Packet {
    /// 负载大小（字节），队列字节记账以此为准
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// 播放器事件
///
/// 由调度循环线程经 channel 投递。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// 循环回绕，携带新的循环时间偏移（微秒）
    Loop { offset_us: i64 },
    /// 播放结束（非循环模式）
    End,
}

/// 播放器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// 媒体路径或流 URL
    pub video_path: String,

    /// 是否启用音频
    pub enable_audio: bool,

    /// 是否循环播放
    pub enable_looping: bool,

    /// 音频走 HDMI（false 走本地模拟输出）
    pub use_hdmi_for_audio: bool,

    /// 初始音量 0.0 - 1.0
    pub initial_volume: f32,

    /// 起播位置（秒）
    pub start_time_secs: i32,

    /// 允许压缩音频直通
    pub enable_passthrough: bool,

    /// 允许固件硬解音频
    pub enable_hw_audio_decode: bool,

    /// 下混时增益补偿
    pub boost_on_downmix: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            video_path: String::new(),
            enable_audio: true,
            enable_looping: false,
            use_hdmi_for_audio: true,
            initial_volume: 1.0,
            start_time_secs: 0,
            enable_passthrough: false,
            enable_hw_audio_decode: false,
            boost_on_downmix: true,
        }
    }
}

impl PlayerSettings {
    /// 从 JSON 文件加载配置
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&text)?;
        Ok(settings)
    }

    /// 保存配置到 JSON 文件
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}
