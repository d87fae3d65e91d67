// 播放器核心模块

pub mod packet_queue;
pub mod reader;       // 解封装读取器抽象接口
pub mod video;        // 视频管线抽象接口
pub mod audio_codec;  // 软件音频解码器抽象接口
pub mod audio_sink;   // 音频输出抽象接口
pub mod audio_player;
pub mod engine;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_reader;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_codec;
#[cfg(feature = "cpal")]
pub mod cpal_sink;

// 测试用的脚本化协作者
#[cfg(test)]
pub mod mock;

pub use audio_codec::AudioCodec;
pub use audio_player::{AudioOptions, AudioPlayer, MAX_DATA_SIZE};
pub use audio_sink::AudioRenderer;
pub use engine::PlayerEngine;
pub use packet_queue::PacketQueue;
pub use reader::{MediaReader, SharedReader};
pub use video::VideoPipeline;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg_codec::FfmpegAudioCodec;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg_reader::FfmpegReader;
#[cfg(feature = "cpal")]
pub use cpal_sink::CpalRenderer;
