// 循环视频播放内核：解封装调度、音频解码管线和共享时钟同步

pub mod core;
pub mod player;

pub use crate::core::{
    AudioDevice, CodecId, Packet, PassthroughMode, PcmChannel, PlayerError, PlayerEvent,
    PlayerSettings, Result, SharedClock, StreamHints, StreamKind,
};
pub use crate::player::{
    AudioCodec, AudioOptions, AudioPlayer, AudioRenderer, MediaReader, PlayerEngine,
    VideoPipeline,
};
