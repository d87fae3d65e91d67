use crate::core::{CodecId, PcmChannel, PlayerError, Result, StreamHints};
use crate::player::audio_codec::AudioCodec;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, software, util};
use log::{debug, warn};

/// FFmpeg 软件音频解码器
///
/// 压缩包喂给解码器，产出帧统一重采样为交织 S16 字节流，
/// 由 take_data() 一次性取走。
pub struct FfmpegAudioCodec {
    decoder: Option<codec::decoder::Audio>,
    resampler: Option<software::resampling::Context>,
    pending: Vec<u8>,
    channels: u16,
    sample_rate: u32,
}

impl FfmpegAudioCodec {
    pub fn new() -> Self {
        Self {
            decoder: None,
            resampler: None,
            pending: Vec::new(),
            channels: 0,
            sample_rate: 0,
        }
    }

    fn ffmpeg_id(codec_id: CodecId) -> Option<codec::Id> {
        match codec_id {
            CodecId::Ac3 => Some(codec::Id::AC3),
            CodecId::Eac3 => Some(codec::Id::EAC3),
            CodecId::Dts => Some(codec::Id::DTS),
            CodecId::Mp3 => Some(codec::Id::MP3),
            CodecId::Aac => Some(codec::Id::AAC),
            CodecId::Flac => Some(codec::Id::FLAC),
            CodecId::Vorbis => Some(codec::Id::VORBIS),
            CodecId::Pcm => Some(codec::Id::PCM_S16LE),
            _ => None,
        }
    }

    /// 把一帧重采样成交织 S16 并追加到待取缓冲
    fn convert_frame(&mut self, frame: &util::frame::Audio) -> Result<()> {
        if self.resampler.is_none() {
            debug!(
                "🔧 初始化音频重采样器: {:?} {}Hz/{}ch → s16",
                frame.format(),
                frame.rate(),
                frame.channels()
            );
            self.resampler = Some(software::resampling::Context::get(
                frame.format(),
                frame.channel_layout(),
                frame.rate(),
                util::format::Sample::I16(util::format::sample::Type::Packed),
                frame.channel_layout(),
                frame.rate(),
            )?);
        }

        let mut converted = util::frame::Audio::empty();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.run(frame, &mut converted)?;
        }

        self.channels = converted.channels();
        self.sample_rate = converted.rate();

        let byte_len = converted.samples() * converted.channels() as usize * 2;
        self.pending
            .extend_from_slice(&converted.data(0)[..byte_len]);
        Ok(())
    }
}

impl Default for FfmpegAudioCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioCodec for FfmpegAudioCodec {
    fn open(&mut self, hints: &StreamHints) -> bool {
        let id = match Self::ffmpeg_id(hints.codec) {
            Some(id) => id,
            None => {
                warn!("⚠ 不支持的音频编码: {}", hints.codec.as_str());
                return false;
            }
        };
        let ffmpeg_codec = match ffmpeg::decoder::find(id) {
            Some(c) => c,
            None => {
                warn!("⚠ FFmpeg 没有 {} 解码器", id.name());
                return false;
            }
        };
        let context = codec::context::Context::new_with_codec(ffmpeg_codec);
        match context.decoder().audio() {
            Ok(decoder) => {
                debug!(
                    "音频解码器就绪: {} ({}ch @ {}Hz)",
                    id.name(),
                    hints.channels,
                    hints.samplerate
                );
                self.decoder = Some(decoder);
                self.resampler = None;
                self.pending.clear();
                self.channels = hints.channels;
                self.sample_rate = hints.samplerate;
                true
            }
            Err(e) => {
                warn!("⚠ 音频解码器打开失败: {}", e);
                false
            }
        }
    }

    fn close(&mut self) {
        self.decoder = None;
        self.resampler = None;
        self.pending.clear();
    }

    fn decode(&mut self, data: &[u8]) -> Result<usize> {
        let packet = ffmpeg::Packet::copy(data);

        {
            let decoder = self
                .decoder
                .as_mut()
                .ok_or_else(|| PlayerError::DecodeError("解码器未打开".to_string()))?;
            match decoder.send_packet(&packet) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => {
                    debug!("音频解码器收到 EOF（send_packet），执行 flush 并忽略本次包");
                    decoder.flush();
                    return Ok(data.len());
                }
                Err(e) => return Err(e.into()),
            }
        }

        loop {
            let mut decoded_frame = util::frame::Audio::empty();
            let received = match self.decoder.as_mut() {
                Some(decoder) => decoder.receive_frame(&mut decoded_frame),
                None => break,
            };
            match received {
                Ok(_) => self.convert_frame(&decoded_frame)?,
                Err(ffmpeg::Error::Other { errno: 11 }) => break, // EAGAIN
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(data.len())
    }

    fn take_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    fn reset(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.flush();
        }
        self.pending.clear();
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bits_per_sample(&self) -> u32 {
        16
    }

    fn channel_map(&self) -> Vec<PcmChannel> {
        PcmChannel::default_map(self.channels())
    }
}
