use crate::core::{AudioDevice, PassthroughMode, PcmChannel, SharedClock, StreamHints};
use crate::player::audio_sink::AudioRenderer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam::queue::SegQueue;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 输出缓冲容量（按 S16 字节计），约等于 2.7 秒的 48kHz 立体声
const BUFFER_CAPACITY: usize = 512 * 1024;

/// 5.1 下混到立体声时的补偿增益（约 +3dB）
const DOWNMIX_BOOST: f32 = 1.414;

/// cpal 音频输出
///
/// 交织 S16 字节流转成 f32 样本进入无锁队列，
/// 设备回调按当前增益取样播放，欠载补静音。
pub struct CpalRenderer {
    stream: Option<Stream>,
    buffer: Arc<SegQueue<f32>>,
    gain: Arc<Mutex<f32>>,
    volume: i64,
    boost: f32,
    eos_flag: Arc<AtomicBool>,
    is_open: bool,
}

// cpal::Stream 不是 Send，但流的创建、使用和销毁都由持有本结构的
// 音频管线串行驱动，不会出现并发访问
unsafe impl Send for CpalRenderer {}

impl CpalRenderer {
    pub fn new() -> Self {
        Self {
            stream: None,
            buffer: Arc::new(SegQueue::new()),
            gain: Arc::new(Mutex::new(1.0)),
            volume: 0,
            boost: 1.0,
            eos_flag: Arc::new(AtomicBool::new(false)),
            is_open: false,
        }
    }

    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;
        let channels_match = config.channels == supported.channels();
        rate_in_range && channels_match
    }

    /// 协商设备配置：优先请求值，不支持则按标准配置回退
    fn negotiate_config(device: &cpal::Device, samplerate: u32, channels: u16) -> Option<StreamConfig> {
        let requested = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(samplerate),
            buffer_size: cpal::BufferSize::Default,
        };

        let supported = device.supported_output_configs().ok()?;
        for candidate in supported {
            if Self::is_config_compatible(&requested, &candidate) {
                return Some(requested);
            }
        }

        warn!(
            "⚠ 音频设备不支持 {} Hz, {} 声道，按标准配置回退",
            samplerate, channels
        );
        let fallbacks = [(48000, 2), (44100, 2), (48000, 1), (44100, 1)];
        for (fb_rate, fb_channels) in fallbacks {
            let fb_config = StreamConfig {
                channels: fb_channels,
                sample_rate: cpal::SampleRate(fb_rate),
                buffer_size: cpal::BufferSize::Default,
            };
            let supported = device.supported_output_configs().ok()?;
            for candidate in supported {
                if Self::is_config_compatible(&fb_config, &candidate) {
                    info!("✅ 使用回退配置: {} Hz, {} 声道", fb_rate, fb_channels);
                    return Some(fb_config);
                }
            }
        }
        None
    }

    /// 设备音量（百分之一分贝）换算成线性增益
    fn device_gain(&self) -> f32 {
        10f32.powf(self.volume as f32 / 2000.0) * self.boost
    }
}

impl Default for CpalRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioRenderer for CpalRenderer {
    #[allow(clippy::too_many_arguments)]
    fn init(
        &mut self,
        device: AudioDevice,
        channel_map: &[PcmChannel],
        hints: &StreamHints,
        _clock: &SharedClock,
        passthrough: PassthroughMode,
        hw_decode: bool,
        boost_on_downmix: bool,
    ) -> bool {
        if passthrough.is_active() {
            error!("❌ cpal 输出不支持 IEC 61937 直通");
            return false;
        }
        if hw_decode {
            error!("❌ cpal 输出没有硬件解码通路");
            return false;
        }

        info!(
            "初始化音频输出 [{}]: {} Hz, {} 声道 (map {}ch)",
            device.name(),
            hints.samplerate,
            hints.channels,
            channel_map.len()
        );

        let host = cpal::default_host();
        let output_device = match host.default_output_device() {
            Some(d) => d,
            None => {
                error!("❌ 无法找到音频输出设备");
                return false;
            }
        };
        debug!("使用音频设备: {}", output_device.name().unwrap_or_default());

        let config = match Self::negotiate_config(&output_device, hints.samplerate, hints.channels) {
            Some(c) => c,
            None => {
                error!(
                    "❌ 音频设备不支持任何标准配置（原请求 {} Hz, {} 声道）",
                    hints.samplerate, hints.channels
                );
                return false;
            }
        };

        self.boost = if boost_on_downmix && config.channels < hints.channels {
            warn!(
                "⚠ 设备只有 {} 声道（源 {} 声道），应用下混补偿增益",
                config.channels, hints.channels
            );
            DOWNMIX_BOOST
        } else {
            1.0
        };

        let buffer = Arc::clone(&self.buffer);
        let gain = Arc::clone(&self.gain);
        let stream = match output_device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let g = *gain.lock();
                for sample in data.iter_mut() {
                    *sample = match buffer.pop() {
                        Some(value) => (value * g).clamp(-1.0, 1.0),
                        None => 0.0,
                    };
                }
            },
            move |err| {
                eprintln!("音频流错误: {}", err);
            },
            None,
        ) {
            Ok(s) => s,
            Err(e) => {
                error!("❌ 创建音频流失败: {}", e);
                return false;
            }
        };

        if let Err(e) = stream.play() {
            error!("❌ 启动音频流失败: {}", e);
            return false;
        }

        *self.gain.lock() = self.device_gain();
        self.stream = Some(stream);
        self.eos_flag.store(false, Ordering::SeqCst);
        self.is_open = true;
        info!("✅ 音频输出已启动: {} Hz, {} 声道", config.sample_rate.0, config.channels);
        true
    }

    fn deinit(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("⏹ 音频输出已停止");
        }
        while self.buffer.pop().is_some() {}
        self.is_open = false;
    }

    fn add_packets(&mut self, data: &[u8], _dts: Option<i64>, _pts: Option<i64>) -> usize {
        if !self.is_open {
            return 0;
        }
        for pair in data.chunks_exact(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            self.buffer.push(f32::from(sample) / 32768.0);
        }
        data.len()
    }

    fn space(&self) -> usize {
        BUFFER_CAPACITY.saturating_sub(self.cached_bytes())
    }

    fn cached_bytes(&self) -> usize {
        // 队列中的每个 f32 样本来自 2 字节 S16
        self.buffer.len() * 2
    }

    fn submit_eos(&mut self) {
        self.eos_flag.store(true, Ordering::SeqCst);
    }

    fn eos(&self) -> bool {
        self.eos_flag.load(Ordering::SeqCst) && self.buffer.is_empty()
    }

    fn set_volume(&mut self, device_value: i64) {
        self.volume = device_value;
        *self.gain.lock() = self.device_gain();
    }

    fn volume(&self) -> i64 {
        self.volume
    }

    fn flush(&mut self) {
        while self.buffer.pop().is_some() {}
        self.eos_flag.store(false, Ordering::SeqCst);
    }
}

impl Drop for CpalRenderer {
    fn drop(&mut self) {
        self.deinit();
    }
}
