use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::core::error::PlayerError;
use crate::core::{
    AudioDevice, Packet, PassthroughMode, Result, SharedClock, StreamHints, StreamKind,
};
use crate::player::audio_codec::AudioCodec;
use crate::player::audio_sink::AudioRenderer;
use crate::player::packet_queue::PacketQueue;
use crate::player::reader::SharedReader;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 音频队列字节上限：3MB，超出即拒收，由调度循环退避重试
pub const MAX_DATA_SIZE: usize = 3 * 1024 * 1024;

/// 音频管线选项
#[derive(Debug, Clone, Copy)]
pub struct AudioOptions {
    pub device: AudioDevice,
    pub enable_passthrough: bool,
    pub enable_hw_decode: bool,
    pub boost_on_downmix: bool,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            device: AudioDevice::Hdmi,
            enable_passthrough: false,
            enable_hw_decode: false,
            boost_on_downmix: true,
        }
    }
}

/// 解码器锁保护的状态：软件解码器 + 输出设备 + 当前配置
///
/// 冲洗和重配置都要先拿到这把锁，才能安全打断在途解码。
struct DecoderState {
    codec: Box<dyn AudioCodec>,
    sink: Box<dyn AudioRenderer>,
    codec_open: bool,
    sink_open: bool,
    /// 最近一次配置采用的原始流参数
    hints: StreamHints,
    /// 重映射后的声道数，参数比较基准（避免 6->8 映射反复触发重建）
    effective_channels: u16,
    passthrough: PassthroughMode,
    hw_decode: bool,
    options: AudioOptions,
    clock: SharedClock,
    reader: SharedReader,
    codec_name: String,
}

/// 音频播放管线
///
/// 结构与视频侧对称：
/// - 调度循环通过 add_packet() 投包（队列锁）
/// - 独立消费线程取包解码并写输出（解码器锁）
/// - flush/close 从控制线程打断，先队列锁后解码器锁
pub struct AudioPlayer {
    queue: Arc<PacketQueue>,
    decoder: Arc<Mutex<DecoderState>>,
    current_pts: Arc<Mutex<Option<i64>>>,
    abort: Arc<AtomicBool>,
    error_flag: Arc<AtomicBool>,
    open_flag: AtomicBool,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    clock: SharedClock,
}

impl AudioPlayer {
    /// 打开音频管线：建立解码器和输出设备，启动消费线程
    pub fn open(
        hints: StreamHints,
        clock: SharedClock,
        reader: SharedReader,
        codec: Box<dyn AudioCodec>,
        sink: Box<dyn AudioRenderer>,
        options: AudioOptions,
    ) -> Result<Self> {
        let mut state = DecoderState {
            codec,
            sink,
            codec_open: false,
            sink_open: false,
            hints,
            effective_channels: 0,
            passthrough: PassthroughMode::None,
            hw_decode: false,
            options,
            clock: clock.clone(),
            reader,
            codec_name: String::new(),
        };
        configure(&mut state, &hints)?;

        let queue = Arc::new(PacketQueue::new(MAX_DATA_SIZE));
        let decoder = Arc::new(Mutex::new(state));
        let current_pts = Arc::new(Mutex::new(None));
        let abort = Arc::new(AtomicBool::new(false));
        let error_flag = Arc::new(AtomicBool::new(false));

        let thread_handle = {
            let queue = Arc::clone(&queue);
            let decoder = Arc::clone(&decoder);
            let current_pts = Arc::clone(&current_pts);
            let abort = Arc::clone(&abort);
            let error_flag = Arc::clone(&error_flag);
            thread::spawn(move || {
                consumer_loop(queue, decoder, current_pts, abort, error_flag);
            })
        };

        info!("{} 🔊 音频管线已启动", log_ctx());

        Ok(Self {
            queue,
            decoder,
            current_pts,
            abort,
            error_flag,
            open_flag: AtomicBool::new(true),
            thread_handle: Mutex::new(Some(thread_handle)),
            clock,
        })
    }

    /// 入队一个音频包
    ///
    /// 队列满或管线已关闭时原样退还，调度循环退避后重试。
    pub fn add_packet(&self, pkt: Packet) -> std::result::Result<(), Packet> {
        if self.abort.load(Ordering::SeqCst) || !self.open_flag.load(Ordering::SeqCst) {
            return Err(pkt);
        }
        self.queue.push(pkt)
    }

    /// 清空队列并标记在途包丢弃，输出缓冲同步清空
    pub fn flush(&self) {
        let decoder = Arc::clone(&self.decoder);
        let current_pts = Arc::clone(&self.current_pts);
        self.queue.flush_with(|| {
            let mut state = decoder.lock();
            *current_pts.lock() = None;
            if state.sink_open {
                state.sink.flush();
            }
        });
        debug!("{} 🧹 音频队列已冲洗", log_ctx());
    }

    /// 队列空且输出已排空才算结束
    ///
    /// 先读队列再取解码器锁，与 flush 的固定加锁顺序（队列→解码器）不冲突。
    pub fn eos(&self) -> bool {
        let queue_empty = self.queue.is_empty();
        let state = self.decoder.lock();
        queue_empty && (!state.sink_open || state.sink.eos())
    }

    /// 向输出提交流结束标记
    pub fn submit_eos(&self) {
        let mut state = self.decoder.lock();
        if state.sink_open {
            state.sink.submit_eos();
        }
    }

    /// 等待输出排空，最多 2 秒
    pub fn wait_completion(&self) {
        let mut timeout_ms: i64 = 2_000;
        loop {
            if self.eos() {
                debug!("{} ✅ 音频输出已排空", log_ctx());
                break;
            }
            if timeout_ms <= 0 {
                warn!("{} ⚠ 等待音频排空超时", log_ctx());
                break;
            }
            self.clock.sleep(50);
            timeout_ms -= 50;
        }
    }

    /// 队列中缓存的字节数
    pub fn cached_bytes(&self) -> usize {
        self.queue.size()
    }

    /// 最近一个下发包的播放时间戳（微秒）
    pub fn current_pts(&self) -> Option<i64> {
        *self.current_pts.lock()
    }

    /// 设置设备音量（-6000..6000，百分之一分贝）
    pub fn set_volume(&self, device_value: i64) {
        let mut state = self.decoder.lock();
        if state.sink_open {
            state.sink.set_volume(device_value);
        }
    }

    /// 当前设备音量，输出未打开时为 0
    pub fn volume(&self) -> i64 {
        let state = self.decoder.lock();
        if state.sink_open {
            state.sink.volume()
        } else {
            0
        }
    }

    /// 解码链重建失败后置位，引擎据此降级为无音频播放
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.open_flag.load(Ordering::SeqCst)
    }

    /// 关闭管线：停线程、清队列、释放解码器和输出。可重复调用。
    pub fn close(&self) {
        if !self.open_flag.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("{} 🛑 AudioPlayer::close() called", log_ctx());

        self.abort.store(true, Ordering::SeqCst);
        self.flush();
        self.queue.close();

        if let Some(handle) = self.thread_handle.lock().take() {
            let _ = handle.join();
        }

        let mut state = self.decoder.lock();
        if state.sink_open {
            state.sink.deinit();
            state.sink_open = false;
        }
        if state.codec_open {
            state.codec.close();
            state.codec_open = false;
        }
        drop(state);
        *self.current_pts.lock() = None;
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        if self.open_flag.load(Ordering::SeqCst) {
            warn!("{} ⚠ AudioPlayer 被 drop，但未调用 close()，正在尝试优雅停止", log_ctx());
            self.close();
        }
    }
}

/// 按流参数建立解码链：先软件解码器，后输出设备
///
/// 直通判定：仅当允许直通、输出不是本地模拟口、且编码在
/// AC-3/E-AC-3/DTS 允许表内。硬件解码只在非直通时考虑。
fn configure(state: &mut DecoderState, hints: &StreamHints) -> Result<()> {
    if !state.codec.open(hints) {
        error!("{} ❌ 音频解码器打开失败: {}", log_ctx(), hints.codec.as_str());
        return Err(PlayerError::CodecOpenError(hints.codec.as_str().to_string()));
    }
    state.codec_open = true;
    state.hints = *hints;

    state.passthrough = if state.options.enable_passthrough {
        match state.options.device {
            AudioDevice::Local => PassthroughMode::None,
            AudioDevice::Hdmi => hints.codec.passthrough_mode(),
        }
    } else {
        PassthroughMode::None
    };

    state.hw_decode = !state.passthrough.is_active()
        && state.options.enable_hw_decode
        && hints.codec.supports_hw_decode();

    // PCM 路径 6 声道按 8 声道组提交
    let mut effective = *hints;
    if !state.passthrough.is_active() && !state.hw_decode && effective.channels == 6 {
        effective.channels = 8;
    }
    state.effective_channels = effective.channels;

    let channel_map = state.codec.channel_map();
    let opened = state.sink.init(
        state.options.device,
        &channel_map,
        &effective,
        &state.clock,
        state.passthrough,
        state.hw_decode,
        state.options.boost_on_downmix,
    );
    if !opened {
        error!(
            "{} ❌ 音频输出初始化失败: device={}",
            log_ctx(),
            state.options.device.name()
        );
        state.codec.close();
        state.codec_open = false;
        return Err(PlayerError::DeviceOpenError(
            state.options.device.name().to_string(),
        ));
    }
    state.sink_open = true;
    state.codec_name = state.reader.lock().codec_name(StreamKind::Audio);

    if state.passthrough.is_active() {
        info!(
            "{} 🔊 音频输出就绪(直通): codec={} channels={} samplerate={} bitspersample={}",
            log_ctx(),
            state.codec_name,
            2,
            effective.samplerate,
            effective.bitspersample
        );
    } else {
        info!(
            "{} 🔊 音频输出就绪: codec={} channels={} samplerate={} bitspersample={} hw_decode={}",
            log_ctx(),
            state.codec_name,
            effective.channels,
            effective.samplerate,
            effective.bitspersample,
            state.hw_decode
        );
    }
    Ok(())
}

/// 消费线程主循环
///
/// 两段式检查：队列阶段处理冲洗与取包，解码阶段持解码器锁后
/// 再查一次冲洗标志，保证冲洗发生在取包之后时在途包也被丢弃。
/// 输出暂时没空间时包保留在手上，下一轮直接重试。
fn consumer_loop(
    queue: Arc<PacketQueue>,
    decoder: Arc<Mutex<DecoderState>>,
    current_pts: Arc<Mutex<Option<i64>>>,
    abort: Arc<AtomicBool>,
    error_flag: Arc<AtomicBool>,
) {
    debug!("{} 🔊 音频消费线程启动", log_ctx());
    let mut held: Option<Packet> = None;

    loop {
        if held.is_none() {
            queue.wait_not_empty();
        }
        if abort.load(Ordering::SeqCst) {
            break;
        }

        // 队列阶段
        if queue.consume_flush() {
            held = None;
            continue;
        }
        if held.is_none() {
            held = queue.pop();
        }
        let Some(pkt) = held.take() else {
            continue;
        };

        // 解码阶段
        let mut state = decoder.lock();
        if queue.consume_flush() {
            continue;
        }
        match decode_packet(&mut state, &pkt, &current_pts) {
            Ok(true) => {}
            Ok(false) => {
                held = Some(pkt);
            }
            Err(e) => {
                error!("{} ❌ 音频解码链重建失败: {}", log_ctx(), e);
                error_flag.store(true, Ordering::SeqCst);
            }
        }
    }

    debug!("{} 🛑 音频消费线程退出", log_ctx());
}

/// 解码一个包
///
/// Ok(true) 表示包已消费（含主动丢弃），Ok(false) 表示输出暂时
/// 没有空间需要重试，Err 表示解码链重建失败。
fn decode_packet(
    state: &mut DecoderState,
    pkt: &Packet,
    current_pts: &Mutex<Option<i64>>,
) -> Result<bool> {
    // 上次重建失败后解码面不可用，吞掉数据等引擎降级
    if !state.codec_open || !state.sink_open {
        return Ok(true);
    }

    // 非活动流的包不进解码器
    if !state
        .reader
        .lock()
        .is_active(StreamKind::Audio, pkt.stream_index)
    {
        return Ok(true);
    }

    let mut channels = pkt.hints.channels;
    if !state.passthrough.is_active() && !state.hw_decode && channels == 6 {
        channels = 8;
    }

    // 码率变化只对 DTS/AC-3/E-AC-3 有意义
    let mut old_bitrate = state.hints.bitrate;
    let mut new_bitrate = pkt.hints.bitrate;
    if !state.hints.codec.is_bitrate_sensitive() {
        old_bitrate = 0;
        new_bitrate = 0;
    }

    // 流参数变化：关停输出和解码器后按新参数重建
    if state.hints.codec != pkt.hints.codec
        || state.effective_channels != channels
        || state.hints.samplerate != pkt.hints.samplerate
        || old_bitrate != new_bitrate
        || state.hints.bitspersample != pkt.hints.bitspersample
    {
        debug!(
            "{} 🔄 音频参数变化，重建解码链: {}/{}ch/{}Hz -> {}/{}ch/{}Hz",
            log_ctx(),
            state.hints.codec.as_str(),
            state.effective_channels,
            state.hints.samplerate,
            pkt.hints.codec.as_str(),
            channels,
            pkt.hints.samplerate
        );
        state.sink.deinit();
        state.sink_open = false;
        state.codec.close();
        state.codec_open = false;
        configure(state, &pkt.hints)?;
    }

    // 输出空间不足先小睡一次，仍不足则退回重试
    if state.sink.space() <= pkt.size() {
        state.clock.sleep(10);
    }
    if state.sink.space() <= pkt.size() {
        return Ok(false);
    }

    if pkt.pts.is_some() {
        *current_pts.lock() = pkt.pts;
    } else if pkt.dts.is_some() {
        *current_pts.lock() = pkt.dts;
    }
    let pts = *current_pts.lock();

    if !state.passthrough.is_active() && !state.hw_decode {
        // 软件解码：逐段喂入，消费长度异常视为失步，复位后丢弃剩余
        let mut offset = 0usize;
        while offset < pkt.data.len() {
            let remaining = &pkt.data[offset..];
            let len = match state.codec.decode(remaining) {
                Ok(len) => len,
                Err(e) => {
                    warn!("{} ⚠ 音频码流失步，复位解码器: {}", log_ctx(), e);
                    state.codec.reset();
                    break;
                }
            };
            if len > remaining.len() {
                warn!(
                    "{} ⚠ 音频解码消费长度异常 ({} > {})，复位解码器",
                    log_ctx(),
                    len,
                    remaining.len()
                );
                state.codec.reset();
                break;
            }
            offset += len;

            let decoded = state.codec.take_data();
            if decoded.is_empty() {
                if len == 0 {
                    // 无消费也无产出，避免空转
                    break;
                }
                continue;
            }

            let sent = state.sink.add_packets(&decoded, pkt.dts, pts);
            if sent != decoded.len() {
                error!(
                    "{} ❌ 音频输出写入不完整: sent={} decoded={}",
                    log_ctx(),
                    sent,
                    decoded.len()
                );
            }
        }
    } else {
        // 直通/硬解：压缩数据整包下发
        state.sink.add_packets(&pkt.data, pkt.dts, pkt.pts);
    }

    Ok(true)
}
