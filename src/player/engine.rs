use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info, warn};
use parking_lot::Mutex;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::core::error::PlayerError;
use crate::core::{
    AudioDevice, Packet, PlayerEvent, PlayerSettings, Result, SharedClock, StreamHints,
    StreamKind, DEVICE_VOLUME_MAX, DEVICE_VOLUME_MIN,
};
use crate::player::audio_codec::AudioCodec;
use crate::player::audio_player::{AudioOptions, AudioPlayer};
use crate::player::audio_sink::AudioRenderer;
use crate::player::reader::{MediaReader, SharedReader};
use crate::player::video::VideoPipeline;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 0.0..1.0 线性映射到设备音量 -6000..6000（百分之一分贝）
fn volume_to_device(volume: f32) -> i64 {
    let v = volume.clamp(0.0, 1.0);
    (v * 12_000.0 - 6_000.0) as i64
}

/// 设备音量映射回 0.0..1.0，保留两位小数
fn device_to_volume(device_value: i64) -> f32 {
    let clamped = device_value.clamp(DEVICE_VOLUME_MIN, DEVICE_VOLUME_MAX) as f32;
    let v = (clamped + 6_000.0) / 12_000.0;
    (v * 100.0 + 0.5).floor() / 100.0
}

/// 调度线程的工作集，open_player() 时从引擎状态克隆出来
struct DispatchContext {
    reader: SharedReader,
    video: Arc<Mutex<Box<dyn VideoPipeline>>>,
    audio: Option<Arc<AudioPlayer>>,
    clock: SharedClock,
    do_stop: Arc<AtomicBool>,
    has_video: bool,
    has_audio: Arc<AtomicBool>,
    do_looping: bool,
    total_frames: i64,
    start_frame: Arc<AtomicI32>,
    loop_count: Arc<AtomicU64>,
    event_tx: Sender<PlayerEvent>,
}

/// 播放引擎
///
/// 职责划分：
/// - setup() 探测媒体并确定流布局
/// - open_player() 打开视频/音频管线并启动调度线程
/// - 调度线程是唯一的读包者，按流路由到各管线
/// - 控制面（暂停/速度/音量/查询）从调用方线程直接操作共享时钟和管线
pub struct PlayerEngine {
    settings: PlayerSettings,
    reader: SharedReader,
    clock: SharedClock,
    video: Option<Arc<Mutex<Box<dyn VideoPipeline>>>>,
    audio: Option<Arc<AudioPlayer>>,
    has_video: bool,
    has_audio: Arc<AtomicBool>,
    did_audio_open: bool,
    b_playing: bool,
    video_hints: StreamHints,
    audio_hints: StreamHints,
    n_frames: i64,
    duration_secs: f32,
    start_pts: i64,
    start_frame: Arc<AtomicI32>,
    loop_count: Arc<AtomicU64>,
    speed_multiplier: i32,
    do_stop: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    event_tx: Sender<PlayerEvent>,
    event_rx: Receiver<PlayerEvent>,
}

/// 打开媒体并校验视频参数可用
///
/// skip_probe 为 true 时走快速路径，失败由调用方换完整探测重试。
fn probe(reader: &mut dyn MediaReader, path: &str, skip_probe: bool) -> bool {
    let begin = Instant::now();
    if let Err(e) = reader.open(path, skip_probe) {
        warn!("{} ⚠ 打开媒体失败 (skip_probe={}): {}", log_ctx(), skip_probe, e);
        return false;
    }
    info!(
        "{} 📄 媒体探测耗时 {}ms (skip_probe={})",
        log_ctx(),
        begin.elapsed().as_millis(),
        skip_probe
    );
    match reader.hints(StreamKind::Video) {
        Some(hints) => hints.width > 0 || hints.height > 0,
        None => false,
    }
}

impl PlayerEngine {
    /// 探测媒体，确定流布局，准备共享时钟
    ///
    /// 先走跳过 AV 探测的快速路径，失败（网络流常见）再走完整探测。
    /// 没有视频流直接失败；音频流存在与否决定 has_audio，
    /// 再被 enable_audio 开关约束。
    pub fn setup(settings: PlayerSettings, mut reader: Box<dyn MediaReader>) -> Result<Self> {
        let mut passed = probe(reader.as_mut(), &settings.video_path, true);
        if !passed {
            warn!("{} ⚠ 快速探测失败（可能是网络流），改走完整探测", log_ctx());
            passed = probe(reader.as_mut(), &settings.video_path, false);
        }
        if !passed {
            error!("{} ❌ 打开媒体失败: {}", log_ctx(), settings.video_path);
            return Err(PlayerError::OpenError(settings.video_path.clone()));
        }

        let has_video = reader.num_streams(StreamKind::Video) > 0;
        let mut has_audio = reader.num_streams(StreamKind::Audio) > 0;
        let audio_hints = if has_audio {
            reader.hints(StreamKind::Audio).unwrap_or_default()
        } else {
            StreamHints::default()
        };
        if !settings.enable_audio {
            has_audio = false;
        }
        if !has_video {
            error!("{} ❌ 未检测到视频流", log_ctx());
            return Err(PlayerError::NoVideoStream);
        }
        let video_hints = reader.hints(StreamKind::Video).unwrap_or_default();

        info!(
            "{} 🎬 媒体就绪: {}x{} fps={:.2} 音频={}",
            log_ctx(),
            video_hints.width,
            video_hints.height,
            video_hints.fps,
            has_audio
        );

        let (event_tx, event_rx) = unbounded();

        Ok(Self {
            settings,
            reader: Arc::new(Mutex::new(reader)),
            clock: SharedClock::new(),
            video: None,
            audio: None,
            has_video,
            has_audio: Arc::new(AtomicBool::new(has_audio)),
            did_audio_open: false,
            b_playing: false,
            video_hints,
            audio_hints,
            n_frames: 0,
            duration_secs: 0.0,
            start_pts: 0,
            start_frame: Arc::new(AtomicI32::new(0)),
            loop_count: Arc::new(AtomicU64::new(0)),
            speed_multiplier: 1,
            do_stop: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            event_tx,
            event_rx,
        })
    }

    /// 打开管线并启动调度线程
    ///
    /// 视频管线打不开整个 open 失败；音频管线打不开降级为
    /// 无声播放并继续。起播位置非零且容器可 seek 时先定位，
    /// 时钟从定位落点启动。
    pub fn open_player(
        &mut self,
        mut video: Box<dyn VideoPipeline>,
        audio_codec: Box<dyn AudioCodec>,
        audio_sink: Box<dyn AudioRenderer>,
    ) -> Result<()> {
        let did_video_open = video.open(&self.video_hints, &self.clock);
        self.b_playing = did_video_open;

        if self.has_audio.load(Ordering::SeqCst) {
            let device = if self.settings.use_hdmi_for_audio {
                AudioDevice::Hdmi
            } else {
                AudioDevice::Local
            };
            let options = AudioOptions {
                device,
                enable_passthrough: self.settings.enable_passthrough,
                enable_hw_decode: self.settings.enable_hw_audio_decode,
                boost_on_downmix: self.settings.boost_on_downmix,
            };
            match AudioPlayer::open(
                self.audio_hints,
                self.clock.clone(),
                Arc::clone(&self.reader),
                audio_codec,
                audio_sink,
                options,
            ) {
                Ok(player) => {
                    self.audio = Some(Arc::new(player));
                    self.did_audio_open = true;
                    self.set_volume(self.settings.initial_volume);
                }
                Err(e) => {
                    error!("{} ❌ 音频管线打开失败，继续无声播放: {}", log_ctx(), e);
                    self.has_audio.store(false, Ordering::SeqCst);
                }
            }
        }

        if !self.b_playing {
            error!("{} ❌ 视频管线打开失败", log_ctx());
            return Err(PlayerError::OpenError("视频管线".to_string()));
        }

        let fps = video.fps();
        if self.video_hints.nb_frames > 0 && fps > 0.0 {
            self.n_frames = self.video_hints.nb_frames;
            self.duration_secs = self.video_hints.nb_frames as f32 / fps;
            info!(
                "{} 📄 时长 {:.2}s（{} 帧 @ {:.2}fps）",
                log_ctx(),
                self.duration_secs,
                self.n_frames,
                fps
            );
        }

        if self.settings.start_time_secs != 0 && self.reader.lock().can_seek() {
            let start_secs = self.settings.start_time_secs;
            match self.reader.lock().seek_time(i64::from(start_secs) * 1000, false) {
                Ok(pts) => {
                    self.start_pts = pts;
                    self.start_frame
                        .store(fps as i32 * start_secs, Ordering::SeqCst);
                    info!(
                        "{} ⏩ 起始定位到 {}s，起始帧 {}",
                        log_ctx(),
                        start_secs,
                        self.start_frame.load(Ordering::SeqCst)
                    );
                }
                Err(e) => {
                    error!("{} ❌ 起始定位到 {}s 失败: {}", log_ctx(), start_secs, e);
                }
            }
        }

        self.clock.start(self.start_pts);

        let video = Arc::new(Mutex::new(video));
        self.video = Some(Arc::clone(&video));

        let ctx = DispatchContext {
            reader: Arc::clone(&self.reader),
            video,
            audio: self.audio.clone(),
            clock: self.clock.clone(),
            do_stop: Arc::clone(&self.do_stop),
            has_video: self.has_video,
            has_audio: Arc::clone(&self.has_audio),
            do_looping: self.settings.enable_looping,
            total_frames: self.n_frames,
            start_frame: Arc::clone(&self.start_frame),
            loop_count: Arc::clone(&self.loop_count),
            event_tx: self.event_tx.clone(),
        };
        self.thread_handle = Some(thread::spawn(move || {
            Self::dispatch_loop(ctx);
        }));

        info!("{} ✅ 播放器已启动", log_ctx());
        Ok(())
    }

    /// 调度循环（在独立线程中运行）
    ///
    /// 单线程读包，按流路由。关键次序：
    /// - 缓存排空状态只在没读到包时评估
    /// - EOF 且缓存排空才向视频管线提交 EOS
    /// - 循环模式下回绕 seek 后重算时间偏移，偏移变化才发通知，
    ///   容器级回绕标志会补发一次
    /// - 管线队列满时保留在手上的包，小睡后整轮重试
    fn dispatch_loop(ctx: DispatchContext) {
        info!("{} 🎬 调度线程启动", log_ctx());

        let mut held: Option<Packet> = None;
        let mut loop_offset: i64 = 0;
        let mut previous_loop_offset: i64 = 0;

        while !ctx.do_stop.load(Ordering::SeqCst) {
            if held.is_none() {
                held = ctx.reader.lock().read();
                if ctx.do_looping {
                    if let Some(pkt) = held.as_mut() {
                        if let Some(pts) = pkt.pts {
                            pkt.pts = Some(pts + loop_offset);
                            pkt.dts = pkt.dts.map(|dts| dts + loop_offset);
                        }
                    }
                }
            }

            let mut cache_empty = false;
            if held.is_none() {
                if ctx.has_audio.load(Ordering::SeqCst) {
                    let audio_cached = ctx
                        .audio
                        .as_ref()
                        .map(|audio| audio.cached_bytes())
                        .unwrap_or(0);
                    cache_empty = audio_cached == 0 && !ctx.video.lock().cached();
                } else {
                    cache_empty = !ctx.video.lock().cached();
                }
            }

            let is_eof = ctx.reader.lock().is_eof();

            if is_eof && held.is_none() && cache_empty {
                ctx.video.lock().submit_eos();
            }

            if ctx.do_looping && is_eof && held.is_none() {
                if cache_empty {
                    if let Err(e) = ctx.reader.lock().seek_time(0, true) {
                        error!("{} ❌ 循环回绕 seek 失败: {}", log_ctx(), e);
                    }
                    held = ctx.reader.lock().read();

                    let source_pts = if ctx.has_audio.load(Ordering::SeqCst) {
                        ctx.audio.as_ref().and_then(|audio| audio.current_pts())
                    } else if ctx.has_video {
                        ctx.video.lock().current_pts()
                    } else {
                        None
                    };
                    if let Some(pts) = source_pts {
                        loop_offset = pts;
                    }

                    if previous_loop_offset != loop_offset {
                        previous_loop_offset = loop_offset;
                        let n = ctx.loop_count.fetch_add(1, Ordering::SeqCst) + 1;
                        info!(
                            "{} 🔄 循环回绕 #{}: offset={}us",
                            log_ctx(),
                            n,
                            loop_offset
                        );
                        let _ = ctx.event_tx.send(PlayerEvent::Loop {
                            offset_us: loop_offset,
                        });
                    }
                    if ctx.reader.lock().take_rewound() {
                        let _ = ctx.event_tx.send(PlayerEvent::Loop {
                            offset_us: loop_offset,
                        });
                    }
                } else {
                    ctx.clock.sleep(10);
                    continue;
                }
            } else if !ctx.do_looping && is_eof && held.is_none() && cache_empty {
                if ctx.video.lock().eos() {
                    info!("{} ⏹ 播放到文件末尾", log_ctx());
                    let _ = ctx.event_tx.send(PlayerEvent::End);
                    break;
                }
            }

            // 循环播放下帧计数随回绕清零
            if ctx.do_looping {
                let current = i64::from(
                    ctx.video.lock().current_frame() + ctx.start_frame.load(Ordering::SeqCst),
                );
                if current >= ctx.total_frames {
                    ctx.video.lock().reset_frame_counter();
                    ctx.start_frame.store(0, Ordering::SeqCst);
                }
            }

            // 音频解码链故障时降级为纯视频
            if ctx.has_audio.load(Ordering::SeqCst) {
                if let Some(audio) = ctx.audio.as_ref() {
                    if audio.has_error() {
                        error!("{} ❌ 音频管线故障，降级为无声播放", log_ctx());
                        ctx.has_audio.store(false, Ordering::SeqCst);
                    }
                }
            }

            // 路由：视频按活动流校验，音频按类型，其余丢弃
            if let Some(pkt) = held.take() {
                let is_video = ctx.has_video
                    && ctx
                        .reader
                        .lock()
                        .is_active(StreamKind::Video, pkt.stream_index);
                if is_video {
                    if let Err(pkt) = ctx.video.lock().add_packet(pkt) {
                        held = Some(pkt);
                        ctx.clock.sleep(10);
                    }
                } else if pkt.kind == StreamKind::Audio && ctx.has_audio.load(Ordering::SeqCst) {
                    if let Some(audio) = ctx.audio.as_ref() {
                        if let Err(pkt) = audio.add_packet(pkt) {
                            held = Some(pkt);
                            ctx.clock.sleep(10);
                        }
                    }
                }
            } else {
                ctx.clock.sleep(10);
            }
        }

        info!("{} 🛑 调度线程退出", log_ctx());
    }

    /// 事件接收端，可多次调用（接收端可克隆）
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.event_rx.clone()
    }

    pub fn set_paused(&self, paused: bool) {
        if paused {
            self.clock.pause();
        } else {
            self.clock.resume();
        }
    }

    pub fn pause(&self) {
        self.set_paused(true);
    }

    pub fn play(&self) {
        self.set_paused(false);
    }

    /// 暂停后推进一帧
    pub fn step_frame_forward(&self) {
        if !self.is_paused() {
            self.set_paused(true);
        }
        self.clock.step(1);
    }

    /// 恢复正常速度
    pub fn set_normal_speed(&mut self) {
        self.speed_multiplier = 1;
        let speed = crate::core::clock::NORMAL_PLAY_SPEED;
        self.clock.set_speed(speed);
        self.reader.lock().set_speed(speed);
    }

    /// 加速一档，倍率上限 4
    pub fn increase_speed(&mut self) -> i32 {
        if self.speed_multiplier + 1 <= 4 {
            self.speed_multiplier += 1;
            let speed = crate::core::clock::NORMAL_PLAY_SPEED * self.speed_multiplier;
            self.clock.set_speed(speed);
            self.reader.lock().set_speed(speed);
        }
        self.speed_multiplier
    }

    /// 减速一档，跳过 0 直接进入倒放，低于 -8 回到正常速度
    pub fn rewind(&mut self) {
        if self.speed_multiplier - 1 == 0 {
            self.speed_multiplier = -1;
        } else {
            self.speed_multiplier -= 1;
        }
        if self.speed_multiplier < -8 {
            self.speed_multiplier = 1;
        }
        let speed = crate::core::clock::NORMAL_PLAY_SPEED * self.speed_multiplier;
        self.clock.set_speed(speed);
        self.reader.lock().set_speed(speed);
    }

    pub fn speed_multiplier(&self) -> i32 {
        self.speed_multiplier
    }

    /// 设置音量（0.0 - 1.0，超出自动截断）
    pub fn set_volume(&self, volume: f32) {
        if !self.has_audio.load(Ordering::SeqCst) || !self.did_audio_open {
            return;
        }
        if let Some(audio) = self.audio.as_ref() {
            audio.set_volume(volume_to_device(volume));
        }
    }

    /// 当前音量（0.0 - 1.0，两位小数），无音频时为 0
    pub fn volume(&self) -> f32 {
        if !self.has_audio.load(Ordering::SeqCst) || !self.did_audio_open {
            return 0.0;
        }
        match self.audio.as_ref() {
            Some(audio) => device_to_volume(audio.volume()),
            None => 0.0,
        }
    }

    pub fn increase_volume(&self) {
        if !self.has_audio.load(Ordering::SeqCst) || !self.did_audio_open {
            return;
        }
        self.set_volume(self.volume() + 0.1);
    }

    pub fn decrease_volume(&self) {
        if !self.has_audio.load(Ordering::SeqCst) || !self.did_audio_open {
            return;
        }
        self.set_volume(self.volume() - 0.1);
    }

    pub fn is_playing(&self) -> bool {
        self.b_playing
    }

    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    /// 当前帧序号（含起播定位的帧偏移）
    pub fn current_frame(&self) -> i32 {
        match self.video.as_ref() {
            Some(video) => video.lock().current_frame() + self.start_frame.load(Ordering::SeqCst),
            None => 0,
        }
    }

    pub fn total_frames(&self) -> i64 {
        self.n_frames
    }

    pub fn is_looping(&self) -> bool {
        self.settings.enable_looping
    }

    /// 已完成的循环回绕次数
    pub fn loop_count(&self) -> u64 {
        self.loop_count.load(Ordering::SeqCst)
    }

    /// 当前媒体时间（微秒），未在播放时为 0
    pub fn media_time_us(&self) -> i64 {
        if self.is_playing() {
            self.clock.media_time_us()
        } else {
            0
        }
    }

    pub fn duration_secs(&self) -> f32 {
        self.duration_secs
    }

    pub fn fps(&self) -> f32 {
        match self.video.as_ref() {
            Some(video) => video.lock().fps(),
            None => 0.0,
        }
    }

    pub fn width(&self) -> u32 {
        self.video_hints.width
    }

    pub fn height(&self) -> u32 {
        self.video_hints.height
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    /// 停止调度线程并释放所有管线。可重复调用。
    pub fn close(&mut self) {
        if self.do_stop.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("{} 🛑 PlayerEngine::close() called", log_ctx());

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        self.b_playing = false;

        if let Some(audio) = self.audio.take() {
            audio.close();
        }
        self.reader.lock().close();
        self.clock.pause();
    }
}

impl Drop for PlayerEngine {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            warn!(
                "{} ⚠ PlayerEngine 被 drop，但未调用 close()，正在尝试优雅停止",
                log_ctx()
            );
        }
        self.close();
    }
}
