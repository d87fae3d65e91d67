// 测试用的协作者模拟实现：脚本化读取器、视频管线、音频解码器和输出

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::{
    AudioDevice, Packet, PassthroughMode, PcmChannel, PlayerError, Result, SharedClock,
    StreamHints, StreamKind,
};
use crate::player::audio_codec::AudioCodec;
use crate::player::audio_sink::AudioRenderer;
use crate::player::reader::MediaReader;
use crate::player::video::VideoPipeline;

/// 轮询等待条件成立，线程协作测试用
pub fn wait_until<F: Fn() -> bool>(cond: F, timeout_ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn audio_hints(codec: crate::core::CodecId, channels: u16, samplerate: u32, bitrate: u32) -> StreamHints {
    StreamHints {
        codec,
        channels,
        samplerate,
        bitspersample: 16,
        bitrate,
        ..StreamHints::default()
    }
}

pub fn video_hints(width: u32, height: u32, fps: f32, nb_frames: i64) -> StreamHints {
    StreamHints {
        codec: crate::core::CodecId::H264,
        width,
        height,
        fps,
        nb_frames,
        ..StreamHints::default()
    }
}

pub fn audio_packet(hints: StreamHints, size: usize, pts: Option<i64>) -> Packet {
    Packet {
        data: vec![0u8; size],
        pts,
        dts: pts,
        stream_index: 1,
        kind: StreamKind::Audio,
        hints,
    }
}

pub fn video_packet(size: usize, pts: Option<i64>) -> Packet {
    Packet {
        data: vec![0u8; size],
        pts,
        dts: pts,
        stream_index: 0,
        kind: StreamKind::Video,
        hints: StreamHints::default(),
    }
}

// ========== 读取器 ==========

pub struct ReaderState {
    /// 待读包脚本
    pub packets: VecDeque<Packet>,
    /// seek 后重新填充的包（循环测试用）
    pub refill_on_seek: Vec<Packet>,
    /// 脚本耗尽即 EOF
    pub eof_when_empty: bool,
    pub eof: bool,
    pub video_hints: Option<StreamHints>,
    pub audio_hints: Option<StreamHints>,
    pub video_streams: usize,
    pub audio_streams: usize,
    /// 脚本化的 open 结果，耗尽后默认成功
    pub open_results: VecDeque<bool>,
    /// 记录每次 open 的 skip_probe 参数
    pub open_calls: Vec<bool>,
    /// 记录 (position_ms, backward)
    pub seeks: Vec<(i64, bool)>,
    pub seek_result_pts: i64,
    pub rewound: bool,
    pub can_seek: bool,
    pub speeds: Vec<i32>,
    pub closed: bool,
    pub active_video_index: Option<usize>,
    pub active_audio_index: Option<usize>,
}

impl Default for ReaderState {
    fn default() -> Self {
        Self {
            packets: VecDeque::new(),
            refill_on_seek: Vec::new(),
            eof_when_empty: true,
            eof: false,
            video_hints: Some(video_hints(1280, 720, 25.0, 250)),
            audio_hints: Some(audio_hints(crate::core::CodecId::Aac, 2, 48_000, 0)),
            video_streams: 1,
            audio_streams: 1,
            open_results: VecDeque::new(),
            open_calls: Vec::new(),
            seeks: Vec::new(),
            seek_result_pts: 0,
            rewound: false,
            can_seek: true,
            speeds: Vec::new(),
            closed: false,
            active_video_index: Some(0),
            active_audio_index: Some(1),
        }
    }
}

pub struct MockReader {
    pub state: Arc<Mutex<ReaderState>>,
}

impl MockReader {
    pub fn new() -> (Self, Arc<Mutex<ReaderState>>) {
        let state = Arc::new(Mutex::new(ReaderState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl MediaReader for MockReader {
    fn open(&mut self, _path: &str, skip_probe: bool) -> Result<()> {
        let mut s = self.state.lock();
        s.open_calls.push(skip_probe);
        match s.open_results.pop_front() {
            Some(false) => Err(PlayerError::OpenError("mock open failed".to_string())),
            _ => Ok(()),
        }
    }

    fn read(&mut self) -> Option<Packet> {
        let mut s = self.state.lock();
        let pkt = s.packets.pop_front();
        if pkt.is_none() && s.eof_when_empty {
            s.eof = true;
        }
        pkt
    }

    fn hints(&self, kind: StreamKind) -> Option<StreamHints> {
        let s = self.state.lock();
        match kind {
            StreamKind::Video => s.video_hints,
            StreamKind::Audio => s.audio_hints,
            StreamKind::Unknown => None,
        }
    }

    fn num_streams(&self, kind: StreamKind) -> usize {
        let s = self.state.lock();
        match kind {
            StreamKind::Video => s.video_streams,
            StreamKind::Audio => s.audio_streams,
            StreamKind::Unknown => 0,
        }
    }

    fn is_active(&self, kind: StreamKind, stream_index: usize) -> bool {
        let s = self.state.lock();
        match kind {
            StreamKind::Video => s.active_video_index == Some(stream_index),
            StreamKind::Audio => s.active_audio_index == Some(stream_index),
            StreamKind::Unknown => false,
        }
    }

    fn seek_time(&mut self, position_ms: i64, backward: bool) -> Result<i64> {
        let mut s = self.state.lock();
        s.seeks.push((position_ms, backward));
        if !s.refill_on_seek.is_empty() {
            s.packets = s.refill_on_seek.clone().into();
            s.eof = false;
        }
        Ok(s.seek_result_pts)
    }

    fn can_seek(&self) -> bool {
        self.state.lock().can_seek
    }

    fn is_eof(&self) -> bool {
        self.state.lock().eof
    }

    fn set_speed(&mut self, speed: i32) {
        self.state.lock().speeds.push(speed);
    }

    fn take_rewound(&mut self) -> bool {
        let mut s = self.state.lock();
        let r = s.rewound;
        s.rewound = false;
        r
    }

    fn codec_name(&self, _kind: StreamKind) -> String {
        "mock".to_string()
    }

    fn close(&mut self) {
        self.state.lock().closed = true;
    }
}

// ========== 视频管线 ==========

pub struct VideoState {
    pub opened: bool,
    pub open_result: bool,
    /// 接受的包大小序列
    pub accepted: Vec<usize>,
    /// 模拟队列满：拒绝接下来 n 次投包
    pub reject_next: usize,
    pub cached: bool,
    pub eos: bool,
    pub eos_submitted: usize,
    pub current_frame: i32,
    pub frame_resets: usize,
    pub current_pts: Option<i64>,
    pub fps: f32,
}

impl Default for VideoState {
    fn default() -> Self {
        Self {
            opened: false,
            open_result: true,
            accepted: Vec::new(),
            reject_next: 0,
            cached: false,
            eos: false,
            eos_submitted: 0,
            current_frame: 0,
            frame_resets: 0,
            current_pts: None,
            fps: 25.0,
        }
    }
}

pub struct MockVideoPipeline {
    pub state: Arc<Mutex<VideoState>>,
}

impl MockVideoPipeline {
    pub fn new() -> (Self, Arc<Mutex<VideoState>>) {
        let state = Arc::new(Mutex::new(VideoState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl VideoPipeline for MockVideoPipeline {
    fn open(&mut self, _hints: &StreamHints, _clock: &SharedClock) -> bool {
        let mut s = self.state.lock();
        s.opened = true;
        s.open_result
    }

    fn add_packet(&mut self, pkt: Packet) -> std::result::Result<(), Packet> {
        let mut s = self.state.lock();
        if s.reject_next > 0 {
            s.reject_next -= 1;
            return Err(pkt);
        }
        s.accepted.push(pkt.size());
        Ok(())
    }

    fn cached(&self) -> bool {
        self.state.lock().cached
    }

    fn eos(&self) -> bool {
        self.state.lock().eos
    }

    fn submit_eos(&mut self) {
        self.state.lock().eos_submitted += 1;
    }

    fn current_frame(&self) -> i32 {
        self.state.lock().current_frame
    }

    fn reset_frame_counter(&mut self) {
        let mut s = self.state.lock();
        s.frame_resets += 1;
        s.current_frame = 0;
    }

    fn current_pts(&self) -> Option<i64> {
        self.state.lock().current_pts
    }

    fn fps(&self) -> f32 {
        self.state.lock().fps
    }
}

// ========== 软件音频解码器 ==========

/// 脚本化的单次 decode 行为
#[derive(Debug, Clone, Copy)]
pub enum DecodeScript {
    /// 报告消费 n 字节，不产出数据
    Consume(usize),
    /// 报告解码错误
    Fail,
}

pub struct CodecState {
    pub open_results: VecDeque<bool>,
    pub open_count: usize,
    pub opened_hints: Vec<StreamHints>,
    pub close_count: usize,
    pub is_open: bool,
    /// 脚本耗尽后默认行为：全量消费并原样回显
    pub decode_script: VecDeque<DecodeScript>,
    pub resets: usize,
    pub pending: Vec<u8>,
}

impl Default for CodecState {
    fn default() -> Self {
        Self {
            open_results: VecDeque::new(),
            open_count: 0,
            opened_hints: Vec::new(),
            close_count: 0,
            is_open: false,
            decode_script: VecDeque::new(),
            resets: 0,
            pending: Vec::new(),
        }
    }
}

pub struct MockAudioCodec {
    pub state: Arc<Mutex<CodecState>>,
}

impl MockAudioCodec {
    pub fn new() -> (Self, Arc<Mutex<CodecState>>) {
        let state = Arc::new(Mutex::new(CodecState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl AudioCodec for MockAudioCodec {
    fn open(&mut self, hints: &StreamHints) -> bool {
        let mut s = self.state.lock();
        s.open_count += 1;
        s.opened_hints.push(*hints);
        let ok = s.open_results.pop_front().unwrap_or(true);
        s.is_open = ok;
        ok
    }

    fn close(&mut self) {
        let mut s = self.state.lock();
        s.close_count += 1;
        s.is_open = false;
    }

    fn decode(&mut self, data: &[u8]) -> Result<usize> {
        let mut s = self.state.lock();
        match s.decode_script.pop_front() {
            Some(DecodeScript::Fail) => Err(PlayerError::DecodeError("mock decode".to_string())),
            Some(DecodeScript::Consume(n)) => Ok(n),
            None => {
                s.pending.extend_from_slice(data);
                Ok(data.len())
            }
        }
    }

    fn take_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().pending)
    }

    fn reset(&mut self) {
        let mut s = self.state.lock();
        s.resets += 1;
        s.pending.clear();
    }

    fn channels(&self) -> u16 {
        self.state.lock().opened_hints.last().map(|h| h.channels).unwrap_or(2)
    }

    fn sample_rate(&self) -> u32 {
        self.state.lock().opened_hints.last().map(|h| h.samplerate).unwrap_or(48_000)
    }

    fn bits_per_sample(&self) -> u32 {
        16
    }

    fn channel_map(&self) -> Vec<PcmChannel> {
        PcmChannel::default_map(self.channels())
    }
}

// ========== 音频输出 ==========

/// 一次 init 的参数记录
#[derive(Debug, Clone)]
pub struct SinkInit {
    pub device: AudioDevice,
    pub passthrough: PassthroughMode,
    pub hw_decode: bool,
    pub boost_on_downmix: bool,
    pub channels: u16,
    pub map_len: usize,
}

pub struct SinkState {
    pub init_results: VecDeque<bool>,
    pub init_count: usize,
    pub inits: Vec<SinkInit>,
    pub is_open: bool,
    /// 缓冲容量（字节），space = capacity - buffered
    pub capacity: usize,
    pub buffered: usize,
    /// 每次写入记录 (字节数, dts, pts)
    pub chunks: Vec<(usize, Option<i64>, Option<i64>)>,
    /// 每次最多接受的字节数（模拟部分写入）
    pub accept_limit: Option<usize>,
    pub eos_submitted: bool,
    pub eos: bool,
    pub volume: i64,
    pub flushes: usize,
    pub deinits: usize,
}

impl Default for SinkState {
    fn default() -> Self {
        Self {
            init_results: VecDeque::new(),
            init_count: 0,
            inits: Vec::new(),
            is_open: false,
            capacity: 1024 * 1024,
            buffered: 0,
            chunks: Vec::new(),
            accept_limit: None,
            eos_submitted: false,
            eos: false,
            volume: 0,
            flushes: 0,
            deinits: 0,
        }
    }
}

pub struct MockSink {
    pub state: Arc<Mutex<SinkState>>,
}

impl MockSink {
    pub fn new() -> (Self, Arc<Mutex<SinkState>>) {
        let state = Arc::new(Mutex::new(SinkState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl AudioRenderer for MockSink {
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
        let mut s = self.state.lock();
        s.init_count += 1;
        s.inits.push(SinkInit {
            device,
            passthrough,
            hw_decode,
            boost_on_downmix,
            channels: hints.channels,
            map_len: channel_map.len(),
        });
        let ok = s.init_results.pop_front().unwrap_or(true);
        s.is_open = ok;
        ok
    }

    fn deinit(&mut self) {
        let mut s = self.state.lock();
        s.deinits += 1;
        s.is_open = false;
    }

    fn add_packets(&mut self, data: &[u8], dts: Option<i64>, pts: Option<i64>) -> usize {
        let mut s = self.state.lock();
        let take = match s.accept_limit {
            Some(limit) => data.len().min(limit),
            None => data.len(),
        };
        s.buffered += take;
        s.chunks.push((take, dts, pts));
        take
    }

    fn space(&self) -> usize {
        let s = self.state.lock();
        s.capacity.saturating_sub(s.buffered)
    }

    fn cached_bytes(&self) -> usize {
        self.state.lock().buffered
    }

    fn submit_eos(&mut self) {
        self.state.lock().eos_submitted = true;
    }

    fn eos(&self) -> bool {
        self.state.lock().eos
    }

    fn set_volume(&mut self, device_value: i64) {
        self.state.lock().volume = device_value;
    }

    fn volume(&self) -> i64 {
        self.state.lock().volume
    }

    fn flush(&mut self) {
        let mut s = self.state.lock();
        s.flushes += 1;
        s.buffered = 0;
    }
}
