use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 正常播放速度基准值（1 倍速）
pub const NORMAL_PLAY_SPEED: i32 = 1000;

/// 共享播放时钟 - 所有解码管线的同步基准
///
/// 速度、暂停、单步都以它为唯一事实来源；各管线持有克隆引用，
/// 不存在全局单例。
#[derive(Clone)]
pub struct SharedClock {
    inner: Arc<Mutex<ClockInner>>,
}

struct ClockInner {
    base_pts: i64,          // 基准媒体时间（微秒）
    base_instant: Instant,  // 基准时刻
    speed: i32,             // 播放速度，1000 = 正常
    paused: bool,
    paused_at: i64,         // 暂停时的媒体时间（微秒）
    pending_steps: u32,     // 暂停态下待消费的单步数
}

impl SharedClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                base_pts: 0,
                base_instant: Instant::now(),
                speed: NORMAL_PLAY_SPEED,
                paused: true,
                paused_at: 0,
                pending_steps: 0,
            })),
        }
    }

    /// 以给定媒体时间为基准开始走时
    pub fn start(&self, pts_us: i64) {
        let mut inner = self.inner.lock();
        inner.base_pts = pts_us;
        inner.paused_at = pts_us;
        inner.base_instant = Instant::now();
        inner.paused = false;
        inner.pending_steps = 0;
    }

    /// 当前媒体时间（微秒）
    pub fn media_time_us(&self) -> i64 {
        let inner = self.inner.lock();
        Self::media_time_locked(&inner)
    }

    /// 重设媒体时间基准（seek 后调用）
    pub fn set_time(&self, pts_us: i64) {
        let mut inner = self.inner.lock();
        inner.base_pts = pts_us;
        inner.paused_at = pts_us;
        inner.base_instant = Instant::now();
    }

    /// 恢复走时
    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        if inner.paused {
            inner.base_pts = inner.paused_at;
            inner.base_instant = Instant::now();
            inner.paused = false;
            inner.pending_steps = 0;
        }
    }

    /// 暂停走时，媒体时间冻结
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if !inner.paused {
            inner.paused_at = Self::media_time_locked(&inner);
            inner.paused = true;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// 设置播放速度（1000 = 正常，负值倒放）
    pub fn set_speed(&self, speed: i32) {
        let mut inner = self.inner.lock();
        if !inner.paused {
            inner.base_pts = Self::media_time_locked(&inner);
            inner.base_instant = Instant::now();
        }
        inner.speed = speed;
    }

    pub fn speed(&self) -> i32 {
        self.inner.lock().speed
    }

    /// 登记 n 个待消费的单步（暂停态逐帧）
    pub fn step(&self, n: u32) {
        let mut inner = self.inner.lock();
        inner.pending_steps += n;
    }

    /// 待消费的单步数
    pub fn pending_steps(&self) -> u32 {
        self.inner.lock().pending_steps
    }

    /// 消费一个单步，媒体时间前进一个帧间隔
    ///
    /// 由视频管线在暂停态调用；非暂停态没有单步语义，返回 false。
    pub fn consume_step(&self, frame_duration_us: i64) -> bool {
        let mut inner = self.inner.lock();
        if inner.paused && inner.pending_steps > 0 {
            inner.pending_steps -= 1;
            inner.paused_at += frame_duration_us;
            true
        } else {
            false
        }
    }

    /// 阻塞当前线程约 ms 毫秒（真实时间，不随速度缩放）
    ///
    /// 只作为退避重试的延迟，不承担正确性。
    pub fn sleep(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }

    fn media_time_locked(inner: &ClockInner) -> i64 {
        if inner.paused {
            inner.paused_at
        } else {
            let elapsed = inner.base_instant.elapsed().as_micros() as i64;
            inner.base_pts + elapsed * inner.speed as i64 / NORMAL_PLAY_SPEED as i64
        }
    }
}

impl Default for SharedClock {
    fn default() -> Self {
        Self::new()
    }
}
