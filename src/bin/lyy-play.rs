use anyhow::{anyhow, Result};
use crossbeam_channel::unbounded;
use log::{info, warn};
use std::io::BufRead;
use std::path::Path;
use std::thread;

use lyy_player::core::{Packet, PlayerEvent, PlayerSettings, SharedClock, StreamHints};
use lyy_player::player::{CpalRenderer, FfmpegAudioCodec, FfmpegReader, PlayerEngine, VideoPipeline};

const CONFIG_FILE: &str = "lyy-play.json";

/// 无渲染视频管线
///
/// 桌面联调没有硬件视频通路，这里按共享时钟的步调消费视频包，
/// 跟踪帧号和 PTS，让调度循环、循环回绕和 EOS 逻辑都照常工作。
struct HeadlessVideo {
    clock: Option<SharedClock>,
    fps: f32,
    frames: i32,
    last_pts: Option<i64>,
    eos_flag: bool,
}

impl HeadlessVideo {
    fn new() -> Self {
        Self {
            clock: None,
            fps: 0.0,
            frames: 0,
            last_pts: None,
            eos_flag: false,
        }
    }
}

impl VideoPipeline for HeadlessVideo {
    fn open(&mut self, hints: &StreamHints, clock: &SharedClock) -> bool {
        self.fps = if hints.fps > 0.0 { hints.fps } else { 25.0 };
        self.clock = Some(clock.clone());
        true
    }

    fn add_packet(&mut self, pkt: Packet) -> std::result::Result<(), Packet> {
        if let (Some(clock), Some(pts)) = (self.clock.as_ref(), pkt.pts) {
            // 比时钟快一秒以上就退还，让调度循环退避
            if pts > clock.media_time_us() + 1_000_000 {
                return Err(pkt);
            }
        }
        self.frames += 1;
        if pkt.pts.is_some() {
            self.last_pts = pkt.pts;
        }
        Ok(())
    }

    fn cached(&self) -> bool {
        match (self.clock.as_ref(), self.last_pts) {
            (Some(clock), Some(pts)) => pts > clock.media_time_us(),
            _ => false,
        }
    }

    fn eos(&self) -> bool {
        self.eos_flag && !self.cached()
    }

    fn submit_eos(&mut self) {
        self.eos_flag = true;
    }

    fn current_frame(&self) -> i32 {
        self.frames
    }

    fn reset_frame_counter(&mut self) {
        self.frames = 0;
    }

    fn current_pts(&self) -> Option<i64> {
        self.last_pts
    }

    fn fps(&self) -> f32 {
        self.fps
    }
}

fn parse_args() -> Result<PlayerSettings> {
    let mut settings = if Path::new(CONFIG_FILE).exists() {
        match PlayerSettings::load(Path::new(CONFIG_FILE)) {
            Ok(s) => {
                info!("📄 已加载配置 {}", CONFIG_FILE);
                s
            }
            Err(e) => {
                warn!("⚠ 配置解析失败，使用默认值: {}", e);
                PlayerSettings::default()
            }
        }
    } else {
        PlayerSettings::default()
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--loop" => settings.enable_looping = true,
            "--no-audio" => settings.enable_audio = false,
            "--local-audio" => settings.use_hdmi_for_audio = false,
            "--volume" => {
                settings.initial_volume = args
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| anyhow!("--volume 需要一个 0.0-1.0 的数值"))?;
            }
            "--start" => {
                settings.start_time_secs = args
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| anyhow!("--start 需要秒数"))?;
            }
            other if !other.starts_with('-') => settings.video_path = other.to_string(),
            other => return Err(anyhow!("未知参数: {}", other)),
        }
    }

    if settings.video_path.is_empty() {
        return Err(anyhow!(
            "用法: lyy-play <媒体路径> [--loop] [--no-audio] [--local-audio] [--volume V] [--start 秒]"
        ));
    }
    Ok(settings)
}

/// 处理一条控制台命令，返回 false 表示退出
fn handle_command(engine: &mut PlayerEngine, cmd: &str) -> bool {
    match cmd {
        "q" => return false,
        "p" => {
            engine.pause();
            info!("⏹ 已暂停");
        }
        "c" => {
            engine.play();
            info!("🎬 继续播放");
        }
        "s" => {
            engine.step_frame_forward();
            info!("⏩ 步进一帧（当前帧 {}）", engine.current_frame());
        }
        "f" => {
            let multiplier = engine.increase_speed();
            info!("⏩ 速度倍率 {}", multiplier);
        }
        "w" => {
            engine.rewind();
            info!("⏩ 速度倍率 {}", engine.speed_multiplier());
        }
        "n" => {
            engine.set_normal_speed();
            info!("⏩ 恢复正常速度");
        }
        "+" => {
            engine.increase_volume();
            info!("🔊 音量 {:.2}", engine.volume());
        }
        "-" => {
            engine.decrease_volume();
            info!("🔊 音量 {:.2}", engine.volume());
        }
        "i" => {
            info!(
                "📄 t={:.2}s 帧 {}/{} 速度倍率 {} 音量 {:.2}",
                engine.media_time_us() as f64 / 1_000_000.0,
                engine.current_frame(),
                engine.total_frames(),
                engine.speed_multiplier(),
                engine.volume()
            );
        }
        "" => {}
        other => warn!("⚠ 未知命令: {}（支持 p c s f w n + - i q）", other),
    }
    true
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("🎬 lyy-play 启动");

    // 初始化 FFmpeg
    ffmpeg_next::init().map_err(|e| anyhow!("FFmpeg 初始化失败: {}", e))?;

    let settings = parse_args()?;
    let mut engine = PlayerEngine::setup(settings, Box::new(FfmpegReader::new()))?;
    engine.open_player(
        Box::new(HeadlessVideo::new()),
        Box::new(FfmpegAudioCodec::new()),
        Box::new(CpalRenderer::new()),
    )?;

    info!(
        "📄 {}x{} @ {:.2}fps，{} 帧，时长 {:.1}s",
        engine.width(),
        engine.height(),
        engine.fps(),
        engine.total_frames(),
        engine.duration_secs()
    );

    let events = engine.events();
    let (cmd_tx, mut cmd_rx) = unbounded::<String>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if cmd_tx.send(l).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    loop {
        let mut stdin_closed = false;
        crossbeam_channel::select! {
            recv(events) -> event => match event {
                Ok(PlayerEvent::Loop { offset_us }) => {
                    info!("🔄 循环回绕，时间偏移 {}us", offset_us);
                }
                Ok(PlayerEvent::End) => {
                    info!("⏹ 播放结束");
                    break;
                }
                Err(_) => break,
            },
            recv(cmd_rx) -> line => match line {
                Ok(line) => {
                    if !handle_command(&mut engine, line.trim()) {
                        break;
                    }
                }
                Err(_) => stdin_closed = true,
            },
        }
        if stdin_closed {
            // stdin 已关闭（比如重定向输入耗尽），只继续等事件
            cmd_rx = crossbeam_channel::never();
        }
    }

    engine.close();
    info!("✅ 退出");
    Ok(())
}
