use crate::core::{AudioDevice, PassthroughMode, PcmChannel, SharedClock, StreamHints};

/// 音频输出渲染器抽象接口
///
/// 硬件输出（或桌面联调用的 cpal 实现）的契约：按字节收数据、
/// 报告剩余空间、跟踪排空状态、管理设备音量。
pub trait AudioRenderer: Send {
    /// 初始化输出
    ///
    /// passthrough 激活时直接收压缩码流；hw_decode 为 true 时
    /// 收压缩数据交固件解码；否则收 PCM。
    #[allow(clippy::too_many_arguments)]
    fn init(
        &mut self,
        device: AudioDevice,
        channel_map: &[PcmChannel],
        hints: &StreamHints,
        clock: &SharedClock,
        passthrough: PassthroughMode,
        hw_decode: bool,
        boost_on_downmix: bool,
    ) -> bool;

    /// 释放输出，之后可以用新参数重新 init
    fn deinit(&mut self);

    /// 写入数据，返回实际接受的字节数
    fn add_packets(&mut self, data: &[u8], dts: Option<i64>, pts: Option<i64>) -> usize;

    /// 剩余缓冲空间（字节）
    fn space(&self) -> usize;

    /// 已缓冲未播出的字节数
    fn cached_bytes(&self) -> usize;

    /// 通知流结束
    fn submit_eos(&mut self);

    /// 已完全播完（submit_eos 之后缓冲排空）
    fn eos(&self) -> bool;

    /// 设置设备音量（-6000..6000，百分之一分贝）
    fn set_volume(&mut self, device_value: i64);

    /// 当前设备音量
    fn volume(&self) -> i64;

    /// 丢弃所有已缓冲数据
    fn flush(&mut self);
}
