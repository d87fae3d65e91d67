use crate::core::{Packet, SharedClock, StreamHints};

/// 视频解码管线抽象接口
///
/// 硬件解码/渲染路径在核心之外，调度循环只依赖这组契约：
/// 投包、缓存状态、EOS 和帧计数。
pub trait VideoPipeline: Send {
    /// 打开视频管线
    fn open(&mut self, hints: &StreamHints, clock: &SharedClock) -> bool;

    /// 投递一个视频包
    ///
    /// 内部队列满时原样退还，调用方退避重试。
    fn add_packet(&mut self, pkt: Packet) -> Result<(), Packet>;

    /// 内部还有未播完的缓存
    fn cached(&self) -> bool;

    /// 已完全播完（submit_eos 之后缓存排空）
    fn eos(&self) -> bool;

    /// 通知流结束
    fn submit_eos(&mut self);

    /// 当前已呈现的帧序号
    fn current_frame(&self) -> i32;

    /// 帧计数器清零（循环回绕时调用）
    fn reset_frame_counter(&mut self);

    /// 最近呈现的 PTS（微秒）
    fn current_pts(&self) -> Option<i64>;

    /// 帧率
    fn fps(&self) -> f32;
}
