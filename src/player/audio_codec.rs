use crate::core::{PcmChannel, Result, StreamHints};

/// 软件音频解码器抽象接口
///
/// 解码循环契约：每次 decode 消费输入的一段前缀并产出零个或
/// 多个字节的解码输出，输出经 take_data 取走。消费长度异常
/// 视为码流失步，由调用方 reset 后丢弃剩余输入。
pub trait AudioCodec: Send {
    /// 按流参数打开解码器
    fn open(&mut self, hints: &StreamHints) -> bool;

    /// 关闭解码器，之后可以用新参数重新 open
    fn close(&mut self);

    /// 解码一段数据，返回消费的字节数
    fn decode(&mut self, data: &[u8]) -> Result<usize>;

    /// 取走自上次调用以来的全部解码输出
    fn take_data(&mut self) -> Vec<u8>;

    /// 失步后复位内部状态
    fn reset(&mut self);

    /// 输出声道数
    fn channels(&self) -> u16;

    /// 输出采样率
    fn sample_rate(&self) -> u32;

    /// 输出位深
    fn bits_per_sample(&self) -> u32;

    /// 输出声道布局
    fn channel_map(&self) -> Vec<PcmChannel>;
}
