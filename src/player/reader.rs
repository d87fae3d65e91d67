use parking_lot::Mutex;
use std::sync::Arc;

use crate::core::{Packet, Result, StreamHints, StreamKind};

/// 调度循环和音频管线共用的读取器句柄
///
/// 调度循环独占读包，音频线程只查询流活动状态，短临界区共享。
pub type SharedReader = Arc<Mutex<Box<dyn MediaReader>>>;

/// 解封装器抽象接口
///
/// 这个 trait 定义了调度循环消费的容器读取面。
/// 不同的来源（本地文件、网络流）由具体实现负责。
pub trait MediaReader: Send {
    /// 打开媒体
    ///
    /// skip_probe 为 true 时走快速路径（跳过 AV 探测），
    /// 网络流通常需要完整探测，由调用方失败后重试慢路径。
    fn open(&mut self, path: &str, skip_probe: bool) -> Result<()>;

    /// 读取下一个数据包
    ///
    /// 返回：
    /// - Some(packet): 成功读取一个包
    /// - None: 文件结束或暂时无数据，配合 is_eof() 区分
    fn read(&mut self) -> Option<Packet>;

    /// 指定类型首选流的参数快照
    fn hints(&self, kind: StreamKind) -> Option<StreamHints>;

    /// 指定类型的流数量
    fn num_streams(&self, kind: StreamKind) -> usize;

    /// 给定流索引是否是当前活动流
    fn is_active(&self, kind: StreamKind, stream_index: usize) -> bool;

    /// seek 到指定位置（毫秒）
    ///
    /// backward 为 true 时向前找最近的关键帧。
    /// 返回实际落点的 PTS（微秒）。
    fn seek_time(&mut self, position_ms: i64, backward: bool) -> Result<i64>;

    /// 是否支持 seek
    fn can_seek(&self) -> bool {
        true
    }

    /// 是否已到文件末尾
    fn is_eof(&self) -> bool;

    /// 设置读取速度（1000 = 正常），快进时调整丢包策略
    fn set_speed(&mut self, speed: i32);

    /// 取出并清除容器级回绕标志
    ///
    /// 回绕发生在 seek 重新落回文件开头时，循环播放据此补发通知。
    fn take_rewound(&mut self) -> bool {
        false
    }

    /// 编解码器名称（用于日志）
    fn codec_name(&self, kind: StreamKind) -> String {
        let _ = kind;
        String::new()
    }

    /// 关闭媒体，释放资源
    fn close(&mut self);
}
