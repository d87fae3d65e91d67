use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::Packet;

/// 有界数据包队列 - 按字节记账的 FIFO
///
/// 单生产者（调度循环）单消费者（管线线程）模型，flush 可以从
/// 第三个控制线程调用。满时拒绝而不是阻塞，由调用方退避重试。
pub struct PacketQueue {
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
    /// 瞬态冲刷标志，消费者持解码器锁时也要能读，因此放在互斥体外
    flushing: AtomicBool,
    capacity: usize,
}

struct QueueInner {
    packets: VecDeque<Packet>,
    /// 当前驻留字节数，等于队内所有包大小之和
    size: usize,
    closed: bool,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                packets: VecDeque::new(),
                size: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            flushing: AtomicBool::new(false),
            capacity,
        }
    }

    /// 入队
    ///
    /// 严格小于容量才接纳：`size + pkt.size() < capacity`。
    /// 满或已关闭都原样退还包，不改变任何状态。
    pub fn push(&self, pkt: Packet) -> Result<(), Packet> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(pkt);
        }
        if inner.size + pkt.size() >= self.capacity {
            return Err(pkt);
        }
        inner.size += pkt.size();
        inner.packets.push_back(pkt);
        drop(inner);
        self.not_empty.notify_all();
        Ok(())
    }

    /// 出队（非阻塞）
    pub fn pop(&self) -> Option<Packet> {
        let mut inner = self.inner.lock();
        let pkt = inner.packets.pop_front();
        if let Some(ref p) = pkt {
            inner.size -= p.size();
        }
        pkt
    }

    /// 阻塞等待队列非空
    ///
    /// 关闭或冲刷也会唤醒，调用方随后自行检查中止条件。
    pub fn wait_not_empty(&self) {
        let mut inner = self.inner.lock();
        while inner.packets.is_empty() && !inner.closed && !self.flushing.load(Ordering::SeqCst) {
            self.not_empty.wait(&mut inner);
        }
    }

    /// 清空队列并竖起冲刷标志
    pub fn flush(&self) {
        self.flush_with(|| {});
    }

    /// 清空队列，并在仍持有队列锁的情况下执行 f
    ///
    /// 音频管线用它在队列锁之内再取解码器锁（固定的加锁顺序），
    /// 保证 flush 不与 push/pop 交错。
    pub fn flush_with<F: FnOnce()>(&self, f: F) {
        let mut inner = self.inner.lock();
        inner.packets.clear();
        inner.size = 0;
        self.flushing.store(true, Ordering::SeqCst);
        f();
        drop(inner);
        self.not_empty.notify_all();
    }

    /// 消费冲刷标志
    ///
    /// 每次 flush 后第一次调用返回 true 并清除标志，供消费者
    /// 丢弃手中的在途包；之后恢复返回 false。不取队列锁，
    /// 消费者在解码器锁内调用也安全。
    pub fn consume_flush(&self) -> bool {
        self.flushing.swap(false, Ordering::SeqCst)
    }

    /// 关闭队列，唤醒所有等待者，此后 push 一律拒绝
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().packets.is_empty()
    }

    /// 队内包数
    pub fn len(&self) -> usize {
        self.inner.lock().packets.len()
    }

    /// 队内字节数
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StreamHints, StreamKind};

    fn make_packet(size: usize) -> Packet {
        Packet {
            data: vec![0u8; size],
            pts: Some(0),
            dts: Some(0),
            stream_index: 0,
            kind: StreamKind::Audio,
            hints: StreamHints::default(),
        }
    }

    #[test]
    fn test_size_accounting() {
        let queue = PacketQueue::new(3 * 1024 * 1024);
        assert!(queue.push(make_packet(100)).is_ok());
        assert!(queue.push(make_packet(200)).is_ok());
        assert_eq!(queue.size(), 300);
        assert_eq!(queue.len(), 2);

        let p = queue.pop().expect("queue should have a packet");
        assert_eq!(p.size(), 100);
        assert_eq!(queue.size(), 200);

        queue.pop();
        assert_eq!(queue.size(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_over_capacity_rejected() {
        let queue = PacketQueue::new(3 * 1024 * 1024);
        assert!(queue.push(make_packet(100)).is_ok());
        assert!(queue.push(make_packet(200)).is_ok());

        // 第三个包超容量，拒绝且状态不变
        let rejected = queue.push(make_packet(5_000_000));
        assert!(rejected.is_err());
        assert_eq!(rejected.unwrap_err().size(), 5_000_000);
        assert_eq!(queue.size(), 300);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_push_exactly_at_capacity_rejected() {
        let queue = PacketQueue::new(1000);
        // 严格小于：正好到达容量也拒绝
        assert!(queue.push(make_packet(1000)).is_err());
        assert!(queue.push(make_packet(999)).is_ok());
        assert_eq!(queue.size(), 999);
    }

    #[test]
    fn test_fifo_order() {
        let queue = PacketQueue::new(1024);
        for i in 1..=3 {
            queue.push(make_packet(i)).ok();
        }
        assert_eq!(queue.pop().map(|p| p.size()), Some(1));
        assert_eq!(queue.pop().map(|p| p.size()), Some(2));
        assert_eq!(queue.pop().map(|p| p.size()), Some(3));
        assert_eq!(queue.pop().map(|p| p.size()), None);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let queue = PacketQueue::new(1024);
        queue.push(make_packet(10)).ok();
        queue.push(make_packet(20)).ok();

        queue.flush();
        assert!(queue.is_empty());
        assert_eq!(queue.size(), 0);

        queue.flush();
        assert!(queue.is_empty());
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn test_consume_flush_fires_once() {
        let queue = PacketQueue::new(1024);
        queue.push(make_packet(10)).ok();

        // 在途包场景：先弹出再冲刷
        let _in_flight = queue.pop();
        queue.flush();
        assert!(queue.consume_flush());
        assert!(!queue.consume_flush());
    }

    #[test]
    fn test_flush_with_runs_under_queue_lock() {
        let queue = PacketQueue::new(1024);
        queue.push(make_packet(10)).ok();

        let mut ran = false;
        queue.flush_with(|| ran = true);
        assert!(ran);
        assert!(queue.is_empty());
        assert!(queue.consume_flush());
    }

    #[test]
    fn test_push_after_close_rejected() {
        let queue = PacketQueue::new(1024);
        queue.close();
        assert!(queue.push(make_packet(10)).is_err());
        assert_eq!(queue.size(), 0);
        assert!(queue.is_closed());
    }

    #[test]
    fn test_wait_not_empty_wakes_on_push() {
        use std::sync::Arc;

        let queue = Arc::new(PacketQueue::new(1024));
        let q2 = Arc::clone(&queue);
        let handle = std::thread::spawn(move || {
            q2.wait_not_empty();
            q2.pop().map(|p| p.size())
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.push(make_packet(7)).ok();
        assert_eq!(handle.join().ok().flatten(), Some(7));
    }

    #[test]
    fn test_wait_not_empty_wakes_on_close() {
        use std::sync::Arc;

        let queue = Arc::new(PacketQueue::new(1024));
        let q2 = Arc::clone(&queue);
        let handle = std::thread::spawn(move || {
            q2.wait_not_empty();
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.close();
        assert!(handle.join().is_ok());
    }
}
