//! 有界采样队列
//!
//! 队列满时丢弃**最新**的样本（生产者从不阻塞），已排队的旧样本保持不变。

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use gantry_driver::LogSample;

/// 有界 FIFO 采样队列（多生产者、多消费者）
#[derive(Debug, Clone)]
pub struct SampleQueue {
    tx: Sender<LogSample>,
    rx: Receiver<LogSample>,
    capacity: usize,
}

impl SampleQueue {
    /// 创建队列
    ///
    /// `capacity` 为 0 时按 1 处理（crossbeam 的 0 容量通道是同步交接通道）。
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// 尝试入队，队列满时返回 false（样本被丢弃）
    pub fn try_push(&self, sample: LogSample) -> bool {
        match self.tx.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// 取出当前所有已排队的样本（按入队顺序）
    pub fn drain(&self) -> Vec<LogSample> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
