//! 传感器字节流解码器
//!
//! 串口数据持续追加到一个增长的缓冲区中，可能包含噪声、半帧或重同步垃圾字节。
//! 解码器每次调用时只交付**最新**的完整帧：
//!
//! 1. 从头扫描所有互不重叠的 `0x01 + 任意 12 字节` 匹配
//! 2. 解码最后一个匹配，丢弃它及其之前的全部字节
//! 3. 没有匹配时缓冲区保持不变，返回上一次解码的值（初始为零帧）
//!
//! # 已知限制
//!
//! 协议没有校验和。负载中的 `0x01` 字节可能导致提前同步（误匹配），
//! 这里保持与传感器固件兼容的宽松行为，不做额外校验。

use crate::{FRAME_LEN, START_BYTE, SensorFrame};
use bytes::{Buf, BytesMut};

/// 帧解码器（最后一帧优先 + 保持上次值）
///
/// # 示例
///
/// ```rust
/// use bytes::BytesMut;
/// use gantry_protocol::{FrameDecoder, SensorFrame};
///
/// let mut decoder = FrameDecoder::new();
/// let mut buffer = BytesMut::new();
///
/// buffer.extend_from_slice(&[0xFF, 0x00]); // 垃圾字节
/// buffer.extend_from_slice(&SensorFrame::new(1.0, 2.0, 3.0).to_bytes());
///
/// let frame = decoder.decode(&mut buffer);
/// assert_eq!(frame, SensorFrame::new(1.0, 2.0, 3.0));
/// assert!(buffer.is_empty());
///
/// // 没有新数据时返回上一次的值
/// assert_eq!(decoder.decode(&mut buffer), frame);
/// ```
#[derive(Debug, Default, Clone)]
pub struct FrameDecoder {
    /// 上一次成功解码的帧
    last: SensorFrame,
    /// 成功解码（并交付）的帧数
    frames_decoded: u64,
    /// 因"最后一帧优先"被跳过的旧帧数
    frames_skipped: u64,
}

impl FrameDecoder {
    /// 创建新的解码器（初始值为零帧）
    pub fn new() -> Self {
        Self::default()
    }

    /// 从缓冲区解码最新帧
    ///
    /// 永不阻塞，永不失败。找到匹配时会截断缓冲区，只保留最后一个匹配之后的字节。
    pub fn decode(&mut self, buffer: &mut BytesMut) -> SensorFrame {
        let Some((start, matches)) = find_last_frame(buffer) else {
            return self.last;
        };

        let payload = &buffer[start + 1..start + FRAME_LEN];
        if let Ok(frame) = SensorFrame::parse(payload) {
            self.last = frame;
            self.frames_decoded += 1;
            self.frames_skipped += (matches - 1) as u64;
        }

        buffer.advance(start + FRAME_LEN);
        self.last
    }

    /// 上一次解码的帧（不消费缓冲区）
    pub fn last(&self) -> SensorFrame {
        self.last
    }

    /// 已交付的帧数
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// 被更新帧覆盖而跳过的帧数
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }
}

/// 查找最后一个互不重叠的帧匹配
///
/// 返回 `(起始偏移, 匹配总数)`；没有匹配时返回 `None`。
fn find_last_frame(data: &[u8]) -> Option<(usize, usize)> {
    let mut last = None;
    let mut matches = 0;
    let mut i = 0;

    while i + FRAME_LEN <= data.len() {
        if data[i] == START_BYTE {
            last = Some(i);
            matches += 1;
            i += FRAME_LEN;
        } else {
            i += 1;
        }
    }

    last.map(|start| (start, matches))
}
