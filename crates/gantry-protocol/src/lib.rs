//! # Gantry Protocol
//!
//! 摆角/风速传感器串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量（起始字节、帧长度）
//! - `decoder`: 字节流帧解码器（最后一帧优先 + 保持上次值）
//!
//! ## 帧格式
//!
//! ```text
//! [0x01][angle: f32 LE][angular_velocity: f32 LE][wind_speed: f32 LE]
//!   1B        4B                 4B                      4B          = 13 字节
//! ```
//!
//! 协议没有校验和，也没有长度前缀。

pub mod constants;
pub mod decoder;

pub use constants::*;
pub use decoder::FrameDecoder;

use bytes::{Buf, BufMut};
use thiserror::Error;

/// 单个传感器读数
///
/// 所有字段均为设备原始单位（角度未经标定缩放）。
///
/// # 示例
///
/// ```rust
/// use gantry_protocol::SensorFrame;
///
/// let frame = SensorFrame::new(1.5, -0.25, 3.0);
/// let bytes = frame.to_bytes();
/// assert_eq!(bytes[0], 0x01);
/// assert_eq!(SensorFrame::parse(&bytes[1..]).unwrap(), frame);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorFrame {
    /// 摆角（设备原始单位）
    pub angle: f32,
    /// 摆角角速度（设备原始单位）
    pub angular_velocity: f32,
    /// 风速
    pub wind_speed: f32,
}

impl SensorFrame {
    /// 创建新的读数
    pub fn new(angle: f32, angular_velocity: f32, wind_speed: f32) -> Self {
        Self {
            angle,
            angular_velocity,
            wind_speed,
        }
    }

    /// 从 12 字节负载解析（三个小端 f32）
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() != PAYLOAD_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: PAYLOAD_LEN,
                actual: payload.len(),
            });
        }

        let mut data = payload;
        Ok(Self {
            angle: data.get_f32_le(),
            angular_velocity: data.get_f32_le(),
            wind_speed: data.get_f32_le(),
        })
    }

    /// 编码为完整的 13 字节帧（含起始字节）
    ///
    /// 传感器固件发送的格式；主机侧主要用于测试和仿真。
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        let mut buf = &mut out[..];
        buf.put_u8(START_BYTE);
        buf.put_f32_le(self.angle);
        buf.put_f32_le(self.angular_velocity);
        buf.put_f32_le(self.wind_speed);
        out
    }
}

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
