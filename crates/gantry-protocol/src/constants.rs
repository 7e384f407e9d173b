//! 协议常量定义

/// 帧起始字节
pub const START_BYTE: u8 = 0x01;

/// 负载长度（三个 f32）
pub const PAYLOAD_LEN: usize = 12;

/// 完整帧长度（起始字节 + 负载）
pub const FRAME_LEN: usize = 1 + PAYLOAD_LEN;
