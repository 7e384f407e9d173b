//! 摆角/风速传感器链路
//!
//! # 组成
//!
//! - [`SensorLink`]: 非阻塞地取出当前已到达的字节（对应串口 `in_waiting`）
//! - [`SensorChannel`]: 链路 + 增长缓冲区 + [`FrameDecoder`] + 零点偏移
//! - [`SensorCalibration`]: 设备角度单位 → 弧度
//!
//! 链路错误不会向上传播：记录日志后视为"没有新数据"，解码器沿用上一次读数。

use crate::error::SensorError;
use bytes::BytesMut;
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, unbounded};
use gantry_protocol::{FrameDecoder, SensorFrame};
use std::io::{ErrorKind, Read};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// 读取线程每次读取的最大字节数
const READ_CHUNK_SIZE: usize = 256;

/// 读取线程与解码侧之间的通道容量（块数）
const READER_CHANNEL_CAPACITY: usize = 64;

/// 字节流来源
pub trait SensorLink: Send {
    /// 把当前可用的全部字节追加到 `buffer`，返回追加的字节数
    ///
    /// 不得阻塞。
    fn read_available(&mut self, buffer: &mut BytesMut) -> Result<usize, SensorError>;
}

/// 空链路：永远没有数据
///
/// 解码器因此始终返回零帧（没有传感器板时使用）。
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSensorLink;

impl SensorLink for NullSensorLink {
    fn read_available(&mut self, _buffer: &mut BytesMut) -> Result<usize, SensorError> {
        Ok(0)
    }
}

/// 基于 channel 的链路
///
/// 字节块通过 [`SensorFeed`] 推入。既用于测试，也是 [`ReaderSensorLink`] 的接收端。
#[derive(Debug)]
pub struct ChannelSensorLink {
    rx: Receiver<Vec<u8>>,
}

impl ChannelSensorLink {
    /// 创建无界链路，返回 `(link, feed)`
    pub fn new() -> (Self, SensorFeed) {
        let (tx, rx) = unbounded();
        (Self { rx }, SensorFeed { tx })
    }

    fn from_receiver(rx: Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }
}

impl SensorLink for ChannelSensorLink {
    fn read_available(&mut self, buffer: &mut BytesMut) -> Result<usize, SensorError> {
        let mut total = 0;
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => {
                    buffer.extend_from_slice(&chunk);
                    total += chunk.len();
                },
                Err(TryRecvError::Empty) => return Ok(total),
                Err(TryRecvError::Disconnected) => {
                    if total > 0 {
                        return Ok(total);
                    }
                    return Err(SensorError::Disconnected);
                },
            }
        }
    }
}

/// [`ChannelSensorLink`] 的发送端
#[derive(Debug, Clone)]
pub struct SensorFeed {
    tx: Sender<Vec<u8>>,
}

impl SensorFeed {
    /// 推入任意字节（可以是噪声或半帧）
    ///
    /// 链路已被丢弃时返回 false。
    pub fn push(&self, bytes: &[u8]) -> bool {
        self.tx.send(bytes.to_vec()).is_ok()
    }

    /// 推入一个完整帧
    pub fn push_frame(&self, frame: SensorFrame) -> bool {
        self.push(&frame.to_bytes())
    }
}

/// 基于 `std::io::Read` 的链路（如已打开的串口设备文件）
///
/// 后台线程阻塞读取并把字节块送入有界通道；通道满时读取线程阻塞，
/// 由设备自身的缓冲吸收突发数据。读到 EOF 或不可恢复的错误时线程退出，
/// 链路随后报告 [`SensorError::Disconnected`]。
#[derive(Debug)]
pub struct ReaderSensorLink {
    inner: ChannelSensorLink,
}

impl ReaderSensorLink {
    /// 用任意 reader 创建链路并启动读取线程
    pub fn spawn<R>(name: &str, mut reader: R) -> Result<Self, SensorError>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = bounded::<Vec<u8>>(READER_CHANNEL_CAPACITY);
        let thread_name = format!("gantry-sensor-{}", name);
        let source = name.to_string();

        // 读取线程可能阻塞在 read() 上，因此不 join，随进程退出
        thread::Builder::new().name(thread_name).spawn(move || {
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => {
                        info!("Sensor stream {} reached EOF", source);
                        break;
                    },
                    Ok(n) => {
                        if tx.send(chunk[..n].to_vec()).is_err() {
                            debug!("Sensor link {} dropped, reader exiting", source);
                            break;
                        }
                    },
                    Err(e)
                        if matches!(
                            e.kind(),
                            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                        ) =>
                    {
                        thread::sleep(Duration::from_millis(1));
                    },
                    Err(e) => {
                        warn!("Sensor stream {} read error: {}", source, e);
                        break;
                    },
                }
            }
        })?;

        Ok(Self {
            inner: ChannelSensorLink::from_receiver(rx),
        })
    }

    /// 打开设备文件（如 `/dev/ttyACM0`，波特率需事先由系统配置）
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, SensorError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        info!("Opened sensor device {}", path.display());
        Self::spawn(&path.display().to_string(), file)
    }
}

impl SensorLink for ReaderSensorLink {
    fn read_available(&mut self, buffer: &mut BytesMut) -> Result<usize, SensorError> {
        self.inner.read_available(buffer)
    }
}

/// 角度标定：设备角度单位 → 弧度
///
/// `rad = sign · (raw / angle_scale) · π / 180`，`invert` 时 `sign = -1`（安装方向）。
/// 角速度使用同一变换。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorCalibration {
    /// 实验标定的角度缩放系数
    pub angle_scale: f64,
    /// 是否翻转符号
    pub invert: bool,
}

impl Default for SensorCalibration {
    fn default() -> Self {
        Self {
            angle_scale: 0.806,
            invert: true,
        }
    }
}

impl SensorCalibration {
    /// 设备角度（或角速度）→ 弧度
    pub fn to_radians(&self, raw: f32) -> f64 {
        let sign = if self.invert { -1.0 } else { 1.0 };
        sign * (f64::from(raw) / self.angle_scale).to_radians()
    }
}

/// 传感器通道：链路 + 缓冲区 + 解码器 + 零点偏移
pub struct SensorChannel {
    link: Box<dyn SensorLink>,
    buffer: BytesMut,
    decoder: FrameDecoder,
    calibration: SensorCalibration,
    angle_offset: f32,
    wind_offset: f32,
    link_healthy: bool,
}

impl std::fmt::Debug for SensorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorChannel")
            .field("buffered", &self.buffer.len())
            .field("last", &self.decoder.last())
            .field("angle_offset", &self.angle_offset)
            .field("wind_offset", &self.wind_offset)
            .finish_non_exhaustive()
    }
}

impl SensorChannel {
    pub fn new(link: Box<dyn SensorLink>, calibration: SensorCalibration) -> Self {
        Self {
            link,
            buffer: BytesMut::with_capacity(1024),
            decoder: FrameDecoder::new(),
            calibration,
            angle_offset: 0.0,
            wind_offset: 0.0,
            link_healthy: true,
        }
    }

    pub fn calibration(&self) -> &SensorCalibration {
        &self.calibration
    }

    /// 读取链路上的新字节并解码最新帧（已扣除零点偏移）
    ///
    /// 永不失败：链路错误只记录日志，返回上一次的值。
    pub fn read(&mut self) -> SensorFrame {
        match self.link.read_available(&mut self.buffer) {
            Ok(n) => {
                if !self.link_healthy {
                    info!("Sensor link recovered");
                    self.link_healthy = true;
                }
                if n > 0 {
                    trace!("Sensor link delivered {} bytes ({} buffered)", n, self.buffer.len());
                }
            },
            Err(e) => {
                // 只在状态切换时告警，避免高频采样刷屏
                if self.link_healthy {
                    warn!("Sensor link error, carrying forward last reading: {}", e);
                    self.link_healthy = false;
                }
            },
        }

        let raw = self.decoder.decode(&mut self.buffer);
        self.apply_offsets(raw)
    }

    fn apply_offsets(&self, raw: SensorFrame) -> SensorFrame {
        SensorFrame {
            angle: raw.angle - self.angle_offset,
            angular_velocity: raw.angular_velocity,
            wind_speed: raw.wind_speed - self.wind_offset,
        }
    }

    /// 把当前角度设为零点
    pub fn zero_angle(&mut self) {
        let current = self.read();
        self.angle_offset += current.angle;
        debug!("Angle offset set to {}", self.angle_offset);
    }

    /// 把当前风速设为零点
    pub fn zero_wind(&mut self) {
        let current = self.read();
        self.wind_offset += current.wind_speed;
        debug!("Wind offset set to {}", self.wind_offset);
    }

    pub fn angle_offset(&self) -> f32 {
        self.angle_offset
    }

    pub fn wind_offset(&self) -> f32 {
        self.wind_offset
    }

    pub fn is_link_healthy(&self) -> bool {
        self.link_healthy
    }
}
