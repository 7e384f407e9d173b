//! # 整机配置
//!
//! 从 TOML 文件加载。每个段都有与实验台硬件一致的默认值，空文件即可得到完整配置。
//!
//! ```toml
//! machine_id = 1
//! machine_name = "lab-gantry"
//! hoist_max_length_mm = 350.0
//!
//! [cart]
//! encoder_counts = 65536
//! pulley_circumference_mm = 40.0
//! position_limit_mm = 700.0
//! direction = 1
//!
//! [sensor]
//! angle_scale = 0.806
//! invert = true
//!
//! [logger]
//! logging_rate_hz = 100.0
//! write_rate_hz = 10.0
//! ```

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 整机配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CraneConfig {
    /// 机器 ID（持久化时区分不同龙门吊）
    pub machine_id: i64,
    /// 机器名称
    pub machine_name: String,
    /// 吊绳最大长度（mm），剩余绳长 = 该值 − 卷扬位置
    pub hoist_max_length_mm: f64,
    /// 横向小车
    #[serde(default = "AxisConfig::default_cart")]
    pub cart: AxisConfig,
    /// 卷扬
    #[serde(default = "AxisConfig::default_hoist")]
    pub hoist: AxisConfig,
    pub sensor: SensorSettings,
    pub logger: LoggerSettings,
    pub executor: ExecutorSettings,
}

impl Default for CraneConfig {
    fn default() -> Self {
        Self {
            machine_id: 1,
            machine_name: "gantry".to_string(),
            hoist_max_length_mm: 350.0,
            cart: AxisConfig::default_cart(),
            hoist: AxisConfig::default_hoist(),
            sensor: SensorSettings::default(),
            logger: LoggerSettings::default(),
            executor: ExecutorSettings::default(),
        }
    }
}

impl CraneConfig {
    /// 从文件加载并校验
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CraneConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// 保存到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_toml_string()?)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.hoist_max_length_mm.is_finite() && self.hoist_max_length_mm > 0.0,
            "hoist_max_length_mm must be positive, got {}",
            self.hoist_max_length_mm
        );
        self.cart.validate().context("[cart]")?;
        self.hoist.validate().context("[hoist]")?;
        self.sensor.validate().context("[sensor]")?;
        self.logger.validate().context("[logger]")?;
        Ok(())
    }

    /// 按轴类型取配置
    pub fn axis(&self, kind: AxisKind) -> &AxisConfig {
        match kind {
            AxisKind::Cart => &self.cart,
            AxisKind::Hoist => &self.hoist,
        }
    }
}

/// 轴类型（配置文件中的 `"cart"` / `"hoist"`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    #[default]
    Cart,
    Hoist,
}

/// 单轴配置
///
/// 段存在时 `pulley_circumference_mm` 和 `direction` 必须显式给出，其余字段有默认值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// 每转编码器计数
    #[serde(default = "default_encoder_counts")]
    pub encoder_counts: u32,
    /// 带轮周长（mm）
    pub pulley_circumference_mm: f64,
    /// 行程上限（mm）
    #[serde(default = "default_position_limit_mm")]
    pub position_limit_mm: f64,
    /// 方向：1 或 -1
    pub direction: i8,
    /// 是否已完成回零标定
    #[serde(default)]
    pub calibrated: bool,
}

fn default_encoder_counts() -> u32 {
    65536
}

fn default_position_limit_mm() -> f64 {
    700.0
}

impl AxisConfig {
    /// 小车默认值：40 mm 带轮，正向
    pub fn default_cart() -> Self {
        Self {
            encoder_counts: default_encoder_counts(),
            pulley_circumference_mm: 40.0,
            position_limit_mm: default_position_limit_mm(),
            direction: 1,
            calibrated: false,
        }
    }

    /// 卷扬默认值：直径 21 mm 卷筒，反向
    pub fn default_hoist() -> Self {
        Self {
            encoder_counts: default_encoder_counts(),
            pulley_circumference_mm: 21.0 * std::f64::consts::PI,
            position_limit_mm: default_position_limit_mm(),
            direction: -1,
            calibrated: false,
        }
    }

    /// 每毫米编码器计数
    pub fn counts_per_mm(&self) -> f64 {
        f64::from(self.encoder_counts) / self.pulley_circumference_mm
    }

    /// 每 mm/s 对应的驱动器 rpm
    pub fn rpm_per_mm_per_s(&self) -> f64 {
        60.0 / self.pulley_circumference_mm
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.encoder_counts > 0, "encoder_counts must be positive");
        ensure!(
            self.pulley_circumference_mm.is_finite() && self.pulley_circumference_mm > 0.0,
            "pulley_circumference_mm must be positive, got {}",
            self.pulley_circumference_mm
        );
        ensure!(
            self.position_limit_mm.is_finite() && self.position_limit_mm > 0.0,
            "position_limit_mm must be positive, got {}",
            self.position_limit_mm
        );
        if self.direction != 1 && self.direction != -1 {
            bail!("direction must be 1 or -1, got {}", self.direction);
        }
        Ok(())
    }
}

/// 传感器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    /// 设备文件路径（如 `/dev/ttyACM0`），为空时不连接传感器
    pub device: Option<String>,
    /// 实验标定的角度缩放系数
    pub angle_scale: f64,
    /// 是否翻转角度符号（安装方向）
    pub invert: bool,
    /// 启动时把当前摆角设为零点
    pub zero_angle_on_start: bool,
    /// 启动时把当前风速设为零点
    pub zero_wind_on_start: bool,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            device: None,
            angle_scale: 0.806,
            invert: true,
            zero_angle_on_start: false,
            zero_wind_on_start: false,
        }
    }
}

impl SensorSettings {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.angle_scale.is_finite() && self.angle_scale != 0.0,
            "angle_scale must be finite and non-zero, got {}",
            self.angle_scale
        );
        Ok(())
    }
}

/// 持续记录配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    /// 是否启用持续记录
    pub enabled: bool,
    /// 采样频率（Hz）
    pub logging_rate_hz: f64,
    /// 写入频率（Hz）
    pub write_rate_hz: f64,
    /// 采样队列容量
    pub buffer_size: usize,
    /// 停止时等待工作线程退出的时限（毫秒）
    pub join_timeout_ms: u64,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            logging_rate_hz: 100.0,
            write_rate_hz: 10.0,
            buffer_size: 1000,
            join_timeout_ms: 2000,
        }
    }
}

impl LoggerSettings {
    /// 采样周期
    pub fn logging_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.logging_rate_hz)
    }

    /// 写入周期
    pub fn write_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.write_rate_hz)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.logging_rate_hz.is_finite() && self.logging_rate_hz > 0.0,
            "logging_rate_hz must be positive, got {}",
            self.logging_rate_hz
        );
        ensure!(
            self.write_rate_hz.is_finite() && self.write_rate_hz > 0.0,
            "write_rate_hz must be positive, got {}",
            self.write_rate_hz
        );
        ensure!(self.buffer_size > 0, "buffer_size must be non-zero");
        Ok(())
    }
}

/// 轨迹执行配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// 执行期间的加速度上限（设备单位，默认即驱动器最大值）
    pub max_acceleration: u32,
    /// 被驱动的轴
    pub driven_axis: AxisKind,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_acceleration: i32::MAX as u32,
            driven_axis: AxisKind::Cart,
        }
    }
}
