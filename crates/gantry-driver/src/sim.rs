//! 仿真电机驱动器
//!
//! [`SimulatedMotor`] 按墙钟时间积分运动学状态，用于没有硬件时运行完整流程，
//! 同时作为测试替身：记录每条命令及其发出时刻，并支持故障注入。
//!
//! 简化假设：加速度无限大（速度立即到达上限），力矩模式下立即停止。

use crate::error::MotorError;
use crate::motor::{MotorDriver, MotorMode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// 发给驱动器的一条命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCommand {
    SetMode(MotorMode),
    AccelLimit(u32),
    VelocityLimit(u32),
    PositionTarget(i32),
    VelocityTarget(i32),
    TorqueTarget(i32),
}

#[derive(Debug)]
struct SimState {
    mode: MotorMode,
    accel_limit: u32,
    velocity_limit: u32,
    position_target: i32,
    velocity_target: i32,
    torque_target: i32,
    /// 位置（编码器计数，连续值）
    position: f64,
    /// 当前速度（设备单位 rpm）
    velocity: f64,
    last_update: Instant,
    commands: Vec<(Instant, MotorCommand)>,
}

impl SimState {
    fn advance(&mut self, now: Instant, counts_per_rev: f64) {
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        let rpm_to_counts_s = counts_per_rev / 60.0;
        let limit = f64::from(self.velocity_limit);

        match self.mode {
            MotorMode::Position => {
                let diff = f64::from(self.position_target) - self.position;
                let step = limit * rpm_to_counts_s * dt;
                if diff.abs() <= step {
                    self.position = f64::from(self.position_target);
                    self.velocity = 0.0;
                } else {
                    self.position += diff.signum() * step;
                    self.velocity = diff.signum() * limit;
                }
            },
            MotorMode::Velocity => {
                let v = f64::from(self.velocity_target).clamp(-limit, limit);
                self.position += v * rpm_to_counts_s * dt;
                self.velocity = v;
            },
            MotorMode::Torque => {
                self.velocity = 0.0;
            },
        }
    }
}

/// 仿真电机（可克隆的共享句柄）
///
/// 克隆出的句柄共享同一个内部状态，测试可以在驱动器交给 [`Axis`](crate::Axis) 之后继续检查它。
#[derive(Debug, Clone)]
pub struct SimulatedMotor {
    counts_per_rev: f64,
    state: Arc<Mutex<SimState>>,
    failing: Arc<AtomicBool>,
}

impl SimulatedMotor {
    /// 创建仿真电机
    ///
    /// - `encoder_counts`: 每转编码器计数
    pub fn new(encoder_counts: u32) -> Self {
        Self {
            counts_per_rev: f64::from(encoder_counts),
            state: Arc::new(Mutex::new(SimState {
                mode: MotorMode::Torque,
                accel_limit: 0,
                velocity_limit: 0,
                position_target: 0,
                velocity_target: 0,
                torque_target: 0,
                position: 0.0,
                velocity: 0.0,
                last_update: Instant::now(),
                commands: Vec::new(),
            })),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 设置初始位置（编码器计数）
    pub fn with_position(self, counts: i32) -> Self {
        {
            let mut state = self.state.lock();
            state.position = f64::from(counts);
            state.position_target = counts;
        }
        self
    }

    /// 故障注入：开启后所有调用返回 `MotorError::Disconnected`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// 已记录的全部命令
    pub fn commands(&self) -> Vec<(Instant, MotorCommand)> {
        self.state.lock().commands.clone()
    }

    pub fn last_command(&self) -> Option<MotorCommand> {
        self.state.lock().commands.last().map(|(_, c)| *c)
    }

    pub fn mode(&self) -> MotorMode {
        self.state.lock().mode
    }

    pub fn velocity_limit(&self) -> u32 {
        self.state.lock().velocity_limit
    }

    pub fn accel_limit(&self) -> u32 {
        self.state.lock().accel_limit
    }

    pub fn torque_target(&self) -> i32 {
        self.state.lock().torque_target
    }

    fn check(&self) -> Result<(), MotorError> {
        if self.failing.load(Ordering::Relaxed) {
            Err(MotorError::Disconnected)
        } else {
            Ok(())
        }
    }

    fn command(&self, command: MotorCommand) -> Result<(), MotorError> {
        self.check()?;
        let now = Instant::now();
        let mut state = self.state.lock();
        state.advance(now, self.counts_per_rev);

        match command {
            MotorCommand::SetMode(mode) => {
                state.mode = mode;
                if mode == MotorMode::Position {
                    // 切入位置模式时保持当前位置
                    state.position_target = state.position.round() as i32;
                }
            },
            MotorCommand::AccelLimit(limit) => state.accel_limit = limit,
            MotorCommand::VelocityLimit(limit) => state.velocity_limit = limit,
            MotorCommand::PositionTarget(counts) => state.position_target = counts,
            MotorCommand::VelocityTarget(velocity) => state.velocity_target = velocity,
            MotorCommand::TorqueTarget(torque) => state.torque_target = torque,
        }
        state.commands.push((now, command));
        Ok(())
    }
}

impl MotorDriver for SimulatedMotor {
    fn set_mode(&mut self, mode: MotorMode) -> Result<(), MotorError> {
        self.command(MotorCommand::SetMode(mode))
    }

    fn set_accel_limit(&mut self, limit: u32) -> Result<(), MotorError> {
        self.command(MotorCommand::AccelLimit(limit))
    }

    fn set_velocity_limit(&mut self, limit: u32) -> Result<(), MotorError> {
        self.command(MotorCommand::VelocityLimit(limit))
    }

    fn set_position_target(&mut self, counts: i32) -> Result<(), MotorError> {
        self.command(MotorCommand::PositionTarget(counts))
    }

    fn set_velocity_target(&mut self, velocity: i32) -> Result<(), MotorError> {
        self.command(MotorCommand::VelocityTarget(velocity))
    }

    fn set_torque_target(&mut self, torque: i32) -> Result<(), MotorError> {
        self.command(MotorCommand::TorqueTarget(torque))
    }

    fn get_position(&mut self) -> Result<i32, MotorError> {
        self.check()?;
        let mut state = self.state.lock();
        state.advance(Instant::now(), self.counts_per_rev);
        Ok(state.position.round() as i32)
    }

    fn get_velocity(&mut self) -> Result<i32, MotorError> {
        self.check()?;
        let mut state = self.state.lock();
        state.advance(Instant::now(), self.counts_per_rev);
        Ok(state.velocity.round() as i32)
    }
}
