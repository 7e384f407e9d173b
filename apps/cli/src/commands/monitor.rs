//! monitor 命令
//!
//! 以固定频率打印整机快照

use anyhow::{Context, Result, ensure};
use clap::Args;
use gantry_driver::MachineSnapshot;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// 监控命令参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 配置文件（TOML）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 监控时长（秒），0 表示直到 Ctrl-C
    #[arg(short, long, default_value_t = 0.0)]
    pub duration_s: f64,

    /// 刷新频率（Hz）
    #[arg(short, long, default_value_t = 10.0)]
    pub rate_hz: f64,

    /// 传感器设备（覆盖配置）
    #[arg(short, long)]
    pub sensor: Option<String>,
}

/// 单行格式化快照
pub fn format_snapshot(elapsed: Duration, s: &MachineSnapshot) -> String {
    format!(
        concat!(
            "[{:8.3}s] cart {:8.2} mm {:8.2} mm/s | hoist {:8.2} mm {:8.2} mm/s",
            " | rope {:7.2} mm | θ {:+8.4} rad ω {:+8.4} rad/s | wind {:6.2}"
        ),
        elapsed.as_secs_f64(),
        s.cart_pos_mm,
        s.cart_vel_mm_s,
        s.hoist_pos_mm,
        s.hoist_vel_mm_s,
        s.rope_length_mm,
        s.angle_rad,
        s.angular_vel_rad_s,
        s.wind_speed,
    )
}

impl MonitorCommand {
    pub fn execute(&self) -> Result<()> {
        ensure!(
            self.rate_hz.is_finite() && self.rate_hz > 0.0,
            "--rate-hz must be positive, got {}",
            self.rate_hz
        );
        ensure!(
            self.duration_s.is_finite() && self.duration_s >= 0.0,
            "--duration-s must be non-negative, got {}",
            self.duration_s
        );

        let config = super::load_config(self.config.as_deref(), self.sensor.as_deref())?;
        let machine = super::build_machine(&config)?;

        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl-C handler")?;

        let period = Duration::from_secs_f64(1.0 / self.rate_hz);
        let limit = (self.duration_s > 0.0).then(|| Duration::from_secs_f64(self.duration_s));
        let start = Instant::now();

        println!("📡 Monitoring '{}' at {} Hz (Ctrl-C to stop)", config.machine_name, self.rate_hz);
        while running.load(Ordering::SeqCst) {
            let elapsed = start.elapsed();
            if limit.is_some_and(|limit| elapsed >= limit) {
                break;
            }

            let snapshot = machine.get_snapshot()?;
            println!("{}", format_snapshot(elapsed, &snapshot));
            thread::sleep(period);
        }

        machine.release_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_snapshot() {
        let snapshot = MachineSnapshot {
            cart_pos_mm: 12.5,
            rope_length_mm: 350.0,
            ..Default::default()
        };
        let line = format_snapshot(Duration::from_millis(1500), &snapshot);
        assert!(line.starts_with("[   1.500s]"), "{}", line);
        assert!(line.contains("12.50 mm"));
        assert!(line.contains("350.00 mm"));
    }

    #[test]
    fn test_rejects_zero_rate() {
        let cmd = MonitorCommand {
            config: None,
            duration_s: 1.0,
            rate_hz: 0.0,
            sensor: None,
        };
        assert!(cmd.execute().is_err());
    }
}
