//! # Gantry CLI
//!
//! 龙门吊控制核心的命令行工具。
//!
//! ```bash
//! # 打印默认配置
//! gantry-cli config > gantry.toml
//!
//! # 在仿真轴上执行航点轨迹，记录持续状态并输出实测轨迹
//! gantry-cli execute --config gantry.toml --waypoints trajectory.json \
//!     --state-log state.jsonl --output measured.json
//!
//! # 以 5 Hz 打印整机快照 10 秒
//! gantry-cli monitor --config gantry.toml --duration-s 10 --rate-hz 5
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{ConfigCommand, ExecuteCommand, MonitorCommand};

/// Gantry CLI - 龙门吊命令行工具
#[derive(Parser, Debug)]
#[command(name = "gantry-cli")]
#[command(about = "Command-line interface for the gantry crane control core", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 打印配置（TOML）
    Config {
        #[command(flatten)]
        args: ConfigCommand,
    },

    /// 执行航点轨迹
    Execute {
        #[command(flatten)]
        args: ExecuteCommand,
    },

    /// 监控整机状态
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gantry_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { args } => args.execute(),
        Commands::Execute { args } => args.execute(),
        Commands::Monitor { args } => args.execute(),
    }
}
