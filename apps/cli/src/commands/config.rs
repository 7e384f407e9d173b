//! config 命令
//!
//! 打印配置（默认值或校验后的配置文件）

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// 配置命令参数
#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// 要校验并打印的配置文件（省略时打印默认配置）
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl ConfigCommand {
    pub fn execute(&self) -> Result<()> {
        let config = super::load_config(self.config.as_deref(), None)?;
        print!("{}", config.to_toml_string()?);
        Ok(())
    }
}
