//! URL Vitals 主程序入口
//!
//! 外部URL存活与延迟监控工具

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};
use url_vitals::cli::args::{Args, Commands};
use url_vitals::cli::commands::{
    CheckCommand, Command, InitCommand, StartCommand, ValidateCommand, VersionCommand,
};
use url_vitals::logging::LoggingSystem;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let logging_system =
        LoggingSystem::setup_logging(args.log_config()).context("初始化日志系统失败")?;

    debug!(
        "URL Vitals v{} 启动，日志级别 {}",
        url_vitals::VERSION,
        logging_system.config().level
    );

    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: &dyn Command = match &args.command {
        Commands::Start { .. } => &StartCommand,
        Commands::Check { .. } => &CheckCommand,
        Commands::Init { .. } => &InitCommand,
        Commands::Validate { .. } => &ValidateCommand,
        Commands::Version { .. } => &VersionCommand,
    };
    command.execute(args).await
}
