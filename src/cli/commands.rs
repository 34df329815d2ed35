//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::types::DEFAULT_TIMEOUT;
use crate::config::{parse_positive_duration, ConfigLoader, RawWatchConfig, TomlConfigLoader};
use crate::error::ProbeError;
use crate::probe::{HttpProber, ProbeResult, Prober};
use crate::shutdown;
use crate::watch::{ExitReason, Orchestrator};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

/// 配置文件模板
const CONFIG_TEMPLATE: &str = r#"# URL Vitals 配置文件

# 要监控的URL列表
urls = [
  "https://example.com",
]

# 检测间隔（humantime 语法：200ms、30s、1m）
interval = "30s"

# 单次探测超时
timeout = "2s"

# Prometheus 指标端口与绑定地址
port = 9100
bind_address = "0.0.0.0"

# 结果通道容量
channel_capacity = 16
"#;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载配置文件
///
/// 显式指定的文件必须存在；未指定且默认位置没有文件时返回空配置。
async fn load_raw_config(args: &Args) -> Result<RawWatchConfig> {
    match args.get_config_path() {
        Some(path) => {
            let loader = TomlConfigLoader::default();
            let raw = loader
                .load_from_file(&path)
                .await
                .with_context(|| format!("加载配置文件失败: {}", path.display()))?;
            info!("已加载配置文件: {}", path.display());
            Ok(raw)
        }
        None => Ok(RawWatchConfig::default()),
    }
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            self.create_config_file(config_path, *force).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 创建配置文件
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("创建目录失败: {}", parent.display()))?;
        }

        tokio::fs::write(config_path, CONFIG_TEMPLATE)
            .await
            .with_context(|| format!("写入配置文件失败: {}", config_path.display()))?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加要监控的URL");
        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            let Some(config_file) = config_path.clone().or_else(|| args.get_config_path()) else {
                bail!("未找到配置文件，请通过 --config 指定");
            };
            self.validate_config_file(&config_file, *verbose).await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::default();
        let raw = loader.load_from_file(config_path).await?;
        let config = raw.validate().context("配置验证失败")?;

        if verbose {
            println!("配置验证通过！");
            println!("  检测间隔: {}", humantime::format_duration(config.interval));
            println!("  探测超时: {}", humantime::format_duration(config.timeout));
            println!("  指标地址: {}", config.socket_addr());
            println!("  结果通道容量: {}", config.channel_capacity);
            println!("监控目标:");
            for (i, url) in config.urls.iter().enumerate() {
                println!("  {}. {}", i + 1, url);
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!("✓ 找到 {} 个监控目标", config.urls.len());
        }

        Ok(())
    }
}

/// 一次性探测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check {
            urls,
            timeout,
            format,
        } = &args.command
        {
            self.perform_check(args, urls, timeout.as_deref(), format)
                .await
        } else {
            Ok(())
        }
    }
}

impl CheckCommand {
    /// 并发探测每个URL一次
    async fn perform_check(
        &self,
        args: &Args,
        urls: &[String],
        timeout: Option<&str>,
        format: &OutputFormat,
    ) -> Result<()> {
        let (urls, file_timeout) = if urls.is_empty() {
            let raw = load_raw_config(args).await?;
            (raw.urls, raw.timeout)
        } else {
            (urls.to_vec(), None)
        };

        if urls.is_empty() {
            bail!("必须提供至少一个要探测的URL");
        }

        let timeout_str = timeout
            .map(str::to_string)
            .or(file_timeout)
            .unwrap_or_else(|| DEFAULT_TIMEOUT.to_string());
        let timeout = parse_positive_duration("探测超时", &timeout_str)?;

        let prober = HttpProber::new().context("创建探测器失败")?;
        let results = prober.probe_batch(&urls, timeout).await;

        match format {
            OutputFormat::Json => self.print_json_results(&urls, &results)?,
            OutputFormat::Text => self.print_text_results(&urls, &results),
        }

        let down = results
            .iter()
            .filter(|result| !matches!(result, Ok(r) if r.is_up()))
            .count();
        if down > 0 {
            bail!("{} 个URL不可用", down);
        }
        Ok(())
    }

    /// 打印文本格式结果
    fn print_text_results(&self, urls: &[String], results: &[Result<ProbeResult, ProbeError>]) {
        for (url, result) in urls.iter().zip(results) {
            match result {
                Ok(probe) if probe.is_timeout() => {
                    println!("✗ {} - 超时", url);
                }
                Ok(probe) => {
                    let status_icon = if probe.is_up() { "✓" } else { "✗" };
                    println!(
                        "{} {} - {} - {}ms (dns {}ms, connect {}ms, tls {}ms)",
                        status_icon,
                        url,
                        probe.status_code,
                        probe.duration_ms(),
                        probe.phases.dns.as_millis(),
                        probe.phases.connect.as_millis(),
                        probe.phases.tls.as_millis()
                    );
                }
                Err(e) => {
                    println!("✗ {} - 检测失败: {e}", url);
                }
            }
        }
    }

    /// 打印JSON格式结果
    fn print_json_results(
        &self,
        urls: &[String],
        results: &[Result<ProbeResult, ProbeError>],
    ) -> Result<()> {
        let entries: Vec<serde_json::Value> = urls
            .iter()
            .zip(results)
            .map(|(url, result)| match result {
                Ok(probe) => {
                    let mut value = serde_json::to_value(probe)?;
                    value["up"] = serde_json::Value::Bool(probe.is_up());
                    Ok(value)
                }
                Err(e) => Ok(serde_json::json!({
                    "url": url,
                    "up": false,
                    "error": e.to_string(),
                })),
            })
            .collect::<Result<_, serde_json::Error>>()?;

        println!("{}", serde_json::to_string_pretty(&entries)?);
        Ok(())
    }
}

/// 启动命令
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Some(overrides) = args.command.start_overrides() else {
            return Ok(());
        };

        let config = load_raw_config(args)
            .await?
            .merge(overrides)
            .validate()
            .context("配置验证失败")?;

        info!(
            "监控 {} 个URL，间隔 {}，超时 {}",
            config.urls.len(),
            humantime::format_duration(config.interval),
            humantime::format_duration(config.timeout)
        );

        let orchestrator = Orchestrator::new(config).context("创建编排器失败")?;
        let running = orchestrator.start().await.context("启动指标服务失败")?;

        let signals = shutdown::spawn_signal_listener(running.shutdown_handle());
        let report = running.wait().await.context("监控运行失败")?;
        signals.abort();

        for exit in report.failures() {
            match &exit.reason {
                ExitReason::Failed(e) => warn!("{} 已因错误停止: {}", exit.url, e),
                ExitReason::Panicked(message) => warn!("{} 检测任务panic: {}", exit.url, message),
                other => warn!("{} 已停止: {:?}", exit.url, other),
            }
        }
        info!(
            "监控已结束: 共探测 {} 次，应用 {} 条结果",
            report.total_probes(),
            report.results_applied
        );

        Ok(())
    }
}
