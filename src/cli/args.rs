//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::config::RawWatchConfig;
use crate::logging::LogConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// URL Vitals - 外部URL存活与延迟监控工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "url-vitals",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "URL_VITALS_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        help = "日志级别",
        env = "URL_VITALS_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// 日志格式
    #[arg(long, value_enum, default_value = "text", help = "日志格式")]
    pub log_format: LogFormat,

    /// 日志文件路径
    #[arg(long, value_name = "FILE", help = "日志文件路径（默认输出到控制台）")]
    pub log_file: Option<PathBuf>,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum LogLevel {
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 日志格式枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum LogFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动监控并暴露Prometheus指标
    Start {
        /// 要监控的URL，可重复或以逗号分隔
        #[arg(
            short,
            long = "url",
            value_name = "URL",
            value_delimiter = ',',
            help = "要监控的URL"
        )]
        urls: Vec<String>,

        /// 检测间隔
        #[arg(
            short,
            long,
            value_name = "DURATION",
            help = "检测间隔，例如 30s、1m（默认 30s）"
        )]
        interval: Option<String>,

        /// 探测超时
        #[arg(
            short,
            long,
            value_name = "DURATION",
            help = "探测超时，例如 2s、500ms（默认 2s）"
        )]
        timeout: Option<String>,

        /// 指标端口
        #[arg(short, long, value_name = "PORT", help = "指标端口（默认 80）")]
        port: Option<u16>,

        /// 指标绑定地址
        #[arg(long, value_name = "ADDR", help = "指标绑定地址（默认 0.0.0.0）")]
        bind: Option<String>,

        /// 结果通道容量
        #[arg(long, value_name = "COUNT", help = "结果通道容量（默认 16）")]
        channel_capacity: Option<usize>,
    },

    /// 对URL执行一次性探测
    Check {
        /// 要探测的URL，未指定时使用配置文件中的URL
        #[arg(
            short,
            long = "url",
            value_name = "URL",
            value_delimiter = ',',
            help = "要探测的URL"
        )]
        urls: Vec<String>,

        /// 探测超时
        #[arg(short, long, value_name = "DURATION", help = "探测超时（默认 2s）")]
        timeout: Option<String>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 初始化配置文件
    Init {
        /// 配置文件路径
        #[arg(
            value_name = "FILE",
            help = "配置文件路径",
            default_value = "url-vitals.toml"
        )]
        config_path: PathBuf,

        /// 是否覆盖现有文件
        #[arg(short, long, help = "覆盖现有文件")]
        force: bool,
    },

    /// 验证配置文件
    Validate {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径")]
        config_path: Option<PathBuf>,

        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 获取配置文件路径
    ///
    /// 未显式指定时查找默认位置，都不存在时返回 `None`。
    pub fn get_config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(crate::config::get_default_config_path)
    }

    /// 构建日志配置
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone().into(),
            file_path: self.log_file.clone(),
            json_format: self.log_format == LogFormat::Json,
        }
    }
}

impl Commands {
    /// `start` 命令行参数对应的配置覆盖项
    pub fn start_overrides(&self) -> Option<RawWatchConfig> {
        match self {
            Commands::Start {
                urls,
                interval,
                timeout,
                port,
                bind,
                channel_capacity,
            } => Some(RawWatchConfig {
                urls: urls.clone(),
                interval: interval.clone(),
                timeout: timeout.clone(),
                port: *port,
                bind_address: bind.clone(),
                channel_capacity: *channel_capacity,
            }),
            _ => None,
        }
    }
}
