//! # Observability
//!
//! 日志与指标的统一入口。日志一律写 stderr, 命令输出独占 stdout;
//! 指标通过 `metrics` facade 上报, 配置端口后由 Prometheus exporter 暴露。
//!
//! ```ignore
//! use observability::{init_with_config, LogFormat, ObservabilityConfig};
//!
//! init_with_config(ObservabilityConfig {
//!     log_format: LogFormat::Json,
//!     ..Default::default()
//! })?;
//! ```

pub mod metrics;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    record_chunk_distributed, record_process_exit, record_queue_depth, record_run_finished,
    record_sink_completed, record_sink_failed, ChunkSizes, RunSummary,
};

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus 端口, `None` 不启动 exporter
    pub metrics_port: Option<u16>,
    /// `RUST_LOG` 未设置时使用的过滤器
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Compact,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// 结构化日志, 附带 target/文件/行号
    Json,
    Pretty,
    #[default]
    Compact,
}

impl ObservabilityConfig {
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_log_level))
    }

    fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_port.map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    }
}

/// 安装全局 subscriber, 按需启动 Prometheus exporter
///
/// 进程内只能调用一次, 重复调用返回错误。
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(layer)
        .try_init()
        .context("tracing subscriber already installed")?;

    if let Some(addr) = config.metrics_addr() {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .with_context(|| format!("failed to start Prometheus exporter on {addr}"))?;
        tracing::info!(%addr, "serving Prometheus metrics");
    }

    tracing::debug!(log_format = ?config.log_format, "observability ready");
    Ok(())
}
