//! # Pedometer CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 采样循环编排与生命周期管理
//! - 优雅关闭处理

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_pipeline, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging based on CLI options
    observability::init_with_config(observability_config(&cli))?;

    info!(version = env!("CARGO_PKG_VERSION"), "Pedometer CLI starting");

    // Execute command
    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// `-q` wins over `RUST_LOG`; otherwise the env filter takes precedence
/// over `-v`. The Prometheus endpoint is started by the pipeline.
fn observability_config(cli: &Cli) -> ObservabilityConfig {
    ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: None,
        default_log_level: cli::log_level(cli.verbose, cli.quiet).to_string(),
        ignore_env: cli.quiet,
    }
}
