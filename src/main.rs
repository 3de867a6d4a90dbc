use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use iac_validator::config::Settings;
use iac_validator::http::{self, SkillState};
use iac_validator::mcp::McpServer;
use iac_validator::tools::{build_registry, Toolchain};

/// IaC Validator: MCP stdio server and HTTP skill service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 日志级别（默认 info；设置了 DEBUG 环境变量时默认 debug）
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// 外部工具的超时时间（秒）
    #[arg(long, global = true)]
    tool_timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 在 stdin/stdout 上运行 MCP 服务（默认）
    Stdio,
    /// 运行 HTTP Skill 服务
    Serve {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

fn init_tracing(args: &Args, settings: &Settings) {
    let level = settings.log_level(args.log_level.as_deref());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr) // 日志输出到 stderr，避免干扰 stdout 的 JSON-RPC
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::from_env();
    if let Some(secs) = args.tool_timeout_secs.filter(|s| *s > 0) {
        settings.tool_timeout = Duration::from_secs(secs);
    }
    if let Some(Command::Serve { port, manifest }) = &args.command {
        if let Some(port) = port {
            settings.port = *port;
        }
        if let Some(manifest) = manifest {
            settings.manifest_path = manifest.clone();
        }
    }

    init_tracing(&args, &settings);

    let settings = Arc::new(settings);
    let toolchain = Arc::new(Toolchain::new(settings.clone()));
    let registry = Arc::new(build_registry(toolchain)?);
    info!(tools = registry.len(), "capabilities registered");

    match args.command.unwrap_or(Command::Stdio) {
        Command::Stdio => {
            let server = McpServer::new(registry);
            server
                .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                .await?;
        }
        Command::Serve { .. } => {
            let state = Arc::new(SkillState::new(registry, &settings));
            http::serve(state, settings.port).await?;
        }
    }

    Ok(())
}
