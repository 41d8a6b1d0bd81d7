//! Seeker - 命令行入口
//!
//! 初始化日志与配置，打开任务的主控会话，逐行读取用户输入并打印回复与进度通知。
//! Ctrl+C 取消正在进行的调用并退出。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use seeker::agents::AgentEvent;
use seeker::config::load_config;
use seeker::core::{AgentError, RecoveryEngine, ShutdownManager};
use seeker::{observability, runtime};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "seeker", version, about = "Deep research agent")]
struct Cli {
    /// 继续已有任务；省略时以当前时间新建
    #[arg(long, env = "SEEKER_TASK_ID")]
    task_id: Option<String>,

    /// 配置文件路径（默认 config/default.toml）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 覆盖 [app].tasks_root
    #[arg(long)]
    tasks_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = Cli::parse();

    let mut cfg = load_config(cli.config).context("Failed to load config")?;
    if let Some(root) = cli.tasks_root {
        cfg.app.tasks_root = root;
    }

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            match ev {
                AgentEvent::Notify { text } => println!("[notify] {text}"),
                AgentEvent::DocumentSaved { name } => println!("[saved] {name}"),
                AgentEvent::Delegation { target, .. } => println!("[{target}] working..."),
                other => tracing::trace!(event = ?other, "agent event"),
            }
        }
    });

    let ctx = runtime::create_agent_context(&cfg, shutdown.token(), Some(event_tx))
        .context("Failed to create agent")?;
    let mut session = runtime::open_task(ctx, cli.task_id)
        .await
        .context("Failed to open task")?;
    let recovery = RecoveryEngine::new();
    println!("Task: {} (empty line or Ctrl+C to quit)", session.task_id());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.wait_for_shutdown() => break,
            line = lines.next_line() => line.context("Failed to read input")?,
        };
        let Some(input) = line else { break };
        let input = input.trim();
        if input.is_empty() {
            break;
        }

        match runtime::process_message(&mut session, &recovery, input).await {
            Ok(reply) if reply.is_empty() => {}
            Ok(reply) => println!("{reply}"),
            Err(AgentError::Cancelled) => break,
            Err(e) => return Err(e).context("Session aborted"),
        }
    }

    tracing::info!(task_id = %session.task_id(), "session closed");
    Ok(())
}
