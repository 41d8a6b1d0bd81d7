//! 可观测性：tracing 订阅器初始化与任务 span

use tracing::Span;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化全局日志；RUST_LOG 未设置时默认 info
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}

/// 会话级 span：该会话内的所有日志都带上 task_id 与 agent 名
pub fn task_span(task_id: &str, agent: &str) -> Span {
    tracing::info_span!("task", task_id = %task_id, agent = %agent)
}
