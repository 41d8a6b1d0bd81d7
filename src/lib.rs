//! Seeker - Rust 深度调研智能体
//!
//! 模块划分：
//! - **agents**: 主控会话、搜索 / 写作子 Agent、轮次循环
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、恢复、重试、优雅关闭
//! - **directive**: XML 风格指令解析与各会话指令集
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 对话日志
//! - **observability**: tracing 初始化与任务 span
//! - **runtime**: 按配置装配会话并处理单条输入
//! - **tools**: 搜索、网页读取、字幕与工具网关
//! - **workspace**: 任务目录存储与单飞锁

pub mod agents;
pub mod config;
pub mod core;
pub mod directive;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod runtime;
pub mod tools;
pub mod workspace;
