//! # Paper Summarize
//!
//! 分步生成论文摘要的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（上传的文档、上下文缓存），只暴露能力
//! - `RemoteSession` - 唯一的远程资源 owner，保证释放
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单次请求
//! - `RateLimiter` - 每分钟请求数限制（进程内共用）
//! - `RetryPolicy` - 暂时性错误的指数退避重试
//! - `RequestClient` - 流式请求、计时、用量统计
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个文档"的完整处理流程
//! - `DocumentCtx` - 上下文封装（输入、步骤文件目录、输出）
//! - `SummaryFlow` - 流程编排（固定步骤 → 章节结构 → 章节步骤 → 拼接）
//! - `StepArtifact` - 步骤文件，存在即跳过
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量文档处理器，管理资源
//! - `orchestrator/document_processor` - 单个文档处理器，解析路径、写入结果
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::RemoteSession;
pub use models::{LanguagePack, SectionTree, UsageStats};
pub use orchestrator::{App, BatchStats};
pub use workflow::{DocumentCtx, FlowOutput, StepArtifact, SummaryFlow};
