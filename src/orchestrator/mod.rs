//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量文档处理器
//! - 管理应用生命周期（初始化、运行）
//! - 创建共享的请求客户端（限流窗口跨文档共用）
//! - 逐个处理文档，失败的文档不影响后续文档
//! - 输出全局统计信息
//!
//! ### `document_processor` - 单个文档处理器
//! - 解析输出路径
//! - 检查输入格式
//! - 执行 SummaryFlow 并写入摘要
//! - 输出单个文档的用量统计
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<PathBuf>)
//!     ↓
//! document_processor (处理单个文档)
//!     ↓
//! workflow::SummaryFlow (固定步骤 + 章节步骤)
//!     ↓
//! services (能力层：限流 / 重试 / 请求)
//!     ↓
//! infrastructure (基础设施：RemoteSession)
//! ```

pub mod batch_processor;
pub mod document_processor;

// 重新导出主要类型
pub use batch_processor::{App, BatchStats};
pub use document_processor::{process_document, resolve_output_paths, OutputOptions};
