/// 日志工具模块
///
/// 启动横幅、批量统计等多行日志
use chrono::{DateTime, Local};
use tracing::info;

use crate::config::Config;

const BANNER_WIDTH: usize = 60;

fn banner() -> String {
    "=".repeat(BANNER_WIDTH)
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", banner());
    info!("🚀 程序启动 - 论文分步摘要模式");
    info!("🤖 模型: {} ({:?})", config.llm_model_name, config.backend);
    info!("📊 每分钟最大请求数: {}", config.max_rpm);
    if config.use_context_cache {
        info!("🗄️ 已启用上下文缓存");
    }
    info!("{}", banner());
}

/// 记录文档列表
pub fn log_documents_loaded(total: usize) {
    info!("✓ 共 {} 个待处理的文档", total);
    info!("💡 逐个处理，已有步骤文件的步骤会直接复用\n");
}

/// 打印最终统计信息
///
/// # 参数
/// - `success`: 成功数量
/// - `failed`: 失败数量
/// - `total`: 总数
/// - `started`: 开始处理的时间
pub fn print_final_stats(success: usize, failed: usize, total: usize, started: DateTime<Local>) {
    let finished = Local::now();
    let elapsed = (finished - started).num_seconds().max(0);

    info!("\n{}", banner());
    info!("📊 全部处理完成统计");
    info!("完成时间: {}", finished.format("%Y-%m-%d %H:%M:%S"));
    info!(
        "总耗时: {}:{:02}:{:02}",
        elapsed / 3600,
        elapsed % 3600 / 60,
        elapsed % 60
    );
    info!("{}", banner());
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("{}", banner());
}

/// 截断长文本用于日志显示（按字符计数）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
