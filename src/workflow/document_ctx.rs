//! 文档处理上下文
//!
//! 封装"我正在处理第几个文档，结果写到哪里"这一信息

use std::fmt::Display;
use std::path::PathBuf;

/// 文档处理上下文
#[derive(Debug, Clone)]
pub struct DocumentCtx {
    /// 输入文档
    pub input: PathBuf,

    /// 步骤文件目录
    pub artifacts_dir: PathBuf,

    /// 最终结果文件
    pub output_path: PathBuf,

    /// 文档序号（从1开始，仅用于日志显示）
    pub index: usize,

    /// 文档总数
    pub total: usize,
}

impl DocumentCtx {
    pub fn new(
        input: PathBuf,
        artifacts_dir: PathBuf,
        output_path: PathBuf,
        index: usize,
        total: usize,
    ) -> Self {
        Self {
            input,
            artifacts_dir,
            output_path,
            index,
            total,
        }
    }

    /// 进度行前缀
    pub fn progress_prefix(&self) -> String {
        format!("处理中 {}/{}, ", self.index, self.total)
    }
}

impl Display for DocumentCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[文档 {}/{} {}]",
            self.index,
            self.total,
            self.input.display()
        )
    }
}
