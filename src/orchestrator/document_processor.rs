//! 单个文档处理器 - 编排层
//!
//! ## 职责
//!
//! 1. **路径解析**：确定步骤文件目录和最终结果文件
//! 2. **输入检查**：只接受 Markdown / 纯文本
//! 3. **流程调度**：委托 `SummaryFlow` 执行所有步骤
//! 4. **结果输出**：写入摘要文件，输出累计用量

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::error::{AppError, FileError};
use crate::workflow::{DocumentCtx, FlowOutput, SummaryFlow};

/// 支持的输入扩展名
const SUPPORTED_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// 输出路径选项
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions<'a> {
    pub output_file: Option<&'a str>,
    pub output_dir: Option<&'a str>,
    pub suffix: Option<&'a str>,
}

/// 解析步骤文件目录和最终结果文件
///
/// # 返回
/// `(步骤文件目录, 结果文件)`
pub fn resolve_output_paths(input: &Path, options: &OutputOptions<'_>) -> (PathBuf, PathBuf) {
    let (mut artifacts_dir, mut output) = match options.output_file {
        Some(output_file) => {
            let output = PathBuf::from(output_file);
            let artifacts_dir = output.with_extension("");
            let output = if output.extension().is_none() {
                append_to_path(&output, ".md")
            } else {
                output
            };
            (artifacts_dir, output)
        }
        None => {
            let mut artifacts_dir = input.with_extension("");
            if let Some(suffix) = options.suffix {
                artifacts_dir = append_to_path(&artifacts_dir, suffix);
            }
            let output = append_to_path(&artifacts_dir, ".md");
            (artifacts_dir, output)
        }
    };

    if let Some(output_dir) = options.output_dir {
        let dir = Path::new(output_dir);
        if let Some(name) = artifacts_dir.file_name() {
            artifacts_dir = dir.join(name);
        }
        if let Some(name) = output.file_name() {
            output = dir.join(name);
        }
    }

    (artifacts_dir, output)
}

fn append_to_path(path: &Path, tail: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(tail);
    PathBuf::from(raw)
}

/// 检查输入文件格式
pub fn check_supported_input(path: &Path) -> Result<(), AppError> {
    let supported = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()));

    if supported {
        Ok(())
    } else {
        Err(FileError::UnsupportedInput {
            path: path.display().to_string(),
        }
        .into())
    }
}

/// 检查结果文件不会覆盖输入文件
pub async fn check_output_path(input: &Path, output: &Path) -> Result<(), AppError> {
    let same = input == output
        || matches!(
            (tokio::fs::canonicalize(input).await, tokio::fs::canonicalize(output).await),
            (Ok(a), Ok(b)) if a == b
        );

    if same {
        Err(FileError::OutputOverwritesInput {
            path: input.display().to_string(),
        }
        .into())
    } else {
        Ok(())
    }
}

/// 处理单个文档
///
/// # 参数
/// - `flow`: 文档摘要流程
/// - `ctx`: 文档上下文（路径已解析）
///
/// # 返回
/// 返回流程输出（摘要已写入 `output_path`）
pub async fn process_document(flow: &SummaryFlow, ctx: &DocumentCtx) -> Result<FlowOutput> {
    check_supported_input(&ctx.input)?;
    check_output_path(&ctx.input, &ctx.output_path).await?;

    info!("==== 摘要中 {}/{}: {}", ctx.index, ctx.total, ctx.input.display());

    let output = flow
        .run(ctx)
        .await
        .with_context(|| format!("{} 摘要流程失败", ctx))?;

    tokio::fs::write(&output.output_path, &output.summary)
        .await
        .map_err(|e| AppError::file_write_failed(output.output_path.display().to_string(), e))?;

    info!("💾 摘要已保存: {}", output.output_path.display());
    info!("📊 统计:\n{}", output.stats.render("- "));

    Ok(output)
}
