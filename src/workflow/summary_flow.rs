//! 文档摘要流程 - 流程层
//!
//! 核心职责：定义"一个文档"的完整处理流程
//!
//! 流程顺序：
//! 1. 固定步骤（标题、摘要、概述……章节结构）
//! 2. 章节结构步骤的 JSON → 章节树
//! 3. 每个顶层章节一个扩展步骤
//! 4. 拼接所有步骤的响应
//!
//! 每个步骤的结果写入步骤文件，文件已存在的步骤不再发送请求。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::clients::GenerateRequest;
use crate::config::{Config, GenerationParams};
use crate::error::{AppError, AppResult};
use crate::infrastructure::RemoteSession;
use crate::models::{LanguagePack, SectionTree, UsageStats};
use crate::services::RequestClient;
use crate::utils::truncate_text;
use crate::workflow::artifact::{artifact_path, StepArtifact};
use crate::workflow::document_ctx::DocumentCtx;
use crate::workflow::outline::{extract_chapter_titles, strip_structure_json};
use crate::workflow::step::{plan_step, StepSource};

/// 一个文档的处理结果
#[derive(Debug, Clone)]
pub struct FlowOutput {
    /// 拼接后的摘要
    pub summary: String,
    pub output_path: PathBuf,
    /// 所有步骤的累计用量（速率已重新计算）
    pub stats: UsageStats,
}

/// 文档摘要流程
///
/// - 按顺序执行步骤，决定每一步读文件还是发请求
/// - 维护章节树
/// - 不论成功失败，结束时释放远程资源
pub struct SummaryFlow {
    client: Arc<RequestClient>,
    pack: Arc<LanguagePack>,
    model: String,
    params: GenerationParams,
    use_context_cache: bool,
}

impl SummaryFlow {
    pub fn new(config: &Config, client: Arc<RequestClient>, pack: Arc<LanguagePack>) -> Self {
        Self {
            client,
            pack,
            model: config.qualified_model_name(),
            params: config.generation.clone(),
            use_context_cache: config.use_context_cache,
        }
    }

    pub async fn run(&self, ctx: &DocumentCtx) -> AppResult<FlowOutput> {
        let mut session = RemoteSession::new(
            self.client.generator().clone(),
            self.client.retry_policy().clone(),
            self.model.clone(),
            self.pack.system_instruction.clone(),
            self.use_context_cache,
        );

        let result = self.run_steps(ctx, &mut session).await;
        session.release().await;
        result
    }

    async fn run_steps(&self, ctx: &DocumentCtx, session: &mut RemoteSession) -> AppResult<FlowOutput> {
        let structure_step = self.pack.structure_step();
        let mut tree = SectionTree::new();
        let mut totals = UsageStats::new();
        let mut summary = String::new();
        let mut index = 0;

        while let Some(step) = plan_step(&self.pack, &tree, index) {
            let path = artifact_path(&ctx.artifacts_dir, index);

            let artifact = match StepSource::locate(&path, &step.prompt).await? {
                StepSource::Cached { text } => {
                    info!("⏭️ 跳过已存在的文件: {}", path.display());
                    let artifact = StepArtifact::parse(index, &text);
                    if index == structure_step {
                        tree.insert(&extract_chapter_titles(&artifact.response)?);
                    }
                    artifact
                }
                StepSource::Live { prompt } => {
                    self.run_live(ctx, session, &mut tree, &path, index, &prompt)
                        .await?
                }
            };

            totals.merge(&artifact.usage);

            let response = if index == structure_step {
                strip_structure_json(&artifact.response)
            } else {
                artifact.response
            };
            if index > 0 {
                summary.push('\n');
            }
            summary.push_str(&step.title);
            summary.push_str("\n\n");
            summary.push_str(&response);

            index += 1;
        }

        debug!("{} 共 {} 个步骤，{} 个顶层章节", ctx, index, tree.top_level().len());
        totals.apply_rates();

        Ok(FlowOutput {
            summary,
            output_path: ctx.output_path.clone(),
            stats: totals,
        })
    }

    /// 发送请求并写入步骤文件
    ///
    /// 返回的结果从写入的文件内容重新解析，与之后从文件恢复的结果一致。
    async fn run_live(
        &self,
        ctx: &DocumentCtx,
        session: &mut RemoteSession,
        tree: &mut SectionTree,
        path: &Path,
        index: usize,
        prompt: &str,
    ) -> AppResult<StepArtifact> {
        let context = session.ensure_context(&ctx.input).await?;

        let first_line = prompt.trim_end().lines().next().unwrap_or("");
        let known_sections = tree.top_level().len();
        let last = if known_sections > 0 {
            format!("/{}", self.pack.steps.len() + known_sections - 1)
        } else {
            String::new()
        };
        info!("---- {}Prompt {}{}: {}", ctx.progress_prefix(), index, last, first_line);
        debug!("提示词: {}", truncate_text(prompt, 200));

        let request = GenerateRequest {
            model: self.model.clone(),
            params: self.params.clone(),
            system_instruction: self.pack.system_instruction.clone(),
            context,
            prompt: prompt.to_string(),
        };
        let outcome = self.client.call(&request).await?;

        let mut artifact = StepArtifact {
            index,
            usage: outcome.usage,
            prompt: prompt.to_string(),
            response: outcome.text,
        };

        if index == self.pack.structure_step() {
            match extract_chapter_titles(&artifact.response) {
                Ok(titles) => {
                    tree.insert(&titles);
                    artifact.response = format!("{}\n{}", artifact.response, tree.render());
                }
                Err(e) => {
                    // 保留原始响应以便检查
                    write_artifact(&ctx.artifacts_dir, path, &artifact).await?;
                    return Err(e.into());
                }
            }
        }

        if !artifact.usage.is_empty() {
            info!("📊 本次用量:\n{}", artifact.usage.render(""));
        }

        let rendered = write_artifact(&ctx.artifacts_dir, path, &artifact).await?;
        Ok(StepArtifact::parse(index, &rendered))
    }
}

async fn write_artifact(dir: &Path, path: &Path, artifact: &StepArtifact) -> AppResult<String> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::create_dir_failed(dir.display().to_string(), e))?;

    let rendered = artifact.render();
    tokio::fs::write(path, &rendered)
        .await
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
    Ok(rendered)
}
