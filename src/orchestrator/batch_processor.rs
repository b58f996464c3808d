//! 批量文档处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量文档的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：选择语言包、创建生成后端和请求客户端
//! 2. **配置检查**：输出路径冲突、API 密钥
//! 3. **顺序处理**：一个文档处理完（或失败）后再处理下一个
//! 4. **全局统计**：汇总所有文档的处理结果
//!
//! 限流窗口由所有文档共用。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{error, info, warn};

use crate::clients::{build_generator, Generator};
use crate::config::Config;
use crate::models::{load_language_pack, LanguagePack};
use crate::orchestrator::document_processor::{process_document, resolve_output_paths, OutputOptions};
use crate::services::{ChunkSink, NoopSink, RateLimiter, RequestClient, RetryPolicy, StdoutSink};
use crate::utils::logging::{log_documents_loaded, log_startup, print_final_stats};
use crate::workflow::{DocumentCtx, SummaryFlow};

/// 批量处理统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}

/// 应用主结构
pub struct App {
    config: Config,
    flow: SummaryFlow,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let pack = select_language_pack(&config).await?;
        let generator = build_generator(&config);
        Ok(Self::with_generator(config, generator, pack))
    }

    /// 使用指定的生成后端创建应用
    pub fn with_generator(config: Config, generator: Arc<dyn Generator>, pack: LanguagePack) -> Self {
        info!("🌐 输出语言: {} | 后端: {}", pack.name, generator.name());

        let sink: Arc<dyn ChunkSink> = if config.echo_stream {
            Arc::new(StdoutSink)
        } else {
            Arc::new(NoopSink)
        };
        let client = RequestClient::new(
            generator,
            Arc::new(RateLimiter::new(config.max_rpm)),
            RetryPolicy::from(&config.retry),
            sink,
        );
        let flow = SummaryFlow::new(&config, Arc::new(client), Arc::new(pack));

        Self { config, flow }
    }

    /// 运行应用主逻辑
    pub async fn run(&self, paths: &[PathBuf]) -> Result<BatchStats> {
        if paths.is_empty() {
            warn!("⚠️ 没有指定待处理的文档，程序结束");
            return Ok(BatchStats::default());
        }

        self.config
            .validate(paths.len())
            .context("配置检查失败")?;

        let started = Local::now();
        let total = paths.len();
        log_documents_loaded(total);

        let options = OutputOptions {
            output_file: self.config.output_file.as_deref(),
            output_dir: self.config.output_dir.as_deref(),
            suffix: self.config.output_suffix.as_deref(),
        };

        let mut stats = BatchStats {
            total,
            ..Default::default()
        };

        for (idx, path) in paths.iter().enumerate() {
            let (artifacts_dir, output_path) = resolve_output_paths(path, &options);
            let ctx = DocumentCtx::new(path.clone(), artifacts_dir, output_path, idx + 1, total);

            match process_document(&self.flow, &ctx).await {
                Ok(_) => stats.success += 1,
                Err(e) => {
                    error!("{} ❌ 处理过程中发生错误: {:#}", ctx, e);
                    stats.failed += 1;
                }
            }
        }

        print_final_stats(stats.success, stats.failed, stats.total, started);

        Ok(stats)
    }
}

/// 语言包文件优先，其次按语言代码选择内置语言包
async fn select_language_pack(config: &Config) -> Result<LanguagePack> {
    let pack = match &config.language_pack_file {
        Some(file) => load_language_pack(Path::new(file))
            .await
            .with_context(|| format!("无法加载语言包文件: {}", file))?,
        None => LanguagePack::select(config.language.as_deref())?,
    };
    Ok(pack)
}
