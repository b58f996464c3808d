//! 远程会话 - 基础设施层
//!
//! 持有已上传文档和上下文缓存这两个远程资源，只暴露"取得上下文"和"释放"的能力。
//! 不认识步骤和章节。

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::clients::{CacheHandle, DocumentHandle, Generator, PromptContext};
use crate::error::AppResult;
use crate::services::RetryPolicy;

/// 远程会话
///
/// 职责：
/// - 每个文档最多上传一次（第一次需要发送请求时）
/// - 按配置创建上下文缓存
/// - 释放时先删除缓存再删除文档，各一次
///
/// 上传和创建缓存遇到暂时性错误时按重试策略重试。
pub struct RemoteSession {
    generator: Arc<dyn Generator>,
    retry: RetryPolicy,
    model: String,
    system_instruction: String,
    use_cache: bool,
    document: Option<DocumentHandle>,
    cache: Option<CacheHandle>,
}

impl RemoteSession {
    pub fn new(
        generator: Arc<dyn Generator>,
        retry: RetryPolicy,
        model: impl Into<String>,
        system_instruction: impl Into<String>,
        use_cache: bool,
    ) -> Self {
        Self {
            generator,
            retry,
            model: model.into(),
            system_instruction: system_instruction.into(),
            use_cache,
            document: None,
            cache: None,
        }
    }

    /// 取得请求上下文，必要时上传文档并创建缓存
    pub async fn ensure_context(&mut self, path: &Path) -> AppResult<PromptContext> {
        if let Some(cache) = &self.cache {
            return Ok(PromptContext::Cache(cache.clone()));
        }
        if let Some(document) = &self.document {
            return Ok(PromptContext::Document(document.clone()));
        }

        let generator = &self.generator;
        let document = self
            .retry
            .run(|_| generator.upload_document(path))
            .await?;
        info!("📤 已上传文档: {} ({})", document.display_name, document.uri);
        self.document = Some(document.clone());

        if self.use_cache {
            let (model, instruction) = (&self.model, &self.system_instruction);
            let created = self
                .retry
                .run(|_| generator.create_cache(model, &document, instruction))
                .await?;
            if let Some(cache) = created {
                info!("🗄️ 已创建上下文缓存: {}", cache.name);
                self.cache = Some(cache.clone());
                return Ok(PromptContext::Cache(cache));
            }
        }

        Ok(PromptContext::Document(document))
    }

    /// 释放远程资源，错误只记录不返回
    pub async fn release(&mut self) {
        if let Some(cache) = self.cache.take() {
            match self.generator.delete_cache(&cache).await {
                Ok(()) => info!("🧹 已删除上下文缓存: {}", cache.name),
                Err(e) => warn!("⚠️ 删除上下文缓存失败 ({}): {}", cache.name, e),
            }
        }
        if let Some(document) = self.document.take() {
            match self.generator.delete_document(&document).await {
                Ok(()) => info!("🧹 已删除上传的文档: {}", document.display_name),
                Err(e) => warn!("⚠️ 删除上传的文档失败 ({}): {}", document.name, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ChunkStream, GenerateRequest};
    use crate::error::{AppError, GenerationError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// 上传和创建缓存各先失败若干次
    struct FlakyGenerator {
        upload_failures: AtomicU32,
        cache_failures: AtomicU32,
        uploads: AtomicU32,
        cache_creates: AtomicU32,
        status: u16,
    }

    impl FlakyGenerator {
        fn new(upload_failures: u32, cache_failures: u32, status: u16) -> Self {
            Self {
                upload_failures: AtomicU32::new(upload_failures),
                cache_failures: AtomicU32::new(cache_failures),
                uploads: AtomicU32::new(0),
                cache_creates: AtomicU32::new(0),
                status,
            }
        }

        fn fail_once(&self, counter: &AtomicU32) -> AppResult<()> {
            let left = counter.load(Ordering::SeqCst);
            if left > 0 {
                counter.store(left - 1, Ordering::SeqCst);
                return Err(GenerationError::from_status("flaky", self.status, "busy").into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Generator for FlakyGenerator {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn upload_document(&self, path: &Path) -> AppResult<DocumentHandle> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            self.fail_once(&self.upload_failures)?;
            Ok(DocumentHandle {
                name: "files/1".to_string(),
                display_name: path.display().to_string(),
                uri: "https://example.invalid/files/1".to_string(),
                mime_type: "text/markdown".to_string(),
                inline_content: None,
            })
        }

        async fn delete_document(&self, _document: &DocumentHandle) -> AppResult<()> {
            Ok(())
        }

        async fn create_cache(
            &self,
            _model: &str,
            _document: &DocumentHandle,
            _system_instruction: &str,
        ) -> AppResult<Option<CacheHandle>> {
            self.cache_creates.fetch_add(1, Ordering::SeqCst);
            self.fail_once(&self.cache_failures)?;
            Ok(Some(CacheHandle {
                name: "cachedContents/1".to_string(),
            }))
        }

        async fn delete_cache(&self, _cache: &CacheHandle) -> AppResult<()> {
            Ok(())
        }

        async fn stream_generate(&self, _request: &GenerateRequest) -> Result<ChunkStream, GenerationError> {
            unreachable!()
        }
    }

    fn session(generator: Arc<FlakyGenerator>) -> RemoteSession {
        RemoteSession::new(generator, RetryPolicy::default(), "models/test", "sys", true)
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_upload_and_cache_errors_are_retried() {
        let generator = Arc::new(FlakyGenerator::new(1, 1, 503));
        let mut session = session(generator.clone());

        let context = session.ensure_context(Path::new("paper.md")).await.unwrap();
        assert!(matches!(context, PromptContext::Cache(_)));
        assert_eq!(generator.uploads.load(Ordering::SeqCst), 2);
        assert_eq!(generator.cache_creates.load(Ordering::SeqCst), 2);

        // 之后直接复用
        session.ensure_context(Path::new("paper.md")).await.unwrap();
        assert_eq!(generator.uploads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_upload_is_not_retried() {
        let generator = Arc::new(FlakyGenerator::new(1, 0, 403));
        let mut session = session(generator.clone());

        let err = session.ensure_context(Path::new("paper.md")).await.unwrap_err();
        assert!(matches!(err, AppError::Generation(GenerationError::Rejected { .. })));
        assert_eq!(generator.uploads.load(Ordering::SeqCst), 1);
    }
}
