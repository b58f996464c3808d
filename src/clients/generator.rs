//! 生成后端抽象
//!
//! 流水线只依赖这里的 [`Generator`]：上传文档、创建/删除上下文缓存、
//! 以流的形式生成文本。具体的 HTTP 协议由各个客户端实现。

use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::GenerationParams;
use crate::error::{AppResult, GenerationError};
use crate::models::UsageStats;

/// 已上传（或已登记）的文档
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    /// 服务端资源名，删除时使用
    pub name: String,
    pub display_name: String,
    pub uri: String,
    pub mime_type: String,
    /// 不支持文件上传的后端把文档内容直接放在这里
    pub inline_content: Option<String>,
}

/// 服务端上下文缓存
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHandle {
    pub name: String,
}

/// 提示词附带的上下文
#[derive(Debug, Clone)]
pub enum PromptContext {
    /// 每次请求都附带文档引用和系统指令
    Document(DocumentHandle),
    /// 文档和系统指令已在缓存中
    Cache(CacheHandle),
}

/// 一次生成请求
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub params: GenerationParams,
    pub system_instruction: String,
    pub context: PromptContext,
    pub prompt: String,
}

/// 服务端返回的用量元数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageMetadata {
    pub prompt_token_count: u64,
    pub candidates_token_count: u64,
    pub total_token_count: u64,
    pub cached_content_token_count: Option<u64>,
}

impl UsageMetadata {
    pub fn to_stats(&self) -> UsageStats {
        let mut stats = UsageStats::new();
        stats.set("prompt_token_count", self.prompt_token_count);
        if let Some(cached) = self.cached_content_token_count {
            stats.set("cached_content_token_count", cached);
        }
        stats.set("candidates_token_count", self.candidates_token_count);
        stats.set("total_token_count", self.total_token_count);
        stats
    }
}

/// 流中的一个片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Text(String),
    /// 用量（可能出现多次，以最后一次为准）
    Usage(UsageMetadata),
}

pub type ChunkStream = BoxStream<'static, Result<StreamChunk, GenerationError>>;

/// 生成后端
#[async_trait]
pub trait Generator: Send + Sync {
    /// 后端名称（用于日志和错误信息）
    fn name(&self) -> &str;

    async fn upload_document(&self, path: &Path) -> AppResult<DocumentHandle>;

    async fn delete_document(&self, document: &DocumentHandle) -> AppResult<()>;

    /// 创建上下文缓存，后端不支持时返回 `None`
    async fn create_cache(
        &self,
        model: &str,
        document: &DocumentHandle,
        system_instruction: &str,
    ) -> AppResult<Option<CacheHandle>>;

    async fn delete_cache(&self, cache: &CacheHandle) -> AppResult<()>;

    async fn stream_generate(&self, request: &GenerateRequest) -> Result<ChunkStream, GenerationError>;
}

/// 根据扩展名推断上传时使用的 MIME 类型
pub fn document_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("txt") => "text/plain",
        _ => "text/markdown",
    }
}

/// 文件名（用于显示）
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_to_stats_order() {
        let usage = UsageMetadata {
            prompt_token_count: 100,
            candidates_token_count: 20,
            total_token_count: 120,
            cached_content_token_count: Some(80),
        };
        let stats = usage.to_stats();
        let keys: Vec<&str> = stats.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "cached_content_token_count",
                "prompt_token_count",
                "candidates_token_count",
                "total_token_count"
            ]
        );
    }

    #[test]
    fn test_document_mime_type() {
        assert_eq!(document_mime_type(Path::new("paper.md")), "text/markdown");
        assert_eq!(document_mime_type(Path::new("paper.TXT")), "text/plain");
    }
}
