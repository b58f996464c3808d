/// Gemini API 客户端
///
/// 使用 Gemini 原生 REST 接口（v1beta）：
/// - 文件上传：`upload/v1beta/files`（resumable 协议）
/// - 上下文缓存：`v1beta/cachedContents`
/// - 流式生成：`{model}:streamGenerateContent?alt=sse`
use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::clients::generator::{
    display_name, document_mime_type, CacheHandle, ChunkStream, DocumentHandle, GenerateRequest,
    Generator, PromptContext, StreamChunk, UsageMetadata,
};
use crate::error::{AppError, AppResult, GenerationError};

const BACKEND: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini 客户端
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// 使用自定义地址（测试或代理）
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn delete_resource(&self, name: &str) -> Result<(), GenerationError> {
        let response = self
            .http
            .delete(self.url(&format!("v1beta/{}", name)))
            .query(&[("key", &self.api_key)])
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    file: FileResource,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    uri: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct CachedContentResponse {
    name: String,
}

#[async_trait]
impl Generator for GeminiClient {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn upload_document(&self, path: &Path) -> AppResult<DocumentHandle> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        let mime_type = document_mime_type(path);
        let doc_name = display_name(path);

        debug!("开始上传文档: {} ({} 字节)", doc_name, bytes.len());

        let start = self
            .http
            .post(self.url("upload/v1beta/files"))
            .query(&[("key", &self.api_key)])
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": doc_name } }))
            .send()
            .await
            .map_err(transport_error)?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| malformed("上传响应缺少 x-goog-upload-url"))?
            .to_string();

        let response = self
            .http
            .post(upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(transport_error)?;
        let uploaded: UploadResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| malformed(format!("无法解析上传响应: {}", e)))?;

        let file = uploaded.file;
        Ok(DocumentHandle {
            display_name: file.display_name.unwrap_or(doc_name),
            mime_type: file.mime_type.unwrap_or_else(|| mime_type.to_string()),
            name: file.name,
            uri: file.uri,
            inline_content: None,
        })
    }

    async fn delete_document(&self, document: &DocumentHandle) -> AppResult<()> {
        self.delete_resource(&document.name).await?;
        Ok(())
    }

    async fn create_cache(
        &self,
        model: &str,
        document: &DocumentHandle,
        system_instruction: &str,
    ) -> AppResult<Option<CacheHandle>> {
        let body = json!({
            "model": model,
            "systemInstruction": { "parts": [{ "text": system_instruction }] },
            "contents": [{
                "role": "user",
                "parts": [file_part(document)],
            }],
        });

        let response = self
            .http
            .post(self.url("v1beta/cachedContents"))
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let cached: CachedContentResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| malformed(format!("无法解析缓存响应: {}", e)))?;

        debug!("缓存资源名: {}", cached.name);
        Ok(Some(CacheHandle { name: cached.name }))
    }

    async fn delete_cache(&self, cache: &CacheHandle) -> AppResult<()> {
        self.delete_resource(&cache.name).await?;
        Ok(())
    }

    async fn stream_generate(&self, request: &GenerateRequest) -> Result<ChunkStream, GenerationError> {
        let body = build_generate_body(request);
        debug!("调用 Gemini 流式接口，模型: {}", request.model);

        let response = self
            .http
            .post(self.url(&format!("v1beta/{}:streamGenerateContent", request.model)))
            .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let state = SseState {
            response,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        };
        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.finished {
                    return None;
                }
                match state.response.chunk().await {
                    Ok(Some(bytes)) => {
                        state.buffer.extend_from_slice(&bytes);
                        state.drain_lines();
                    }
                    Ok(None) => {
                        state.finished = true;
                        let rest = std::mem::take(&mut state.buffer);
                        state.push_line(&String::from_utf8_lossy(&rest));
                    }
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(transport_error(e)), state));
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

/// SSE 解析状态：按字节缓冲，只解码完整的行，避免切断多字节字符
struct SseState {
    response: reqwest::Response,
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamChunk, GenerationError>>,
    finished: bool,
}

impl SseState {
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.push_line(&String::from_utf8_lossy(&line));
        }
    }

    fn push_line(&mut self, line: &str) {
        let line = line.trim();
        if let Some(data) = line.strip_prefix("data:") {
            match parse_sse_data(data.trim()) {
                Ok(chunks) => self.pending.extend(chunks.into_iter().map(Ok)),
                Err(e) => {
                    self.pending.push_back(Err(e));
                    self.finished = true;
                }
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
    #[serde(default)]
    cached_content_token_count: Option<u64>,
}

/// 解析一条 SSE `data:` 负载
fn parse_sse_data(data: &str) -> Result<Vec<StreamChunk>, GenerationError> {
    if data.is_empty() || data == "[DONE]" {
        return Ok(Vec::new());
    }
    let parsed: StreamResponse =
        serde_json::from_str(data).map_err(|e| malformed(format!("{}: {}", e, data)))?;

    let mut chunks: Vec<StreamChunk> = parsed
        .candidates
        .into_iter()
        .take(1)
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .filter(|t| !t.is_empty())
        .map(StreamChunk::Text)
        .collect();

    if let Some(usage) = parsed.usage_metadata {
        chunks.push(StreamChunk::Usage(UsageMetadata {
            prompt_token_count: usage.prompt_token_count,
            candidates_token_count: usage.candidates_token_count,
            total_token_count: usage.total_token_count,
            cached_content_token_count: usage.cached_content_token_count,
        }));
    }
    Ok(chunks)
}

fn file_part(document: &DocumentHandle) -> Value {
    json!({
        "fileData": {
            "mimeType": document.mime_type,
            "fileUri": document.uri,
        }
    })
}

fn build_generate_body(request: &GenerateRequest) -> Value {
    let params = &request.params;
    let generation_config = json!({
        "temperature": params.temperature,
        "topP": params.top_p,
        "topK": params.top_k,
        "maxOutputTokens": params.max_output_tokens,
        "responseMimeType": params.response_mime_type,
    });

    match &request.context {
        PromptContext::Cache(cache) => json!({
            "cachedContent": cache.name,
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": generation_config,
        }),
        PromptContext::Document(document) => json!({
            "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
            "contents": [{
                "role": "user",
                "parts": [file_part(document), { "text": request.prompt }],
            }],
            "generationConfig": generation_config,
        }),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GenerationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(GenerationError::from_status(BACKEND, status.as_u16(), text))
}

fn transport_error(err: reqwest::Error) -> GenerationError {
    if err.is_builder() {
        return GenerationError::Rejected {
            backend: BACKEND.to_string(),
            status: None,
            message: err.to_string(),
        };
    }
    match err.status() {
        Some(status) => GenerationError::from_status(BACKEND, status.as_u16(), err.to_string()),
        None => GenerationError::Transient {
            backend: BACKEND.to_string(),
            message: err.to_string(),
        },
    }
}

fn malformed(message: impl Into<String>) -> GenerationError {
    GenerationError::MalformedStream {
        backend: BACKEND.to_string(),
        message: message.into(),
    }
}
