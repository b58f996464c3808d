//! OpenAI 兼容客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行流式调用
//! - 兼容 OpenAI API 的服务（如 Gemini 的 OpenAI 兼容端点、各类代理）
//!
//! 这类接口没有文件上传和上下文缓存：文档内容在"上传"时读入内存，
//! 每次请求作为用户消息的一部分发送。

use std::path::Path;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartText,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::clients::generator::{
    display_name, document_mime_type, CacheHandle, ChunkStream, DocumentHandle, GenerateRequest,
    Generator, PromptContext, StreamChunk, UsageMetadata,
};
use crate::config::Config;
use crate::error::{AppError, AppResult, GenerationError};

const BACKEND: &str = "openai";

/// OpenAI 兼容客户端
pub struct OpenAiCompatClient {
    client: Client<OpenAIConfig>,
}

impl OpenAiCompatClient {
    /// 创建新的客户端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
        }
    }

    fn build_messages(
        &self,
        request: &GenerateRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, GenerationError> {
        let document = match &request.context {
            PromptContext::Document(document) => document,
            PromptContext::Cache(cache) => {
                return Err(rejected(format!("不支持上下文缓存: {}", cache.name)));
            }
        };

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system_instruction.as_str())
            .build()
            .map_err(|e| rejected(e.to_string()))?;

        let mut parts = Vec::new();
        if let Some(content) = &document.inline_content {
            parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: content.clone(),
                },
            ));
        }
        parts.push(ChatCompletionRequestUserMessageContentPart::Text(
            ChatCompletionRequestMessageContentPartText {
                text: request.prompt.clone(),
            },
        ));

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(parts))
            .build()
            .map_err(|e| rejected(e.to_string()))?;

        Ok(vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ])
    }

    /// 流式请求，要求服务端在最后一个分片附带用量
    fn build_chat_request(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<CreateChatCompletionRequest, GenerationError> {
        let mut chat_request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(self.build_messages(request)?)
            .temperature(request.params.temperature)
            .top_p(request.params.top_p)
            .max_completion_tokens(request.params.max_output_tokens)
            .stream(true)
            .build()
            .map_err(|e| rejected(e.to_string()))?;

        // 不带 include_usage 时兼容服务不会返回用量分片
        chat_request.stream_options = Some(
            serde_json::from_value(serde_json::json!({ "include_usage": true }))
                .map_err(|e| rejected(e.to_string()))?,
        );

        Ok(chat_request)
    }
}

#[async_trait]
impl Generator for OpenAiCompatClient {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn upload_document(&self, path: &Path) -> AppResult<DocumentHandle> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

        debug!("文档内容已读入内存: {} 字符", content.chars().count());

        Ok(DocumentHandle {
            name: format!("local/{}", display_name(path)),
            display_name: display_name(path),
            uri: path.display().to_string(),
            mime_type: document_mime_type(path).to_string(),
            inline_content: Some(content),
        })
    }

    async fn delete_document(&self, document: &DocumentHandle) -> AppResult<()> {
        debug!("本地文档无需删除: {}", document.name);
        Ok(())
    }

    async fn create_cache(
        &self,
        _model: &str,
        _document: &DocumentHandle,
        _system_instruction: &str,
    ) -> AppResult<Option<CacheHandle>> {
        warn!("⚠️ OpenAI 兼容接口不支持上下文缓存，每次请求都会发送文档内容");
        Ok(None)
    }

    async fn delete_cache(&self, cache: &CacheHandle) -> AppResult<()> {
        debug!("无需删除缓存: {}", cache.name);
        Ok(())
    }

    async fn stream_generate(&self, request: &GenerateRequest) -> Result<ChunkStream, GenerationError> {
        let model = request
            .model
            .strip_prefix("models/")
            .unwrap_or(&request.model);
        debug!("调用 OpenAI 兼容接口，模型: {}", model);

        let chat_request = self.build_chat_request(model, request)?;

        let stream = self
            .client
            .chat()
            .create_stream(chat_request)
            .await
            .map_err(|e| classify_message(&e.to_string()))?;

        let chunks = stream.flat_map(|item| {
            let converted: Vec<Result<StreamChunk, GenerationError>> = match item {
                Ok(response) => {
                    let mut out: Vec<Result<StreamChunk, GenerationError>> = response
                        .choices
                        .into_iter()
                        .take(1)
                        .filter_map(|choice| choice.delta.content)
                        .filter(|text| !text.is_empty())
                        .map(|text| Ok(StreamChunk::Text(text)))
                        .collect();
                    if let Some(usage) = response.usage {
                        out.push(Ok(StreamChunk::Usage(UsageMetadata {
                            prompt_token_count: u64::from(usage.prompt_tokens),
                            candidates_token_count: u64::from(usage.completion_tokens),
                            total_token_count: u64::from(usage.total_tokens),
                            cached_content_token_count: usage
                                .prompt_tokens_details
                                .and_then(|d| d.cached_tokens)
                                .map(u64::from),
                        })));
                    }
                    out
                }
                Err(e) => vec![Err(classify_message(&e.to_string()))],
            };
            futures::stream::iter(converted)
        });

        Ok(Box::pin(chunks))
    }
}

/// 根据错误信息判断是否可以重试
///
/// `async-openai` 的错误类型不直接暴露 HTTP 状态码，只能按文本匹配。
pub fn classify_message(message: &str) -> GenerationError {
    let lower = message.to_lowercase();
    let transient = ["429", "500", "502", "503", "504"]
        .iter()
        .any(|code| lower.contains(code))
        || [
            "rate limit",
            "resource_exhausted",
            "resource exhausted",
            "overloaded",
            "unavailable",
            "timed out",
            "timeout",
            "connection",
            "broken pipe",
            "stream failed",
        ]
        .iter()
        .any(|marker| lower.contains(marker));

    if transient {
        GenerationError::Transient {
            backend: BACKEND.to_string(),
            message: message.to_string(),
        }
    } else {
        rejected(message)
    }
}

fn rejected(message: impl Into<String>) -> GenerationError {
    GenerationError::Rejected {
        backend: BACKEND.to_string(),
        status: None,
        message: message.into(),
    }
}
