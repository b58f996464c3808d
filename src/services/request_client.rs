//! 请求客户端
//!
//! 对生成后端的一次调用：等待限流、带重试地流式生成、
//! 边接收边输出，最后返回规范化后的文本和本次用量。

use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;
use tokio::time::Instant;
use tracing::debug;

use crate::clients::{GenerateRequest, Generator, StreamChunk, UsageMetadata};
use crate::error::GenerationError;
use crate::models::UsageStats;
use crate::services::rate_limiter::RateLimiter;
use crate::services::retry::RetryPolicy;

/// 流式片段的输出目标
pub trait ChunkSink: Send + Sync {
    fn on_chunk(&self, text: &str);

    /// 一次响应结束，`ended_with_newline` 表示最后输出的片段是否以换行结尾
    fn on_finish(&self, _ended_with_newline: bool) {}
}

/// 实时输出到标准输出
pub struct StdoutSink;

impl ChunkSink for StdoutSink {
    fn on_chunk(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn on_finish(&self, ended_with_newline: bool) {
        if !ended_with_newline {
            println!();
        }
    }
}

/// 丢弃所有片段
pub struct NoopSink;

impl ChunkSink for NoopSink {
    fn on_chunk(&self, _text: &str) {}
}

/// 一次调用的结果
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// 去掉末尾空白后加一个换行
    pub text: String,
    pub usage: UsageStats,
}

/// 单次流式生成的原始结果
struct StreamedResponse {
    text: String,
    usage: Option<UsageMetadata>,
    issued: Instant,
    first_chunk: Instant,
    completed: Instant,
}

pub struct RequestClient {
    generator: Arc<dyn Generator>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    sink: Arc<dyn ChunkSink>,
}

impl RequestClient {
    pub fn new(
        generator: Arc<dyn Generator>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        sink: Arc<dyn ChunkSink>,
    ) -> Self {
        Self {
            generator,
            limiter,
            retry,
            sink,
        }
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// 发送一次请求
    ///
    /// 只有成功的调用才会计入限流窗口。
    pub async fn call(&self, request: &GenerateRequest) -> Result<CallOutcome, GenerationError> {
        self.limiter.acquire().await;

        let response = self
            .retry
            .run(|attempt| self.stream_once(request, attempt))
            .await?;

        self.limiter.record_completion(response.completed);
        self.sink.on_finish(response.text.ends_with('\n'));

        let text = format!("{}\n", response.text.trim_end());
        let usage = match &response.usage {
            Some(meta) => {
                let mut stats = meta.to_stats();
                stats.set(
                    "prompt_eval_duration",
                    millis(response.first_chunk - response.issued),
                );
                stats.set(
                    "candidates_eval_duration",
                    millis(response.completed - response.first_chunk),
                );
                stats.apply_rates();
                stats
            }
            None => UsageStats::new(),
        };

        Ok(CallOutcome { text, usage })
    }

    async fn stream_once(
        &self,
        request: &GenerateRequest,
        attempt: u32,
    ) -> Result<StreamedResponse, GenerationError> {
        if attempt > 0 {
            debug!("第 {} 次尝试: {}", attempt + 1, self.generator.name());
        }

        let issued = Instant::now();
        let mut stream = self.generator.stream_generate(request).await?;

        let mut text = String::new();
        let mut usage = None;
        let mut first_chunk = None;

        while let Some(item) = stream.next().await {
            let chunk = item?;
            first_chunk.get_or_insert_with(Instant::now);
            match chunk {
                StreamChunk::Text(piece) => {
                    self.sink.on_chunk(&piece);
                    text.push_str(&piece);
                }
                StreamChunk::Usage(meta) => usage = Some(meta),
            }
        }

        let completed = Instant::now();
        Ok(StreamedResponse {
            text,
            usage,
            issued,
            first_chunk: first_chunk.unwrap_or(completed),
            completed,
        })
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    duration.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{CacheHandle, ChunkStream, DocumentHandle, PromptContext};
    use crate::config::GenerationParams;
    use crate::error::AppResult;
    use crate::models::StatValue;
    use crate::services::rate_limiter::RATE_WINDOW;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// 每次返回固定片段，并记录请求发出的时间
    #[derive(Default)]
    struct ScriptedGenerator {
        issued: Mutex<Vec<Instant>>,
        failures_left: Mutex<u32>,
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn upload_document(&self, _path: &Path) -> AppResult<DocumentHandle> {
            unreachable!()
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
            Ok(None)
        }

        async fn delete_cache(&self, _cache: &CacheHandle) -> AppResult<()> {
            Ok(())
        }

        async fn stream_generate(&self, _request: &GenerateRequest) -> Result<ChunkStream, GenerationError> {
            self.issued.lock().unwrap().push(Instant::now());
            {
                let mut failures = self.failures_left.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(GenerationError::from_status("scripted", 429, "quota"));
                }
            }
            let chunks = vec![
                Ok(StreamChunk::Text("Hello ".to_string())),
                Ok(StreamChunk::Text("world  \n\n".to_string())),
                Ok(StreamChunk::Usage(UsageMetadata {
                    prompt_token_count: 100,
                    candidates_token_count: 5,
                    total_token_count: 105,
                    cached_content_token_count: None,
                })),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "models/test".to_string(),
            params: GenerationParams::default(),
            system_instruction: "sys".to_string(),
            context: PromptContext::Cache(CacheHandle {
                name: "cachedContents/1".to_string(),
            }),
            prompt: "Summarize".to_string(),
        }
    }

    fn client(generator: Arc<ScriptedGenerator>, max_rpm: usize) -> RequestClient {
        RequestClient::new(
            generator,
            Arc::new(RateLimiter::new(max_rpm)),
            RetryPolicy::default(),
            Arc::new(NoopSink),
        )
    }

    #[tokio::test]
    async fn test_call_normalizes_text_and_usage() {
        let generator = Arc::new(ScriptedGenerator::default());
        let outcome = client(generator, 0).call(&request()).await.unwrap();

        assert_eq!(outcome.text, "Hello world\n");
        assert_eq!(outcome.usage.get("prompt_token_count"), Some(&StatValue::Int(100)));
        assert!(outcome.usage.get("prompt_eval_duration").is_some());
        assert!(outcome.usage.get("candidates_eval_duration").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_ceiling_delays_third_call() {
        let generator = Arc::new(ScriptedGenerator::default());
        let client = client(generator.clone(), 2);

        for _ in 0..3 {
            client.call(&request()).await.unwrap();
        }

        let issued = generator.issued.lock().unwrap();
        assert_eq!(issued.len(), 3);
        assert!(issued[1] - issued[0] < Duration::from_secs(1));
        assert!(issued[2] - issued[0] >= RATE_WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retried() {
        let generator = Arc::new(ScriptedGenerator::default());
        *generator.failures_left.lock().unwrap() = 1;
        let client = client(generator.clone(), 0);

        let outcome = client.call(&request()).await.unwrap();
        assert_eq!(outcome.text, "Hello world\n");
        assert_eq!(generator.issued.lock().unwrap().len(), 2);
    }
}
