pub mod gemini_client;
pub mod generator;
pub mod openai_client;

use std::sync::Arc;

use crate::config::{BackendKind, Config};

pub use gemini_client::GeminiClient;
pub use generator::{
    CacheHandle, ChunkStream, DocumentHandle, GenerateRequest, Generator, PromptContext,
    StreamChunk, UsageMetadata,
};
pub use openai_client::OpenAiCompatClient;

/// 根据配置创建生成后端
pub fn build_generator(config: &Config) -> Arc<dyn Generator> {
    match config.backend {
        BackendKind::Gemini => Arc::new(GeminiClient::new(&config.llm_api_key)),
        BackendKind::OpenAi => Arc::new(OpenAiCompatClient::new(config)),
    }
}
