use std::time::Duration;

use crate::error::ConfigError;

/// 生成后端类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Gemini 原生 REST API（支持文件上传与上下文缓存）
    Gemini,
    /// 兼容 OpenAI 的 API（文档内容直接放入提示词）
    OpenAi,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(BackendKind::Gemini),
            "openai" => Ok(BackendKind::OpenAi),
            other => Err(ConfigError::UnknownBackend {
                name: other.to_string(),
            }),
        }
    }
}

/// 生成参数
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            response_mime_type: "text/plain".to_string(),
        }
    }
}

/// 重试策略配置
#[derive(Clone, Debug, PartialEq)]
pub struct RetrySettings {
    /// 第一次重试前的等待时间
    pub initial_delay: Duration,
    /// 单次等待的上限
    pub max_delay: Duration,
    /// 退避倍数
    pub multiplier: f64,
    /// 从第一次请求开始计算的总时限
    pub deadline: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            deadline: Duration::from_secs(120),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 生成后端
    pub backend: BackendKind,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    /// 仅 OpenAI 兼容后端使用
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 每分钟最大请求数（0 表示不限制）
    pub max_rpm: usize,
    pub generation: GenerationParams,
    pub retry: RetrySettings,
    /// 是否启用上下文缓存
    pub use_context_cache: bool,
    /// 是否把流式响应实时打印到终端
    pub echo_stream: bool,
    // --- 语言 ---
    /// 输出语言（None 时根据系统区域设置选择）
    pub language: Option<String>,
    /// 自定义语言包（TOML 文件）
    pub language_pack_file: Option<String>,
    // --- 输出 ---
    /// 输出文件（只能处理单个文档时使用）
    pub output_file: Option<String>,
    /// 中间文件输出目录
    pub output_dir: Option<String>,
    /// 输出文件名后缀
    pub output_suffix: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Gemini,
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-2.0-flash".to_string(),
            max_rpm: 15,
            generation: GenerationParams::default(),
            retry: RetrySettings::default(),
            use_context_cache: false,
            echo_stream: true,
            language: None,
            language_pack_file: None,
            output_file: None,
            output_dir: None,
            output_suffix: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        let default_generation = default.generation.clone();
        let default_retry = default.retry.clone();
        Self {
            backend: env_parse("GENERATION_BACKEND").unwrap_or(default.backend),
            llm_api_key: std::env::var("GEMINI_API_KEY")
                .or_else(|_| std::env::var("LLM_API_KEY"))
                .unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("MODEL_NAME").unwrap_or(default.llm_model_name),
            max_rpm: env_parse("MAX_RPM").unwrap_or(default.max_rpm),
            generation: GenerationParams {
                temperature: env_parse("TEMPERATURE").unwrap_or(default_generation.temperature),
                top_p: env_parse("TOP_P").unwrap_or(default_generation.top_p),
                top_k: env_parse("TOP_K").unwrap_or(default_generation.top_k),
                max_output_tokens: env_parse("MAX_OUTPUT_TOKENS").unwrap_or(default_generation.max_output_tokens),
                response_mime_type: std::env::var("RESPONSE_MIME_TYPE").unwrap_or(default_generation.response_mime_type),
            },
            retry: RetrySettings {
                initial_delay: env_secs("RETRY_INITIAL_SECS").unwrap_or(default_retry.initial_delay),
                max_delay: env_secs("RETRY_MAX_SECS").unwrap_or(default_retry.max_delay),
                multiplier: std::env::var("RETRY_MULTIPLIER")
                    .ok()
                    .and_then(|v| parse_multiplier(&v))
                    .unwrap_or(default_retry.multiplier),
                deadline: env_secs("RETRY_DEADLINE_SECS").unwrap_or(default_retry.deadline),
            },
            use_context_cache: env_parse("USE_CONTEXT_CACHE").unwrap_or(default.use_context_cache),
            echo_stream: env_parse("ECHO_STREAM").unwrap_or(default.echo_stream),
            language: env_non_empty("LANGUAGE").or(default.language),
            language_pack_file: env_non_empty("LANGUAGE_PACK_FILE").or(default.language_pack_file),
            output_file: env_non_empty("OUTPUT_FILE").or(default.output_file),
            output_dir: env_non_empty("OUTPUT_DIR").or(default.output_dir),
            output_suffix: env_non_empty("OUTPUT_SUFFIX").or(default.output_suffix),
        }
    }

    /// 检查与输入文档数量相关的配置冲突
    pub fn validate(&self, document_count: usize) -> Result<(), ConfigError> {
        if self.output_file.is_some() {
            if self.output_dir.is_some() {
                return Err(ConfigError::OutputWithOutputDir);
            }
            if document_count > 1 {
                return Err(ConfigError::OutputWithMultipleInputs {
                    count: document_count,
                });
            }
        }
        if self.llm_api_key.is_empty() {
            return Err(ConfigError::MissingApiKey {
                var_name: "GEMINI_API_KEY".to_string(),
            });
        }
        Ok(())
    }

    /// 带 `models/` 前缀的模型名称（Gemini 原生 API 需要）
    pub fn qualified_model_name(&self) -> String {
        if self.llm_model_name.starts_with("models/") {
            self.llm_model_name.clone()
        } else {
            format!("models/{}", self.llm_model_name)
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name).ok().and_then(|v| parse_secs(&v))
}

/// 秒数，只接受有限的非负数
fn parse_secs(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// 退避倍数，只接受有限的非负数
fn parse_multiplier(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|m| m.is_finite() && *m >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> Config {
        Config {
            llm_api_key: "test-key".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_output_conflicts() {
        let config = Config {
            output_file: Some("summary.md".to_string()),
            output_dir: Some("out".to_string()),
            ..config_with_key()
        };
        assert!(matches!(config.validate(1), Err(ConfigError::OutputWithOutputDir)));

        let config = Config {
            output_file: Some("summary.md".to_string()),
            ..config_with_key()
        };
        assert!(config.validate(1).is_ok());
        assert!(matches!(
            config.validate(2),
            Err(ConfigError::OutputWithMultipleInputs { count: 2 })
        ));
    }

    #[test]
    fn test_retry_values_must_be_finite_and_non_negative() {
        assert_eq!(parse_secs("2.5"), Some(Duration::from_millis(2500)));
        assert_eq!(parse_secs(" 0 "), Some(Duration::ZERO));
        assert_eq!(parse_secs("-1"), None);
        assert_eq!(parse_secs("NaN"), None);
        assert_eq!(parse_secs("inf"), None);
        assert_eq!(parse_secs("ten"), None);

        assert_eq!(parse_multiplier("1.5"), Some(1.5));
        assert_eq!(parse_multiplier("-2"), None);
        assert_eq!(parse_multiplier("NaN"), None);
    }

    #[test]
    fn test_validate_requires_api_key() {
        assert!(matches!(
            Config::default().validate(1),
            Err(ConfigError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn test_qualified_model_name() {
        let mut config = Config::default();
        assert_eq!(config.qualified_model_name(), "models/gemini-2.0-flash");
        config.llm_model_name = "models/gemini-1.5-pro".to_string();
        assert_eq!(config.qualified_model_name(), "models/gemini-1.5-pro");
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("Gemini".parse::<BackendKind>().unwrap(), BackendKind::Gemini);
        assert_eq!("openai".parse::<BackendKind>().unwrap(), BackendKind::OpenAi);
        assert!("claude".parse::<BackendKind>().is_err());
    }
}
