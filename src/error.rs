use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 生成服务相关错误
    #[error("生成服务错误: {0}")]
    Generation(#[from] GenerationError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 章节结构错误
    #[error("章节结构错误: {0}")]
    Outline(#[from] OutlineError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 生成服务错误
#[derive(Debug, Error)]
pub enum GenerationError {
    /// 暂时性失败（网络、限流、5xx），可以重试
    #[error("请求暂时失败 ({backend}): {message}")]
    Transient { backend: String, message: String },
    /// 服务端拒绝请求（参数、鉴权等），不会重试
    #[error("请求被拒绝 ({backend}, 状态码: {status:?}): {message}")]
    Rejected {
        backend: String,
        status: Option<u16>,
        message: String,
    },
    /// 流式响应无法解析
    #[error("无法解析流式响应 ({backend}): {message}")]
    MalformedStream { backend: String, message: String },
    /// 重试次数或时间耗尽
    #[error("重试 {attempts} 次后仍然失败: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GenerationError>,
    },
}

impl GenerationError {
    /// 是否为可以重试的暂时性错误
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Transient { .. })
    }

    /// 根据 HTTP 状态码分类错误
    pub fn from_status(backend: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        let backend = backend.into();
        let message = message.into();
        match status {
            408 | 429 | 500 | 502 | 503 | 504 => GenerationError::Transient { backend, message },
            _ => GenerationError::Rejected {
                backend,
                status: Some(status),
                message,
            },
        }
    }
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 创建目录失败
    #[error("创建目录失败 ({path}): {source}")]
    CreateDirFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 不支持的输入文件
    #[error("不支持的文件格式: {path} (支持: .md, .markdown, .txt)")]
    UnsupportedInput { path: String },
    /// 结果文件与输入文件相同
    #[error("结果文件会覆盖输入文件: {path} (请设置 OUTPUT_SUFFIX 或 OUTPUT_DIR)")]
    OutputOverwritesInput { path: String },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 章节结构（JSON）错误
#[derive(Debug, Error)]
pub enum OutlineError {
    /// 响应中没有 JSON 代码块
    #[error("响应中没有找到 ```json 代码块")]
    MissingJsonBlock,
    /// 响应中有多个 JSON 代码块
    #[error("响应中有 {count} 个 ```json 代码块，无法确定章节结构")]
    AmbiguousJsonBlocks { count: usize },
    /// JSON 代码块没有结束标记
    #[error("```json 代码块没有结束标记")]
    UnterminatedJsonBlock,
    /// JSON 内容不是字符串数组
    #[error("章节结构不是字符串数组: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 指定了输出文件又指定了输出目录
    #[error("指定输出文件 (OUTPUT_FILE) 时不能同时指定输出目录 (OUTPUT_DIR)")]
    OutputWithOutputDir,
    /// 指定了输出文件但有多个输入
    #[error("指定输出文件 (OUTPUT_FILE) 时只能处理一个文件，当前有 {count} 个")]
    OutputWithMultipleInputs { count: usize },
    /// 缺少 API 密钥
    #[error("环境变量 {var_name} 不存在")]
    MissingApiKey { var_name: String },
    /// 未知的生成后端
    #[error("未知的生成后端: {name} (支持: gemini, openai)")]
    UnknownBackend { name: String },
    /// 语言包无效
    #[error("语言包 {name} 无效: {reason}")]
    InvalidLanguagePack { name: String, reason: String },
}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Outline(OutlineError::InvalidJson { source: err })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建目录创建错误
    pub fn create_dir_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::CreateDirFailed {
            path: path.into(),
            source,
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(GenerationError::from_status("gemini", 429, "quota").is_transient());
        assert!(GenerationError::from_status("gemini", 503, "unavailable").is_transient());
        assert!(!GenerationError::from_status("gemini", 400, "bad request").is_transient());
        assert!(!GenerationError::from_status("gemini", 403, "forbidden").is_transient());
    }

    #[test]
    fn test_retries_exhausted_not_transient() {
        let err = GenerationError::RetriesExhausted {
            attempts: 3,
            last: Box::new(GenerationError::from_status("gemini", 500, "boom")),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("boom"));
    }
}
