use crate::error::{AppError, AppResult, FileError};
use crate::models::language::LanguagePack;
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载自定义语言包
pub async fn load_language_pack(toml_file_path: &Path) -> AppResult<LanguagePack> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .map_err(|e| AppError::file_read_failed(toml_file_path.display().to_string(), e))?;

    let pack = parse_language_pack(&toml_file_path.display().to_string(), &content)?;
    tracing::info!(
        "成功加载语言包 {} ({} 个固定步骤)",
        pack.name,
        pack.steps.len()
    );

    Ok(pack)
}

/// 解析并校验语言包
///
/// `origin` 只用于错误信息（文件路径或内置语言代码）。
pub fn parse_language_pack(origin: &str, content: &str) -> AppResult<LanguagePack> {
    let pack: LanguagePack = toml::from_str(content).map_err(|e| FileError::TomlParseFailed {
        path: origin.to_string(),
        source: e,
    })?;
    pack.validate()?;
    Ok(pack)
}
