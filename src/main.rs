use std::path::PathBuf;

use anyhow::Result;
use paper_summarize::{logger, App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init();

    // 加载配置
    let config = Config::from_env();

    // 待处理的文档
    let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();

    // 初始化并运行应用
    let stats = App::initialize(config).await?.run(&paths).await?;

    if stats.failed > 0 {
        anyhow::bail!("{} 个文档处理失败", stats.failed);
    }

    Ok(())
}
