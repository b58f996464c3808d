//! 指数退避重试
//!
//! 只重试暂时性错误（网络、限流、5xx），其余错误直接返回。
//! 总耗时超过截止时间后不再重试。

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::config::RetrySettings;
use crate::error::{AppError, GenerationError};

/// 能区分暂时性失败的错误
pub trait Retryable: std::fmt::Display {
    fn is_transient(&self) -> bool;

    /// 重试耗尽后返回给调用方的错误
    fn exhausted(self, attempts: u32) -> Self;
}

impl Retryable for GenerationError {
    fn is_transient(&self) -> bool {
        GenerationError::is_transient(self)
    }

    fn exhausted(self, attempts: u32) -> Self {
        GenerationError::RetriesExhausted {
            attempts,
            last: Box::new(self),
        }
    }
}

impl Retryable for AppError {
    fn is_transient(&self) -> bool {
        matches!(self, AppError::Generation(e) if e.is_transient())
    }

    fn exhausted(self, attempts: u32) -> Self {
        match self {
            AppError::Generation(e) => AppError::Generation(e.exhausted(attempts)),
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// 从第一次尝试开始计算
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            initial_delay: settings.initial_delay,
            max_delay: settings.max_delay,
            multiplier: settings.multiplier,
            deadline: settings.deadline,
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次失败后的等待时间（从 0 开始）
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(base.max(0.0).min(self.max_delay.as_secs_f64()))
    }

    /// 执行操作，暂时性错误时按退避间隔重试
    ///
    /// 闭包参数为当前尝试序号（从 0 开始）。
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: Retryable,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err),
            };

            let delay = self.delay_for_attempt(attempt);
            if started.elapsed() + delay > self.deadline {
                return Err(err.exhausted(attempt + 1));
            }

            warn!(
                "🔁 第 {} 次请求失败，{:.1} 秒后重试: {}",
                attempt + 1,
                delay.as_secs_f64(),
                err
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
