//! 每分钟请求数限制
//!
//! 记录最近 `max_rpm` 次请求的完成时间。第 `max_rpm` 次之前的那次请求
//! 完成后不足一个时间窗口时，新的请求需要等待。
//! 整个进程共用一个实例（`Arc<RateLimiter>`）。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::Instant;
use tracing::info;

/// 时间窗口：60 秒加 1 秒余量
pub const RATE_WINDOW: Duration = Duration::from_secs(61);

pub struct RateLimiter {
    max_rpm: usize,
    window: Duration,
    completions: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `max_rpm` 为 0 时不限制
    pub fn new(max_rpm: usize) -> Self {
        Self::with_window(max_rpm, RATE_WINDOW)
    }

    pub fn with_window(max_rpm: usize, window: Duration) -> Self {
        Self {
            max_rpm,
            window,
            completions: Mutex::new(VecDeque::with_capacity(max_rpm)),
        }
    }

    /// 记录一次请求完成
    pub fn record_completion(&self, at: Instant) {
        if self.max_rpm == 0 {
            return;
        }
        let mut completions = self.completions.lock().unwrap_or_else(|e| e.into_inner());
        completions.push_back(at);
        while completions.len() > self.max_rpm {
            completions.pop_front();
        }
    }

    /// 距离下一次允许请求还需要等待的时间
    pub fn time_until_permitted(&self, now: Instant) -> Duration {
        if self.max_rpm == 0 {
            return Duration::ZERO;
        }
        let completions = self.completions.lock().unwrap_or_else(|e| e.into_inner());
        if completions.len() < self.max_rpm {
            return Duration::ZERO;
        }
        match completions.front() {
            Some(&oldest) => self.window.saturating_sub(now.saturating_duration_since(oldest)),
            None => Duration::ZERO,
        }
    }

    /// 需要时等待，直到允许发出下一次请求
    pub async fn acquire(&self) {
        let wait = self.time_until_permitted(Instant::now());
        if wait.is_zero() {
            return;
        }

        // 以 0.1 秒为单位向上取整
        let tenths = (wait.as_secs_f64() * 10.0).ceil() as u64;
        info!("⏳ 达到每分钟请求上限，等待 {:.1} 秒...", tenths as f64 / 10.0);

        let fraction = tenths % 10;
        if fraction > 0 {
            tokio::time::sleep(Duration::from_millis(fraction * 100)).await;
        }

        let seconds = tenths / 10;
        if seconds > 0 {
            let bar = ProgressBar::new(seconds);
            if let Ok(style) = ProgressStyle::with_template("  ⏳ [{bar:30.cyan/blue}] {pos}/{len}s") {
                bar.set_style(style.progress_chars("##-"));
            }
            for _ in 0..seconds {
                tokio::time::sleep(Duration::from_secs(1)).await;
                bar.inc(1);
            }
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_never_waits() {
        let limiter = RateLimiter::new(0);
        let now = Instant::now();
        for _ in 0..100 {
            limiter.record_completion(now);
        }
        assert_eq!(limiter.time_until_permitted(now), Duration::ZERO);
    }

    #[test]
    fn test_waits_only_when_window_full() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();

        limiter.record_completion(start);
        assert_eq!(limiter.time_until_permitted(start), Duration::ZERO);

        limiter.record_completion(start + Duration::from_secs(5));
        let now = start + Duration::from_secs(10);
        assert_eq!(limiter.time_until_permitted(now), Duration::from_secs(51));

        let later = start + Duration::from_secs(70);
        assert_eq!(limiter.time_until_permitted(later), Duration::ZERO);
    }

    #[test]
    fn test_window_keeps_only_recent_completions() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        limiter.record_completion(start);
        limiter.record_completion(start + Duration::from_secs(30));
        limiter.record_completion(start + Duration::from_secs(40));

        // 最早的一次已移出窗口，按第 30 秒那次计算
        let now = start + Duration::from_secs(41);
        assert_eq!(limiter.time_until_permitted(now), Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_sleeps_until_permitted() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        limiter.record_completion(start);

        limiter.acquire().await;
        assert!(Instant::now().duration_since(start) >= RATE_WINDOW);
        assert_eq!(limiter.time_until_permitted(Instant::now()), Duration::ZERO);
    }
}
