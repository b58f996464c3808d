pub mod rate_limiter;
pub mod request_client;
pub mod retry;

pub use rate_limiter::RateLimiter;
pub use request_client::{CallOutcome, ChunkSink, NoopSink, RequestClient, StdoutSink};
pub use retry::{Retryable, RetryPolicy};
