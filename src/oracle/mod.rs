// ChapterSleuth - oracle/mod.rs
//
// The LLM oracle subsystem: the trait the engine consumes, the HTTP
// client, the shared rate limiter, retry policy, and the on-disk
// response cache. The oracle is stateless between calls; every value it
// returns is treated as untrusted by the engine.

pub mod cache;
pub mod client;
pub mod limiter;
pub mod retry;

use crate::util::error::OracleError;

/// A text-generation capability: prompt in, completion out.
///
/// Implementations own their rate limiting and retry behaviour; callers
/// see only the final outcome of a call.
#[allow(async_fn_in_trait)]
pub trait Oracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}
