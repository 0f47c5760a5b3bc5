// ChapterSleuth - oracle/client.rs
//
// HTTP oracle client for an Ollama-style generate endpoint. Requests are
// funnelled through the shared rate limiter, retried per the retry policy,
// and bounded by a per-call timeout. The API key, when configured, is read
// from an environment variable and never logged.

use crate::oracle::limiter::RateLimiter;
use crate::oracle::retry::{with_retry, RetryConfig};
use crate::oracle::Oracle;
use crate::util::constants;
use crate::util::error::OracleError;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Oracle endpoint and budget configuration.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Generate endpoint URL.
    pub api_url: String,
    /// Model identifier sent with every request and used for cache keys.
    pub model: String,
    /// Bearer token, if the endpoint requires one.
    pub api_key: Option<String>,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Requests-per-minute budget.
    pub requests_per_minute: u32,
    /// In-flight concurrency cap.
    pub concurrency: usize,
    /// Retry attempts for transient failures.
    pub max_attempts: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/api/generate".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            timeout_secs: constants::DEFAULT_ORACLE_TIMEOUT_SECS,
            requests_per_minute: constants::DEFAULT_ORACLE_RPM,
            concurrency: constants::DEFAULT_ORACLE_CONCURRENCY,
            max_attempts: constants::ORACLE_MAX_ATTEMPTS,
        }
    }
}

/// Ollama-style generate response body.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// reqwest-backed oracle.
#[derive(Debug)]
pub struct HttpOracle {
    client: reqwest::Client,
    config: OracleConfig,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
}

impl HttpOracle {
    /// Build a client with its own limiter.
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let limiter = RateLimiter::new(config.requests_per_minute, config.concurrency);
        Self::with_limiter(config, limiter)
    }

    /// Build a client sharing an existing limiter (batch mode: one budget
    /// across all files).
    pub fn with_limiter(
        config: OracleConfig,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| OracleError::Transport { source })?;
        let retry = RetryConfig {
            max_attempts: config.max_attempts,
            ..Default::default()
        };
        Ok(Self {
            client,
            config,
            limiter,
            retry,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn dispatch(&self, prompt: &str) -> Result<String, OracleError> {
        let _permit = self.limiter.acquire().await;

        let mut request = self
            .client
            .post(&self.config.api_url)
            .header("Content-Type", "application/json")
            .json(&json!({
                "model": self.config.model,
                "prompt": prompt,
                "stream": false,
                "options": { "temperature": 0.0 },
            }));
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                }
            } else {
                OracleError::Transport { source: e }
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(constants::ORACLE_RETRY_AFTER_FALLBACK_SECS);
            return Err(OracleError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|source| OracleError::Transport { source })?;
        match serde_json::from_str::<GenerateResponse>(&body) {
            Ok(parsed) => Ok(parsed.response),
            Err(_) => Err(OracleError::MalformedResponse {
                body_preview: body.chars().take(120).collect(),
            }),
        }
    }
}

impl Oracle for HttpOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        with_retry(&self.retry, || self.dispatch(prompt)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_response_parsing() {
        let body = r#"{"model":"llama3","response":"^제\\d+화","done":true}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.response, "^제\\d+화");
    }

    #[test]
    fn test_default_config() {
        let config = OracleConfig::default();
        assert_eq!(config.requests_per_minute, constants::DEFAULT_ORACLE_RPM);
        assert_eq!(config.concurrency, constants::DEFAULT_ORACLE_CONCURRENCY);
        assert!(config.api_key.is_none());
    }
}
