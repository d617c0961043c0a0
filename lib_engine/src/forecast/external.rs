//! # External Sequence Predictor
//!
//! Bridge to a remote text-completion service that continues a numeric
//! series. The transport is deliberately dumb: POST a prompt, get text
//! back, let [`crate::forecast::ForecastEngine`] make sense of it.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictorError {
    #[error("predictor HTTP client failed: {0}")]
    Client(#[from] reqwest::Error),
    #[error("predictor payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("predictor request failed: {0}")]
    Request(#[from] reqwest_middleware::Error),
    #[error("predictor returned HTTP {0}")]
    Status(u16),
}

/// Turns a prompt into completion text, by whatever means.
pub trait SequencePredictor {
    fn generate(
        &mut self,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<String, PredictorError>> + Send;
}

static NUMBER_RE: OnceLock<Regex> = OnceLock::new();

/// Extracts every unsigned numeric token (integer or decimal) from
/// completion text, in order of appearance. Signs are not part of a token,
/// so `-3` parses as `3`. Tokens too large for `f64` would parse to
/// infinity and are dropped instead.
pub fn parse_numeric_tokens(text: &str) -> Vec<f64> {
    let re = NUMBER_RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("static regex"));
    re.find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .collect()
}

/// Wire form of a generation request: the prompt under an `inputs` key.
#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

/// Remote predictor speaking the plain `{"inputs": prompt}` inference
/// protocol. Transient failures are retried with exponential backoff before
/// the error reaches the forecast engine.
pub struct HttpSequencePredictor {
    client: ClientWithMiddleware,
    endpoint: String,
}

impl HttpSequencePredictor {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, PredictorError> {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
        let inner = reqwest::Client::builder().timeout(timeout).build()?;
        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

impl SequencePredictor for HttpSequencePredictor {
    async fn generate(&mut self, prompt: &str) -> Result<String, PredictorError> {
        let json_body = serde_json::to_string(&InferenceRequest { inputs: prompt })?;
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(json_body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PredictorError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tokens_in_order() {
        let tokens = parse_numeric_tokens("next: 100, 102.5 then 99");
        assert_eq!(tokens, vec![100.0, 102.5, 99.0]);
    }

    #[test]
    fn signs_are_not_part_of_tokens() {
        let tokens = parse_numeric_tokens("drops to -3 degrees");
        assert_eq!(tokens, vec![3.0]);
    }

    #[test]
    fn prose_without_numbers_yields_nothing() {
        assert!(parse_numeric_tokens("the air is fine today").is_empty());
    }

    #[test]
    fn oversized_tokens_are_dropped() {
        let text = format!("{} then 102, 105", "9".repeat(400));
        assert_eq!(parse_numeric_tokens(&text), vec![102.0, 105.0]);
    }

    #[test]
    fn inference_payload_is_plain_inputs_json() {
        let body = serde_json::to_string(&InferenceRequest {
            inputs: "predict next values: 1, 2",
        })
        .unwrap();
        assert_eq!(body, r#"{"inputs":"predict next values: 1, 2"}"#);
    }
}
