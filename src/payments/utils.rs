use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

/// JSON-over-HTTPS transport shared by gateway clients.
///
/// Only idempotent `GET` calls are retried; anything that moves money is
/// sent exactly once.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    provider: &'static str,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(provider: &'static str, timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            provider,
            timeout,
            max_retries,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn attempts_for(&self, method: &Method) -> u32 {
        if *method == Method::GET {
            self.max_retries
        } else {
            0
        }
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
        query: &[(&str, &str)],
    ) -> PaymentResult<T> {
        let max_retries = self.attempts_for(&method);
        let mut url = Url::parse(url).map_err(|e| PaymentError::ValidationError {
            message: format!("invalid provider URL {}: {}", url, e),
            field: None,
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        let mut last_error = None;

        for attempt in 0..=max_retries {
            let mut request = self.client.request(method.clone(), url.clone());
            request = request.timeout(self.timeout);

            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            debug!(
                provider = self.provider,
                method = %method,
                path = url.path(),
                attempt = attempt + 1,
                "gateway request"
            );

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    PaymentError::NetworkError {
                        message: format!(
                            "provider request timed out after {}s",
                            self.timeout.as_secs()
                        ),
                    }
                } else {
                    PaymentError::NetworkError {
                        message: format!("provider request failed: {}", e),
                    }
                }
            });

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            PaymentError::ProviderError {
                                provider: self.provider.to_string(),
                                message: format!("invalid provider JSON response: {}", e),
                                provider_code: None,
                                retryable: false,
                            }
                        });
                    }

                    if status.as_u16() == 429 {
                        if attempt < max_retries {
                            tokio::time::sleep(retry_delay(attempt)).await;
                            continue;
                        }
                        return Err(PaymentError::RateLimitError {
                            message: "provider rate limit exceeded".to_string(),
                            retry_after_seconds: None,
                        });
                    }

                    if status.is_server_error() && attempt < max_retries {
                        warn!(
                            provider = self.provider,
                            status = %status,
                            attempt = attempt + 1,
                            "provider server error, retrying"
                        );
                        tokio::time::sleep(retry_delay(attempt)).await;
                        continue;
                    }

                    return Err(PaymentError::ProviderError {
                        provider: self.provider.to_string(),
                        message: error_message_from_body(&text)
                            .unwrap_or_else(|| format!("HTTP {}", status)),
                        provider_code: Some(status.as_u16().to_string()),
                        retryable: status.is_server_error(),
                    });
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < max_retries {
                        tokio::time::sleep(retry_delay(attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::NetworkError {
            message: "provider request failed".to_string(),
        }))
    }
}

/// Pulls `message` out of a `{status, message}` error body.
fn error_message_from_body(text: &str) -> Option<String> {
    serde_json::from_str::<JsonValue>(text)
        .ok()?
        .get("message")?
        .as_str()
        .map(|m| m.to_string())
}

pub fn sign_hmac_sha512_hex(payload: &[u8], secret: &str) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    type HmacSha512 = Hmac<Sha512>;
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_hmac_sha512_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    match sign_hmac_sha512_hex(payload, secret) {
        Some(computed) => secure_eq(
            computed.as_bytes(),
            signature.trim().to_ascii_lowercase().as_bytes(),
        ),
        None => false,
    }
}

/// Constant-time comparison for equal-length inputs.
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Exponential backoff, capped at 30 seconds for any attempt number.
pub fn retry_delay(attempt: u32) -> Duration {
    let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX).min(30);
    Duration::from_secs(secs)
}
