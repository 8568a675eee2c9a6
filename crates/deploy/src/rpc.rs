//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

/// Default timeout for RPC requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A JSON-RPC client bound to a single endpoint.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: Url,
}

impl RpcClient {
    /// Create a client for `url` with the default request timeout.
    pub fn new(url: Url) -> Result<Self, anyhow::Error> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    /// Create a client for `url` whose requests fail after `timeout`.
    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self, anyhow::Error> {
        let mut builder = reqwest::Client::builder().timeout(timeout);

        // Local development nodes are always reached directly.
        if is_loopback(&url) {
            builder = builder.no_proxy();
        }

        let http = builder.build().context("Failed to create HTTP client")?;

        Ok(Self { http, url })
    }

    /// The endpoint this client talks to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Make a JSON-RPC call and deserialize the result.
    ///
    /// # Arguments
    /// * `method` - The RPC method name
    /// * `params` - The method parameters
    ///
    /// # Returns
    /// The deserialized result, or an error if the request failed or returned an error response.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, anyhow::Error> {
        tracing::trace!(method, url = %self.url, "Sending JSON-RPC request");

        let response = self
            .http
            .post(self.url.clone())
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to {}", method, self.url))?;

        let result: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        parse_response(method, result)
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Extract the `result` member of a JSON-RPC response, turning `error` members into errors.
fn parse_response<T: DeserializeOwned>(method: &str, response: Value) -> Result<T, anyhow::Error> {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");

        match error.get("data").filter(|d| !d.is_null()) {
            Some(data) => anyhow::bail!("RPC error in {}: {} ({})", method, message, data),
            None => anyhow::bail!("RPC error in {}: {}", method, message),
        }
    }

    let result_value = response
        .get("result")
        .with_context(|| format!("No result in {} response", method))?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Parse a hex quantity (`0x1a`) into a `u64`.
pub fn parse_quantity(value: &str) -> Result<u64, anyhow::Error> {
    let digits = value
        .strip_prefix("0x")
        .with_context(|| format!("Quantity is not 0x-prefixed: '{}'", value))?;

    u64::from_str_radix(digits, 16).with_context(|| format!("Invalid hex quantity: '{}'", value))
}

/// Parse a hex quantity (`0x3b9aca00`) into a `u128`.
pub fn parse_quantity_u128(value: &str) -> Result<u128, anyhow::Error> {
    let digits = value
        .strip_prefix("0x")
        .with_context(|| format!("Quantity is not 0x-prefixed: '{}'", value))?;

    u128::from_str_radix(digits, 16).with_context(|| format!("Invalid hex quantity: '{}'", value))
}

/// Format a number as a hex quantity.
pub fn to_quantity(value: impl Into<u128>) -> String {
    format!("0x{:x}", value.into())
}
