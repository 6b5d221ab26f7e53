//! Page fetching over HTTP.

use async_trait::async_trait;
use scanpilot_core::{Arguments, Capability, CapabilityError, ParamKind, ParamSchema, typed_args};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const DEFAULT_MAX_BYTES: usize = 20_000;

#[derive(Deserialize)]
struct FetchArgs {
    url: String,
    max_bytes: Option<u32>,
}

/// `fetch_url_content`: GET a page and return its status, headers and body.
pub struct FetchUrlCapability {
    client: reqwest::Client,
}

impl FetchUrlCapability {
    pub fn new(timeout: Duration) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CapabilityError::Service(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

/// Read at most `max_bytes` of the body; the rest is never downloaded.
async fn read_capped(response: &mut reqwest::Response, max_bytes: usize) -> reqwest::Result<Vec<u8>> {
    let mut body = Vec::new();
    while body.len() < max_bytes {
        match response.chunk().await? {
            Some(chunk) => body.extend_from_slice(&chunk),
            None => break,
        }
    }
    body.truncate(max_bytes);
    Ok(body)
}

/// Decode a possibly cut body, dropping a character split by the cut.
fn decode_body(mut bytes: Vec<u8>) -> String {
    if let Err(e) = std::str::from_utf8(&bytes) {
        if e.error_len().is_none() {
            bytes.truncate(e.valid_up_to());
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[async_trait]
impl Capability for FetchUrlCapability {
    fn name(&self) -> &str {
        "fetch_url_content"
    }

    fn description(&self) -> &str {
        "Fetch a URL with an HTTP GET and return the status code, response headers, \
         and (possibly truncated) body. Useful for inspecting forms and parameters."
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required("url", ParamKind::String, "The http:// or https:// URL to fetch")
            .optional(
                "max_bytes",
                ParamKind::Count,
                "Maximum number of body bytes to return (default 20000)",
            )
    }

    fn check(&self, arguments: &Arguments) -> Result<(), String> {
        match arguments.get("url").and_then(Value::as_str) {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
            _ => Err("url must start with http:// or https://".into()),
        }
    }

    async fn invoke(&self, arguments: Arguments) -> Result<Value, CapabilityError> {
        let args: FetchArgs = typed_args(arguments)?;

        debug!(url = %args.url, "Fetching page");
        let mut response = self
            .client
            .get(&args.url)
            .send()
            .await
            .map_err(|e| CapabilityError::Service(format!("request to {} failed: {e}", args.url)))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let max_bytes = args.max_bytes.map_or(DEFAULT_MAX_BYTES, |n| n as usize);
        let bytes = read_capped(&mut response, max_bytes)
            .await
            .map_err(|e| CapabilityError::Service(format!("reading body of {} failed: {e}", args.url)))?;
        let body = decode_body(bytes);

        Ok(serde_json::json!({
            "url": args.url,
            "status": status,
            "headers": headers,
            "body": body,
        }))
    }
}
