//! HTTP transport for dynamic-session Python interpreters.

use crate::config::SandboxConfig;
use crate::transport::{ExecutionResult, RemoteFile, SandboxTransport};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use std::sync::Arc;
use toolbridge_core::{BridgeError, Result, SessionId};

/// Supplies the bearer token for each request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<Option<String>>;
}

/// A fixed token (or none).
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Strip a trailing `/python/execute` and make sure the base ends in `/`.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    let base = trimmed
        .strip_suffix("/python/execute/")
        .or_else(|| trimmed.strip_suffix("/python/execute"))
        .unwrap_or(trimmed);
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    }
}

pub struct HttpSandboxTransport {
    client: Client,
    base: String,
    timeout_seconds: u64,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpSandboxTransport {
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BridgeError::Http(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base: normalize_endpoint(&config.endpoint),
            timeout_seconds: config.timeout_seconds,
            tokens: Arc::new(StaticToken::new(config.bearer_token.clone())),
        })
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.tokens = provider;
        self
    }

    pub fn base_endpoint(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(match self.tokens.token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(|e| BridgeError::Http(format!("{} request failed: {}", operation, e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(operation, status, "Sandbox request failed");
            return Err(BridgeError::Transport {
                operation: operation.to_string(),
                status,
                body,
            });
        }
        Ok(response)
    }

    async fn read_json(operation: &str, response: Response) -> Result<Value> {
        let text = response
            .text()
            .await
            .map_err(|e| BridgeError::Http(format!("{} response could not be read: {}", operation, e)))?;
        serde_json::from_str(&text)
            .map_err(|e| BridgeError::decode(format!("{} response is not JSON: {}", operation, e), text))
    }
}

/// Responses are sometimes wrapped as `{"properties": {...}}`.
fn unwrap_properties(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.get("properties").is_some_and(Value::is_object) => {
            map.remove("properties").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// File listings arrive as a bare array, `{"$values": [...]}` or `{"value": [...]}`.
fn unwrap_values(operation: &str, value: Value) -> Result<Vec<Value>> {
    match unwrap_properties(value) {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("$values").or_else(|| map.remove("value")) {
            Some(Value::Array(items)) => Ok(items),
            _ if map.contains_key("filename") => Ok(vec![Value::Object(map)]),
            _ => Err(BridgeError::decode(
                format!("{} response has no file list", operation),
                Value::Object(map).to_string(),
            )),
        },
        other => Err(BridgeError::decode(
            format!("{} response has no file list", operation),
            other.to_string(),
        )),
    }
}

fn parse_files(operation: &str, value: Value) -> Result<Vec<RemoteFile>> {
    unwrap_values(operation, value)?
        .into_iter()
        .map(|item| {
            let item = unwrap_properties(item);
            serde_json::from_value(item.clone())
                .map_err(|e| BridgeError::decode(format!("{} returned an invalid file entry: {}", operation, e), item.to_string()))
        })
        .collect()
}

#[async_trait]
impl SandboxTransport for HttpSandboxTransport {
    async fn execute(&self, session: &SessionId, code: &str) -> Result<ExecutionResult> {
        let body = json!({
            "properties": {
                "identifier": session.as_str(),
                "codeInputType": "inline",
                "executionType": "synchronous",
                "timeoutInSeconds": self.timeout_seconds,
                "pythonCode": code,
            }
        });
        let request = self.client.post(self.url("python/execute")).json(&body);
        let response = self.send("execute", request).await?;
        let value = unwrap_properties(Self::read_json("execute", response).await?);
        serde_json::from_value(value.clone())
            .map_err(|e| BridgeError::decode(format!("execute returned an unexpected shape: {}", e), value.to_string()))
    }

    async fn upload_file(&self, session: &SessionId, filename: &str, contents: Vec<u8>) -> Result<RemoteFile> {
        let form = Form::new().part("file", Part::bytes(contents).file_name(filename.to_string()));
        let request = self
            .client
            .post(self.url("python/uploadFile"))
            .query(&[("identifier", session.as_str())])
            .multipart(form);
        let response = self.send("upload", request).await?;
        let value = Self::read_json("upload", response).await?;
        parse_files("upload", value)?
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::decode("upload response listed no file", String::new()))
    }

    async fn download_file(&self, session: &SessionId, remote_path: &str) -> Result<Vec<u8>> {
        let request = self
            .client
            .get(self.url("python/downloadFile"))
            .query(&[("identifier", session.as_str()), ("filename", remote_path)]);
        let response = self.send("download", request).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BridgeError::Http(format!("download body could not be read: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn list_files(&self, session: &SessionId) -> Result<Vec<RemoteFile>> {
        let request = self
            .client
            .get(self.url("python/files"))
            .query(&[("identifier", session.as_str())]);
        let response = self.send("list files", request).await?;
        let value = Self::read_json("list files", response).await?;
        parse_files("list files", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_normalized() {
        assert_eq!(normalize_endpoint("https://pool.example"), "https://pool.example/");
        assert_eq!(normalize_endpoint("https://pool.example/"), "https://pool.example/");
        assert_eq!(
            normalize_endpoint("https://pool.example/python/execute"),
            "https://pool.example/"
        );
        assert_eq!(
            normalize_endpoint("https://pool.example/sub/python/execute/"),
            "https://pool.example/sub/"
        );
    }

    #[test]
    fn wrapped_responses_are_unwrapped() {
        let wrapped = json!({"properties": {"stdout": "hi", "result": 2}});
        let result: ExecutionResult = serde_json::from_value(unwrap_properties(wrapped)).unwrap();
        assert_eq!(result.stdout, "hi");
        assert_eq!(result.result, json!(2));
    }

    #[test]
    fn file_lists_accept_every_wrapper() {
        let entry = json!({"filename": "a.txt", "bytes": 3, "fullPath": "/mnt/data/a.txt"});
        for value in [
            json!([entry.clone()]),
            json!({"$id": "1", "$values": [entry.clone()]}),
            json!({"value": [{"properties": entry.clone()}]}),
        ] {
            let files = parse_files("list files", value).unwrap();
            assert_eq!(files.len(), 1);
            assert_eq!(files[0].filename, "a.txt");
            assert_eq!(files[0].full_path.as_deref(), Some("/mnt/data/a.txt"));
        }
        assert!(parse_files("list files", json!({"unexpected": true})).is_err());
    }
}
