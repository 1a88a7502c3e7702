use anyhow::{Result, anyhow};
use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::inference::TextGenerator;
use crate::retry::{Failure, RetryPolicy, retry};

/// Per-request timeout; a slow model counts as a transient failure.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Blocking client for an Ollama server (`/api/generate`, `/api/tags`).
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base: Url,
    model: String,
    retry: RetryPolicy,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, model, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        // Url::join drops the last path segment unless it ends with '/'
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).map_err(|e| anyhow!("invalid model server URL '{base_url}': {e}"))?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base,
            model: model.into(),
            retry: RetryPolicy::INFERENCE,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    fn generate_once(&self, url: &Url, prompt: &str, max_tokens: u32) -> Result<String, Failure> {
        let req = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: max_tokens,
            },
        };
        let resp = self
            .http
            .post(url.clone())
            .json(&req)
            .send()
            .map_err(classify)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(Failure::fatal(anyhow!("model server returned {status}: {}", body.trim())));
        }
        let parsed: GenerateResponse = resp.json().map_err(classify)?;
        Ok(parsed.response.trim().to_string())
    }

    /// Whether the configured model is installed on the server.
    pub fn check_model(&self) -> Result<bool> {
        let url = self.endpoint("api/tags")?;
        let resp = self.http.get(url).send()?.error_for_status()?;
        let tags: TagsResponse = resp.json()?;
        Ok(tags.models.iter().any(|m| same_model(&m.name, &self.model)))
    }
}

/// `llama3` and `llama3:latest` name the same model.
fn same_model(installed: &str, wanted: &str) -> bool {
    let norm = |s: &str| {
        if s.contains(':') {
            s.to_string()
        } else {
            format!("{s}:latest")
        }
    };
    norm(installed) == norm(wanted)
}

fn classify(e: reqwest::Error) -> Failure {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        Failure::transient(e)
    } else {
        Failure::fatal(e)
    }
}

impl TextGenerator for OllamaClient {
    fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let url = self.endpoint("api/generate")?;
        debug!("generate: {} chars, budget {max_tokens} tokens", prompt.len());
        retry(self.retry, "ollama generate", |_| {
            self.generate_once(&url, prompt, max_tokens)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client(url: &str) -> OllamaClient {
        OllamaClient::new(url, "qwen2.5:14b")
            .unwrap()
            .with_retry(RetryPolicy::immediate(3))
    }

    #[test]
    fn generate_posts_prompt_and_trims_reply() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({
                "model": "qwen2.5:14b",
                "prompt": "Summarize: hello",
                "stream": false,
                "options": {"num_predict": 150}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"response": "  A greeting.\n", "done": true}).to_string())
            .create();

        let out = client(&server.url()).generate("Summarize: hello", 150).unwrap();
        assert_eq!(out, "A greeting.");
        mock.assert();
    }

    #[test]
    fn error_status_is_not_retried() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/generate")
            .with_status(500)
            .with_body("model not loaded")
            .expect(1)
            .create();

        let err = client(&server.url()).generate("x", 10).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("500"), "{msg}");
        assert!(msg.contains("model not loaded"), "{msg}");
        mock.assert();
    }

    #[test]
    fn unreachable_server_exhausts_retries() {
        // Port 9 (discard) is closed on test hosts.
        let err = client("http://127.0.0.1:9").generate("x", 10).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("after 3 attempts"), "{msg}");
    }

    #[test]
    fn base_url_path_is_kept() {
        let c = OllamaClient::new("http://example.org/ollama", "m").unwrap();
        assert_eq!(
            c.endpoint("api/generate").unwrap().as_str(),
            "http://example.org/ollama/api/generate"
        );
    }

    #[test]
    fn check_model_finds_installed_tag() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"models": [{"name": "llama3:latest"}, {"name": "qwen2.5:14b"}]}).to_string(),
            )
            .create();

        assert!(client(&server.url()).check_model().unwrap());
        let llama = OllamaClient::new(&server.url(), "llama3").unwrap();
        assert!(llama.check_model().unwrap());
        let missing = OllamaClient::new(&server.url(), "mistral").unwrap();
        assert!(!missing.check_model().unwrap());
    }
}
