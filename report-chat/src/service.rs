use async_trait::async_trait;
use reqwest::{
    Client, Response,
    multipart::{Form, Part},
};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::{
    attachment::Attachment,
    config::ClientConfig,
    error::{ChatError, Result},
};

/// The remote analysis service.
///
/// Implementations return the raw JSON body; interpreting it is left to the
/// caller so every reply goes through the same normalization.
#[async_trait]
pub trait ReportService: Send + Sync {
    /// `POST /conversation/` with `{title}`
    async fn create_conversation(&self, title: &str) -> Result<Value>;

    /// `POST /chat/{conversation_id}` with `{message}`
    async fn chat(&self, conversation_id: &str, message: &str) -> Result<Value>;

    /// `POST /analyze-report/{conversation_id}` with multipart `file` and `message`
    async fn analyze_report(
        &self,
        conversation_id: &str,
        attachment: &Attachment,
        prompt: &str,
    ) -> Result<Value>;
}

/// HTTP implementation of [`ReportService`]
#[derive(Clone)]
pub struct HttpReportService {
    base_url: String,
    client: Client,
}

impl HttpReportService {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    pub fn with_client(config: &ClientConfig, client: Client) -> Self {
        Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn conversation_url(&self, route: &str, conversation_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            route,
            urlencoding::encode(conversation_id)
        )
    }
}

#[async_trait]
impl ReportService for HttpReportService {
    async fn create_conversation(&self, title: &str) -> Result<Value> {
        let url = format!("{}/conversation/", self.base_url);
        info!("Creating conversation at {}", url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "title": title }))
            .send()
            .await?;

        read_body(response).await
    }

    async fn chat(&self, conversation_id: &str, message: &str) -> Result<Value> {
        let url = self.conversation_url("chat", conversation_id);
        debug!("Sending chat message to {}", url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "message": message }))
            .send()
            .await?;

        read_body(response).await
    }

    async fn analyze_report(
        &self,
        conversation_id: &str,
        attachment: &Attachment,
        prompt: &str,
    ) -> Result<Value> {
        let url = self.conversation_url("analyze-report", conversation_id);
        info!(
            "Uploading {} ({}, {} bytes) to {}",
            attachment.file_name(),
            attachment.content_type(),
            attachment.len(),
            url
        );

        let file = Part::bytes(attachment.bytes().to_vec())
            .file_name(attachment.file_name().to_string())
            .mime_str(attachment.content_type())?;
        let form = Form::new()
            .part("file", file)
            .text("message", prompt.to_string());

        let response = self.client.post(&url).multipart(form).send().await?;

        read_body(response).await
    }
}

/// Turn a response into JSON, keeping non-JSON bodies as a string value
async fn read_body(response: Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ChatError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_urls_are_encoded() {
        let service = HttpReportService::new(&ClientConfig::new("http://svc/", "t"));
        assert_eq!(service.base_url(), "http://svc");
        assert_eq!(
            service.conversation_url("chat", "abc 1/2"),
            "http://svc/chat/abc%201%2F2"
        );
    }
}
