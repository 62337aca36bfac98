// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
use fnctl_api::function::InvokeStyle;
use fnctl_api::invoker::{InvokeMessage, InvokeResponse};
use reqwest::header::CONTENT_TYPE;

const INVOKE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Sends invocation messages over HTTP, either as a plain POST or as a
/// binary-mode CloudEvent.
pub struct HttpInvoker {
    client: reqwest::Client,
}

impl HttpInvoker {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(INVOKE_TIMEOUT).build()?,
        })
    }

    fn request(&self, route: &str, format: InvokeStyle, message: &InvokeMessage) -> reqwest::RequestBuilder {
        let request = self
            .client
            .post(route)
            .header(CONTENT_TYPE, message.content_type.as_str())
            .body(message.data.clone());
        match format {
            InvokeStyle::Http => request,
            InvokeStyle::CloudEvent => request
                .header("ce-specversion", "1.0")
                .header("ce-id", message.id.as_str())
                .header("ce-source", message.source.as_str())
                .header("ce-type", message.event_type.as_str()),
        }
    }
}

#[async_trait::async_trait]
impl fnctl_api::invoker::InvokerStrategy for HttpInvoker {
    async fn invoke(&self, route: &str, format: InvokeStyle, message: &InvokeMessage) -> anyhow::Result<InvokeResponse> {
        log::debug!("invoking {} as {} with message {}", route, format, message.id);
        let response = self.request(route, format, message).send().await?;
        let status = response.status();
        if status.as_u16() > 299 {
            anyhow::bail!("failure invoking '{}' (HTTP {})", route, status.as_u16());
        }

        let mut metadata = std::collections::BTreeMap::<String, Vec<String>>::new();
        for (name, value) in response.headers() {
            metadata
                .entry(name.to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).to_string());
        }
        let body = response.text().await?;
        Ok(InvokeResponse { metadata, body })
    }
}
