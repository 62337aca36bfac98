// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;

pub const DEFAULT_INVOKE_SOURCE: &str = "/fnctl/invoke";
pub const DEFAULT_INVOKE_TYPE: &str = "fnctl.invoke";
pub const DEFAULT_INVOKE_CONTENT_TYPE: &str = "application/json";
pub const DEFAULT_INVOKE_DATA: &str = r#"{"message":"Hello World"}"#;

/// Message sent to a function by `invoke` during development.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeMessage {
    pub id: String,
    pub source: String,
    pub event_type: String,
    pub content_type: String,
    pub data: String,
    /// Overrides the invocation style declared by the function.
    pub format: Option<crate::function::InvokeStyle>,
}

impl Default for InvokeMessage {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: DEFAULT_INVOKE_SOURCE.to_string(),
            event_type: DEFAULT_INVOKE_TYPE.to_string(),
            content_type: DEFAULT_INVOKE_CONTENT_TYPE.to_string(),
            data: DEFAULT_INVOKE_DATA.to_string(),
            format: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvokeResponse {
    pub metadata: BTreeMap<String, Vec<String>>,
    pub body: String,
}

#[async_trait::async_trait]
pub trait InvokerStrategy: Send + Sync {
    async fn invoke(&self, route: &str, format: crate::function::InvokeStyle, message: &InvokeMessage) -> anyhow::Result<InvokeResponse>;
}
