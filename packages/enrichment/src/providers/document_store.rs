//! Write-back to the document-management API.
//!
//! Labels go to `POST {base}/documents/{id}/attributes`, extracted text to
//! `PUT {base}/documents/{id}/ocr`. Both overwrite whatever a previous
//! delivery wrote, so replays are harmless.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::InvocationContext;
use crate::error::{StageError, StageResult};
use crate::traits::stages::AttributeWriter;
use crate::types::config::{ApiKey, AttributeSchema, DocumentStoreConfig};
use crate::types::event::DocumentEvent;
use crate::types::outcome::Stage;

/// One document attribute: a key with string values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub key: String,
    pub string_values: Vec<String>,
}

/// Body of the attributes request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeList {
    pub attributes: Vec<Attribute>,
}

impl AttributeList {
    pub fn from_labels(schema: &AttributeSchema, labels: &[String]) -> Self {
        Self {
            attributes: vec![Attribute {
                key: schema.labels_key.clone(),
                string_values: labels.to_vec(),
            }],
        }
    }
}

/// Body of the OCR request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrContent {
    pub content: String,
    pub content_type: String,
    pub is_base64: bool,
}

impl OcrContent {
    pub fn plain_text(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            content_type: "text/plain".to_string(),
            is_base64: false,
        }
    }
}

/// [`AttributeWriter`] backed by the document-management HTTP API.
pub struct HttpAttributeWriter {
    client: reqwest::Client,
    base_url: String,
    api_key: ApiKey,
    schema: AttributeSchema,
}

impl HttpAttributeWriter {
    pub fn new(config: &DocumentStoreConfig, schema: AttributeSchema) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            schema,
        }
    }

    /// Share an existing HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self, event: &DocumentEvent, resource: &str) -> String {
        format!(
            "{}/documents/{}/{}",
            self.base_url,
            urlencoding::encode(&event.document_id),
            resource
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> StageResult<()> {
        let response = request
            .header(AUTHORIZATION, self.api_key.expose())
            .send()
            .await
            .map_err(|e| StageError::failed(Stage::Attributes, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::Rejected {
                stage: Stage::Attributes,
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AttributeWriter for HttpAttributeWriter {
    async fn write(
        &self,
        _ctx: &InvocationContext,
        event: &DocumentEvent,
        labels: &[String],
        text: &str,
    ) -> StageResult<()> {
        let site = [("siteId", event.site_id.as_str())];
        let mut first_error = None;

        // The two writes are independent; a rejected attributes call must
        // not lose the extracted text.
        if !labels.is_empty() {
            let body = AttributeList::from_labels(&self.schema, labels);
            let request = self
                .client
                .post(self.endpoint(event, "attributes"))
                .query(&site)
                .json(&body);
            match self.send(request).await {
                Ok(()) => {
                    info!(document_id = %event.document_id, labels = labels.len(), "document attributes set")
                }
                Err(e) => {
                    warn!(document_id = %event.document_id, error = %e, "failed to set document attributes");
                    first_error = Some(e);
                }
            }
        }

        if !text.is_empty() {
            let request = self
                .client
                .put(self.endpoint(event, "ocr"))
                .query(&site)
                .json(&OcrContent::plain_text(text));
            match self.send(request).await {
                Ok(()) => {
                    info!(document_id = %event.document_id, text_len = text.len(), "document text set")
                }
                Err(e) => {
                    warn!(document_id = %event.document_id, error = %e, "failed to set document text");
                    first_error.get_or_insert(e);
                }
            }
        } else {
            debug!(document_id = %event.document_id, "no text to write");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_payload_shape() {
        let schema = AttributeSchema::default();
        let body = AttributeList::from_labels(&schema, &["cat".to_string(), "dog".to_string()]);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "attributes": [ { "key": "labels", "stringValues": ["cat", "dog"] } ]
            })
        );
    }

    #[test]
    fn test_attribute_key_is_configurable() {
        let schema = AttributeSchema {
            labels_key: "thumbnail_labels".to_string(),
        };
        let body = AttributeList::from_labels(&schema, &["cat".to_string()]);
        assert_eq!(body.attributes[0].key, "thumbnail_labels");
    }

    #[test]
    fn test_ocr_payload_shape() {
        assert_eq!(
            serde_json::to_value(OcrContent::plain_text("hello")).unwrap(),
            serde_json::json!({ "content": "hello", "contentType": "text/plain", "isBase64": false })
        );
    }
}
