//! Replayable outbound request description.
//!
//! A [`reqwest::RequestBuilder`] is consumed on send, so the fetcher keeps
//! this owned description and builds a fresh request for every attempt.

use crate::error::{RelayError, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::Serialize;

/// One outbound HTTP call, replayable any number of times.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: RequestBody,
}

/// Body of an [`OutboundRequest`].
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Pre-serialized JSON document.
    Json(Bytes),
    Multipart(MultipartBody),
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Add a header. Fails if `value` is not a valid header value.
    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        let value = HeaderValue::from_str(value).map_err(|_| {
            RelayError::configuration(format!("Invalid value for header {name}"))
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Serialize `payload` as the JSON body and set the content type.
    pub fn json<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(payload)
            .map_err(|e| RelayError::Other(format!("Failed to encode request body: {e}")))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = RequestBody::Json(Bytes::from(encoded));
        Ok(self)
    }

    /// Use a multipart form as the body. The boundary header is set per send.
    #[must_use]
    pub fn multipart(mut self, form: MultipartBody) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Build a fresh request for one attempt.
    pub fn to_builder(&self, client: &reqwest::Client) -> Result<reqwest::RequestBuilder> {
        let builder = client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone());

        Ok(match &self.body {
            RequestBody::Empty => builder,
            RequestBody::Json(bytes) => builder.body(bytes.clone()),
            RequestBody::Multipart(form) => builder.multipart(form.to_form()?),
        })
    }
}

/// Multipart form whose parts can be rebuilt for every attempt.
#[derive(Debug, Clone, Default)]
pub struct MultipartBody {
    parts: Vec<MultipartPart>,
}

#[derive(Debug, Clone)]
enum MultipartPart {
    File {
        name: String,
        file_name: String,
        mime_type: String,
        data: Bytes,
    },
    Text {
        name: String,
        value: String,
    },
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file part.
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Bytes,
    ) -> Self {
        self.parts.push(MultipartPart::File {
            name: name.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data,
        });
        self
    }

    /// Append a text part.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Names of the parts, in order.
    pub fn part_names(&self) -> Vec<&str> {
        self.parts
            .iter()
            .map(|part| match part {
                MultipartPart::File { name, .. } | MultipartPart::Text { name, .. } => {
                    name.as_str()
                }
            })
            .collect()
    }

    fn to_form(&self) -> Result<Form> {
        let mut form = Form::new();
        for part in &self.parts {
            form = match part {
                MultipartPart::File {
                    name,
                    file_name,
                    mime_type,
                    data,
                } => {
                    let part = Part::bytes(data.to_vec())
                        .file_name(file_name.clone())
                        .mime_str(mime_type)
                        .map_err(|_| {
                            RelayError::bad_request(format!("Invalid content type: {mime_type}"))
                        })?;
                    form.part(name.clone(), part)
                }
                MultipartPart::Text { name, value } => form.text(name.clone(), value.clone()),
            };
        }
        Ok(form)
    }
}
