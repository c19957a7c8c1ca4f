//! Blocking `reqwest` adapter for the backend transport seam.

use std::time::Duration;

use ecomops_api::{
    ApiError, FormPart, HttpRequest, HttpResponse, HttpTransport, Method, RequestBody,
};
use reqwest::blocking::{Client, multipart};
use tracing::debug;

use crate::redact_sensitive;

/// Backend transport over a pooled blocking HTTP client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds a client with a per-request timeout.
    ///
    /// # Errors
    /// Returns [`ApiError::Transport`] when the TLS stack cannot initialize.
    pub fn new(timeout_ms: u64) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .user_agent(concat!("ecomops/", env!("ECOMOPS_VERSION")))
            .build()
            .map_err(|error| ApiError::Transport(error.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url.clone()),
            Method::Post => self.client.post(request.url.clone()),
        };
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(parts) => builder.multipart(multipart_form(parts)?),
        };

        let response = builder.send().map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(map_reqwest_error)?;
        debug!(stage = "transport", action = "received", status, bytes = body.len());
        Ok(HttpResponse::new(status, body))
    }
}

fn multipart_form(parts: &[FormPart]) -> Result<multipart::Form, ApiError> {
    let mut form = multipart::Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
            FormPart::File {
                name,
                file_name,
                bytes,
            } => {
                let file = multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str("application/octet-stream")
                    .map_err(map_reqwest_error)?;
                form.part(name.clone(), file)
            }
        };
    }
    Ok(form)
}

pub(crate) fn map_reqwest_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(redact_sensitive(&error.to_string()))
    }
}
