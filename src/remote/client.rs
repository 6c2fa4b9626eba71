//! PostgREST Client
//!
//! Reads the whole lead table in one round trip, newest first.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::Value;
use std::time::Duration;

use super::error::TransportError;
use super::LeadSource;
use crate::config::{BackendConfig, Config, ConfigError, Credentials};
use crate::leads::{Lead, LeadSchema};

/// Row API client for the lead table
pub struct RestClient {
    client: Client,
    endpoint: String,
    api_key: String,
    db_schema: String,
    schema: LeadSchema,
}

impl RestClient {
    /// Create a client for the configured backend
    ///
    /// Fails with a configuration error when the URL or key is missing.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let credentials = config.backend.credentials()?;
        Self::new(
            &credentials,
            &config.backend,
            config.sync.fetch_timeout(),
        )
    }

    pub fn new(
        credentials: &Credentials,
        backend: &BackendConfig,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let endpoint = format!(
            "{}/rest/v1/{}?select=*&order={}.desc",
            credentials.base_url,
            urlencoding::encode(&backend.table),
            urlencoding::encode(&backend.fields.created_at_field),
        );

        Ok(Self {
            client,
            endpoint,
            api_key: credentials.api_key.clone(),
            db_schema: backend.db_schema.clone(),
            schema: backend.fields.clone(),
        })
    }

    /// Full request URL, including the select/order query
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch raw rows as JSON without decoding them into leads
    pub async fn fetch_rows(&self) -> Result<Value, TransportError> {
        let mut request = self
            .client
            .get(&self.endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header(header::ACCEPT, "application/json")
            .header(header::CACHE_CONTROL, "no-store");

        if self.db_schema != "public" {
            request = request.header("Accept-Profile", &self.db_schema);
        }

        let response = request.send().await.map_err(TransportError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl LeadSource for RestClient {
    async fn fetch_all(&self) -> Result<Vec<Lead>, TransportError> {
        let body = self.fetch_rows().await?;
        let leads = decode_rows(body, &self.schema)?;
        tracing::debug!(count = leads.len(), "Fetched leads");
        Ok(leads)
    }
}

/// Decode a response body into leads
///
/// The body must be a JSON array and every row must decode; one bad row
/// makes the whole payload malformed.
pub fn decode_rows(body: Value, schema: &LeadSchema) -> Result<Vec<Lead>, TransportError> {
    let rows = match body {
        Value::Array(rows) => rows,
        _ => {
            return Err(TransportError::Decode(
                "expected a JSON array of rows".to_string(),
            ))
        }
    };

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            Lead::from_row(row, schema)
                .map_err(|e| TransportError::Decode(format!("row {}: {}", index, e)))
        })
        .collect()
}
