//! REST transport for the remote driver
//!
//! Requests are described as `RestRequest` values in PostgREST terms (table,
//! filters, ordering, offset/limit) and executed by a `RestTransport`.
//! `HttpRestTransport` talks to a real endpoint; `MemoryRestTransport`
//! (see `memory`) interprets the same requests in-process.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::RemoteSettings;
use crate::error::{StoreError, StoreResult};

pub(crate) const BACKEND_NAME: &str = "remote";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestMethod {
    Get,
    Post,
    Patch,
}

impl RestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestMethod::Get => "GET",
            RestMethod::Post => "POST",
            RestMethod::Patch => "PATCH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lt,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// One request against a table
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub method: RestMethod,
    pub table: String,
    pub select: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub body: Option<Value>,
    /// Values for the `Prefer` header
    pub prefer: Vec<&'static str>,
}

impl RestRequest {
    fn new(method: RestMethod, table: &str) -> Self {
        Self {
            method,
            table: table.to_string(),
            select: None,
            filters: Vec::new(),
            order: Vec::new(),
            offset: None,
            limit: None,
            body: None,
            prefer: Vec::new(),
        }
    }

    pub fn get(table: &str) -> Self {
        Self::new(RestMethod::Get, table)
    }

    /// Insert and return the stored rows
    pub fn post(table: &str, body: Value) -> Self {
        let mut request = Self::new(RestMethod::Post, table);
        request.body = Some(body);
        request.prefer.push("return=representation");
        request
    }

    /// Update filtered rows and return them
    pub fn patch(table: &str, body: Value) -> Self {
        let mut request = Self::new(RestMethod::Patch, table);
        request.body = Some(body);
        request.prefer.push("return=representation");
        request
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    pub fn filter(mut self, column: &str, op: FilterOp, value: impl Into<String>) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, column: &str, value: impl Into<String>) -> Self {
        self.filter(column, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, column: &str, descending: bool) -> Self {
        self.order.push(OrderBy {
            column: column.to_string(),
            descending,
        });
        self
    }

    /// Rows `[offset, offset + limit)` of the ordered result
    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    pub fn prefer(mut self, value: &'static str) -> Self {
        self.prefer.push(value);
        self
    }

    pub fn has_preference(&self, value: &str) -> bool {
        self.prefer.iter().any(|p| *p == value)
    }

    /// PostgREST query string parameters
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(select) = &self.select {
            pairs.push(("select".to_string(), select.clone()));
        }
        for filter in &self.filters {
            pairs.push((
                filter.column.clone(),
                format!("{}.{}", filter.op.as_str(), filter.value),
            ));
        }
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|o| format!("{}.{}", o.column, if o.descending { "desc" } else { "asc" }))
                .collect::<Vec<_>>()
                .join(",");
            pairs.push(("order".to_string(), order));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

/// Executes REST requests, returning the JSON rows of the response
pub trait RestTransport: Send + Sync {
    fn execute(&self, request: &RestRequest) -> StoreResult<Vec<Value>>;
}

/// Real transport using a blocking HTTP client
pub struct HttpRestTransport {
    base_url: String,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

impl HttpRestTransport {
    pub fn new(settings: &RemoteSettings) -> StoreResult<Self> {
        if !settings.is_configured() {
            return Err(StoreError::unavailable(BACKEND_NAME, "remote url is not configured"));
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&settings.api_key)
            .map_err(|e| StoreError::unavailable(BACKEND_NAME, format!("invalid api key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", settings.api_key))
            .map_err(|e| StoreError::unavailable(BACKEND_NAME, format!("invalid api key: {}", e)))?;
        headers.insert("apikey", key);
        headers.insert(reqwest::header::AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                StoreError::unavailable(
                    BACKEND_NAME,
                    format!("failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            timeout_secs: settings.timeout_secs,
            client,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

impl RestTransport for HttpRestTransport {
    fn execute(&self, request: &RestRequest) -> StoreResult<Vec<Value>> {
        let url = self.table_url(&request.table);

        let mut builder = match request.method {
            RestMethod::Get => self.client.get(&url),
            RestMethod::Post => self.client.post(&url),
            RestMethod::Patch => self.client.patch(&url),
        };
        builder = builder.query(&request.query_pairs());
        if !request.prefer.is_empty() {
            builder = builder.header("Prefer", request.prefer.join(","));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!("{} {} {:?}", request.method.as_str(), url, request.query_pairs());

        let response = builder.send().map_err(|e| {
            let reason = if e.is_timeout() {
                format!("request timeout after {} seconds", self.timeout_secs)
            } else {
                format!("request failed: {}", e)
            };
            error!("{} {} failed: {}", request.method.as_str(), url, reason);
            StoreError::unavailable(BACKEND_NAME, reason)
        })?;

        let status = response.status();
        let text = response.text().map_err(|e| {
            StoreError::unavailable(BACKEND_NAME, format!("failed to read body: {}", e))
        })?;

        if !status.is_success() {
            error!("{} {} returned HTTP {}: {}", request.method.as_str(), url, status, text);
            return Err(StoreError::unavailable(
                BACKEND_NAME,
                format!("HTTP {} from {}: {}", status, request.table, text),
            ));
        }

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&text)? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            row => Ok(vec![row]),
        }
    }
}
