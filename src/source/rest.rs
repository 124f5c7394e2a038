//! REST source: offset-style paging over a JSON HTTP API.
//!
//! Paging parameters are injected as configurable query fields (default
//! `page` / `limit`). The response shape belongs to the caller, so the body is
//! mapped into items through a [`ResponseResolver`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::{Map, Value};

use super::{Cursor, FetchRequest, Page, PageSource, SourceError};

pub const DEFAULT_DATA_FIELD: &str = "data";
pub const DEFAULT_PAGE_COUNT_FIELD: &str = "pageCount";
pub const DEFAULT_FIRST_PAGE: u32 = 1;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

type ResolveFn = dyn Fn(&Value) -> Result<Page, SourceError> + Send + Sync;

/// Maps a decoded response body into a [`Page`].
#[derive(Clone)]
pub enum ResponseResolver {
    /// Items under `data_field`, total pages under `page_count_field`.
    /// A bare top-level array is taken as the item list.
    Fields {
        data_field: String,
        page_count_field: String,
    },
    /// Caller-supplied mapping.
    Custom(Arc<ResolveFn>),
}

impl Default for ResponseResolver {
    fn default() -> Self {
        ResponseResolver::Fields {
            data_field: DEFAULT_DATA_FIELD.to_string(),
            page_count_field: DEFAULT_PAGE_COUNT_FIELD.to_string(),
        }
    }
}

impl fmt::Debug for ResponseResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseResolver::Fields {
                data_field,
                page_count_field,
            } => f
                .debug_struct("Fields")
                .field("data_field", data_field)
                .field("page_count_field", page_count_field)
                .finish(),
            ResponseResolver::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl ResponseResolver {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<Page, SourceError> + Send + Sync + 'static,
    {
        ResponseResolver::Custom(Arc::new(f))
    }

    pub fn resolve(&self, body: &Value) -> Result<Page, SourceError> {
        match self {
            ResponseResolver::Custom(f) => f(body),
            ResponseResolver::Fields {
                data_field,
                page_count_field,
            } => {
                let items = match body {
                    Value::Array(items) => items.clone(),
                    Value::Object(map) => match map.get(data_field) {
                        Some(Value::Array(items)) => items.clone(),
                        Some(_) => {
                            return Err(SourceError::Parse(format!(
                                "field '{data_field}' is not an array"
                            )));
                        }
                        None => {
                            return Err(SourceError::Parse(format!(
                                "response has no '{data_field}' field"
                            )));
                        }
                    },
                    _ => {
                        return Err(SourceError::Parse(
                            "response is neither an object nor an array".to_string(),
                        ));
                    }
                };
                let page_count = body
                    .get(page_count_field)
                    .and_then(Value::as_u64)
                    .map(|n| n.min(u64::from(u32::MAX)) as u32);
                Ok(Page {
                    items,
                    page_count,
                    after: None,
                })
            }
        }
    }
}

/// HTTP backend for [`FetchRequest::Rest`].
pub struct RestSource {
    client: reqwest::Client,
    resolver: ResponseResolver,
    first_page: u32,
    timeout: Duration,
}

impl Default for RestSource {
    fn default() -> Self {
        Self::new(ResponseResolver::default())
    }
}

impl RestSource {
    pub fn new(resolver: ResponseResolver) -> Self {
        Self {
            client: reqwest::Client::new(),
            resolver,
            first_page: DEFAULT_FIRST_PAGE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Page number sent for the first page (1 unless the API is zero-based).
    pub fn with_first_page(mut self, first_page: u32) -> Self {
        self.first_page = first_page;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Renders a JSON param as a query-string value.
fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Paging fields first, then caller params. Caller params win on collision.
pub(crate) fn build_query(
    params: &Map<String, Value>,
    paging: Option<(&str, u32, &str, u32)>,
) -> Vec<(String, String)> {
    let mut query = Vec::new();
    if let Some((page_field, page, limit_field, limit)) = paging {
        if !params.contains_key(page_field) {
            query.push((page_field.to_string(), page.to_string()));
        }
        if !params.contains_key(limit_field) {
            query.push((limit_field.to_string(), limit.to_string()));
        }
    }
    query.extend(params.iter().map(|(k, v)| (k.clone(), query_value(v))));
    query
}

fn transport_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Network(format!("request timed out: {e}"))
    } else {
        SourceError::Network(e.to_string())
    }
}

#[async_trait]
impl PageSource for RestSource {
    fn name(&self) -> &str {
        "rest"
    }

    async fn fetch_page(
        &self,
        request: &FetchRequest,
        cursor: &Cursor,
        limit: Option<u32>,
    ) -> Result<Page, SourceError> {
        let FetchRequest::Rest {
            url,
            params,
            page_field,
            limit_field,
            content_type,
        } = request
        else {
            return Err(SourceError::Config(format!(
                "rest source cannot serve a {} request",
                request.kind()
            )));
        };

        let page_number = self.first_page + cursor.page;
        let query = build_query(
            params,
            limit.map(|l| (page_field.as_str(), page_number, limit_field.as_str(), l)),
        );

        info!("REST fetch: url={url}, page={page_number}, limit={limit:?}");
        debug!("REST query: {query:?}");

        let response = self
            .client
            .get(url)
            .query(&query)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;

        debug!("REST response status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!("REST backend error: {status} - {body}");
            return Err(SourceError::Backend {
                status: Some(status),
                message: body,
            });
        }

        let text = response.text().await.map_err(transport_error)?;
        let body: Value =
            serde_json::from_str(&text).map_err(|e| SourceError::Parse(e.to_string()))?;

        if let Some(server_page) = body.get("page") {
            debug!("Server reported page {server_page}; local cursor is authoritative");
        }

        let page = self.resolver.resolve(&body)?;
        info!(
            "REST page resolved: {} items, page_count={:?}",
            page.items.len(),
            page.page_count
        );
        Ok(page)
    }
}
