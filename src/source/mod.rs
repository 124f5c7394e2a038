//! # Data Sources
//!
//! Two very different backends sit behind one fetch contract:
//!
//! ```text
//!   FetchRequest::Rest ──────────► RestSource ──────► GET url?page=..&limit=..
//!                                                          │
//!   FetchRequest::DocumentQuery ─► DocumentSource ─► DocumentStore (keyset)
//!                                                          │
//!                                   Page { items, page_count, after }
//! ```
//!
//! [`Adapter`] dispatches a request to whichever backend matches its kind.

pub mod document;
pub mod memory;
pub mod rest;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::item::Item;

pub use document::{Condition, DocumentSource, DocumentStore, FilterOp, OrderBy, StoreError};
pub use memory::MemoryDocumentStore;
pub use rest::{ResponseResolver, RestSource};

pub const DEFAULT_PAGE_FIELD: &str = "page";
pub const DEFAULT_LIMIT_FIELD: &str = "limit";
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

fn default_page_field() -> String {
    DEFAULT_PAGE_FIELD.to_string()
}

fn default_limit_field() -> String {
    DEFAULT_LIMIT_FIELD.to_string()
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

/// Describes what a pager lists. Replacing it with an unequal value resets the list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FetchRequest {
    Rest {
        url: String,
        #[serde(default)]
        params: Map<String, Value>,
        #[serde(default = "default_page_field")]
        page_field: String,
        #[serde(default = "default_limit_field")]
        limit_field: String,
        #[serde(default = "default_content_type")]
        content_type: String,
    },
    DocumentQuery {
        collection: String,
        #[serde(default)]
        conditions: Vec<Condition>,
        #[serde(default)]
        order_by: Option<OrderBy>,
        /// Reference fields (`"collection/id"`) replaced by the referenced document.
        #[serde(default)]
        populate: Vec<String>,
    },
}

impl FetchRequest {
    /// A REST request with default paging field names.
    pub fn rest(url: impl Into<String>) -> Self {
        FetchRequest::Rest {
            url: url.into(),
            params: Map::new(),
            page_field: default_page_field(),
            limit_field: default_limit_field(),
            content_type: default_content_type(),
        }
    }

    /// An unfiltered, unordered document query.
    pub fn documents(collection: impl Into<String>) -> Self {
        FetchRequest::DocumentQuery {
            collection: collection.into(),
            conditions: Vec::new(),
            order_by: None,
            populate: Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchRequest::Rest { .. } => "rest",
            FetchRequest::DocumentQuery { .. } => "document-query",
        }
    }
}

/// Where the next page starts.
///
/// REST backends read `page` (pages already loaded); document queries read
/// `after`, the last raw document of the previous page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cursor {
    pub page: u32,
    pub after: Option<Item>,
}

/// One page of results as reported by a backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    /// Total number of pages, if the backend knows it.
    pub page_count: Option<u32>,
    /// Keyset cursor for the following page.
    pub after: Option<Item>,
}

/// Errors that can occur while fetching a page.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Transport failure (timeout, DNS, connection refused). Retryable.
    Network(String),
    /// The backend answered with a failure (non-2xx status, failed query).
    Backend { status: Option<u16>, message: String },
    /// The response could not be mapped into items.
    Parse(String),
    /// No backend is configured for the request kind.
    Config(String),
    /// The request was cancelled. Never surfaced to the user.
    Cancelled,
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Network(_) => true,
            SourceError::Backend { status, .. } => match status {
                Some(code) => *code >= 500 || *code == 429,
                None => true,
            },
            SourceError::Parse(_) | SourceError::Config(_) | SourceError::Cancelled => false,
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Network(msg) => write!(f, "network error: {msg}"),
            SourceError::Backend {
                status: Some(status),
                message,
            } => write!(f, "backend error (HTTP {status}): {message}"),
            SourceError::Backend {
                status: None,
                message,
            } => write!(f, "backend error: {message}"),
            SourceError::Parse(msg) => write!(f, "parse error: {msg}"),
            SourceError::Config(msg) => write!(f, "config error: {msg}"),
            SourceError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for SourceError {}

/// Uniform fetch contract over every backend.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Returns the name of the source, for logs.
    fn name(&self) -> &str;

    /// Fetches the page at `cursor`. `limit = None` disables paging: the whole
    /// result set comes back as a single page.
    async fn fetch_page(
        &self,
        request: &FetchRequest,
        cursor: &Cursor,
        limit: Option<u32>,
    ) -> Result<Page, SourceError>;
}

/// Routes each request to the backend for its kind.
#[derive(Default)]
pub struct Adapter {
    rest: Option<RestSource>,
    documents: Option<DocumentSource>,
}

impl Adapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rest(mut self, rest: RestSource) -> Self {
        self.rest = Some(rest);
        self
    }

    pub fn with_documents(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(DocumentSource::new(store));
        self
    }
}

#[async_trait]
impl PageSource for Adapter {
    fn name(&self) -> &str {
        "adapter"
    }

    async fn fetch_page(
        &self,
        request: &FetchRequest,
        cursor: &Cursor,
        limit: Option<u32>,
    ) -> Result<Page, SourceError> {
        match request {
            FetchRequest::Rest { .. } => match &self.rest {
                Some(rest) => rest.fetch_page(request, cursor, limit).await,
                None => Err(SourceError::Config(
                    "no REST backend configured".to_string(),
                )),
            },
            FetchRequest::DocumentQuery { .. } => match &self.documents {
                Some(documents) => documents.fetch_page(request, cursor, limit).await,
                None => Err(SourceError::Config(
                    "no document store configured".to_string(),
                )),
            },
        }
    }
}
