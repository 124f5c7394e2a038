//! Document-collection source with keyset pagination.
//!
//! Each page re-runs the ordered, filtered query starting strictly after the
//! last document of the previous page, and recomputes the page count with a
//! separate count query.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Cursor, FetchRequest, Page, PageSource, SourceError};
use crate::core::item::Item;

/// Comparison operators understood by document queries.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "array-contains")]
    ArrayContains,
    #[serde(rename = "in")]
    In,
}

impl FilterOp {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "==" => FilterOp::Eq,
            "!=" => FilterOp::Ne,
            "<" => FilterOp::Lt,
            "<=" => FilterOp::Le,
            ">" => FilterOp::Gt,
            ">=" => FilterOp::Ge,
            "array-contains" => FilterOp::ArrayContains,
            "in" => FilterOp::In,
            _ => return None,
        })
    }
}

/// A `(field, op, value)` filter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Parses `"field op json-value"`, e.g. `age >= 21` or `tags array-contains "rust"`.
    /// A value that is not valid JSON is taken as a plain string.
    pub fn parse(expr: &str) -> Option<Self> {
        let mut parts = expr.trim().splitn(3, char::is_whitespace);
        let field = parts.next()?.trim();
        let op = FilterOp::parse(parts.next()?.trim())?;
        let raw = parts.next()?.trim();
        if field.is_empty() || raw.is_empty() {
            return None;
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        Some(Self::new(field, op, value))
    }

    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return self.op == FilterOp::Ne && !self.value.is_null();
        };
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::Ne => actual != &self.value,
            FilterOp::Lt => same_type_cmp(actual, &self.value) == Some(Ordering::Less),
            FilterOp::Le => matches!(
                same_type_cmp(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Gt => same_type_cmp(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::Ge => matches!(
                same_type_cmp(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::ArrayContains => actual
                .as_array()
                .is_some_and(|values| values.contains(&self.value)),
            FilterOp::In => self
                .value
                .as_array()
                .is_some_and(|values| values.contains(actual)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

/// A stored document: an id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    /// Fields with `"id"` folded in; this is what lands in the list.
    pub fn into_item(self) -> Item {
        let mut fields = self.fields;
        fields.insert("id".to_string(), Value::String(self.id));
        Value::Object(fields)
    }
}

/// A query against one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    pub collection: String,
    pub conditions: Vec<Condition>,
    pub order_by: Option<OrderBy>,
    /// Keyset cursor: only documents ordered strictly after this one.
    pub start_after: Option<Item>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The query itself failed inside the store.
    Query(String),
    /// Fixture or document could not be decoded.
    Decode(String),
    Io(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Query(msg) => write!(f, "query failed: {msg}"),
            StoreError::Decode(msg) => write!(f, "decode failed: {msg}"),
            StoreError::Io(msg) => write!(f, "store I/O error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for SourceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Decode(msg) => SourceError::Parse(msg),
            other => SourceError::Backend {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

/// Abstract interface for a document collection backend.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Runs a filtered, ordered, optionally keyset-bounded query.
    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Document>, StoreError>;

    /// Counts documents in `collection` matching every condition.
    async fn count(&self, collection: &str, conditions: &[Condition]) -> Result<usize, StoreError>;

    /// Loads a single document by `"collection/id"` path.
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError>;
}

/// Rank of a JSON type in the cross-type sort order.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Ordering between two values of the same JSON type. `None` across types.
fn same_type_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order over JSON values: nulls, booleans, numbers, strings, arrays, objects.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    same_type_cmp(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

/// Orders two items by `order_by` (missing fields sort as null), then by id.
pub fn compare_keyset(a: &Item, b: &Item, order_by: Option<&OrderBy>) -> Ordering {
    let primary = order_by.map_or(Ordering::Equal, |order| {
        let av = a.get(&order.field).unwrap_or(&Value::Null);
        let bv = b.get(&order.field).unwrap_or(&Value::Null);
        let ord = compare_values(av, bv);
        if order.descending { ord.reverse() } else { ord }
    });
    primary.then_with(|| {
        let aid = a.get("id").unwrap_or(&Value::Null);
        let bid = b.get("id").unwrap_or(&Value::Null);
        compare_values(aid, bid)
    })
}

/// Backend for [`FetchRequest::DocumentQuery`].
pub struct DocumentSource {
    store: Arc<dyn DocumentStore>,
}

impl DocumentSource {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Replaces each reference field (`"collection/id"`) with the referenced fields.
    async fn populate(&self, items: Vec<Item>, fields: &[String]) -> Result<Vec<Item>, SourceError> {
        let mut items = items;
        for field in fields {
            let lookups = items.into_iter().map(|item| async move {
                let reference = item.get(field).and_then(Value::as_str).map(str::to_string);
                let Some(path) = reference else {
                    return Ok::<Item, StoreError>(item);
                };
                let resolved = match self.store.get(&path).await? {
                    Some(doc) => doc.into_item(),
                    None => {
                        warn!("Populate: dangling reference {path} in field '{field}'");
                        Value::Null
                    }
                };
                let mut item = item;
                if let Value::Object(map) = &mut item {
                    map.insert(field.clone(), resolved);
                }
                Ok(item)
            });
            items = join_all(lookups)
                .await
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
        }
        Ok(items)
    }
}

#[async_trait]
impl PageSource for DocumentSource {
    fn name(&self) -> &str {
        "documents"
    }

    async fn fetch_page(
        &self,
        request: &FetchRequest,
        cursor: &Cursor,
        limit: Option<u32>,
    ) -> Result<Page, SourceError> {
        let FetchRequest::DocumentQuery {
            collection,
            conditions,
            order_by,
            populate,
        } = request
        else {
            return Err(SourceError::Config(format!(
                "document source cannot serve a {} request",
                request.kind()
            )));
        };

        let page_count = match limit {
            Some(limit) if limit > 0 => {
                let total = self.store.count(collection, conditions).await?;
                let pages = total.div_ceil(limit as usize).max(1);
                Some(u32::try_from(pages).unwrap_or(u32::MAX))
            }
            _ => Some(1),
        };

        let query = DocumentQuery {
            collection: collection.clone(),
            conditions: conditions.clone(),
            order_by: order_by.clone(),
            start_after: if limit.is_some() {
                cursor.after.clone()
            } else {
                None
            },
            limit: limit.map(|l| l as usize),
        };

        info!(
            "Document fetch: collection={collection}, conditions={}, after={}, limit={limit:?}",
            conditions.len(),
            query.start_after.is_some()
        );

        let documents = self.store.query(&query).await?;
        let raw: Vec<Item> = documents.into_iter().map(Document::into_item).collect();
        let after = raw.last().cloned();
        debug!("Document page: {} documents, page_count={page_count:?}", raw.len());

        let items = if populate.is_empty() {
            raw
        } else {
            self.populate(raw, populate).await?
        };

        Ok(Page {
            items,
            page_count,
            after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_condition_parse() {
        let c = Condition::parse("age >= 21").unwrap();
        assert_eq!(c, Condition::new("age", FilterOp::Ge, json!(21)));

        let c = Condition::parse("tags array-contains rust").unwrap();
        assert_eq!(c.value, json!("rust"));

        assert!(Condition::parse("age ~ 3").is_none());
        assert!(Condition::parse("age").is_none());
    }

    #[test]
    fn test_condition_matching() {
        let doc = fields(json!({"age": 30, "tags": ["a", "b"], "city": "Oslo"}));
        assert!(Condition::new("age", FilterOp::Gt, json!(21)).matches(&doc));
        assert!(!Condition::new("age", FilterOp::Lt, json!(21)).matches(&doc));
        assert!(Condition::new("tags", FilterOp::ArrayContains, json!("b")).matches(&doc));
        assert!(Condition::new("city", FilterOp::In, json!(["Oslo", "Bergen"])).matches(&doc));
        assert!(!Condition::new("age", FilterOp::Gt, json!("21")).matches(&doc));
        assert!(!Condition::new("missing", FilterOp::Eq, json!(1)).matches(&doc));
    }

    #[test]
    fn test_filter_op_serde_uses_symbols() {
        let c: Condition =
            serde_json::from_value(json!({"field": "n", "op": "<=", "value": 3})).unwrap();
        assert_eq!(c.op, FilterOp::Le);
    }

    #[test]
    fn test_compare_values_cross_type() {
        assert_eq!(compare_values(&json!(null), &json!(1)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
    }

    #[test]
    fn test_compare_keyset_descending_with_id_tiebreak() {
        let order = OrderBy {
            field: "score".into(),
            descending: true,
        };
        let a = json!({"id": "a", "score": 5});
        let b = json!({"id": "b", "score": 5});
        let c = json!({"id": "c", "score": 9});
        assert_eq!(compare_keyset(&c, &a, Some(&order)), Ordering::Less);
        assert_eq!(compare_keyset(&a, &b, Some(&order)), Ordering::Less);
    }

    #[test]
    fn test_document_into_item_adds_id() {
        let doc = Document {
            id: "d1".into(),
            fields: fields(json!({"title": "x"})),
        };
        assert_eq!(doc.into_item(), json!({"title": "x", "id": "d1"}));
    }
}
