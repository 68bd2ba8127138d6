//! In-process REST store
//!
//! Interprets `RestRequest`s against in-memory tables with the PostgREST
//! semantics the remote driver relies on: eq/gte/lt filters, multi-column
//! ordering, offset/limit, a server-side row cap, `resolution=` insert
//! preferences and autoincrement ids. Every request is recorded so callers
//! can inspect exactly which pages were read.

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use super::transport::{FilterOp, RestMethod, RestRequest, RestTransport, BACKEND_NAME};
use crate::error::{StoreError, StoreResult};

type Row = Map<String, Value>;

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
    next_id: HashMap<String, i64>,
}

pub struct MemoryRestTransport {
    max_rows: usize,
    tables: Mutex<Tables>,
    requests: Mutex<Vec<RestRequest>>,
    failing: Mutex<Option<(RestMethod, String)>>,
}

impl MemoryRestTransport {
    /// `max_rows` is the cap the store applies to every response
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows,
            tables: Mutex::new(Tables::default()),
            requests: Mutex::new(Vec::new()),
            failing: Mutex::new(None),
        }
    }

    /// Every request executed so far, in order
    pub fn requests(&self) -> Vec<RestRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Requests of one method against one table
    pub fn requests_for(&self, method: RestMethod, table: &str) -> Vec<RestRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.table == table)
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Make every `method` request against `table` fail as unreachable
    pub fn fail_on(&self, method: RestMethod, table: &str) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = Some((method, table.to_string()));
    }

    pub fn recover(&self) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Number of rows currently stored in `table`
    pub fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.rows.get(table).map(Vec::len).unwrap_or(0)
    }

    fn get(&self, tables: &Tables, request: &RestRequest) -> Vec<Value> {
        let empty = Vec::new();
        let rows = tables.rows.get(&request.table).unwrap_or(&empty);

        let mut matched: Vec<&Row> = rows
            .iter()
            .filter(|row| matches_filters(row, request))
            .collect();
        if !request.order.is_empty() {
            matched.sort_by(|a, b| {
                for order in &request.order {
                    let ord = compare_values(
                        a.get(&order.column).unwrap_or(&Value::Null),
                        b.get(&order.column).unwrap_or(&Value::Null),
                    );
                    let ord = if order.descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = request.offset.unwrap_or(0);
        let limit = request.limit.unwrap_or(self.max_rows).min(self.max_rows);

        matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| Value::Object(project(row, request.select.as_deref())))
            .collect()
    }

    fn post(&self, tables: &mut Tables, request: &RestRequest) -> StoreResult<Vec<Value>> {
        let incoming = match &request.body {
            Some(Value::Array(items)) => items.clone(),
            Some(item @ Value::Object(_)) => vec![item.clone()],
            _ => return Err(StoreError::unavailable(BACKEND_NAME, "POST without a JSON body")),
        };
        let ignore_duplicates = request.has_preference("resolution=ignore-duplicates");

        let mut written = Vec::new();
        for item in incoming {
            let Value::Object(mut row) = item else {
                return Err(StoreError::unavailable(BACKEND_NAME, "POST body rows must be objects"));
            };

            if !row.contains_key("id") {
                let next = tables.next_id.entry(request.table.clone()).or_insert(1);
                row.insert("id".to_string(), Value::from(*next));
                *next += 1;
            } else if let Some(n) = row.get("id").and_then(Value::as_i64) {
                let next = tables.next_id.entry(request.table.clone()).or_insert(1);
                *next = (*next).max(n + 1);
            }

            let table = tables.rows.entry(request.table.clone()).or_default();
            let duplicate = table.iter().any(|r| r.get("id") == row.get("id"));
            if !duplicate {
                table.push(row.clone());
                written.push(Value::Object(row));
            } else if !ignore_duplicates {
                return Err(StoreError::unavailable(
                    BACKEND_NAME,
                    format!("HTTP 409 duplicate key in {}", request.table),
                ));
            }
        }
        Ok(written)
    }

    fn patch(&self, tables: &mut Tables, request: &RestRequest) -> StoreResult<Vec<Value>> {
        let Some(Value::Object(changes)) = &request.body else {
            return Err(StoreError::unavailable(BACKEND_NAME, "PATCH without a JSON object body"));
        };

        let mut updated = Vec::new();
        if let Some(rows) = tables.rows.get_mut(&request.table) {
            for row in rows.iter_mut().filter(|row| matches_filters(row, request)) {
                for (k, v) in changes {
                    row.insert(k.clone(), v.clone());
                }
                updated.push(Value::Object(row.clone()));
            }
        }
        Ok(updated)
    }
}

impl RestTransport for MemoryRestTransport {
    fn execute(&self, request: &RestRequest) -> StoreResult<Vec<Value>> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((method, table)) = failing.as_ref() {
            if *method == request.method && *table == request.table {
                return Err(StoreError::unavailable(BACKEND_NAME, "connection refused"));
            }
        }
        drop(failing);

        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        match request.method {
            RestMethod::Get => Ok(self.get(&tables, request)),
            RestMethod::Post => self.post(&mut tables, request),
            RestMethod::Patch => self.patch(&mut tables, request),
        }
    }
}

fn matches_filters(row: &Row, request: &RestRequest) -> bool {
    request.filters.iter().all(|filter| {
        let Some(value) = row.get(&filter.column) else {
            return false;
        };
        let ord = compare_to_literal(value, &filter.value);
        match filter.op {
            FilterOp::Eq => ord == Ordering::Equal,
            FilterOp::Gte => ord != Ordering::Less,
            FilterOp::Lt => ord == Ordering::Less,
        }
    })
}

fn project(row: &Row, select: Option<&str>) -> Row {
    match select {
        None | Some("*") => row.clone(),
        Some(columns) => columns
            .split(',')
            .map(str::trim)
            .filter_map(|c| row.get(c).map(|v| (c.to_string(), v.clone())))
            .collect(),
    }
}

/// Compare a stored value with a query-string literal
fn compare_to_literal(value: &Value, literal: &str) -> Ordering {
    match value {
        Value::Number(n) => match (n.as_f64(), literal.parse::<f64>()) {
            (Some(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => n.to_string().as_str().cmp(literal),
        },
        Value::String(s) => compare_text(s, literal),
        Value::Bool(b) => b.to_string().as_str().cmp(literal),
        _ => Ordering::Less,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => compare_text(x, y),
        (Value::Null, Value::Null) => Ordering::Equal,
        // nulls sort last, as in PostgreSQL ascending order
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Timestamps compare as time, everything else as text
fn compare_text(a: &str, b: &str) -> Ordering {
    if let (Ok(x), Ok(y)) = (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (parse_naive(a), parse_naive(b)) {
        return x.cmp(&y);
    }
    a.cmp(b)
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}
