use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::AzureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Partial,
    Error,
}

impl ToolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Partial => "partial",
            ToolStatus::Error => "error",
        }
    }
}

/// Uniform `{status, data, errors}` envelope returned by every tool.
///
/// `errors` is non-empty whenever `status` is not `success`, and `data` is
/// the empty object whenever `status` is `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub data: Value,
    pub errors: Vec<String>,
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        Self {
            status: ToolStatus::Success,
            data,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        let errors = if errors.is_empty() {
            vec!["tool failed without a reported cause".to_string()]
        } else {
            errors
        };
        Self {
            status: ToolStatus::Error,
            data: json!({}),
            errors,
        }
    }

    pub fn from_error(err: &AzureError) -> Self {
        Self::failed(vec![err.to_string()])
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }

    /// Appends a late failure (e.g. export) without discarding the data.
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        if self.status == ToolStatus::Success {
            self.status = ToolStatus::Partial;
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            json!({ "status": "error", "data": {}, "errors": ["envelope serialization failed"] })
        })
    }
}

/// A normalized report plus the bookkeeping needed to pick a status.
#[derive(Debug, Clone)]
pub struct Outcome<R> {
    pub report: R,
    pub errors: Vec<String>,
    pub succeeded: usize,
    pub failed: usize,
}

impl<R> Outcome<R> {
    pub fn complete(report: R) -> Self {
        Self {
            report,
            errors: Vec::new(),
            succeeded: 1,
            failed: 0,
        }
    }

    /// Success with no failures, partial when at least one sub-call
    /// succeeded next to failures, error when nothing succeeded.
    pub fn status(&self) -> ToolStatus {
        if self.failed == 0 && self.errors.is_empty() {
            ToolStatus::Success
        } else if self.succeeded > 0 {
            ToolStatus::Partial
        } else {
            ToolStatus::Error
        }
    }

    pub fn map<S>(self, f: impl FnOnce(R) -> S) -> Outcome<S> {
        Outcome {
            report: f(self.report),
            errors: self.errors,
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }
}

impl<R: Serialize> Outcome<R> {
    pub fn into_tool_result(self) -> ToolResult {
        match self.status() {
            ToolStatus::Error => ToolResult::failed(self.errors),
            status => match serde_json::to_value(&self.report) {
                Ok(data) => ToolResult {
                    status,
                    data,
                    errors: self.errors,
                },
                Err(e) => {
                    let mut errors = self.errors;
                    errors.push(format!("failed to serialize report: {e}"));
                    ToolResult::failed(errors)
                }
            },
        }
    }
}

/// Gathers per-sub-call / per-entity results. Failures are recorded and the
/// iteration continues over the remaining entities.
#[derive(Debug)]
pub struct Collector<T> {
    items: Vec<T>,
    errors: Vec<String>,
    succeeded: usize,
    failed: usize,
}

impl<T> Default for Collector<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            errors: Vec::new(),
            succeeded: 0,
            failed: 0,
        }
    }
}

impl<T> Collector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.succeeded += 1;
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        self.items.extend(items);
        self.succeeded += 1;
    }

    pub fn fail(&mut self, context: Option<&str>, err: &AzureError) {
        self.fail_message(match context {
            Some(context) => format!("{context}: {err}"),
            None => err.to_string(),
        });
    }

    pub fn fail_message(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.failed += 1;
    }

    /// Record one sub-call that produced many entities.
    pub fn record_many(&mut self, context: Option<&str>, result: Result<Vec<T>, AzureError>) {
        match result {
            Ok(items) => self.extend(items),
            Err(err) => self.fail(context, &err),
        }
    }

    pub fn record(&mut self, context: Option<&str>, result: Result<T, AzureError>) {
        match result {
            Ok(item) => self.push(item),
            Err(err) => self.fail(context, &err),
        }
    }

    /// Fold another collector's bookkeeping in, keeping its items.
    pub fn absorb(&mut self, other: Collector<T>) {
        self.items.extend(other.items);
        self.errors.extend(other.errors);
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn finish<R>(self, build: impl FnOnce(Vec<T>) -> R) -> Outcome<R> {
        Outcome {
            report: build(self.items),
            errors: self.errors,
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }
}
