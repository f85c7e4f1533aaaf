//! # Diff
//!
//! Field-level and content-level comparison of two records.
//!
//! [`Differ::diff`] classifies every field as added, removed or changed, treats the
//! title as one more comparable field, and aligns the two `content` bodies line by
//! line using a longest-common-subsequence table. [`Differ::format`] turns the result
//! into a human-readable report.

use crate::record::{CONTENT_FIELD, Record};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValue {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub from: Value,
    pub to: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    Add,
    Remove,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    #[serde(rename = "type")]
    pub line_type: LineType,
    pub text: String,
}

impl DiffLine {
    fn new(line_type: LineType, text: &str) -> DiffLine {
        DiffLine { line_type, text: text.to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    /// Fields present only in the newer record.
    pub added: Vec<FieldValue>,
    /// Fields present only in the older record.
    pub removed: Vec<FieldValue>,
    /// Fields present in both with different values, plus `title` when it differs.
    pub changed: Vec<FieldChange>,
    /// Line-level edit script of the `content` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_diff: Option<Vec<DiffLine>>,
}

impl DiffResult {
    /// No field differences and no added or removed content lines.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && self
                .content_diff
                .iter()
                .flatten()
                .all(|line| line.line_type == LineType::Context)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Differ;

impl Differ {
    pub fn new() -> Differ {
        Differ
    }

    /// Compares `older` against `newer`.
    pub fn diff(&self, older: &Record, newer: &Record) -> DiffResult {
        let mut result = DiffResult::default();

        let keys: BTreeSet<&String> = older.fields.keys().chain(newer.fields.keys()).collect();
        for key in keys {
            match (older.fields.get(key), newer.fields.get(key)) {
                (None, Some(value)) => result.added.push(FieldValue {
                    field: key.clone(),
                    value: value.clone(),
                }),
                (Some(value), None) => result.removed.push(FieldValue {
                    field: key.clone(),
                    value: value.clone(),
                }),
                (Some(from), Some(to)) if !deep_equal(from, to) => result.changed.push(FieldChange {
                    field: key.clone(),
                    from: from.clone(),
                    to: to.clone(),
                }),
                _ => {}
            }
        }

        if older.title != newer.title {
            result.changed.push(FieldChange {
                field: "title".to_string(),
                from: Value::String(older.title.clone()),
                to: Value::String(newer.title.clone()),
            });
        }

        result.content_diff = Some(line_diff(
            older.content().unwrap_or_default(),
            newer.content().unwrap_or_default(),
        ));

        result
    }

    /// Renders a diff as text: `+` added, `-` removed, `~` changed fields, followed by
    /// the content edit script. `colored` only adds ANSI colour codes.
    pub fn format(&self, result: &DiffResult, colored: bool) -> String {
        let (green, red, yellow, reset) = if colored {
            (GREEN, RED, YELLOW, RESET)
        } else {
            ("", "", "", "")
        };

        let mut lines = Vec::new();

        for FieldValue { field, value } in &result.added {
            lines.push(format!("{green}+ [{field}] {value}{reset}"));
        }
        for FieldValue { field, value } in &result.removed {
            lines.push(format!("{red}- [{field}] {value}{reset}"));
        }
        for FieldChange { field, from, to } in &result.changed {
            // shown as a line diff below
            if field == CONTENT_FIELD {
                continue;
            }
            lines.push(format!("{yellow}~ [{field}] {from} → {to}{reset}"));
        }

        if let Some(script) = result.content_diff.as_deref().filter(|script| !script.is_empty()) {
            lines.push("--- content ---".to_string());
            for DiffLine { line_type, text } in script {
                lines.push(match line_type {
                    LineType::Add => format!("{green}+ {text}{reset}"),
                    LineType::Remove => format!("{red}- {text}{reset}"),
                    LineType::Context => format!("  {text}"),
                });
            }
        }

        lines.join("\n")
    }
}

/// Structural equality. Numbers compare by value, so `1` equals `1.0`.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            _ if x == y => true,
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| deep_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Line-level edit script turning `old` into `new`.
///
/// Context and removed lines, in order, reconstruct `old`; context and added lines
/// reconstruct `new`.
pub fn line_diff(old: &str, new: &str) -> Vec<DiffLine> {
    let old_lines: Vec<&str> = old.split('\n').collect();
    let new_lines: Vec<&str> = new.split('\n').collect();
    let common = longest_common_subsequence(&old_lines, &new_lines);

    let mut script = Vec::with_capacity(old_lines.len().max(new_lines.len()));
    let (mut i, mut j, mut k) = (0, 0, 0);

    while i < old_lines.len() || j < new_lines.len() {
        let anchor = common.get(k);
        if i < old_lines.len()
            && j < new_lines.len()
            && anchor == Some(&old_lines[i])
            && anchor == Some(&new_lines[j])
        {
            script.push(DiffLine::new(LineType::Context, old_lines[i]));
            i += 1;
            j += 1;
            k += 1;
        } else if j < new_lines.len() && anchor != Some(&new_lines[j]) {
            script.push(DiffLine::new(LineType::Add, new_lines[j]));
            j += 1;
        } else if i < old_lines.len() {
            script.push(DiffLine::new(LineType::Remove, old_lines[i]));
            i += 1;
        } else {
            break;
        }
    }

    script
}

fn longest_common_subsequence<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<&'a str> {
    let (m, n) = (a.len(), b.len());
    let mut table = vec![vec![0usize; n + 1]; m + 1];

    for i in 1..=m {
        for j in 1..=n {
            table[i][j] = if a[i - 1] == b[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }

    let mut common = Vec::with_capacity(table[m][n]);
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        if a[i - 1] == b[j - 1] {
            common.push(a[i - 1]);
            i -= 1;
            j -= 1;
        } else if table[i - 1][j] > table[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    common.reverse();
    common
}
