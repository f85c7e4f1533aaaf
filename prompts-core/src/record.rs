//! # Records
//!
//! Records are the stored entities of the system: prompt templates, their versions,
//! variable definitions, test cases and test results. Each record carries a
//! [`RecordKind`] tag and a map of JSON-typed fields which can be checked against the
//! kind's schema with [`Record::validate`].
//!
//! Records are linked by [`Relation`]s. The only relation type with special meaning is
//! [`FOLLOWS`]: `source_id` is the version immediately after `target_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Relation type linking a version to the version it succeeds.
pub const FOLLOWS: &str = "follows";

/// Relation type linking a test result to the prompt and test it was produced from.
pub const REFERENCES: &str = "references";

/// Field holding the prompt body.
pub const CONTENT_FIELD: &str = "content";

pub type Fields = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    PromptTemplate,
    PromptVersion,
    PromptVariable,
    PromptTest,
    PromptResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    /// A list of strings.
    Tags,
    /// A JSON object.
    Json,
    /// A string restricted to the listed options.
    Select(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

const fn required(name: &'static str, field_type: FieldType) -> FieldSpec {
    FieldSpec { name, field_type, required: true }
}

const fn optional(name: &'static str, field_type: FieldType) -> FieldSpec {
    FieldSpec { name, field_type, required: false }
}

const TEMPLATE_SCHEMA: &[FieldSpec] = &[
    required("content", FieldType::Text),
    optional("description", FieldType::Text),
    optional("variables", FieldType::Tags),
    optional("tags", FieldType::Tags),
];

const VERSION_SCHEMA: &[FieldSpec] = &[
    required("content", FieldType::Text),
    optional("description", FieldType::Text),
    optional("versionNumber", FieldType::Number),
    optional("changelog", FieldType::Text),
    optional("variables", FieldType::Tags),
    optional("tags", FieldType::Tags),
];

const VARIABLE_SCHEMA: &[FieldSpec] = &[
    required(
        "variableType",
        FieldType::Select(&["string", "number", "boolean", "array", "object"]),
    ),
    optional("description", FieldType::Text),
    optional("defaultValue", FieldType::Text),
    optional("required", FieldType::Boolean),
    optional("example", FieldType::Text),
];

const TEST_SCHEMA: &[FieldSpec] = &[
    required("inputVariables", FieldType::Json),
    optional("expectedCriteria", FieldType::Text),
    optional("scoringDimensions", FieldType::Tags),
];

const RESULT_SCHEMA: &[FieldSpec] = &[
    required("renderedPrompt", FieldType::Text),
    optional("output", FieldType::Text),
    required("scores", FieldType::Json),
    optional("metadata", FieldType::Json),
    required("passed", FieldType::Boolean),
];

impl RecordKind {
    pub fn slug(&self) -> &'static str {
        match self {
            RecordKind::PromptTemplate => "prompt-template",
            RecordKind::PromptVersion => "prompt-version",
            RecordKind::PromptVariable => "prompt-variable",
            RecordKind::PromptTest => "prompt-test",
            RecordKind::PromptResult => "prompt-result",
        }
    }

    pub fn schema(&self) -> &'static [FieldSpec] {
        match self {
            RecordKind::PromptTemplate => TEMPLATE_SCHEMA,
            RecordKind::PromptVersion => VERSION_SCHEMA,
            RecordKind::PromptVariable => VARIABLE_SCHEMA,
            RecordKind::PromptTest => TEST_SCHEMA,
            RecordKind::PromptResult => RESULT_SCHEMA,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FieldType {
    /// Whether a non-null value has this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Text, Value::String(_)) => true,
            (FieldType::Number, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Tags, Value::Array(items)) => items.iter().all(Value::is_string),
            (FieldType::Json, Value::Object(_)) => true,
            (FieldType::Select(options), Value::String(s)) => options.contains(&s.as_str()),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    Missing(&'static str),
    WrongType { field: &'static str, expected: FieldType },
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldProblem::Missing(field) => write!(f, "{field}: required field is missing"),
            FieldProblem::WrongType { field, expected } => {
                write!(f, "{field}: expected {expected:?}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} record: {}", join_problems(.problems))]
pub struct ValidationError {
    pub kind: RecordKind,
    pub problems: Vec<FieldProblem>,
}

fn join_problems(problems: &[FieldProblem]) -> String {
    problems.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub kind: RecordKind,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fields: Fields,
}

impl Record {
    /// Creates a record with a fresh id, timestamped now.
    pub fn new(kind: RecordKind, title: impl Into<String>, fields: Fields) -> Record {
        let now = Utc::now();
        Record {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            created_at: now,
            updated_at: now,
            fields,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Record {
        self.id = id.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Record {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The `content` field, when it holds a string.
    pub fn content(&self) -> Option<&str> {
        self.field(CONTENT_FIELD).and_then(Value::as_str)
    }

    /// Checks the fields against the schema of the record's kind.
    ///
    /// Required fields must be present and non-null; present non-null fields must have
    /// the declared type. Fields the schema does not name are allowed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let problems: Vec<FieldProblem> = self
            .kind
            .schema()
            .iter()
            .filter_map(|spec| match self.fields.get(spec.name) {
                None | Some(Value::Null) if spec.required => Some(FieldProblem::Missing(spec.name)),
                None | Some(Value::Null) => None,
                Some(value) if !spec.field_type.accepts(value) => Some(FieldProblem::WrongType {
                    field: spec.name,
                    expected: spec.field_type,
                }),
                Some(_) => None,
            })
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { kind: self.kind, problems })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    pub created_at: DateTime<Utc>,
}

impl Relation {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Relation {
        Relation {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation_type: relation_type.into(),
            created_at: Utc::now(),
        }
    }

    /// `source_id` is the version immediately after `target_id`.
    pub fn follows(source_id: impl Into<String>, target_id: impl Into<String>) -> Relation {
        Relation::new(source_id, target_id, FOLLOWS)
    }

    pub fn references(source_id: impl Into<String>, target_id: impl Into<String>) -> Relation {
        Relation::new(source_id, target_id, REFERENCES)
    }

    pub fn is_follows(&self) -> bool {
        self.relation_type == FOLLOWS
    }
}
