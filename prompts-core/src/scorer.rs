//! # Scoring
//!
//! Runs stored test cases against prompts and records the outcome.
//!
//! Scores are supplied by the caller: the scorer renders the prompt with the test's
//! `inputVariables`, stores a `prompt-result` record holding the rendered text and the
//! given [`Evaluation`], and links the result to the test and the prompt with
//! `references` relations. [`Scorer::compare_versions`] runs two prompts over the same
//! tests and reports per-dimension score deltas.

use crate::record::{Fields, Record, RecordKind, Relation, ValidationError};
use crate::renderer::{RenderError, RenderOptions, Renderer, Variables};
use crate::storage::RecordStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

pub type Scores = BTreeMap<String, f64>;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("Prompt not found: {0}")]
    PromptNotFound(String),
    #[error("Test not found: {0}")]
    TestNotFound(String),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Expected {expected} evaluations, got {got}")]
    EvaluationCountMismatch { expected: usize, got: usize },
    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ScoreError {
    fn storage<E: std::error::Error + Send + Sync + 'static>(err: E) -> ScoreError {
        ScoreError::Storage(Box::new(err))
    }
}

/// Caller-supplied judgement of one test run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub scores: Scores,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Evaluation {
    pub fn new(scores: Scores, passed: bool) -> Evaluation {
        Evaluation {
            scores,
            passed,
            ..Evaluation::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunResult {
    pub prompt_id: String,
    pub test_id: String,
    pub rendered_prompt: String,
    pub scores: Scores,
    pub passed: bool,
    /// The stored `prompt-result` record.
    pub result: Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    V1,
    V2,
    Tie,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub v1_id: String,
    pub v2_id: String,
    pub test_id: String,
    pub v1_result: TestRunResult,
    pub v2_result: TestRunResult,
    /// `v2 - v1` for every dimension scored by either side. Unscored counts as zero.
    pub deltas: Scores,
    pub total_delta: f64,
    pub winner: Winner,
}

pub struct Scorer<'a, S> {
    store: &'a S,
    renderer: Renderer,
}

impl<'a, S: RecordStore> Scorer<'a, S> {
    pub fn new(store: &'a S) -> Scorer<'a, S> {
        Scorer {
            store,
            renderer: Renderer::new(),
        }
    }

    /// Runs the test `test_id` against the prompt `prompt_id` and stores the result.
    ///
    /// The prompt's `content` is rendered leniently with the test's `inputVariables`;
    /// a prompt without content renders as the empty string.
    pub async fn run_test(
        &self,
        prompt_id: &str,
        test_id: &str,
        evaluation: Evaluation,
    ) -> Result<TestRunResult, ScoreError> {
        let prompt = self
            .store
            .get_record(prompt_id)
            .await
            .map_err(ScoreError::storage)?
            .ok_or_else(|| ScoreError::PromptNotFound(prompt_id.to_string()))?;
        let test = self
            .store
            .get_record(test_id)
            .await
            .map_err(ScoreError::storage)?
            .ok_or_else(|| ScoreError::TestNotFound(test_id.to_string()))?;

        let variables: Variables = match test.field("inputVariables") {
            Some(Value::Object(map)) => map.clone(),
            _ => Variables::new(),
        };
        let rendered_prompt = self.renderer.render(
            prompt.content().unwrap_or_default(),
            &variables,
            &RenderOptions::lenient(),
        )?;

        let result = Record::new(
            RecordKind::PromptResult,
            format!("Result: {} on {}", test.title, prompt.title),
            result_fields(&rendered_prompt, &evaluation),
        );
        result.validate()?;

        self.store.save_record(&result).await.map_err(ScoreError::storage)?;
        for target in [test_id, prompt_id] {
            self.store
                .save_relation(&Relation::references(&result.id, target))
                .await
                .map_err(ScoreError::storage)?;
        }
        debug!(prompt_id, test_id, result = %result.id, passed = evaluation.passed, "recorded test run");

        Ok(TestRunResult {
            prompt_id: prompt_id.to_string(),
            test_id: test_id.to_string(),
            rendered_prompt,
            scores: evaluation.scores,
            passed: evaluation.passed,
            result,
        })
    }

    /// Runs each test against `prompt_id`, pairing tests and evaluations by position.
    pub async fn run_suite(
        &self,
        prompt_id: &str,
        test_ids: &[&str],
        evaluations: &[Evaluation],
    ) -> Result<Vec<TestRunResult>, ScoreError> {
        if test_ids.len() != evaluations.len() {
            return Err(ScoreError::EvaluationCountMismatch {
                expected: test_ids.len(),
                got: evaluations.len(),
            });
        }

        let mut results = Vec::with_capacity(test_ids.len());
        for (test_id, evaluation) in test_ids.iter().zip(evaluations) {
            results.push(self.run_test(prompt_id, test_id, evaluation.clone()).await?);
        }
        Ok(results)
    }

    /// Runs the same tests against two prompts and compares their scores test by test.
    pub async fn compare_versions(
        &self,
        v1_id: &str,
        v2_id: &str,
        test_ids: &[&str],
        v1_evaluations: &[Evaluation],
        v2_evaluations: &[Evaluation],
    ) -> Result<Vec<Comparison>, ScoreError> {
        let v1_results = self.run_suite(v1_id, test_ids, v1_evaluations).await?;
        let v2_results = self.run_suite(v2_id, test_ids, v2_evaluations).await?;

        Ok(v1_results
            .into_iter()
            .zip(v2_results)
            .map(|(v1_result, v2_result)| {
                let deltas = score_deltas(&v1_result.scores, &v2_result.scores);
                let total_delta: f64 = deltas.values().sum();
                let winner = if total_delta > 0.0 {
                    Winner::V2
                } else if total_delta < 0.0 {
                    Winner::V1
                } else {
                    Winner::Tie
                };

                Comparison {
                    v1_id: v1_id.to_string(),
                    v2_id: v2_id.to_string(),
                    test_id: v1_result.test_id.clone(),
                    v1_result,
                    v2_result,
                    deltas,
                    total_delta,
                    winner,
                }
            })
            .collect())
    }
}

fn result_fields(rendered_prompt: &str, evaluation: &Evaluation) -> Fields {
    let scores: Map<String, Value> = evaluation
        .scores
        .iter()
        .map(|(dimension, score)| (dimension.clone(), Value::from(*score)))
        .collect();

    let mut fields = Fields::new();
    fields.insert("renderedPrompt".to_string(), Value::from(rendered_prompt));
    fields.insert("scores".to_string(), Value::Object(scores));
    fields.insert("passed".to_string(), Value::Bool(evaluation.passed));
    if let Some(output) = &evaluation.output {
        fields.insert("output".to_string(), Value::from(output.as_str()));
    }
    if let Some(metadata) = &evaluation.metadata {
        fields.insert("metadata".to_string(), Value::Object(metadata.clone()));
    }
    fields
}

/// Per-dimension `v2 - v1` over the union of both score sets.
pub fn score_deltas(v1: &Scores, v2: &Scores) -> Scores {
    let dimensions: BTreeSet<&String> = v1.keys().chain(v2.keys()).collect();

    dimensions
        .into_iter()
        .map(|dimension| {
            let before = v1.get(dimension).copied().unwrap_or(0.0);
            let after = v2.get(dimension).copied().unwrap_or(0.0);
            (dimension.clone(), after - before)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_storage::InMemoryStore;
    use crate::record::REFERENCES;
    use serde_json::json;

    fn scores(pairs: &[(&str, f64)]) -> Scores {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn prompt(id: &str, content: &str) -> Record {
        Record::new(
            RecordKind::PromptTemplate,
            "Test Prompt",
            serde_json::from_value(json!({ "content": content })).unwrap(),
        )
        .with_id(id)
    }

    fn test_case(id: &str, input_variables: Value) -> Record {
        Record::new(
            RecordKind::PromptTest,
            "Test Case",
            serde_json::from_value(json!({ "inputVariables": input_variables })).unwrap(),
        )
        .with_id(id)
    }

    async fn store_with(records: &[Record]) -> InMemoryStore {
        let store = InMemoryStore::new();
        for record in records {
            store.save_record(record).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_run_test_renders_prompt() {
        let store = store_with(&[
            prompt("p1", "Hello {{name}}"),
            test_case("t1", json!({"name": "World"})),
        ])
        .await;
        let scorer = Scorer::new(&store);

        let run = scorer
            .run_test("p1", "t1", Evaluation::new(scores(&[("relevance", 80.0)]), true))
            .await
            .unwrap();

        assert_eq!("Hello World", run.rendered_prompt);
        assert_eq!("p1", run.prompt_id);
        assert_eq!("t1", run.test_id);
        assert!(run.passed);
        assert_eq!(Some(&80.0), run.scores.get("relevance"));
    }

    #[tokio::test]
    async fn test_run_test_leaves_unknown_placeholders() {
        let store = store_with(&[
            prompt("p1", "Write about {{topic}} for {{audience}}"),
            test_case("t1", json!({"topic": "Rust"})),
        ])
        .await;

        let run = Scorer::new(&store)
            .run_test("p1", "t1", Evaluation::default())
            .await
            .unwrap();

        assert_eq!("Write about Rust for {{audience}}", run.rendered_prompt);
    }

    #[tokio::test]
    async fn test_run_test_stores_result_and_relations() {
        let store = store_with(&[
            prompt("p1", "Summarize {{topic}}"),
            test_case("t1", json!({"topic": "AI"})),
        ])
        .await;
        let mut evaluation = Evaluation::new(scores(&[("coherence", 90.0)]), false);
        evaluation.output = Some("AI is...".to_string());

        let run = Scorer::new(&store).run_test("p1", "t1", evaluation).await.unwrap();

        let stored = store.get_record(&run.result.id).await.unwrap().unwrap();
        assert_eq!(RecordKind::PromptResult, stored.kind);
        assert_eq!("Result: Test Case on Test Prompt", stored.title);
        assert_eq!(Some(&json!("Summarize AI")), stored.field("renderedPrompt"));
        assert_eq!(Some(&json!({"coherence": 90.0})), stored.field("scores"));
        assert_eq!(Some(&json!(false)), stored.field("passed"));
        assert_eq!(Some(&json!("AI is...")), stored.field("output"));
        assert_eq!(None, stored.field("metadata"));

        let relations = store.relations().await;
        let targets: Vec<&str> = relations.iter().map(|r| r.target_id.as_str()).collect();
        assert_eq!(vec!["t1", "p1"], targets);
        assert!(relations
            .iter()
            .all(|r| r.relation_type == REFERENCES && r.source_id == run.result.id));
    }

    #[tokio::test]
    async fn test_run_test_missing_records() {
        let store = store_with(&[prompt("p1", "x"), test_case("t1", json!({}))]).await;
        let scorer = Scorer::new(&store);

        let missing_prompt = scorer.run_test("nope", "t1", Evaluation::default()).await;
        assert!(matches!(missing_prompt, Err(ScoreError::PromptNotFound(id)) if id == "nope"));

        let missing_test = scorer.run_test("p1", "nope", Evaluation::default()).await;
        assert!(matches!(missing_test, Err(ScoreError::TestNotFound(id)) if id == "nope"));

        assert!(store.relations().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_suite() {
        let store = store_with(&[
            prompt("p1", "Hi {{name}}"),
            test_case("t1", json!({"name": "Ann"})),
            test_case("t2", json!({"name": "Bo"})),
        ])
        .await;
        let scorer = Scorer::new(&store);

        let runs = scorer
            .run_suite(
                "p1",
                &["t1", "t2"],
                &[Evaluation::new(Scores::new(), true), Evaluation::new(Scores::new(), false)],
            )
            .await
            .unwrap();

        assert_eq!(vec!["Hi Ann", "Hi Bo"], runs.iter().map(|r| r.rendered_prompt.as_str()).collect::<Vec<_>>());
        assert_eq!(vec![true, false], runs.iter().map(|r| r.passed).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_run_suite_count_mismatch() {
        let store = store_with(&[prompt("p1", "x"), test_case("t1", json!({}))]).await;

        let result = Scorer::new(&store).run_suite("p1", &["t1"], &[]).await;

        assert!(matches!(
            result,
            Err(ScoreError::EvaluationCountMismatch { expected: 1, got: 0 })
        ));
    }

    #[tokio::test]
    async fn test_compare_versions() {
        let store = store_with(&[
            prompt("v1", "Old {{q}}"),
            prompt("v2", "New {{q}}"),
            test_case("t1", json!({"q": "a"})),
            test_case("t2", json!({"q": "b"})),
        ])
        .await;
        let scorer = Scorer::new(&store);

        let comparisons = scorer
            .compare_versions(
                "v1",
                "v2",
                &["t1", "t2"],
                &[
                    Evaluation::new(scores(&[("accuracy", 70.0), ("tone", 80.0)]), true),
                    Evaluation::new(scores(&[("accuracy", 90.0)]), true),
                ],
                &[
                    Evaluation::new(scores(&[("accuracy", 85.0), ("tone", 75.0)]), true),
                    Evaluation::new(scores(&[("accuracy", 60.0), ("tone", 10.0)]), false),
                ],
            )
            .await
            .unwrap();

        assert_eq!(2, comparisons.len());

        let first = &comparisons[0];
        assert_eq!("t1", first.test_id);
        assert_eq!(scores(&[("accuracy", 15.0), ("tone", -5.0)]), first.deltas);
        assert_eq!(10.0, first.total_delta);
        assert_eq!(Winner::V2, first.winner);
        assert_eq!("Old a", first.v1_result.rendered_prompt);
        assert_eq!("New a", first.v2_result.rendered_prompt);

        let second = &comparisons[1];
        assert_eq!(scores(&[("accuracy", -30.0), ("tone", 10.0)]), second.deltas);
        assert_eq!(Winner::V1, second.winner);
    }

    #[test]
    fn test_score_deltas_tie() {
        let deltas = score_deltas(&scores(&[("a", 1.0), ("b", 2.0)]), &scores(&[("a", 2.0), ("b", 1.0)]));
        assert_eq!(0.0, deltas.values().sum::<f64>());
        assert!(score_deltas(&Scores::new(), &Scores::new()).is_empty());
    }

    #[test]
    fn test_winner_serializes_lowercase() {
        assert_eq!("\"tie\"", serde_json::to_string(&Winner::Tie).unwrap());
        assert_eq!("\"v2\"", serde_json::to_string(&Winner::V2).unwrap());
    }
}
