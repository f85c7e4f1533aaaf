use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use prompts_core::chain::ChainResolver;
use prompts_core::diff::Differ;
use prompts_core::record::{CONTENT_FIELD, Fields, Record, RecordKind};
use prompts_core::renderer::{RenderOptions, Renderer, Variables};
use prompts_core::scorer::{Evaluation, Scorer};
use prompts_core::storage::RecordStore;
use prompts_core::versioning::bump_version;
use serde_json::Value;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

async fn load<S: RecordStore>(store: &S, id: &str) -> Result<Record> {
    store
        .get_record(id)
        .await?
        .ok_or_else(|| anyhow!("Prompt not found: {id}"))
}

/// Reads a JSON object of variable values.
fn read_variables(path: &Path) -> Result<Variables> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Could not read vars file: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Vars file is not a JSON object: {}", path.display()))
}

/// Variables from `vars_file`, overridden by `--var` pairs, which are always strings.
fn collect_variables(vars: &[(String, String)], vars_file: Option<&Path>) -> Result<Variables> {
    let mut variables = match vars_file {
        Some(path) => read_variables(path)?,
        None => Variables::new(),
    };
    for (key, value) in vars {
        variables.insert(key.clone(), Value::from(value.as_str()));
    }
    Ok(variables)
}

pub async fn new_prompt<S: RecordStore>(
    store: &S,
    title: &str,
    content: &str,
    description: Option<&str>,
    variables: &[String],
    tags: &[String],
) -> Result<String> {
    // declared variables win over what the template mentions
    let variables = if variables.is_empty() {
        Renderer::new().extract_variables(content)
    } else {
        variables.to_vec()
    };

    let mut fields = Fields::new();
    fields.insert(CONTENT_FIELD.to_string(), Value::from(content));
    if let Some(description) = description {
        fields.insert("description".to_string(), Value::from(description));
    }
    fields.insert("variables".to_string(), Value::from(variables.clone()));
    fields.insert("tags".to_string(), Value::from(tags.to_vec()));

    let record = Record::new(RecordKind::PromptTemplate, title, fields);
    record.validate()?;
    store.save_record(&record).await?;

    let mut out = format!("Created prompt {title}\nID: {}", record.id);
    if !variables.is_empty() {
        write!(out, "\nVariables: {}", variables.join(", "))?;
    }
    Ok(out)
}

pub async fn bump<S: RecordStore>(
    store: &S,
    id: &str,
    content: &str,
    changelog: Option<&str>,
) -> Result<String> {
    let version = bump_version(store, id, content, changelog)
        .await
        .with_context(|| format!("Could not create a new version of {id}"))?;

    Ok(format!("Created {}\nID: {}", version.title, version.id))
}

pub async fn render<S: RecordStore>(
    store: &S,
    id: &str,
    vars: &[(String, String)],
    vars_file: Option<&Path>,
) -> Result<String> {
    let prompt = load(store, id).await?;
    let variables = collect_variables(vars, vars_file)?;

    let rendered = Renderer::new().render(
        prompt.content().unwrap_or_default(),
        &variables,
        &RenderOptions::lenient(),
    )?;
    Ok(rendered)
}

pub async fn diff<S: RecordStore>(
    store: &S,
    v1: &str,
    v2: &str,
    json: bool,
    colored: bool,
) -> Result<String> {
    let older = load(store, v1).await?;
    let newer = load(store, v2).await?;

    let differ = Differ::new();
    let result = differ.diff(&older, &newer);
    if json {
        return Ok(serde_json::to_string_pretty(&result)?);
    }

    let body = if result.is_empty() {
        "No differences found.".to_string()
    } else {
        differ.format(&result, colored)
    };
    Ok(format!("Diff: {} → {}\n\n{body}", older.title, newer.title))
}

pub async fn history<S: RecordStore>(store: &S, id: &str, json: bool) -> Result<String> {
    let versions = ChainResolver::new(store).version_chain(id).await?;
    if json {
        return Ok(serde_json::to_string_pretty(&versions)?);
    }

    let title = store
        .get_record(id)
        .await?
        .map(|record| record.title)
        .unwrap_or_else(|| id.to_string());

    let mut out = format!("Version history for: {title}\n");
    for (i, version) in versions.iter().enumerate() {
        let marker = if i + 1 == versions.len() { "▶" } else { "◆" };
        let number = match version.field("versionNumber") {
            Some(Value::Number(n)) => format!("v{n}"),
            _ if i == 0 => "root".to_string(),
            _ => format!("v{}", i + 1),
        };
        writeln!(
            out,
            "\n{marker} {number} {} ({})",
            version.title,
            version.created_at.format(DATE_FORMAT)
        )?;
        if let Some(changelog) = version.field("changelog").and_then(Value::as_str) {
            writeln!(out, "   {changelog}")?;
        }
        write!(out, "   ID: {}", version.id)?;
    }
    write!(out, "\n\nTotal versions: {}", versions.len())?;
    Ok(out)
}

fn describe(record: &Record) -> String {
    format!(
        "{} ({})\nCreated: {}\n\n{}",
        record.title,
        record.id,
        record.created_at.format(DATE_FORMAT),
        record.content().unwrap_or_default()
    )
}

pub async fn latest<S: RecordStore>(store: &S, id: &str) -> Result<String> {
    let record = ChainResolver::new(store).latest_version(id).await?;
    Ok(describe(&record))
}

pub async fn at<S: RecordStore>(store: &S, id: &str, date: DateTime<Utc>) -> Result<String> {
    match ChainResolver::new(store).version_at(id, date).await? {
        Some(record) => Ok(describe(&record)),
        None => bail!("No version of {id} existed at {}", date.format(DATE_FORMAT)),
    }
}

pub async fn vars<S: RecordStore>(store: &S, id: &str) -> Result<String> {
    let prompt = load(store, id).await?;
    let names = Renderer::new().extract_variables(prompt.content().unwrap_or_default());
    Ok(names.join("\n"))
}

pub async fn new_test<S: RecordStore>(
    store: &S,
    title: &str,
    vars: &[(String, String)],
    vars_file: Option<&Path>,
    criteria: Option<&str>,
    dimensions: &[String],
) -> Result<String> {
    let mut fields = Fields::new();
    fields.insert(
        "inputVariables".to_string(),
        Value::Object(collect_variables(vars, vars_file)?),
    );
    if let Some(criteria) = criteria {
        fields.insert("expectedCriteria".to_string(), Value::from(criteria));
    }
    if !dimensions.is_empty() {
        fields.insert("scoringDimensions".to_string(), Value::from(dimensions.to_vec()));
    }

    let record = Record::new(RecordKind::PromptTest, title, fields);
    record.validate()?;
    store.save_record(&record).await?;

    Ok(format!("Created test {title}\nID: {}", record.id))
}

pub async fn run_test<S: RecordStore>(
    store: &S,
    id: &str,
    against: &str,
    evaluation: Evaluation,
    json: bool,
) -> Result<String> {
    let run = Scorer::new(store).run_test(id, against, evaluation).await?;
    if json {
        return Ok(serde_json::to_string_pretty(&run)?);
    }

    let mut out = format!(
        "Result ID: {}\nStatus: {}\n\nRendered prompt:\n{}\n\nScores:",
        run.result.id,
        if run.passed { "PASSED" } else { "FAILED" },
        run.rendered_prompt
    );
    for (dimension, score) in &run.scores {
        write!(out, "\n  {dimension}: {score}")?;
    }
    Ok(out)
}
