mod commands;
mod config;

use crate::config::get_storage;
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use prompts_core::scorer::Evaluation;
use prompts_core::storage::RecordStore;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version,
display_name = "prompts",
bin_name = "prompts",
about="Version-controlled prompt templates",
long_about="Version, render and compare prompt templates from the command line", )]
struct Args {
    #[arg(short = 'p', long)]
    storage_path: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Create a new prompt template
    New {
        #[arg(short = 't', long)]
        title: String,
        #[arg(short = 'c', long)]
        content: String,
        #[arg(short = 'd', long)]
        description: Option<String>,
        /// Declared variable names; extracted from the content when omitted
        #[arg(long, value_delimiter = ',')]
        variables: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Create a new version of an existing prompt
    Bump {
        id: String,
        #[arg(short = 'c', long)]
        content: String,
        #[arg(short = 'm', long)]
        changelog: Option<String>,
    },
    /// Render a prompt with variable substitution
    Render {
        id: String,
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,
        #[arg(long)]
        vars_file: Option<PathBuf>,
    },
    /// Show the differences between two versions
    Diff {
        v1: String,
        v2: String,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        no_color: bool,
    },
    /// Show the full version history of a prompt
    History {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the newest version of a prompt
    Latest { id: String },
    /// Show the version that was current at a point in time
    At { id: String, date: DateTime<Utc> },
    /// List the variables a prompt uses
    Vars { id: String },
    /// Create a test case
    NewTest {
        #[arg(short = 't', long)]
        title: String,
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,
        #[arg(long)]
        vars_file: Option<PathBuf>,
        #[arg(long)]
        criteria: Option<String>,
        #[arg(long, value_delimiter = ',')]
        dimensions: Vec<String>,
    },
    /// Run a test case against a prompt and record the scores
    Test {
        id: String,
        #[arg(short = 'a', long)]
        against: String,
        #[arg(short = 's', long = "score", value_parser = parse_score)]
        scores: Vec<(String, f64)>,
        #[arg(long)]
        failed: bool,
        #[arg(short = 'o', long)]
        output: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn split_pair(s: &str) -> Result<(&str, &str), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(format!("expected key=value, got `{s}`")),
    }
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    let (key, value) = split_pair(s)?;
    Ok((key.to_string(), value.to_string()))
}

fn parse_score(s: &str) -> Result<(String, f64), String> {
    let (key, value) = split_pair(s)?;
    let score = value
        .parse::<f64>()
        .map_err(|err| format!("invalid score for {key}: {err}"))?;
    Ok((key.to_string(), score))
}

async fn run<S: RecordStore>(store: &S, cmd: Commands) -> Result<String> {
    match cmd {
        Commands::New {
            title,
            content,
            description,
            variables,
            tags,
        } => {
            commands::new_prompt(store, &title, &content, description.as_deref(), &variables, &tags)
                .await
        }
        Commands::Bump {
            id,
            content,
            changelog,
        } => commands::bump(store, &id, &content, changelog.as_deref()).await,
        Commands::Render {
            id,
            vars,
            vars_file,
        } => commands::render(store, &id, &vars, vars_file.as_deref()).await,
        Commands::Diff {
            v1,
            v2,
            json,
            no_color,
        } => {
            let colored = !no_color && std::io::stdout().is_terminal();
            commands::diff(store, &v1, &v2, json, colored).await
        }
        Commands::History { id, json } => commands::history(store, &id, json).await,
        Commands::Latest { id } => commands::latest(store, &id).await,
        Commands::At { id, date } => commands::at(store, &id, date).await,
        Commands::Vars { id } => commands::vars(store, &id).await,
        Commands::NewTest {
            title,
            vars,
            vars_file,
            criteria,
            dimensions,
        } => {
            commands::new_test(
                store,
                &title,
                &vars,
                vars_file.as_deref(),
                criteria.as_deref(),
                &dimensions,
            )
            .await
        }
        Commands::Test {
            id,
            against,
            scores,
            failed,
            output,
            json,
        } => {
            let evaluation = Evaluation {
                scores: scores.into_iter().collect(),
                passed: !failed,
                output,
                metadata: None,
            };
            commands::run_test(store, &id, &against, evaluation, json).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prompts=warn,prompts_core=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let storage = get_storage(args.storage_path);

    let output = run(&storage, args.cmd).await?;
    println!("{output}");

    Ok(())
}
