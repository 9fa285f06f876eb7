use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fitline_client::OpenAiCompletionClient;
use fitline_core::workload::{
    CandidateMatch, CandidateMatching, InterviewAnswers, InterviewReview, MatchCandidate,
    ResumeParsing, VacancyAnalysis, VacancyDescription, score_all,
};
use fitline_core::{
    Aggregated, CandidateProfile, Dispatcher, FitlineConfig, PositionCriteria, score_at,
};

#[derive(Parser)]
#[command(name = "fitline", version, about = "Candidate scoring and batched resume processing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one candidate against a position locally
    Score {
        /// Candidate profile JSON file
        #[arg(short, long)]
        candidate: PathBuf,

        /// Position criteria JSON file
        #[arg(short = 'p', long)]
        criteria: PathBuf,

        /// Evaluate age as of this date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Extract structured records from resume text files
    Parse {
        /// Plain-text resume files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Resumes per request (defaults to FITLINE_BATCH_SIZE)
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Match candidates against a position
    Match {
        /// JSON array of {"candidate_id": .., "profile": {..}}
        #[arg(short, long)]
        candidates: PathBuf,

        /// Position criteria JSON file
        #[arg(short = 'p', long)]
        criteria: PathBuf,

        /// Ask the completion service for an assessment on top of local scoring
        #[arg(long, default_value_t = false)]
        external: bool,

        /// Candidates per request (defaults to FITLINE_BATCH_SIZE)
        #[arg(short, long)]
        batch_size: Option<usize>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Evaluate age as of this date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Derive structured requirements from a vacancy description
    AnalyzeVacancy {
        #[arg(short, long)]
        title: String,

        /// File with the vacancy description
        #[arg(short, long)]
        description: PathBuf,

        /// File with the free-text requirements
        #[arg(short, long)]
        requirements: PathBuf,

        /// Print scoring criteria instead of the raw derived requirements
        #[arg(long, default_value_t = false)]
        criteria: bool,
    },

    /// Score interview answers for soft skills and confidence
    ReviewInterview {
        /// Position title
        #[arg(short, long)]
        position: String,

        /// File with one question per line
        #[arg(short, long)]
        questions: PathBuf,

        /// File with the candidate's answers
        #[arg(short, long)]
        answers: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fitline=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Score {
            candidate,
            criteria,
            as_of,
        } => {
            let candidate: CandidateProfile = load_json(&candidate)?;
            let criteria: PositionCriteria = load_json(&criteria)?;
            let result = score_at(&candidate, &criteria, as_of.unwrap_or_else(today));
            print_json(&result)?;
        }
        Commands::Parse { files, batch_size } => {
            let config = load_config()?;
            cmd_parse(&config, &files, batch_size.unwrap_or(config.batch_size)).await?;
        }
        Commands::Match {
            candidates,
            criteria,
            external,
            batch_size,
            format,
            as_of,
        } => {
            let candidates: Vec<MatchCandidate> = load_json(&candidates)?;
            let criteria: PositionCriteria = load_json(&criteria)?;
            let as_of = as_of.unwrap_or_else(today);

            let matches = if external {
                let config = load_config()?;
                let batch_size = batch_size.unwrap_or(config.batch_size);
                cmd_match_external(&config, candidates, criteria, batch_size, as_of).await?
            } else {
                score_all(&candidates, &criteria, as_of)
            };

            match format {
                OutputFormat::Json => print_json(&matches)?,
                OutputFormat::Csv => write_csv(std::io::stdout().lock(), &matches)?,
            }
        }
        Commands::AnalyzeVacancy {
            title,
            description,
            requirements,
            criteria,
        } => {
            let config = load_config()?;
            let vacancy = VacancyDescription {
                title,
                description: read_text(&description)?,
                requirements: read_text(&requirements)?,
            };
            let derived = dispatcher(&config)?
                .run_one(&VacancyAnalysis, vacancy)
                .await
                .context("Vacancy analysis failed")?;
            if criteria {
                print_json(&derived.into_criteria())?;
            } else {
                print_json(&derived)?;
            }
        }
        Commands::ReviewInterview {
            position,
            questions,
            answers,
        } => {
            let config = load_config()?;
            let interview = InterviewAnswers {
                position_title: position,
                questions: read_lines(&questions)?,
                answers: read_text(&answers)?,
            };
            let scores = dispatcher(&config)?
                .run_one(&InterviewReview, interview)
                .await
                .context("Interview review failed")?;
            print_json(&scores)?;
        }
    }

    Ok(())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn load_config() -> Result<FitlineConfig> {
    FitlineConfig::from_env().context("Invalid fitline configuration")
}

/// Dispatcher over the config's shared pools; derive other tunings with
/// [`Dispatcher::with_config`].
fn dispatcher(config: &FitlineConfig) -> Result<Dispatcher<OpenAiCompletionClient>> {
    let client =
        OpenAiCompletionClient::from_config(config).context("Failed to create HTTP clients")?;
    Ok(Dispatcher::new(
        client,
        config.credential_pool(),
        config.egress_pool(),
        config.dispatch_config(),
    ))
}

/// Stop dispatching new batches on Ctrl-C; in-flight batches still finish.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, waiting for in-flight batches");
            trigger.cancel();
        }
    });
    token
}

fn report_failures<T>(result: &Aggregated<T>) {
    if result.failed.is_empty() {
        return;
    }
    tracing::warn!(
        failed_batches = result.failure_count(),
        cancelled_batches = result.cancelled_count(),
        missing = result.missing_indices().len(),
        "Some items produced no record"
    );
}

async fn cmd_parse(config: &FitlineConfig, files: &[PathBuf], batch_size: usize) -> Result<()> {
    let texts = files
        .iter()
        .map(|path| read_text(path))
        .collect::<Result<Vec<_>>>()?;

    let result = dispatcher(config)?
        .run_with_cancel(Arc::new(ResumeParsing), texts, batch_size, cancel_on_ctrl_c())
        .await;
    report_failures(&result);

    let records: Vec<serde_json::Value> = result
        .records
        .iter()
        .map(|record| {
            serde_json::json!({
                "file": files[record.index].display().to_string(),
                "resume": record.value,
            })
        })
        .collect();
    let failed: Vec<serde_json::Value> = result
        .failed
        .iter()
        .map(|batch| {
            serde_json::json!({
                "files": batch
                    .indices
                    .iter()
                    .map(|&i| files[i].display().to_string())
                    .collect::<Vec<_>>(),
                "error": batch.error,
                "attempts": batch.attempts,
                "cancelled": batch.cancelled,
            })
        })
        .collect();

    print_json(&serde_json::json!({ "records": records, "failed": failed }))
}

async fn cmd_match_external(
    config: &FitlineConfig,
    candidates: Vec<MatchCandidate>,
    criteria: PositionCriteria,
    batch_size: usize,
    as_of: NaiveDate,
) -> Result<Vec<CandidateMatch>> {
    let workload = CandidateMatching::new(criteria).with_as_of(as_of);
    let result = dispatcher(config)?
        .with_config(config.match_dispatch_config())
        .run_with_cancel(Arc::new(workload), candidates, batch_size, cancel_on_ctrl_c())
        .await;
    report_failures(&result);
    Ok(result.into_values())
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    Ok(read_text(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = read_text(path)?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

const MATCH_COLUMNS: [&str; 12] = [
    "candidate_id",
    "overall_score",
    "experience",
    "technical",
    "soft_skills",
    "language",
    "education",
    "age",
    "matched_technical_skills",
    "missing_technical_skills",
    "matched_languages",
    "recommendation",
];

/// One CSV row; field order follows [`MATCH_COLUMNS`].
#[derive(Serialize)]
struct MatchRow<'a> {
    candidate_id: u64,
    overall_score: u8,
    experience: u8,
    technical: u8,
    soft_skills: u8,
    language: u8,
    education: u8,
    age: u8,
    matched_technical_skills: String,
    missing_technical_skills: String,
    matched_languages: String,
    recommendation: &'a str,
}

fn write_csv<W: Write>(writer: W, matches: &[CandidateMatch]) -> Result<()> {
    // Header first; an empty result is header-only.
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv.write_record(MATCH_COLUMNS)?;
    for m in matches {
        let result = &m.result;
        csv.serialize(MatchRow {
            candidate_id: m.candidate_id,
            overall_score: result.overall_score,
            experience: result.scores.experience,
            technical: result.scores.technical,
            soft_skills: result.scores.soft_skills,
            language: result.scores.language,
            education: result.scores.education,
            age: result.scores.age,
            matched_technical_skills: result.matched_technical_skills.join("; "),
            missing_technical_skills: result.missing_technical_skills.join("; "),
            matched_languages: result.matched_languages.join("; "),
            recommendation: result
                .assessment
                .as_ref()
                .and_then(|a| a.recommendation.as_deref())
                .unwrap_or(""),
        })?;
    }
    csv.flush()?;
    Ok(())
}
