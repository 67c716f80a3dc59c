//! Cadence CLI - Command-line interface for Dose Cadence
//!
//! Commands:
//! - generate: Write a synthetic sample payload
//! - process: Run a payload through the full pipeline
//! - train: Train a reminder-timing policy and write a checkpoint
//! - adjust: Adjust reminder times with a trained policy
//! - project: Project future doses with the cycle offset compensator

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use dose_cadence::env::{
    AdaptiveEnv, Environment, RecordedIntakes, SimulatedIntakeConfig, SimulatedIntakes,
};
use dose_cadence::policy::{BaselineOptimizer, Hyperparameters};
use dose_cadence::schema::TimeParser;
use dose_cadence::session::{compliance_history, ScheduleEntry};
use dose_cadence::synthetic::SampleGenerator;
use dose_cadence::training::{EvaluationSummary, TrainingReport};
use dose_cadence::{
    evaluate_policy, store, AdjustmentSession, CadenceConfig, CadenceError, CadenceProcessor,
    EnvConfig, FeatureDataset, TrainingJob, CADENCE_VERSION,
};

/// Cadence - Adaptive medication reminder timing
#[derive(Parser)]
#[command(name = "cadence")]
#[command(version = CADENCE_VERSION)]
#[command(about = "Learn and project medication reminder timing", long_about = None)]
struct Cli {
    /// JSON config file (defaults are used for anything it omits)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic sample payload
    Generate {
        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// First day of the schedules (YYYY-MM-DDTHH:MM:SS, default today at midnight)
        #[arg(long)]
        reference: Option<String>,
    },

    /// Run a payload through validation, features, sequences and projections
    Process {
        /// Input payload path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Also save the feature dataset here
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Date for bare HH:MM:SS timestamps (YYYY-MM-DD, default today)
        #[arg(long)]
        reference_date: Option<String>,
    },

    /// Train a policy and write its checkpoint
    Train {
        /// Feature dataset produced by `process --dataset`
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Where simulated doses come from
        #[arg(long, value_enum, default_value = "simulated")]
        source: SourceKind,

        /// Medication whose history drives the recorded source (default: first)
        #[arg(long)]
        medication: Option<String>,

        /// Checkpoint path (default: <checkpoint_dir>/cadence_policy.json)
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Override the configured timestep budget
        #[arg(long)]
        timesteps: Option<u64>,
    },

    /// Adjust reminder times with a trained policy
    Adjust {
        /// Policy checkpoint
        #[arg(short, long)]
        model: PathBuf,

        /// JSON array of schedule entries (use - for stdin)
        #[arg(short, long)]
        schedule: PathBuf,

        /// Feature dataset supplying compliance history
        #[arg(long)]
        history: Option<PathBuf>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Project future doses from a payload's intake history
    Project {
        /// Input payload path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Date for bare HH:MM:SS timestamps (YYYY-MM-DD, default today)
        #[arg(long)]
        reference_date: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    /// Seeded random intake behavior
    Simulated,
    /// Replay of a medication's recorded deviations
    Recorded,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CadenceCliError> {
    let config = match &cli.config {
        Some(path) => CadenceConfig::from_file(path)?,
        None => CadenceConfig::default(),
    };

    match cli.command {
        Commands::Generate { output, reference } => cmd_generate(&output, reference.as_deref()),

        Commands::Process {
            input,
            output,
            dataset,
            reference_date,
        } => cmd_process(
            &config,
            &input,
            &output,
            dataset.as_deref(),
            reference_date.as_deref(),
        ),

        Commands::Train {
            dataset,
            source,
            medication,
            checkpoint,
            timesteps,
        } => cmd_train(
            config,
            dataset.as_deref(),
            source,
            medication.as_deref(),
            checkpoint,
            timesteps,
        ),

        Commands::Adjust {
            model,
            schedule,
            history,
            output,
        } => cmd_adjust(&config, &model, &schedule, history.as_deref(), &output),

        Commands::Project {
            input,
            output,
            reference_date,
        } => cmd_project(&config, &input, &output, reference_date.as_deref()),
    }
}

fn cmd_generate(output: &Path, reference: Option<&str>) -> Result<(), CadenceCliError> {
    let reference = match reference {
        Some(raw) => TimeParser::today().parse_timestamp(raw)?,
        None => TimeParser::today()
            .reference_date()
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| CadenceCliError::InvalidArgument("invalid reference".to_string()))?,
    };

    let payload = SampleGenerator::new(reference).generate();
    write_output(output, &payload)
}

fn cmd_process(
    config: &CadenceConfig,
    input: &Path,
    output: &Path,
    dataset_path: Option<&Path>,
    reference_date: Option<&str>,
) -> Result<(), CadenceCliError> {
    let processor = processor_for(config, reference_date)?;
    let result = processor.process_json(&read_input(input)?)?;

    if let Some(path) = dataset_path {
        store::save_dataset(path, &result.dataset)?;
        info!("feature dataset saved to {}", path.display());
    }
    if result.issue_count() > 0 {
        warn!("{} records skipped, see 'issues' in the output", result.issue_count());
    }

    write_output(output, &result)
}

#[derive(Serialize)]
struct TrainOutput {
    report: TrainingReport,
    evaluation: EvaluationSummary,
}

fn cmd_train(
    mut config: CadenceConfig,
    dataset_path: Option<&Path>,
    source: SourceKind,
    medication: Option<&str>,
    checkpoint: Option<PathBuf>,
    timesteps: Option<u64>,
) -> Result<(), CadenceCliError> {
    if let Some(timesteps) = timesteps {
        config.training.total_timesteps = timesteps;
    }

    let dataset = match dataset_path {
        Some(path) => Some(store::load_dataset(path)?),
        None => None,
    };
    let sequences = match &dataset {
        Some(dataset) => dose_cadence::SequenceBuilder::new(config.pipeline.sequence_length)
            .build(dataset),
        None => Vec::new(),
    };

    let env = build_env(&config, source, dataset.as_ref(), medication)?;
    let checkpoint_path = checkpoint.unwrap_or_else(|| config.training.checkpoint_path());
    let optimizer = BaselineOptimizer::new(Hyperparameters::from(&config.training));

    let handle = TrainingJob::new(config.training.clone(), env, optimizer)
        .with_sequences(sequences)
        .with_checkpoint_path(Some(checkpoint_path))
        .spawn();
    info!("training job {} started", handle.job_id());
    let report = handle.wait()?;

    let checkpoint = report
        .checkpoint
        .as_ref()
        .ok_or_else(|| CadenceError::Training("job finished without a checkpoint".to_string()))?;
    let policy = checkpoint.to_policy()?;

    let mut eval_env = build_env(&config, source, dataset.as_ref(), medication)?;
    let evaluation = evaluate_policy(
        policy.as_ref(),
        &mut eval_env,
        config.training.eval_episodes,
        Some(config.training.seed),
    )?;
    info!(
        "evaluation: mean reward {:.2} +/- {:.2}",
        evaluation.mean_reward, evaluation.std_reward
    );

    write_output(Path::new("-"), &TrainOutput { report, evaluation })
}

fn build_env(
    config: &CadenceConfig,
    source: SourceKind,
    dataset: Option<&FeatureDataset>,
    medication: Option<&str>,
) -> Result<Box<dyn Environment + Send>, CadenceCliError> {
    let env_config: EnvConfig = config.environment.clone();

    match source {
        SourceKind::Simulated => Ok(Box::new(AdaptiveEnv::new(
            env_config,
            SimulatedIntakes::new(SimulatedIntakeConfig::default(), config.training.seed),
        ))),
        SourceKind::Recorded => {
            let dataset = dataset.ok_or_else(|| {
                CadenceCliError::InvalidArgument(
                    "the recorded source needs --dataset".to_string(),
                )
            })?;
            let series = match medication {
                Some(id) => dataset.series_for(id),
                None => dataset.series.first(),
            }
            .ok_or_else(|| {
                CadenceCliError::InvalidArgument("medication not found in dataset".to_string())
            })?;

            let source = RecordedIntakes::from_records(&series.records);
            if source.is_empty() {
                return Err(CadenceError::data(format!(
                    "medication {} has no logged intakes to replay",
                    series.medication_id
                ))
                .into());
            }
            Ok(Box::new(AdaptiveEnv::new(env_config, source)))
        }
    }
}

fn cmd_adjust(
    config: &CadenceConfig,
    model: &Path,
    schedule: &Path,
    history: Option<&Path>,
    output: &Path,
) -> Result<(), CadenceCliError> {
    let checkpoint = store::load_checkpoint(model)?;
    let session = AdjustmentSession::from_checkpoint(&checkpoint, config.environment.max_time_shift)?;

    let entries: Vec<ScheduleEntry> = serde_json::from_str(&read_input(schedule)?)?;
    let history = match history {
        Some(path) => compliance_history(&store::load_dataset(path)?),
        None => Default::default(),
    };

    let adjustments = session.adjust_all(&entries, &history)?;
    info!("adjusted {} reminders", adjustments.len());
    write_output(output, &adjustments)
}

fn cmd_project(
    config: &CadenceConfig,
    input: &Path,
    output: &Path,
    reference_date: Option<&str>,
) -> Result<(), CadenceCliError> {
    let processor = processor_for(config, reference_date)?;
    let adapted = processor.adapt_json(&read_input(input)?)?;
    let mut batch = dose_cadence::project_medications(&adapted.medications);

    // Medications with nothing to project are left out of the response
    batch.projections.retain(|p| !p.future_schedules.is_empty());
    let mut issues = adapted.issues;
    issues.append(&mut batch.issues);
    batch.issues = issues;

    write_output(output, &batch)
}

fn processor_for(
    config: &CadenceConfig,
    reference_date: Option<&str>,
) -> Result<CadenceProcessor, CadenceCliError> {
    let processor = CadenceProcessor::new(config.clone());
    Ok(match reference_date {
        Some(raw) => processor.with_time_parser(TimeParser::with_reference_date(
            dose_cadence::schema::time::parse_date(raw)?,
        )),
        None => processor,
    })
}

fn read_input(input: &Path) -> Result<String, CadenceCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

/// Pretty JSON for terminals and files, compact JSON when piped
fn write_output<T: Serialize>(output: &Path, value: &T) -> Result<(), CadenceCliError> {
    if output.to_string_lossy() == "-" {
        let json = if atty::is(atty::Stream::Stdout) {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        println!("{}", json);
    } else {
        store::save_json(output, value)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum CadenceCliError {
    Io(io::Error),
    Json(serde_json::Error),
    Engine(CadenceError),
    InvalidArgument(String),
}

impl From<io::Error> for CadenceCliError {
    fn from(e: io::Error) -> Self {
        CadenceCliError::Io(e)
    }
}

impl From<serde_json::Error> for CadenceCliError {
    fn from(e: serde_json::Error) -> Self {
        CadenceCliError::Json(e)
    }
}

impl From<CadenceError> for CadenceCliError {
    fn from(e: CadenceError) -> Self {
        match e {
            CadenceError::Io(e) => CadenceCliError::Io(e),
            CadenceError::Json(e) => CadenceCliError::Json(e),
            other => CadenceCliError::Engine(other),
        }
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CadenceCliError> for CliError {
    fn from(e: CadenceCliError) -> Self {
        let (code, message, hint) = match e {
            CadenceCliError::Io(e) => ("IO_ERROR", e.to_string(), "Check file paths and permissions"),
            CadenceCliError::Json(e) => ("JSON_ERROR", e.to_string(), "Check JSON syntax"),
            CadenceCliError::InvalidArgument(msg) => {
                ("INVALID_ARGUMENT", msg, "Run 'cadence help' for usage")
            }
            CadenceCliError::Engine(e) => {
                let message = e.to_string();
                match e {
                    CadenceError::Validation(_) => (
                        "VALIDATION_ERROR",
                        message,
                        "Every medication needs medication_id, start_date, interval and schedules",
                    ),
                    CadenceError::PolicyUnavailable(_) => (
                        "POLICY_UNAVAILABLE",
                        message,
                        "Train a policy with 'cadence train' first",
                    ),
                    CadenceError::Training(_) => {
                        ("TRAINING_ERROR", message, "Check the training configuration")
                    }
                    _ => ("DATA_ERROR", message, "Check dates, times and intervals in the input"),
                }
            }
        };

        CliError {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}
