//! Command-line interface for flowgate
//!
//! Each subcommand runs one of the bundled workflows in [`crate::demos`]
//! against the configured provider and maps the outcome to an exit code.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::error;

use flowgate_config::{CliArgs, Config};
use flowgate_engine::{
    ApprovalLoop, ChainOutcome, ConfidenceThreshold, DecisionSource, JsonFileKnowledge,
    ValidationOutcome, WorkflowError,
};
use flowgate_llm::{StructuredGenerate, generator_from_config};
use flowgate_utils::error::{ConfigError, display_for_user};
use flowgate_utils::exit_codes::ExitCode;
use flowgate_utils::logging::{LogFormat, init_tracing};

use crate::console::ConsoleDecisions;
use crate::demos::{calendar, knowledge, support, validation};

/// flowgate - gated chains, intent routing, parallel validation and human
/// approval over structured LLM output
#[derive(Parser, Debug)]
#[command(name = "flowgate")]
#[command(about = "Composable LLM workflows with quality gates")]
#[command(
    long_about = "flowgate runs structured-output LLM workflows: prompt chains with quality gates, \
intent routing, parallel input validation and human approval loops.\n\n\
Configuration is read from .flowgate/config.toml (searched upward from the current directory) \
or $FLOWGATE_HOME/config.toml; command-line flags take precedence."
)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// LLM provider (openai or openrouter)
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Model to request from the provider
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Override the provider endpoint URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Confidence a gate or routing decision must exceed (0.0 - 1.0)
    #[arg(long, global = true)]
    pub confidence_threshold: Option<f64>,

    /// Timeout for each generation call, in seconds
    #[arg(long, global = true)]
    pub call_timeout_secs: Option<u64>,

    /// Maximum number of regenerations in the approval loop
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Show previously rejected drafts to the model when regenerating
    #[arg(long, global = true)]
    pub carry_rejected_drafts: bool,

    /// Timeout for each approval decision, in seconds (0 waits indefinitely)
    #[arg(long, global = true)]
    pub decision_timeout_secs: Option<u64>,

    /// Maximum tool-call rounds per generation
    #[arg(long, global = true)]
    pub max_tool_rounds: Option<u32>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format (compact or json)
    #[arg(long, global = true, default_value = "compact")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Extract a calendar event, its details and a confirmation (gated chain)
    Chain {
        /// Free-form text that may describe an event
        text: String,
    },

    /// Classify a customer message as question, request or complaint and reply
    Route {
        /// Customer message
        text: String,
    },

    /// Create or modify a calendar event, if the request is confidently one
    CalendarRoute {
        /// Calendar request
        text: String,
    },

    /// Screen input with a calendar check and a security check in parallel
    Validate {
        /// Input to screen
        text: String,
    },

    /// Generate a response and ask for approval on the terminal
    Approve {
        /// What to write
        prompt: String,
    },

    /// Answer a question from a JSON knowledge base
    Ask {
        /// Question to answer
        question: String,

        /// Knowledge base JSON file
        #[arg(long)]
        kb: PathBuf,
    },

    /// Show the effective configuration and where each value came from
    Config,
}

impl Cli {
    /// Overrides for configuration discovery.
    #[must_use]
    pub fn to_cli_args(&self) -> CliArgs {
        CliArgs {
            config_path: self.config.clone(),
            llm_provider: self.provider.clone(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            confidence_threshold: self.confidence_threshold,
            call_timeout_secs: self.call_timeout_secs,
            max_retries: self.max_retries,
            carry_rejected_drafts: self.carry_rejected_drafts,
            decision_timeout_secs: self.decision_timeout_secs,
            max_tool_rounds: self.max_tool_rounds,
        }
    }
}

/// Parse arguments, run the selected workflow and report the outcome.
///
/// All output, including errors, is written here; the caller only maps the
/// returned code to the process exit status.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.log_format) {
        eprintln!("⚠ Failed to initialize logging: {e}");
    }

    let config = match Config::discover(&cli.to_cli_args()) {
        Ok(config) => config,
        Err(err) => {
            match err.downcast_ref::<ConfigError>() {
                Some(config_err) => eprintln!("✗ {}", display_for_user(config_err)),
                None => eprintln!("✗ Configuration error: {err:#}"),
            }
            return Err(ExitCode::CONFIG);
        }
    };

    if cli.command == Commands::Config {
        print_effective_config(&config);
        return Ok(());
    }

    let generator: Arc<dyn StructuredGenerate> = match generator_from_config(&config) {
        Ok(generator) => Arc::new(generator),
        Err(err) => {
            eprintln!("✗ {}", display_for_user(&err));
            return Err(err.to_exit_code());
        }
    };

    let decisions: Arc<dyn DecisionSource> = Arc::new(ConsoleDecisions::stdio());
    match block_on_workflow(execute(&cli.command, &config, generator, decisions))? {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(err) => {
            error!(error = %err, "Workflow failed");
            eprintln!("✗ {}", display_for_user(&err));
            Err(err.to_exit_code())
        }
    }
}

/// Drive a workflow to completion on a fresh runtime.
///
/// The runtime is shut down without waiting for blocking tasks: a terminal
/// read abandoned by a decision timeout only returns once a line arrives.
fn block_on_workflow<F>(workflow: F) -> Result<Result<ExitCode, WorkflowError>, ExitCode>
where
    F: Future<Output = Result<ExitCode, WorkflowError>>,
{
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };
    let result = rt.block_on(workflow);
    rt.shutdown_background();
    Ok(result)
}

/// Run one workflow subcommand.
///
/// Declined inputs (closed gate, low-confidence routing, rejected validation,
/// unapproved drafts) are reported on stdout and returned as non-success exit
/// codes rather than errors.
///
/// # Errors
///
/// Any [`WorkflowError`] other than a validation rejection.
pub async fn execute(
    command: &Commands,
    config: &Config,
    generator: Arc<dyn StructuredGenerate>,
    decisions: Arc<dyn DecisionSource>,
) -> Result<ExitCode, WorkflowError> {
    let threshold = ConfidenceThreshold::new(config.confidence_threshold())?;
    let call_timeout = config.call_timeout();

    match command {
        Commands::Chain { text } => {
            let chain = calendar::event_chain(generator, threshold, call_timeout)?;
            match chain.execute(text).await? {
                ChainOutcome::Completed { output, .. } => {
                    let confirmation: calendar::EventConfirmation = output.into_typed()?;
                    println!("Confirmation: {}", confirmation.confirmation_message);
                    if let Some(link) = confirmation.calendar_link {
                        println!("Calendar link: {link}");
                    }
                    Ok(ExitCode::SUCCESS)
                }
                ChainOutcome::Gated { .. } | ChainOutcome::Empty => {
                    println!("This does not look like a calendar event request.");
                    Ok(ExitCode::NOT_APPLICABLE)
                }
            }
        }

        Commands::Route { text } => {
            let router = support::support_router(generator, call_timeout)?;
            let (reply, classification) = router.route(text).await?;
            println!(
                "[{} {}] {}",
                classification.label, classification.confidence, reply
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::CalendarRoute { text } => {
            let router = calendar::calendar_router(generator, call_timeout)?;
            match router.route_guarded(text, threshold).await? {
                Some((Some(response), _)) => {
                    println!("Response: {}", response.message);
                    if let Some(link) = response.calendar_link {
                        println!("Calendar link: {link}");
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Some((None, _)) | None => {
                    println!("Request not recognized as a calendar operation.");
                    Ok(ExitCode::NOT_APPLICABLE)
                }
            }
        }

        Commands::Validate { text } => {
            let validator = validation::calendar_validator(generator, threshold, call_timeout)?;
            match validator.validate(text).await {
                Ok(report) => {
                    print_outcomes(report.outcomes());
                    println!("Valid: true");
                    Ok(ExitCode::SUCCESS)
                }
                Err(WorkflowError::AggregateFailure { outcomes }) => {
                    print_outcomes(&outcomes);
                    let flags = validation::risk_flags(&outcomes);
                    if !flags.is_empty() {
                        println!("Security flags: {}", flags.join(", "));
                    }
                    println!("Valid: false");
                    Ok(ExitCode::VALIDATION_REJECTED)
                }
                Err(other) => Err(other),
            }
        }

        Commands::Approve { prompt } => {
            let outcome = ApprovalLoop::new(generator, decisions)?
                .with_config(config)
                .run(prompt)
                .await?;
            if outcome.is_approved() {
                println!("Approved response:\n{}", outcome.draft);
                Ok(ExitCode::SUCCESS)
            } else {
                println!(
                    "Response not approved ({} after {} draft(s)).",
                    outcome.state, outcome.drafts_generated
                );
                Ok(ExitCode::APPROVAL_NOT_GRANTED)
            }
        }

        Commands::Ask { question, kb } => {
            let source = Arc::new(JsonFileKnowledge::load(kb).await?);
            let answer = knowledge::answer(generator.as_ref(), source, question, call_timeout).await?;
            println!("Answer: {}", answer.answer);
            println!("Confidence: {}", answer.confidence);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config => {
            print_effective_config(config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_outcomes(outcomes: &[ValidationOutcome]) {
    for outcome in outcomes {
        let mark = if outcome.passed() { "✓" } else { "✗" };
        println!("{mark} {}: {}", outcome.check, outcome.verdict);
    }
}

fn print_effective_config(config: &Config) {
    match &config.config_path {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none)"),
    }
    println!();
    for (key, (value, source)) in config.effective_config() {
        println!("  {key} = {value}  ({source})");
    }
}
