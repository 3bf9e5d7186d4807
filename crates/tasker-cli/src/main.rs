//! `tasker` - run a todo list against the desktop through a vision-action model.

mod scenarios;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tasker_core::app::write_report;
use tasker_core::config::OutputSettings;
use tasker_core::domain::{Action, FailurePolicy, Report};
use tasker_core::impls::{
    CommandScreenshotCapturer, FakeActionExecutor, HttpModelClient, ScriptedModelClient,
    StaticScreenshotCapturer, XdotoolActionExecutor,
};
use tasker_core::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};
use tasker_core::{ExecutionObserver, ReportFormat, TaskerAgentBuilder, TaskerConfig};

use crate::scenarios::{Patient, Scenario};

#[derive(Parser, Debug)]
#[command(name = "tasker", version, about = "Perception-action task runner")]
struct Cli {
    /// JSON config file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long = "exp-name", alias = "exp_name", global = true)]
    exp_name: Option<String>,

    #[arg(long = "save-dir", alias = "save_dir", global = true)]
    save_dir: Option<PathBuf>,

    #[arg(long = "model-name", alias = "model_name", global = true)]
    model_name: Option<String>,

    /// Step budget per todo
    #[arg(long = "max-steps", alias = "max_steps", global = true)]
    max_steps: Option<u32>,

    #[arg(long, global = true)]
    temperature: Option<f32>,

    #[arg(long, value_enum, global = true)]
    format: Option<FormatArg>,

    /// Skip the remaining todos after the first failure
    #[arg(long, global = true)]
    abort_on_failure: bool,

    /// Capture a screenshot after each completed todo
    #[arg(long, global = true)]
    checkpoints: bool,

    /// Use scripted doubles instead of the model, display and input backend
    #[arg(long, global = true)]
    dry_run: bool,

    /// Print the resolved configuration as JSON and exit
    #[arg(long, global = true)]
    print_config: bool,

    /// Used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find the top-selling product on Amazon
    Amazon {
        #[arg(long = "product-name", alias = "product_name", default_value = "purse")]
        product_name: String,
    },

    /// Schedule a flu shot at CVS
    Cvs {
        #[arg(long = "first-name", alias = "first_name", default_value = "First")]
        first_name: String,
        #[arg(long = "last-name", alias = "last_name", default_value = "Last")]
        last_name: String,
        #[arg(long, default_value = "user@example.com")]
        email: String,
        #[arg(long, default_value = "MM-DD-YYYY")]
        birthday: String,
        #[arg(long = "zip-code", alias = "zip_code", default_value = "00000")]
        zip_code: String,
    },

    /// Click through every sidebar page of the Nuclear music player
    NuclearQa,

    /// Run todos read from a file, one per line
    Run {
        #[arg(long)]
        todos: PathBuf,
        #[arg(long, default_value = "")]
        instruction: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Html,
}

impl From<FormatArg> for ReportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Json => ReportFormat::Json,
            FormatArg::Html => ReportFormat::Html,
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn scenario(command: &Command) -> anyhow::Result<Scenario> {
    match command {
        Command::Amazon { product_name } => Ok(scenarios::amazon(product_name)),
        Command::Cvs {
            first_name,
            last_name,
            email,
            birthday,
            zip_code,
        } => scenarios::cvs(&Patient {
            first_name: first_name.clone(),
            last_name: last_name.clone(),
            email: email.clone(),
            birthday: birthday.clone(),
            zip_code: zip_code.clone(),
        }),
        Command::NuclearQa => Ok(scenarios::nuclear_qa()),
        Command::Run { todos, instruction } => {
            scenarios::from_file(todos, Some(instruction.clone()))
        }
    }
}

/// defaults < file < environment < flags
fn resolve_config(cli: &Cli, scenario: &Scenario) -> anyhow::Result<TaskerConfig> {
    let mut config = match &cli.config {
        Some(path) => TaskerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TaskerConfig::default(),
    }
    .with_env();

    if config.output.exp_name == OutputSettings::default().exp_name {
        config.output.exp_name = scenario.default_exp_name.clone();
    }
    if let Some(exp_name) = &cli.exp_name {
        config.output.exp_name = exp_name.clone();
    }
    if let Some(save_dir) = &cli.save_dir {
        config.output.save_dir = save_dir.clone();
    }
    if let Some(model) = &cli.model_name {
        config.model.name = model.clone();
    }
    if let Some(max_steps) = cli.max_steps {
        config.max_steps = max_steps;
    }
    if let Some(temperature) = cli.temperature {
        config.model.temperature = temperature;
    }
    if let Some(format) = cli.format {
        config.output.format = format.into();
    }
    if cli.abort_on_failure {
        config.failure_policy = FailurePolicy::AbortOnFailure;
    }
    if cli.checkpoints {
        config.capture_checkpoints = true;
    }
    config.validate()?;
    Ok(config)
}

fn observer_for(config: &TaskerConfig) -> ExecutionObserver {
    let run_dir = config.output.run_dir();
    let mut observer = ExecutionObserver::new();
    if config.output.journal {
        observer = observer.with_journal(
            run_dir.join(format!("{}_journal.jsonl", config.output.exp_name)),
        );
    }
    if config.output.persist_screenshots {
        observer = observer.with_screenshot_root(run_dir);
    }
    observer
}

fn print_summary(report: &Report) {
    println!("\n{}", "=".repeat(60));
    println!("EXECUTION SUMMARY");
    println!("{}", "=".repeat(60));
    println!("Overall success: {}", report.overall_success);
    println!("\nTodo status:");
    for todo in &report.todos {
        match todo.status.reason() {
            Some(reason) => println!(
                "  [{}] {} - {} ({reason})",
                todo.index + 1,
                todo.description,
                todo.status.label()
            ),
            None => println!(
                "  [{}] {} - {}",
                todo.index + 1,
                todo.description,
                todo.status.label()
            ),
        }
    }
    let s = &report.summary;
    println!("\nExecution statistics:");
    println!("  Completed: {}", s.completed);
    println!("  Failed: {}", s.failed);
    println!("  Aborted: {}", s.aborted);
    println!("  Pending: {}", s.pending);
    println!("  In progress: {}", s.in_progress);
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let scenario = scenario(&cli.command)?;
    let config = resolve_config(&cli, &scenario)?;
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current step");
                cancel.cancel();
            }
        });
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(SystemClock));
    let observer = Arc::new(observer_for(&config));

    let builder = TaskerAgentBuilder::new()
        .with_config(&config)
        .clock(Arc::clone(&clock))
        .id_generator(Arc::clone(&ids))
        .observer(Arc::clone(&observer))
        .cancellation(cancel);
    let builder = if cli.dry_run {
        info!("dry run: scripted model, static screen, no input");
        builder
            .model_client(Arc::new(
                ScriptedModelClient::from_actions([Action::click(640, 400), Action::task_complete()])
                    .cycling(),
            ))
            .capturer(Arc::new(StaticScreenshotCapturer::new(1280, 800).with_clock(Arc::clone(&clock))))
            .executor(Arc::new(FakeActionExecutor::new().with_bounds(1280, 800)))
    } else {
        if config.model.api_key.is_none() {
            warn!("OAGI_API_KEY is not set; requests will be sent without credentials");
        }
        builder
            .model_client(Arc::new(HttpModelClient::new(&config.model)?))
            .capturer(Arc::new(CommandScreenshotCapturer::new(Arc::clone(&clock), Arc::clone(&ids))))
            .executor(Arc::new(XdotoolActionExecutor::new()))
    };
    let agent = builder.build()?;

    let task = agent.task(
        scenario.name.clone(),
        scenario.instruction.clone(),
        scenario.todos.iter().cloned(),
        config.task_settings(),
    );
    println!("Task: {}", task.instruction);
    println!("Number of todos: {}", task.todos.len());
    println!("{}", "=".repeat(60));

    let run_id = task.id;
    let outcome = agent.run(task).await;
    let report = match &outcome {
        Ok(report) => report.clone(),
        Err(_) => observer.export(run_id).await,
    };
    print_summary(&report);

    let path = write_report(
        &report,
        &config.output.save_dir,
        &config.output.exp_name,
        config.output.format,
    )
    .await
    .context("writing execution history")?;
    println!("\nExecution history exported to: {}", path.display());

    outcome.context("run aborted")?;
    Ok(if report.overall_success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
