// crates/bpmncli/src/main.rs

use anyhow::{Context, Result};
use bpmncore::{Catalog, Key, ProcessBuilder, ProcessDefinition, Record};
use bpmnengine::{Engine, EngineConfig};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bpmn")]
#[command(about = "BPMN workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario against a process model
    Run {
        /// Path to process model JSON file
        #[arg(short, long)]
        model: PathBuf,

        /// Path to scenario JSON file
        #[arg(short, long)]
        script: PathBuf,

        /// Path to engine configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a process model file
    Validate {
        /// Path to process model JSON file
        file: PathBuf,
    },

    /// Create an example model and scenario
    Init {
        /// Output file path of the model
        #[arg(short, long, default_value = "process.json")]
        output: PathBuf,

        /// Output file path of the scenario
        #[arg(short, long, default_value = "scenario.json")]
        script: PathBuf,
    },
}

/// One step of a scenario.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum Step {
    CreateInstance {
        bpmn_process_id: String,
        #[serde(default)]
        variables: serde_json::Value,
    },
    PublishMessage {
        name: String,
        correlation_key: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    IncreaseTime {
        millis: u64,
    },
    /// Completes the job of this type in the most recently created instance.
    CompleteJob {
        job_type: String,
        #[serde(default)]
        variables: serde_json::Value,
    },
    /// Cancels the most recently created instance.
    CancelInstance,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { model, script, config, verbose } => {
            let default_level = if verbose { "debug" } else { "info" };
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new(default_level)),
                )
                .init();

            run_scenario(&model, &script, config.as_deref()).await?;
        }

        Commands::Validate { file } => {
            validate_model(&file)?;
        }

        Commands::Init { output, script } => {
            create_example(&output, &script)?;
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("failed to parse {}", path.display()))
}

async fn run_scenario(model: &Path, script: &Path, config: Option<&Path>) -> Result<()> {
    println!("🚀 Loading model from: {}", model.display());
    let definition: ProcessDefinition = read_json(model)?;
    let steps: Vec<Step> = read_json(script)?;
    let config: EngineConfig = match config {
        Some(path) => read_json(path)?,
        None => EngineConfig::default(),
    };

    let mut engine = Engine::with_config(config);
    let mut records = engine.subscribe();

    let printer = tokio::spawn(async move {
        let mut printed = 0usize;
        while let Ok(record) = records.recv().await {
            print_record(&record);
            printed += 1;
        }
        printed
    });

    let process = engine.deploy(&definition)?;
    println!(
        "📋 Deployed '{}' version {} (key {})",
        process.bpmn_process_id, process.version, process.key
    );
    println!("   Steps: {}", steps.len());
    println!();

    let mut last_instance: Option<Key> = None;
    for step in steps {
        tracing::debug!(?step, "Executing step");
        match step {
            Step::CreateInstance { bpmn_process_id, variables } => {
                last_instance = Some(engine.create_instance(&bpmn_process_id, variables)?);
            }
            Step::PublishMessage { name, correlation_key, payload } => {
                let correlated = engine.publish_message(&name, &correlation_key, payload)?;
                tracing::info!("Message '{}' correlated to {} subscriptions", name, correlated);
            }
            Step::IncreaseTime { millis } => {
                let fired = engine.increase_time(Duration::from_millis(millis))?;
                tracing::info!("Clock advanced by {}ms, {} timers fired", millis, fired);
            }
            Step::CompleteJob { job_type, variables } => {
                let instance = last_instance.context("complete_job needs a created instance")?;
                let job_key = engine
                    .state()
                    .jobs
                    .find(instance, &job_type)
                    .map(|job| job.key)
                    .with_context(|| format!("no job of type '{}' in instance {}", job_type, instance))?;
                engine.complete_job(job_key, variables)?;
            }
            Step::CancelInstance => {
                let instance = last_instance.context("cancel_instance needs a created instance")?;
                engine.cancel_instance(instance)?;
            }
        }
    }

    let total = engine.records().len();
    let open_jobs = engine.jobs().count();
    let live_instances = engine.state().instances.len();
    drop(engine);
    let printed = printer.await?;

    println!();
    println!("📊 Scenario Summary:");
    println!("   Records: {} ({} exported)", total, printed);
    println!("   Live element instances: {}", live_instances);
    println!("   Open jobs: {}", open_jobs);

    Ok(())
}

fn print_record(record: &Record) {
    println!(
        "  {:>5} {:<22} {:<20} {:<18} key={}",
        record.position,
        record.intent.to_string(),
        record.value.element_id,
        record.value.bpmn_element_type.to_string(),
        record.key
    );
}

fn validate_model(file: &Path) -> Result<()> {
    println!("🔍 Validating model: {}", file.display());

    let definition: ProcessDefinition = read_json(file)?;
    let mut catalog = Catalog::new();
    let process = catalog.deploy(1, &definition)?;

    println!("✅ Model is valid:");
    println!("   Process: {}", process.bpmn_process_id);
    println!("   Elements: {}", process.elements().count());
    println!("   Start events: {}", process.start_events().len());

    Ok(())
}

fn create_example(output: &Path, script: &Path) -> Result<()> {
    let definition = ProcessBuilder::new("proc")
        .event_sub_process("event_sub_proc_timer", |b| {
            b.timer_start_event("event_sub_start_timer", 60_000)
                .interrupting(false)
                .service_task("event_sub_task_timer", "timerTask")
                .end_event("event_sub_end_timer")
        })
        .event_sub_process("event_sub_proc_msg", |b| {
            b.message_start_event("event_sub_start_msg", "msg", "key")
                .end_event("event_sub_end_msg")
        })
        .start_event("start_proc")
        .service_task("task", "type")
        .end_event("end_proc")
        .build();

    let steps = vec![
        Step::CreateInstance {
            bpmn_process_id: "proc".to_string(),
            variables: serde_json::json!({ "key": "123" }),
        },
        Step::IncreaseTime { millis: 60_000 },
        Step::PublishMessage {
            name: "msg".to_string(),
            correlation_key: "123".to_string(),
            payload: serde_json::json!({}),
        },
    ];

    std::fs::write(output, serde_json::to_string_pretty(&definition)?)?;
    std::fs::write(script, serde_json::to_string_pretty(&steps)?)?;

    println!("✨ Created example model: {}", output.display());
    println!("✨ Created example scenario: {}", script.display());
    println!();
    println!("Run it with:");
    println!(
        "  bpmn run --model {} --script {}",
        output.display(),
        script.display()
    );

    Ok(())
}
