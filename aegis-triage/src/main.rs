use aegis_triage::{
    Cancellation, ModelInvoker, OpenRouterInvoker, PatientCase, PipelineConfig, PromptCatalog,
    RunStatus, TriagePipeline, demo,
};
use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "aegis-triage", about = "Run a patient case through the AEGIS triage pipeline")]
struct Args {
    /// Patient case as JSON (symptoms, history, demographics, genomic_data)
    #[arg(long)]
    case: Option<PathBuf>,

    /// Pipeline configuration (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Answer every stage with canned replies instead of calling a model
    #[arg(long)]
    dry_run: bool,
}

/// Initialize tracing based on environment variables
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "aegis_triage=info,aegis_flow=info".into());

    // Logs go to stderr so stdout carries only the run record
    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}

fn load_case(path: Option<&PathBuf>, dry_run: bool) -> anyhow::Result<PatientCase> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading case file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing case file {}", path.display()))
        }
        None if dry_run => Ok(demo::demo_case()),
        None => anyhow::bail!("--case is required unless --dry-run is given"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = PipelineConfig::load(args.config.as_deref())?;
    let prompts = match &config.prompts_dir {
        Some(dir) => PromptCatalog::with_overrides(dir)?,
        None => PromptCatalog::builtin()?,
    };
    let case = load_case(args.case.as_ref(), args.dry_run)?;

    let invoker: Arc<dyn ModelInvoker> = if args.dry_run {
        info!("Dry run: using canned model replies");
        Arc::new(demo::demo_invoker())
    } else {
        info!(model = %config.model.model, "Using OpenRouter model");
        Arc::new(OpenRouterInvoker::from_env(&config.model, prompts.system.clone())?)
    };

    let pipeline = TriagePipeline::new(invoker, &prompts, &config)?;

    let cancel = Cancellation::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next stage boundary");
            on_interrupt.cancel();
        }
    });

    let run = pipeline.run_with_cancellation(case, &cancel).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&run).context("serializing pipeline run")?
    );

    match run.status() {
        RunStatus::Completed => Ok(()),
        RunStatus::Failed(failure) => anyhow::bail!("pipeline run failed: {failure}"),
        RunStatus::Cancelled { .. } => anyhow::bail!("pipeline run cancelled"),
    }
}
