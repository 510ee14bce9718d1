mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use futures::StreamExt;
use sleuth_core::research::{PipelineError, ResearchEvent};
use sleuth_core::{Config, ResearchLog, ResearchPipeline, RunOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use render::Progress;

#[derive(Parser)]
#[command(name = "sleuth")]
#[command(about = "Answer research questions with cited, fact-checked reports", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Research question (leave empty for interactive mode)
    query: Vec<String>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// Sampling temperature
    #[arg(short, long)]
    temperature: Option<f32>,

    /// Show every research step as it happens
    #[arg(short, long)]
    stream: bool,

    /// Skip the model-backed fact-check
    #[arg(short, long)]
    quick: bool,

    /// Backend base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Backend provider: ollama, openai, openrouter, anthropic
    #[arg(long)]
    provider: Option<String>,

    /// Research log file
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Neither read nor write the research log
    #[arg(long)]
    no_log: bool,

    /// Config file (default: ./sleuth.toml, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List recent research log entries
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the default configuration
    Config,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .wrap_err_with(|| format!("loading {}", path.display()))?,
            None => Config::load()?,
        };

        if let Some(provider) = &self.provider {
            config.llm.provider = provider.clone();
        }
        if let Some(model) = &self.model {
            config.llm.model = Some(model.clone());
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }
        if let Some(url) = &self.base_url {
            config.llm.base_url = Some(url.clone());
        }
        if let Some(path) = &self.log_path {
            config.log.path = path.clone();
        }
        if self.no_log {
            config.log.disabled = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: u8) {
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            0 => "warn".to_string(),
            1 => "warn,sleuth_core=info".to_string(),
            _ => "info,sleuth_core=debug".to_string(),
        },
    };
    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr).compact())
        .init();
}

/// Cancel `token` on Ctrl-C. Abort the returned handle once the run is over.
fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            token.cancel();
        }
    })
}

/// One research run, rendered as it progresses.
async fn ask(
    pipeline: &ResearchPipeline,
    query: &str,
    stream: bool,
) -> Result<RunOutcome, PipelineError> {
    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(cancel.clone());

    let progress = if stream {
        Progress::lines()
    } else {
        Progress::spinner("Researching...")
    };

    let mut events = pipeline.stream(query, cancel);
    let mut result = Err(PipelineError::Cancelled);
    while let Some(event) = events.next().await {
        match event {
            ResearchEvent::Completed(outcome) => result = Ok(*outcome),
            ResearchEvent::Failed(err) => result = Err(err),
            other => progress.update(&other),
        }
    }

    progress.finish();
    watcher.abort();
    result
}

async fn single(pipeline: &ResearchPipeline, query: &str, stream: bool) -> Result<()> {
    match ask(pipeline, query, stream).await {
        Ok(outcome) => {
            render::print_outcome(&outcome);
            Ok(())
        }
        Err(PipelineError::Cancelled) => {
            eprintln!("Research cancelled.");
            Ok(())
        }
        Err(err) => Err(eyre!(err)),
    }
}

async fn interactive(pipeline: &ResearchPipeline, stream: bool, quick: bool) -> Result<()> {
    println!("Sleuth - type a question and press Enter. Type 'quit' or 'exit' to stop.\n");
    if !quick {
        println!("Mode: researcher -> fact-check -> formatter. Use -q for quick, -s to show steps.\n");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("Query: ");
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }

        println!();
        match ask(pipeline, query, stream).await {
            Ok(outcome) => render::print_outcome(&outcome),
            Err(PipelineError::Cancelled) => eprintln!("Research cancelled."),
            Err(err) => eprintln!("Error: {err}"),
        }
        render::print_rule();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Config) => {
            print!("{}", Config::default_config_string());
            return Ok(());
        }
        Some(Commands::History { limit }) => {
            let config = cli.load_config()?;
            let log = ResearchLog::from_config(&config.log);
            let entries = log
                .entries()
                .wrap_err_with(|| format!("reading {}", log.path().display()))?;
            render::print_history(&entries, limit);
            return Ok(());
        }
        None => {}
    }

    let config = cli.load_config()?;
    info!(
        provider = %config.llm.provider,
        model = %config.llm.model_or_default(),
        log = %config.log.path.display(),
        "Starting sleuth"
    );
    let pipeline = ResearchPipeline::from_config(&config)?.quick(cli.quick);

    if cli.query.is_empty() {
        interactive(&pipeline, cli.stream, cli.quick).await
    } else {
        single(&pipeline, &cli.query.join(" "), cli.stream).await
    }
}
