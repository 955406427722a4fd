//! sqlsage - ask questions about your database in plain English.

use std::io::{self, IsTerminal};

use sqlsage::cli::Cli;
use sqlsage::config::{BackendConfig, Config, PipelineSettings};
use sqlsage::error::{Result, SageError};
use sqlsage::llm::{self, LlmProvider};
use sqlsage::pipeline::TurnOrchestrator;
use sqlsage::repl::{self, ReplOptions};
use sqlsage::{db, logging};
use tracing::{error, info};

fn main() {
    // Missing .env is fine; real environment variables still apply
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    if cli.verbose {
        logging::init_stderr_logging();
    } else {
        logging::init_file_logging();
    }

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}: {}", e.category(), e);
            eprintln!("{}: {}", e.category(), e);
            std::process::exit(1);
        }
    }
}

/// Everything resolved from flags, environment and config file.
struct Startup {
    backend: BackendConfig,
    provider: LlmProvider,
    model: Option<String>,
    settings: PipelineSettings,
}

fn resolve(cli: &Cli) -> Result<Startup> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let overrides = cli.backend_overrides().map_err(SageError::config)?;
    let backend = config.resolve_backend(&overrides)?;

    let provider = match cli.llm_provider().map_err(SageError::config)? {
        Some(provider) => provider,
        None => config
            .llm
            .provider
            .parse::<LlmProvider>()
            .map_err(SageError::config)?,
    };
    let model = cli.model.clone().or_else(|| config.llm.model.clone());
    let settings = config.pipeline_settings(cli.strategy.as_deref(), cli.row_limit)?;

    Ok(Startup {
        backend,
        provider,
        model,
        settings,
    })
}

/// Runs the session. Returns false if a one-shot question failed.
fn run(cli: Cli) -> Result<bool> {
    let startup = resolve(&cli)?;
    // Build the LLM client before connecting so a missing API key fails fast
    let llm = llm::create_client(startup.provider, startup.model.clone(), None)?;

    info!(
        backend = %startup.backend.display_string(),
        provider = %startup.provider,
        strategy = %startup.settings.strategy,
        row_limit = startup.settings.row_limit,
        "Starting sqlsage"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SageError::internal(format!("Failed to start runtime: {e}")))?;

    runtime.block_on(async {
        let db = db::connect(&startup.backend).await?;
        let mut orchestrator = TurnOrchestrator::connect(llm, db, startup.settings).await?;
        let mut stdout = io::stdout();

        let ok = match cli.ask.as_deref() {
            Some(question) => {
                let options = ReplOptions {
                    show_sql: cli.show_sql,
                    prompt: false,
                };
                repl::ask(&mut orchestrator, question, &mut stdout, options).await?
            }
            None => {
                let stdin = io::stdin();
                let interactive = stdin.is_terminal();
                if interactive {
                    println!("sqlsage v{}", env!("CARGO_PKG_VERSION"));
                    println!(
                        "Connected to {} ({}) using {}.",
                        startup.backend.display_string(),
                        orchestrator.dialect(),
                        startup.provider
                    );
                    println!("Type 'exit' or 'quit' to leave.\n");
                }
                let options = ReplOptions {
                    show_sql: cli.show_sql,
                    prompt: interactive,
                };
                let failures =
                    repl::run(&mut orchestrator, stdin.lock(), &mut stdout, options).await?;
                info!(failures, turns = orchestrator.history().turn_count(), "Session ended");
                true
            }
        };

        orchestrator.close().await?;
        Ok(ok)
    })
}
