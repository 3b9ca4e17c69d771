mod logging;
mod navigator;
mod render;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use sim_client::{CredentialStore, EnvCredentials, HttpBackend, StaticCredentials};
use sim_controller::{ControllerHandle, ControllerSnapshot, SessionController};
use sim_core::{canonical_intent, AccessPattern, Config, EntryLocation};
use sim_state::SimPhase;
use sim_stream::SseTransport;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::navigator::ConsoleNavigator;
use crate::render::Renderer;

#[derive(Parser)]
#[command(name = "sim-cli")]
#[command(about = "Run virtual patient simulations from the terminal")]
#[command(version)]
struct Cli {
    /// Simulation API base URL
    #[arg(long, env = "SIM_API_BASE")]
    api_base: Option<String>,

    /// Bearer token for the simulation API
    #[arg(long, env = "SIM_AUTH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Read the bearer token from this environment variable on every
    /// request instead (takes precedence over --token)
    #[arg(long, value_name = "VAR")]
    token_env: Option<String>,

    /// TOML config file (defaults to ./simulation.toml when present)
    #[arg(long, env = "SIM_CONFIG")]
    config: Option<PathBuf>,

    /// Skip the pauses between startup phases
    #[arg(long)]
    fast: bool,

    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive simulation
    Chat {
        /// Case id, or a simulation address such as /simulation/VP-001/session/abc
        entry: String,
    },
    /// Ask a single question, end the session and print the evaluation
    Ask {
        case_id: String,
        question: String,
        /// Print the evaluation as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show how a simulation address is interpreted
    Inspect { entry: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    let config = load_config(&cli)?;
    log::debug!("Using API base {}", config.api_base);

    match cli.command {
        Commands::Chat { entry } => {
            let entry = parse_entry(&entry, &config)?;
            let controller = build_controller(&config, cli.token_env.as_deref());
            run_chat(controller, entry).await
        }
        Commands::Ask {
            case_id,
            question,
            json,
        } => {
            let controller = build_controller(&config, cli.token_env.as_deref());
            ask_once(controller, &case_id, &question, json).await
        }
        Commands::Inspect { entry } => inspect(&entry, &config),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            config.apply_env();
            config
        }
        None => Config::new(),
    };

    if let Some(api_base) = &cli.api_base {
        config.api_base = api_base.clone();
    }
    if let Some(token) = &cli.token {
        config.auth_token = Some(token.clone());
    }
    if cli.fast {
        config.phase_delay_ms = 0;
    }
    Ok(config)
}

fn parse_entry(input: &str, config: &Config) -> anyhow::Result<EntryLocation> {
    if input.contains('/') || input.contains('?') {
        EntryLocation::parse(input, &config.simulation_base_path)
            .with_context(|| format!("not a valid address: {input}"))
    } else {
        Ok(EntryLocation::for_case(input))
    }
}

fn build_controller(config: &Config, token_env: Option<&str>) -> SessionController {
    let credentials: Arc<dyn CredentialStore> = match token_env {
        Some(var) => Arc::new(EnvCredentials::new(var)),
        None => Arc::new(StaticCredentials::new(config.auth_token.clone())),
    };
    let backend = HttpBackend::new(config.api_base.clone(), credentials.clone())
        .with_request_timeout(config.request_timeout());
    let transport =
        SseTransport::new(config.api_base.clone()).with_silence_timeout(config.stream_timeout());

    SessionController::new(
        config.clone(),
        Arc::new(backend),
        Arc::new(transport),
        Arc::new(ConsoleNavigator),
    )
    .with_credentials(credentials)
}

async fn render_updates(mut updates: watch::Receiver<ControllerSnapshot>) {
    let mut renderer = Renderer::new();
    let mut stdout = io::stdout();
    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();
        if let Err(e) = renderer.render(&snapshot, &mut stdout) {
            log::warn!("Failed to write to terminal: {}", e);
            break;
        }
    }
}

fn print_help() {
    println!("{}", "Type a question and press Enter.".dimmed());
    println!(
        "{}",
        "Commands: /end  /retry  /reset  /help  /quit".dimmed()
    );
}

async fn run_chat(controller: SessionController, entry: EntryLocation) -> anyhow::Result<()> {
    let (handle, mut task) = sim_controller::spawn(controller);
    let renderer = tokio::spawn(render_updates(handle.subscribe()));

    println!("{}", "🩺 Virtual patient simulation".cyan().bold());
    handle.open_entry(entry).await?;
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            finished = &mut task => {
                finished?;
                renderer.await?;
                return Ok(());
            }
        };
        let Some(line) = line else {
            break;
        };

        let result = match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/help" => {
                print_help();
                continue;
            }
            "/end" => handle.end_session().await,
            "/retry" => handle.retry().await,
            "/reset" => handle.reset().await,
            question => handle.submit_question(question).await,
        };

        if let Err(e) = result {
            println!("{}", format!("⚠ {e}").yellow());
        }
    }

    drop(handle);
    task.await?;
    renderer.await?;
    Ok(())
}

async fn wait_until(
    handle: &ControllerHandle,
    done: impl Fn(&ControllerSnapshot) -> bool,
) -> anyhow::Result<ControllerSnapshot> {
    let mut updates = handle.subscribe();
    loop {
        {
            let snapshot = updates.borrow_and_update();
            if done(&snapshot) {
                return Ok(snapshot.clone());
            }
        }
        updates
            .changed()
            .await
            .context("controller stopped unexpectedly")?;
    }
}

async fn ask_once(
    controller: SessionController,
    case_id: &str,
    question: &str,
    json: bool,
) -> anyhow::Result<()> {
    let (handle, task) = sim_controller::spawn(controller);
    let renderer = (!json).then(|| tokio::spawn(render_updates(handle.subscribe())));

    handle.start_session(case_id).await?;
    if let Some(error) = handle.snapshot().error {
        anyhow::bail!("{error}");
    }

    handle.submit_question(question).await?;
    let snapshot = wait_until(&handle, |s| s.phase != SimPhase::Streaming).await?;
    if let Some(error) = snapshot.error {
        anyhow::bail!("{error}");
    }

    handle.end_session().await?;
    let evaluation = handle.snapshot().evaluation;

    drop(handle);
    task.await?;
    if let Some(renderer) = renderer {
        renderer.await?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
    }
    Ok(())
}

fn inspect(input: &str, config: &Config) -> anyhow::Result<()> {
    let entry = parse_entry(input, config)?;
    let pattern = entry.access_pattern();

    println!("Access pattern: {}", format!("{pattern:?}").cyan());
    println!("Case:           {}", entry.case_id.as_deref().unwrap_or("-"));
    println!(
        "Session:        {}",
        entry.session_id.as_deref().unwrap_or("-")
    );
    if let Some(return_to) = &entry.context.return_to {
        println!("Return to:      {return_to}");
    }
    if let Some(specialty) = &entry.context.specialty {
        println!("Specialty:      {specialty}");
    }
    for (key, value) in &entry.context.extra {
        println!("{:<16}{value}", format!("{key}:"));
    }

    match (pattern, &entry.case_id, &entry.session_id) {
        (AccessPattern::CaseWithSession, Some(case_id), Some(session_id)) => {
            let canonical = canonical_intent(
                &config.simulation_base_path,
                case_id,
                session_id,
                &entry.context,
            );
            println!("Canonical:      {}", canonical.target.green());
        }
        (AccessPattern::CaseOnly, _, _) => {
            println!("{}", "A new session will be created on open.".dimmed());
        }
        _ => {
            println!(
                "{}",
                format!("Invalid: would redirect to {}", config.case_list_path).red()
            );
        }
    }
    Ok(())
}
