//! CLI entry point for FocusCoach.
//!
//! This binary provides the `focuscoach` command with subcommands for
//! running the focus monitor, managing the saved goal, chatting with the
//! configured model, and checking status.

mod cli;
mod config;
mod intervention;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use focuscoach_monitor::{
    ChatCompletion, ChatMessage, Collaborators, FocusMonitor, GoalStore, MonitorEvent,
    OpenAiClient,
};
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, GoalAction};
use crate::config::FocusConfig;
use crate::intervention::TerminalSurface;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

/// How long shutdown waits for blocking work.  An unanswered terminal
/// read never finishes on its own.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing `.env` is fine.
    let _ = dotenvy::dotenv();

    let default_level = match (&cli.log_level, &cli.command) {
        (Some(level), _) => level.as_str(),
        (None, Commands::Run { .. }) => "info",
        (None, _) => "warn",
    };
    init_tracing(default_level, cli.log_json);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let outcome = runtime.block_on(dispatch(cli));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    outcome
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = FocusConfig::load(&cli.config)?;

    match cli.command {
        Commands::Run {
            goal,
            interval_secs,
        } => cmd_run(config, goal, interval_secs, cli.log_json).await,
        Commands::Goal { action } => cmd_goal(&config, action).await,
        Commands::Chat { message, system } => cmd_chat(&config, message.join(" "), system).await,
        Commands::Status => cmd_status(&config, &cli.config).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

async fn cmd_run(
    mut config: FocusConfig,
    goal: Option<String>,
    interval_secs: Option<u64>,
    json_summary: bool,
) -> Result<()> {
    if let Some(secs) = interval_secs {
        config.monitor.interval_secs = secs;
    }

    // 1. Resolve the goal.
    let goals = config.goal_store();
    if let Some(goal) = goal {
        goals.save(&goal).await.context("failed to save goal")?;
    }
    let Some(objective) = goals.get().await.context("failed to read goal")? else {
        bail!("no goal set; pass --goal or run `focuscoach goal set <goal>`");
    };

    // 2. Build collaborators.
    let client = Arc::new(
        OpenAiClient::new(config.llm_config())
            .context("set FOCUSCOACH_API_KEY or OPENAI_API_KEY, or [llm].api_key")?,
    );
    let collaborators = Collaborators {
        capture: Arc::new(config.capture()?),
        classifier: client,
        surface: Arc::new(TerminalSurface::stdin()),
    };

    // 3. Start the monitor.
    let monitor = FocusMonitor::new(collaborators, config.monitor_config())
        .context("failed to build focus monitor")?;
    let mut run = monitor.start(objective.clone());
    let stats = run.stats();

    info!(
        goal = %objective,
        interval_secs = config.monitor.interval_secs,
        run_id = %run.run_id(),
        "monitoring focus, press Ctrl-C to stop"
    );

    // 4. Observe the run until it fails or the user interrupts.
    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping monitor");
                break Ok(());
            }
            item = run.next() => match item {
                Some(Ok(event)) => log_event(&event),
                Some(Err(e)) => {
                    error!(error = %e, "focus monitor stopped");
                    break Err(anyhow::Error::new(e).context("focus monitor failed"));
                }
                None => break Ok(()),
            },
        }
    };
    run.cancel();

    let snapshot = stats.snapshot();
    info!(
        checks = snapshot.checks,
        violations = snapshot.violations,
        last_violation = snapshot.last_violation.as_deref().unwrap_or("-"),
        unacknowledged = snapshot.active_violation.as_deref().unwrap_or("-"),
        "session summary"
    );
    if json_summary {
        println!(
            "{}",
            serde_json::to_string(&snapshot).context("failed to serialize session summary")?
        );
    }

    outcome
}

fn log_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::ScreenshotTaken { path } => {
            info!(path = %path.display(), "screenshot taken")
        }
        MonitorEvent::FocusVerified => info!("on task"),
        MonitorEvent::FocusViolation { description } => {
            warn!(%description, "focus violation")
        }
        other => debug!(event = ?other, "monitor event"),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: goal
// ---------------------------------------------------------------------------

async fn cmd_goal(config: &FocusConfig, action: GoalAction) -> Result<()> {
    let store = config.goal_store();
    match action {
        GoalAction::Set { goal } => {
            let goal = goal.join(" ");
            store.save(&goal).await.context("failed to save goal")?;
            println!("Goal saved: {}", goal.trim());
        }
        GoalAction::Show => match store.record().await.context("failed to read goal")? {
            Some(record) => println!("{}  (updated {})", record.input, record.updated_at),
            None => println!("No goal set."),
        },
        GoalAction::Clear => {
            store.clear().await.context("failed to clear goal")?;
            println!("Goal cleared.");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: chat
// ---------------------------------------------------------------------------

async fn cmd_chat(config: &FocusConfig, message: String, system: Option<String>) -> Result<()> {
    let client = OpenAiClient::new(config.chat_llm_config())
        .context("set FOCUSCOACH_API_KEY or OPENAI_API_KEY, or [llm].api_key")?;
    debug!(model = client.model(), "sending chat request");

    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(message));

    let reply = client
        .complete(&messages)
        .await
        .context("chat request failed")?;
    println!("{reply}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

async fn cmd_status(config: &FocusConfig, config_path: &Path) -> Result<()> {
    println!();
    println!("  FocusCoach Status");
    println!("  =================");
    println!();

    if config_path.exists() {
        println!("  Config:           OK ({})", config_path.display());
    } else {
        println!("  Config:           DEFAULTS ({} not found)", config_path.display());
    }

    match config.goal_store().get().await {
        Ok(Some(goal)) => println!("  Goal:             {goal}"),
        Ok(None) => println!("  Goal:             NOT SET (run `focuscoach goal set`)"),
        Err(e) => println!("  Goal:             UNREADABLE ({e})"),
    }

    if config.has_api_key() {
        println!("  API key:          CONFIGURED");
    } else {
        println!("  API key:          NOT SET");
    }
    println!("  Model:            {} @ {}", config.llm.model, config.llm.base_url);
    let chat = config.chat_llm_config();
    if chat.model != config.llm.model || chat.base_url != config.llm.base_url {
        println!("  Chat model:       {} @ {}", chat.model, chat.base_url);
    }
    println!("  Capture command:  {}", config.capture.command.join(" "));
    println!("  Check interval:   {}s", config.monitor.interval_secs);
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber.  `RUST_LOG` takes precedence over
/// `default_level`.
fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
