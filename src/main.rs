//! Command-line front end for the seat timers.

use anyhow::Context;
use cafe_timers::domain::time::duration_from_minutes_entry;
use cafe_timers::infrastructure::notification_scheduler::{
    FiredNotification, TokioNotificationScheduler,
};
use cafe_timers::infrastructure::storage::SqliteKeyValueStore;
use cafe_timers::{
    AppState, CountdownTicker, FloorArea, TapOutcome, TimerView, cancel_timer_impl,
    handle_fired_impl, list_timers_impl, restore_notifications_impl, shutdown_impl,
    start_timer_impl, startup_impl, tap_timer_impl,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "cafe-timers")]
#[command(about = "Countdown timers for every seat on the café floor plan")]
#[command(version)]
struct Cli {
    /// Workspace holding config/ and state/
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show every seat with its countdown
    List {
        #[arg(long, value_enum)]
        area: Option<AreaArg>,
    },
    /// Start a seat's countdown for the given number of minutes
    Start { timer_id: String, minutes: String },
    /// Disable a seat's countdown
    Cancel { timer_id: String },
    /// Same as tapping the seat on the floor plan
    Tap { timer_id: String },
    /// Rebuild scheduled notifications from the stored timers
    Restore,
    /// Keep running, refresh countdowns and deliver notifications
    Watch,
    /// Print the stored timer list
    Dump,
    /// Delete the stored timer list
    Purge,
}

#[derive(Clone, Copy, ValueEnum)]
enum AreaArg {
    Inside,
    Outside,
}

impl From<AreaArg> for FloorArea {
    fn from(value: AreaArg) -> Self {
        match value {
            AreaArg::Inside => FloorArea::Inside,
            AreaArg::Outside => FloorArea::Outside,
        }
    }
}

fn print_view(view: &TimerView) {
    let area = view.area.map(FloorArea::as_str).unwrap_or("-");
    let marker = if view.running { "*" } else { " " };
    println!(
        "{marker}{:>4}  {:<8}{:>8}  {}",
        view.id, area, view.display, view.color
    );
}

impl Command {
    fn uses_notifications(&self) -> bool {
        !matches!(self, Command::List { .. } | Command::Dump | Command::Purge)
    }
}

type CliState = AppState<TokioNotificationScheduler, SqliteKeyValueStore>;

async fn run_command(
    state: &CliState,
    command: Command,
    fired_rx: &mut UnboundedReceiver<FiredNotification>,
) -> anyhow::Result<()> {
    match command {
        Command::List { area } => {
            state.store().load();
            for view in list_timers_impl(state, area.map(FloorArea::from)) {
                print_view(&view);
            }
        }
        Command::Start { timer_id, minutes } => {
            state.store().load();
            let duration = duration_from_minutes_entry(&minutes);
            let view = start_timer_impl(state, timer_id, duration)
                .await
                .map_err(|error| anyhow::anyhow!(state.command_error("start", &error)))?;
            print_view(&view);
        }
        Command::Cancel { timer_id } => {
            state.store().load();
            let view = cancel_timer_impl(state, timer_id)
                .await
                .map_err(|error| anyhow::anyhow!(state.command_error("cancel", &error)))?;
            print_view(&view);
        }
        Command::Tap { timer_id } => {
            state.store().load();
            let outcome = tap_timer_impl(state, timer_id)
                .await
                .map_err(|error| anyhow::anyhow!(state.command_error("tap", &error)))?;
            match outcome {
                TapOutcome::Reset => println!("timer reset"),
                TapOutcome::OpenKeypad { prefill_minutes } => {
                    println!("enter minutes (currently {prefill_minutes})")
                }
                TapOutcome::ConfirmDisable => println!("timer is running; cancel it to disable"),
            }
        }
        Command::Restore => {
            state.store().load();
            let mapping = restore_notifications_impl(state).await;
            println!("{} notification(s) armed until exit", mapping.len());
        }
        Command::Watch => {
            let report = startup_impl(state).await;
            if !report.notifications_enabled {
                warn!("notifications are disabled; countdowns still run");
            }

            let period = Duration::from_millis(state.config().tick_interval_ms);
            let ticker = CountdownTicker::spawn(
                state.store().snapshot(),
                period,
                state.now_provider(),
                |views| {
                    for view in views.iter().filter(|view| view.running) {
                        print_view(view);
                    }
                },
            );

            loop {
                tokio::select! {
                    Some(fired) = fired_rx.recv() => {
                        handle_fired_impl(state, &fired);
                        println!("{} {}", fired.title, fired.body);
                    }
                    result = tokio::signal::ctrl_c() => {
                        if let Err(error) = result {
                            warn!(%error, "failed to listen for Ctrl-C");
                        }
                        break;
                    }
                }
            }
            ticker.stop();
            info!("watch stopped");
        }
        Command::Dump => match state.store().dump_json() {
            Some(dump) => println!("{dump}"),
            None => println!("no timers stored"),
        },
        Command::Purge => {
            state.store().purge();
            println!("stored timers removed");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("cafe_timers={level}"))
        .with_writer(std::io::stderr)
        .init();

    let (scheduler, mut fired_rx) = TokioNotificationScheduler::new();
    let state = AppState::open(&cli.workspace, Arc::new(scheduler))
        .with_context(|| format!("failed to open workspace {}", cli.workspace.display()))?;
    info!(app = %state.config().app_name, workspace = %cli.workspace.display(), "workspace ready");

    // Armed notifications die with this process; `watch` re-arms them on startup.
    let uses_notifications = cli.command.uses_notifications();
    let result = run_command(&state, cli.command, &mut fired_rx).await;
    if uses_notifications {
        shutdown_impl(&state).await;
    }
    result
}
