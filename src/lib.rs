mod audio;
pub mod auth;
pub mod catalog;
pub mod db;
pub mod models;
pub mod present;
pub mod settings;
pub mod speech;
pub mod timer;
mod utils;
pub mod wake;

use std::{io::Write, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use audio::SilentAudioKeepAwake;
use auth::AuthGate;
use catalog::Catalog;
use db::Database;
use models::Routine;
use settings::SettingsStore;
use speech::{Announcer, CommandSpeech};
use timer::{
    commands::{apply_command, CommandOutcome, WorkoutCommand, COMMAND_HELP},
    SystemClock, TimerController, WorkoutEngine,
};
use wake::{InhibitorLock, KeepAwakeFallback, WakeGuard, WakeLockProvider};

type InputLines = Lines<BufReader<Stdin>>;

#[derive(Debug, Parser)]
#[command(name = "pacer", version, about = "Guided interval-workout timer with spoken cues")]
struct Cli {
    /// Directory holding the history database and settings.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Routine catalog to load.
    #[arg(long, default_value = "routines.json")]
    routines: PathBuf,

    /// PIN to log in with instead of being prompted.
    #[arg(long)]
    pin: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the routine dashboard and exit.
    List,
    /// Run one routine by id.
    Run { routine_id: String },
    /// Print the last completion date of every routine.
    History,
    /// Forget the remembered login.
    Logout,
}

pub(crate) struct AppState {
    pub(crate) db: Database,
    pub(crate) timer: TimerController,
    pub(crate) catalog: Catalog,
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("pacer starting up...");

    let cli = Cli::parse();
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
        .and_then(|runtime| runtime.block_on(run_app(cli)));

    if let Err(err) = result {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .ok_or_else(|| anyhow!("no data directory on this host; pass --data-dir"))?
            .join("pacer"),
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let gate = AuthGate::from_env();

    if let Some(Command::Logout) = cli.command {
        gate.logout(&settings)?;
        println!("Logged out.");
        return Ok(());
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    if !login(&gate, &settings, cli.pin.as_deref(), &mut input).await? {
        return Ok(());
    }

    let database = Database::new(data_dir.join("pacer.sqlite3"))?;
    let catalog = Catalog::load(&cli.routines)?;

    match cli.command {
        Some(Command::List) => {
            let history = database.history_map().await?;
            println!("{}", present::render_dashboard(catalog.routines(), &history));
            return Ok(());
        }
        Some(Command::History) => {
            let entries = database.list_history().await?;
            if entries.is_empty() {
                println!("No completed workouts yet.");
            }
            for entry in entries {
                println!("{}  {}", entry.completed_on, entry.routine_id);
            }
            return Ok(());
        }
        _ => {}
    }

    let timer = build_timer(&settings, &database);
    #[cfg(unix)]
    {
        if let Err(err) = timer.spawn_visibility_watcher() {
            warn!("visibility watcher unavailable: {err}");
        }
    }

    let state = AppState {
        db: database,
        timer,
        catalog,
    };

    match cli.command {
        Some(Command::Run { routine_id }) => {
            let routine = state.catalog.find(&routine_id)?;
            run_workout(&state, routine, &mut input).await?;
        }
        _ => dashboard_loop(&state, &mut input).await?,
    }
    Ok(())
}

/// Returns false when stdin closes before a valid PIN is entered.
async fn login(
    gate: &AuthGate,
    settings: &SettingsStore,
    pin: Option<&str>,
    input: &mut InputLines,
) -> Result<bool> {
    if gate.is_authenticated(settings, Utc::now()) {
        return Ok(true);
    }
    if let Some(pin) = pin {
        gate.login(settings, pin, Utc::now())?;
        return Ok(true);
    }

    loop {
        prompt("Enter PIN: ");
        let Some(line) = input.next_line().await? else {
            return Ok(false);
        };
        match gate.login(settings, &line, Utc::now()) {
            Ok(expiry) => {
                info!("logged in until {expiry}");
                return Ok(true);
            }
            Err(err) => println!("{err}"),
        }
    }
}

fn build_timer(settings: &SettingsStore, database: &Database) -> TimerController {
    let speech = settings.speech();
    let announcer = match CommandSpeech::detect().filter(|_| speech.enabled) {
        Some(backend) => {
            info!("speaking through {}", backend.program().display());
            Announcer::new(Arc::new(backend), speech.voice.clone(), speech.settle_delay())
        }
        None => {
            if speech.enabled {
                warn!("no speech synthesizer found; workouts will run silently");
            }
            Announcer::disabled()
        }
    };

    let wake = settings.wake();
    let primary = InhibitorLock::detect()
        .filter(|_| wake.inhibitor)
        .map(|lock| Box::new(lock) as Box<dyn WakeLockProvider>);
    let fallback = wake
        .audio_fallback
        .then(|| Box::new(SilentAudioKeepAwake::new()) as Box<dyn KeepAwakeFallback>);

    let engine = WorkoutEngine::new(
        Arc::new(SystemClock),
        Arc::new(announcer),
        Box::new(WakeGuard::new(primary, fallback)),
        Arc::new(database.clone()),
    );
    TimerController::new(engine, settings.timer().tick_interval())
}

async fn dashboard_loop(state: &AppState, input: &mut InputLines) -> Result<()> {
    loop {
        let history = state.db.history_map().await.unwrap_or_else(|err| {
            warn!("Load history failed: {err:#}");
            Default::default()
        });
        println!();
        println!("{}", present::render_dashboard(state.catalog.routines(), &history));
        prompt("Routine id (or quit): ");

        let Some(line) = input.next_line().await? else {
            return Ok(());
        };
        let choice = line.trim();
        if choice.is_empty() {
            continue;
        }
        if matches!(choice, "quit" | "q" | "exit") {
            return Ok(());
        }
        match state.catalog.find(choice) {
            Ok(routine) => {
                if run_workout(state, routine, input).await? {
                    return Ok(());
                }
            }
            Err(err) => println!("{err}"),
        }
    }
}

/// Runs the workout view until the user goes back (false) or quits (true).
async fn run_workout(
    state: &AppState,
    routine: Arc<Routine>,
    input: &mut InputLines,
) -> Result<bool> {
    let controller = &state.timer;
    let mut updates = controller.subscribe();
    let initial = controller.load(routine.clone());
    updates.mark_unchanged();

    println!();
    println!("== {} ==", routine.title);
    println!("{COMMAND_HELP}");
    println!("{}", present::render_snapshot(&initial));

    let renderer = tokio::spawn(async move {
        let mut last = initial;
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if snapshot != last && !snapshot.routine_title.is_empty() {
                println!("{}", present::render_snapshot(&snapshot));
                last = snapshot;
            }
        }
    });

    let quit = loop {
        let Some(line) = input.next_line().await? else {
            controller.unload();
            break true;
        };
        let command = match line.parse::<WorkoutCommand>() {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        match apply_command(controller, command) {
            CommandOutcome::Updated(_) => {}
            CommandOutcome::Back => break false,
            CommandOutcome::Quit => break true,
            CommandOutcome::Help => println!("{COMMAND_HELP}"),
        }
    };

    renderer.abort();
    Ok(quit)
}

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}
