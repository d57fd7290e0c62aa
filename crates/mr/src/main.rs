//! mr - record and replay mouse/keyboard macros
//!
//! `mr run` keeps the recorder alive with global hotkeys (default Ctrl+S to
//! record, Ctrl+R to replay). The other commands work on the stored macros
//! directly.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use macro_core::events::duration_from_secs;
use macro_recorder::prelude::*;
use macro_recorder::settings::SETTINGS_FILE;
use macro_recorder::storage::default_dir;

#[derive(Parser)]
#[command(name = "mr")]
#[command(about = "Macro recorder - record and replay mouse and keyboard input")]
#[command(version)]
struct Cli {
    /// Data directory (default: $MACRO_RECORDER_HOME or ~/.macro-recorder)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Structured JSON output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the recorder with global hotkeys until Ctrl+C
    Run,
    /// Replay the current macro or a favorite
    Replay {
        #[arg(short, long)]
        favorite: Option<String>,
        /// Playback speed (1.0 = as recorded, 2.0 = 2x)
        #[arg(short, long, default_value = "1.0")]
        speed: f64,
        /// Seconds to wait before starting
        #[arg(long, default_value = "2")]
        delay: f64,
    },
    /// Show a macro
    Show {
        #[arg(short, long)]
        favorite: Option<String>,
        /// List every event
        #[arg(long)]
        all: bool,
    },
    /// Manage favorite macros
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
    /// Tracking options and shortcuts
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum FavoritesAction {
    List,
    /// Save the current macro under a name
    Add { name: String },
    Delete { name: String },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    Set {
        #[arg(long)]
        track_mouse: Option<bool>,
        #[arg(long)]
        track_keyboard: Option<bool>,
        /// Record shortcut, e.g. ctrl+s
        #[arg(long)]
        record: Option<String>,
        /// Replay shortcut, e.g. ctrl+r
        #[arg(long)]
        replay: Option<String>,
    },
    /// Restore the default shortcuts
    Reset,
    /// Press the new record and replay combinations
    Capture {
        /// Seconds to wait for each combination
        #[arg(long, default_value = "10")]
        timeout: u64,
    },
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
    fn err(e: Error) -> Output<()> {
        Output { success: false, data: None, error: Some(e) }
    }
}

fn print_json<T: Serialize>(output: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let json = cli.json;
    let result = data_dir(cli.dir).and_then(|dir| {
        debug!(command = ?cli.command, dir = %dir.display(), "mr starting");
        match cli.command {
            Commands::Run => cmd_run(&dir),
            Commands::Replay { favorite, speed, delay } => cmd_replay(&dir, favorite.as_deref(), speed, delay),
            Commands::Show { favorite, all } => cmd_show(&dir, favorite.as_deref(), all, json),
            Commands::Favorites { action } => cmd_favorites(&dir, action, json),
            Commands::Config { action } => cmd_config(&dir, action, json),
        }
    });

    if let Err(e) = result {
        match e.downcast_ref::<Error>() {
            Some(err) if json => {
                let _ = print_json(&Output::<()>::err(err.clone()));
            }
            Some(err) => {
                eprintln!("Error: {}", err.code.user_message());
                eprintln!("  {}", err.message);
                for s in &err.suggestions {
                    eprintln!("  hint: {}", s);
                }
            }
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn data_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => Ok(default_dir()?),
    }
}

// ── Native input ────────────────────────────────────────────────────────────

#[cfg(feature = "native")]
fn native_sink() -> Result<Arc<dyn InputSink>> {
    Ok(Arc::new(RdevSink::new()))
}

#[cfg(not(feature = "native"))]
fn native_sink() -> Result<Arc<dyn InputSink>> {
    Err(not_built_with_native().into())
}

#[cfg(feature = "native")]
fn start_listener(engine: &EngineHandle) -> Result<std::thread::JoinHandle<()>> {
    Ok(spawn_listener(engine.input())?)
}

#[cfg(not(feature = "native"))]
fn start_listener(_engine: &EngineHandle) -> Result<std::thread::JoinHandle<()>> {
    Err(not_built_with_native().into())
}

#[cfg(not(feature = "native"))]
fn not_built_with_native() -> Error {
    Error::listener_unavailable("built without native input support")
        .with_suggestions(vec!["rebuild with `cargo build --features native`".into()])
}

fn start_engine(dir: &Path) -> Result<(EngineHandle, std::thread::JoinHandle<()>)> {
    let sink = native_sink()?;
    let storage = MacroStorage::with_dir(dir)?;
    let engine = Engine::new(storage, dir.join(SETTINGS_FILE), sink).spawn()?;
    match start_listener(&engine) {
        Ok(listener) => Ok((engine, listener)),
        Err(e) => {
            let _ = engine.shutdown();
            Err(e)
        }
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

fn cmd_run(dir: &Path) -> Result<()> {
    let (engine, listener) = start_engine(dir)?;
    let status = engine.subscribe();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    println!("Macro recorder running (Ctrl+C to quit)\n");
    while running.load(Ordering::SeqCst) {
        match status.recv_timeout(Duration::from_millis(100)) {
            Ok(s) => println!("{}\n", s),
            Err(e) if e.is_timeout() => {}
            Err(_) => break,
        }
        if listener.is_finished() {
            // Drain the failure status before leaving
            while let Ok(s) = status.try_recv() {
                println!("{}\n", s);
            }
            engine.shutdown()?;
            return Err(Error::listener_unavailable("global input listener stopped").into());
        }
    }

    engine.shutdown()?;
    println!("Bye.");
    Ok(())
}

fn cmd_replay(dir: &Path, favorite: Option<&str>, speed: f64, delay: f64) -> Result<()> {
    let storage = MacroStorage::with_dir(dir)?;
    let (label, sequence) = match favorite {
        Some(name) => (name.to_string(), storage.load_favorite(name)?),
        None => ("current macro".to_string(), storage.load_current()?),
    };
    if sequence.is_empty() {
        println!("Nothing to replay.");
        return Ok(());
    }

    let sink = native_sink()?;
    let delay = duration_from_secs(delay).map_err(anyhow::Error::msg)?;

    println!(
        "Replaying {} ({} events, {:.1}s) at {}x speed...",
        label,
        sequence.len(),
        sequence.duration().as_secs_f64(),
        speed
    );
    if !delay.is_zero() {
        println!("Starting in {:.1} seconds...", delay.as_secs_f64());
        std::thread::sleep(delay);
    }

    let replayer = Replayer::new().speed(speed);
    let r = replayer.clone();
    ctrlc::set_handler(move || {
        r.cancel();
    })?;

    let report = replayer.play(&sequence, sink.as_ref())?;
    debug!(?report, "replay finished");
    println!(
        "{} {} moves, {} clicks, {} key presses, {} key releases",
        if report.cancelled { "Cancelled." } else { "Done!" },
        report.moves,
        report.clicks,
        report.key_presses,
        report.key_releases
    );
    if report.failed > 0 {
        println!("{} events could not be simulated", report.failed);
    }
    if report.released_on_exit > 0 {
        println!("{} keys released at the end", report.released_on_exit);
    }
    Ok(())
}

fn load_named(storage: &MacroStorage, favorite: Option<&str>) -> Result<(String, MacroSequence)> {
    Ok(match favorite {
        Some(name) => (name.to_string(), storage.load_favorite(name)?),
        None => {
            if !storage.has_current() {
                return Err(Error::no_macro_recorded().into());
            }
            ("current".to_string(), storage.load_current()?)
        }
    })
}

fn cmd_show(dir: &Path, favorite: Option<&str>, all: bool, json: bool) -> Result<()> {
    let storage = MacroStorage::with_dir(dir)?;
    let (name, sequence) = load_named(&storage, favorite)?;
    let summary = sequence.summary();

    if json {
        let events = all.then_some(&sequence);
        return print_json(&Output::ok(serde_json::json!({
            "name": name,
            "events": sequence.len(),
            "duration": sequence.duration().as_secs_f64(),
            "summary": summary,
            "sequence": events,
        })));
    }

    println!("Name: {}", name);
    println!("Events: {}", sequence.len());
    println!("Duration: {:.3}s", sequence.duration().as_secs_f64());
    println!("  Moves: {}", summary.moves);
    println!("  Clicks: {}", summary.clicks);
    println!("  Key presses: {}", summary.key_presses);
    println!("  Key releases: {}", summary.key_releases);

    if all {
        println!();
        for (i, event) in sequence.iter().enumerate() {
            println!("{:>5}  {:>9.3}s  {}", i, event.t().as_secs_f64(), describe(event));
        }
    }
    Ok(())
}

fn describe(event: &Event) -> String {
    match event {
        Event::Move { x, y, .. } => format!("move     {},{}", x, y),
        Event::Click { x, y, button, pressed, .. } => format!(
            "click    {} {} at {},{}",
            String::from(*button),
            if *pressed { "down" } else { "up" },
            x,
            y
        ),
        Event::KeyPress { key, .. } => format!("press    {}", key.to_wire()),
        Event::KeyRelease { key, .. } => format!("release  {}", key.to_wire()),
    }
}

fn cmd_favorites(dir: &Path, action: FavoritesAction, json: bool) -> Result<()> {
    let storage = MacroStorage::with_dir(dir)?;
    match action {
        FavoritesAction::List => {
            let favorites = storage.load_favorites()?;
            if json {
                let list: Vec<_> = favorites
                    .iter()
                    .map(|(name, seq)| {
                        serde_json::json!({
                            "name": name,
                            "events": seq.len(),
                            "duration": seq.duration().as_secs_f64(),
                        })
                    })
                    .collect();
                return print_json(&Output::ok(list));
            }
            if favorites.is_empty() {
                println!("No favorite macros saved.");
            }
            for (name, seq) in &favorites {
                println!("{:<24} {:>6} events {:>9.1}s", name, seq.len(), seq.duration().as_secs_f64());
            }
        }
        FavoritesAction::Add { name } => {
            let (_, sequence) = load_named(&storage, None)?;
            storage.save_favorite(&name, &sequence)?;
            if json {
                return print_json(&Output::ok(serde_json::json!({"added": name.trim()})));
            }
            println!("Saved '{}' ({} events)", name.trim(), sequence.len());
        }
        FavoritesAction::Delete { name } => {
            if !storage.delete_favorite(&name)? {
                return Err(Error::favorite_not_found(&name).into());
            }
            if json {
                return print_json(&Output::ok(serde_json::json!({"deleted": name})));
            }
            println!("Deleted '{}'", name);
        }
    }
    Ok(())
}

fn cmd_config(dir: &Path, action: ConfigAction, json: bool) -> Result<()> {
    let path = dir.join(SETTINGS_FILE);
    let mut settings = Settings::load(&path);

    match action {
        ConfigAction::Show => {}
        ConfigAction::Set { track_mouse, track_keyboard, record, replay } => {
            let mut tracking = settings.tracking();
            tracking.mouse = track_mouse.unwrap_or(tracking.mouse);
            tracking.keyboard = track_keyboard.unwrap_or(tracking.keyboard);
            settings.set_tracking(tracking);
            if record.is_some() || replay.is_some() {
                let record = record.unwrap_or_else(|| settings.record_key.clone());
                let replay = replay.unwrap_or_else(|| settings.replay_key.clone());
                settings.set_shortcuts(&record, &replay)?;
            }
            settings.save(&path)?;
        }
        ConfigAction::Reset => {
            settings.reset_shortcuts();
            settings.save(&path)?;
        }
        ConfigAction::Capture { timeout } => {
            settings = capture_shortcuts(dir, Duration::from_secs(timeout))?;
        }
    }

    if json {
        return print_json(&Output::ok(&settings));
    }
    println!("Track mouse: {}", settings.track_mouse);
    println!("Track keyboard: {}", settings.track_keyboard);
    println!("Record shortcut: {}", settings.record_key.to_uppercase());
    println!("Replay shortcut: {}", settings.replay_key.to_uppercase());
    Ok(())
}

fn capture_shortcuts(dir: &Path, timeout: Duration) -> Result<Settings> {
    let (engine, _listener) = start_engine(dir)?;
    let result = (|| -> Result<Settings> {
        println!("Press the new RECORD combination...");
        let record = engine.capture_chord(timeout)?;
        println!("  {}", record.to_string().to_uppercase());
        println!("Press the new REPLAY combination...");
        let replay = engine.capture_chord(timeout)?;
        println!("  {}", replay.to_string().to_uppercase());

        engine.set_shortcuts(&record.to_string(), &replay.to_string())?;
        Ok(engine.snapshot()?.settings)
    })();
    engine.shutdown()?;
    result
}
