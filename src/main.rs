//! N-back Trainer - dual N-back working memory drills
//!
//! Single-player terminal front-end over the session engine.
//! Settings, highscore and the scoreboard live in a JSON preferences file.

use clap::Parser;
use std::error::Error;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use nback_trainer::cli::{BellSpeaker, Command, Display, Frame, InputHandler};
use nback_trainer::prefs::leaderboard;
use nback_trainer::session::{ChannelMode, GameViewModel, Speaker};
use nback_trainer::{GameSettings, JsonFilePreferences, PreferencesStore, SessionEngine};

#[derive(Parser, Debug)]
#[command(name = "N-back Trainer")]
#[command(about = "Dual N-back working memory drills in the terminal")]
struct Args {
    /// Stimulus channels: visual, audio or dual
    #[arg(short, long, default_value = "visual")]
    mode: ChannelMode,

    /// How many steps back a match looks
    #[arg(short, long)]
    n_back: Option<u32>,

    /// Events per round
    #[arg(short, long)]
    events: Option<u32>,

    /// Milliseconds between events
    #[arg(short, long)]
    interval_ms: Option<u32>,

    /// Grid edge length (grid has size² cells)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(2..=9))]
    grid_size: Option<u32>,

    /// Distinct spoken letters
    #[arg(short, long)]
    letters: Option<u32>,

    /// Share of eligible events planted as matches (0-100)
    #[arg(long)]
    match_percent: Option<u32>,

    /// Path to the preferences file
    #[arg(short, long, default_value = "nback-prefs.json")]
    prefs: PathBuf,

    /// Name saved with each finished round
    #[arg(long, default_value = "player")]
    name: String,

    /// Seed for reproducible sequences
    #[arg(long)]
    seed: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Log file (the terminal is taken by the UI)
    #[arg(long, default_value = "nback-trainer.log")]
    log_file: PathBuf,

    /// Print the scoreboard and exit
    #[arg(long)]
    scores: bool,

    /// Do not ring the bell for spoken letters
    #[arg(long)]
    mute: bool,
}

fn init_tracing(debug: bool, log_file: &Path) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug {
            "nback_trainer=debug"
        } else {
            "nback_trainer=info"
        })
    });
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .ok();
    Ok(())
}

/// Apply command-line overrides on top of persisted settings
fn merge_settings(mut settings: GameSettings, args: &Args) -> GameSettings {
    if let Some(n) = args.n_back {
        settings.n_back = n;
    }
    if let Some(events) = args.events {
        settings.num_events = events;
    }
    if let Some(ms) = args.interval_ms {
        settings.time_between_events_ms = ms;
    }
    if let Some(size) = args.grid_size {
        settings.grid_size = size;
    }
    if let Some(letters) = args.letters {
        settings.num_spoken_letters = letters;
    }
    settings
}

fn print_scoreboard(prefs: &dyn PreferencesStore) -> Result<(), Box<dyn Error>> {
    let board = leaderboard(prefs.scores()?, 10);
    println!("🏆 Highscore: {}", prefs.high_score()?);
    if board.is_empty() {
        println!("No rounds recorded yet.");
    }
    for (rank, entry) in board.iter().enumerate() {
        println!(
            "{:>2}. {:<16} {:>3}  ({})",
            rank + 1,
            entry.player_name,
            entry.score,
            entry.timestamp_millis
        );
    }
    Ok(())
}

/// Drive the UI until the player quits
fn run_trainer(
    vm: &dyn GameViewModel,
    speaker: Arc<dyn Speaker>,
    player_name: &str,
) -> Result<u32, Box<dyn Error>> {
    InputHandler::enable_raw_mode()?;
    let display = Display::fullscreen()?;
    let input = InputHandler::new();

    let mut state_rx = vm.game_state();
    let mut score_rx = vm.score();
    let mut high_rx = vm.high_score();
    let settings_rx = vm.settings();
    let mut redraw = true;
    let mut recorded = false;
    let mut rounds = 0;

    'session: loop {
        if redraw
            || state_rx.has_changed()?
            || score_rx.has_changed()?
            || high_rx.has_changed()?
        {
            let state = state_rx.borrow_and_update().clone();
            let score = *score_rx.borrow_and_update();
            let high_score = *high_rx.borrow_and_update();

            if state.round_finished && !recorded {
                match vm.record_score(player_name) {
                    Ok(entry) => debug!(score = entry.score, "round saved to scoreboard"),
                    Err(e) => warn!(error = %e, "could not save round"),
                }
                recorded = true;
                rounds += 1;
            } else if !state.round_finished {
                recorded = false;
            }

            display.render(&Frame {
                state: &state,
                score,
                high_score,
                grid_size: settings_rx.borrow().grid_size,
                n_back: vm.n_back(),
            })?;
            redraw = false;
        }

        let Some(key) = input.read_key()? else {
            continue;
        };
        let Some(command) = InputHandler::command(&key) else {
            continue;
        };

        let state = state_rx.borrow().clone();
        let result = match command {
            Command::Quit => break 'session,
            Command::Start => vm.start(Arc::clone(&speaker)),
            Command::Reset => {
                vm.reset_game();
                Ok(())
            }
            Command::CycleMode => vm.set_channel_mode(state.channel_mode.cycle()),
            Command::VisualMatch => vm.check_match(state.visual_value).map(|_| ()),
            Command::SelectCell(cell) => {
                let grid_size = settings_rx.borrow().grid_size;
                if cell < grid_size * grid_size {
                    vm.check_match(Some(cell)).map(|_| ())
                } else {
                    Ok(())
                }
            }
            Command::AudioMatch => vm.check_match(None).map(|_| ()),
        };
        if let Err(e) = result {
            debug!(?command, error = %e, "command ignored");
        }
        redraw = true;
    }

    display.shutdown()?;
    Ok(rounds)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.debug, &args.log_file)?;

    let prefs = Arc::new(JsonFilePreferences::new(&args.prefs));
    if args.scores {
        return print_scoreboard(prefs.as_ref());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    let engine = match args.seed {
        Some(seed) => SessionEngine::with_seed(prefs.clone(), seed),
        None => SessionEngine::new(prefs.clone()),
    };

    let persisted = engine.settings().borrow().clone();
    let settings = merge_settings(persisted.clone(), &args);
    if settings != persisted {
        engine.apply_settings(settings)?;
    }

    let mut config = engine.config();
    config.channel_mode = args.mode;
    if let Some(percent) = args.match_percent {
        config.target_match_percentage = percent;
    }
    engine.configure(config)?;
    info!(prefs = %args.prefs.display(), mode = %args.mode, "trainer started");

    let speaker: Arc<dyn Speaker> = Arc::new(BellSpeaker { muted: args.mute });
    let outcome = run_trainer(&engine, speaker, &args.name);

    runtime.block_on(engine.shutdown());
    let rounds = outcome?;

    println!("\n🧠 Session Complete!");
    println!(
        "📊 Rounds: {} | Highscore: {}",
        rounds,
        *engine.high_score().borrow()
    );
    println!("Thanks for training!");

    Ok(())
}
