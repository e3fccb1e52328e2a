//! twomin - Two minutes of focus, then keep going
//!
//! "Anything can be started in two minutes."
//!
//! Usage:
//!   twomin toggle               Start, pause or resume the timer
//!   twomin status               Show the timer (default)
//!   twomin reset                Back to a fresh two minutes
//!   twomin save                 Save the running stopwatch as a focus session
//!   twomin discard              Drop the running stopwatch
//!   twomin stats                Show focus statistics
//!   twomin run                  Foreground timer with live display and alerts

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use twomin_core::{format, Config, Paths};

use twomin::notify::{DesktopNotifier, LogNotifier, Notifier};
use twomin::{
    Clock, JsonFileStore, KeyValueStore, Phase, StatisticsSnapshot, SystemClock, Ticker,
    TimerMachine, TimerSettings, TimerView, TransitionEvent,
};

/// twomin - Two-minute focus timer that rolls into a stopwatch
#[derive(Parser)]
#[command(name = "twomin")]
#[command(about = "Two-minute focus timer that rolls into a stopwatch")]
#[command(version)]
#[command(after_help = r#"HOW IT WORKS:
    Start a two-minute countdown. When it runs out the timer keeps
    counting up as a stopwatch. Save the session when you are done,
    or discard it.

EXAMPLES:
    twomin toggle               # Start the countdown
    twomin                      # Check remaining time
    twomin toggle               # Pause / resume
    twomin save                 # Keep the session
    twomin stats                # Last 24 hours and lifetime totals
    twomin run                  # Live display with desktop alerts

ALIASES:
    twomin t     # toggle
    twomin st    # status
    twomin r     # reset
    twomin d     # discard

LOGGING:
    RUST_LOG=twomin=debug twomin run
"#)]
struct Cli {
    /// Keep state and config under this directory instead of the defaults
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start, pause or resume the timer
    #[command(alias = "t", alias = "start")]
    Toggle,

    /// Show the timer
    #[command(alias = "st")]
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reset to a fresh countdown
    #[command(alias = "r")]
    Reset,

    /// Save the stopwatch reading as a focus session
    Save,

    /// Drop the stopwatch reading without saving
    #[command(alias = "d")]
    Discard,

    /// Show focus statistics
    #[command(alias = "statistics")]
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the timer in the foreground
    Run,
}

// ANSI color codes
const GREEN: &str = "\x1b[0;32m";
const CYAN: &str = "\x1b[0;36m";
const YELLOW: &str = "\x1b[0;33m";
const MAGENTA: &str = "\x1b[0;35m";
const BOLD: &str = "\x1b[1m";
const NC: &str = "\x1b[0m";

/// Check if stdout is a TTY and colors should be used
fn use_colors() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stdout())
}

/// Conditionally apply color
fn color(code: &str, text: &str) -> String {
    if use_colors() {
        format!("{}{}{}", code, text, NC)
    } else {
        text.to_string()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let paths = match cli.data_dir {
        Some(dir) => Paths::rooted(dir),
        None => Paths::new(),
    };
    let config = Config::load(&paths.config_file())?;

    match cli.command {
        Some(Commands::Run) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cmd_run(&paths, &config))
        }
        Some(Commands::Toggle) => cmd_toggle(&paths, &config),
        Some(Commands::Status { json }) => cmd_status(&paths, &config, json),
        Some(Commands::Reset) => cmd_reset(&paths, &config),
        Some(Commands::Save) => cmd_save(&paths, &config),
        Some(Commands::Discard) => cmd_discard(&paths, &config),
        Some(Commands::Stats { json }) => cmd_stats(&paths, &config, json),
        None => cmd_status(&paths, &config, false),
    }
}

/// Restore the machine from the state file
fn open_machine(paths: &Paths, config: &Config, notifier: Box<dyn Notifier>) -> Result<TimerMachine> {
    let state_file = paths.state_file();
    let store: Arc<dyn KeyValueStore> = Arc::new(
        JsonFileStore::open(&state_file)
            .with_context(|| format!("Failed to open state file: {}", state_file.display()))?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    Ok(TimerMachine::restore(
        TimerSettings::from_config(config),
        clock,
        store,
        notifier,
    ))
}

/// Start, pause or resume
fn cmd_toggle(paths: &Paths, config: &Config) -> Result<()> {
    let mut machine = open_machine(paths, config, Box::new(LogNotifier))?;
    let events = machine.toggle();
    report_transitions(&events);
    print_status(&machine.view());
    Ok(())
}

/// Show the timer
fn cmd_status(paths: &Paths, config: &Config, json: bool) -> Result<()> {
    let machine = open_machine(paths, config, Box::new(LogNotifier))?;
    let view = machine.view();

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_status(&view);
    }
    Ok(())
}

/// Reset to a fresh countdown
fn cmd_reset(paths: &Paths, config: &Config) -> Result<()> {
    let mut machine = open_machine(paths, config, Box::new(LogNotifier))?;
    machine.reset();
    println!("{} Timer reset", color(GREEN, "[ok]"));
    Ok(())
}

/// Save the stopwatch as a focus session
fn cmd_save(paths: &Paths, config: &Config) -> Result<()> {
    let mut machine = open_machine(paths, config, Box::new(LogNotifier))?;

    let (saved, events) = machine.save_focus_session();
    report_transitions(&events);

    match saved {
        Some(session) => {
            println!("{} Focus session saved", color(GREEN, "[ok]"));
            println!(
                "Focused for {}",
                format::duration(session.duration_seconds)
            );
        }
        None => {
            println!(
                "{} Nothing to save: the stopwatch is not running",
                color(CYAN, "[info]")
            );
        }
    }
    Ok(())
}

/// Drop the stopwatch reading
fn cmd_discard(paths: &Paths, config: &Config) -> Result<()> {
    let mut machine = open_machine(paths, config, Box::new(LogNotifier))?;
    let was = machine.phase();
    machine.discard();

    if was.is_stopwatch() {
        println!("{} Session discarded", color(GREEN, "[ok]"));
    } else {
        println!("{} Timer reset", color(GREEN, "[ok]"));
    }
    Ok(())
}

/// Show focus statistics
fn cmd_stats(paths: &Paths, config: &Config, json: bool) -> Result<()> {
    let mut machine = open_machine(paths, config, Box::new(LogNotifier))?;
    let stats = machine.statistics();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats, config.retention_hours);
    }
    Ok(())
}

/// Foreground loop: ticks, desktop alerts and single-key intents on stdin
async fn cmd_run(paths: &Paths, config: &Config) -> Result<()> {
    let notifier: Box<dyn Notifier> = if config.desktop_notifications {
        match DesktopNotifier::detect() {
            Ok(notifier) => Box::new(notifier),
            Err(e) => {
                warn!(error = %e, "desktop notifications unavailable");
                Box::new(LogNotifier)
            }
        }
    } else {
        Box::new(LogNotifier)
    };

    let mut machine = open_machine(paths, config, notifier)?;

    println!("{}", color(&format!("{}{}", BOLD, MAGENTA), "TWO-MINUTE FOCUS"));
    println!("  [enter]/t toggle   s save   d discard   r reset   i stats   q quit");
    println!();

    run_loop(
        &mut machine,
        config,
        BufReader::new(tokio::io::stdin()),
        async {
            let _ = tokio::signal::ctrl_c().await;
        },
    )
    .await
}

/// Drive `machine` from ticks and `input` lines until `q` or `shutdown`
///
/// End of input only stops reading; ticking goes on until `shutdown`.
async fn run_loop<R, F>(
    machine: &mut TimerMachine,
    config: &Config,
    input: R,
    shutdown: F,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    let (tick_tx, mut tick_rx) = mpsc::channel::<()>(8);
    let mut ticker = Ticker::new(Duration::from_millis(config.tick_interval_ms));
    let mut lines = input.lines();
    tokio::pin!(shutdown);

    render_line(&machine.view());
    ticker.sync(machine.is_ticking(), &tick_tx);
    let mut stdin_open = true;

    loop {
        tokio::select! {
            Some(()) = tick_rx.recv() => {
                let events = machine.tick();
                if !events.is_empty() {
                    println!();
                    report_transitions(&events);
                }
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    // Keep the timer running without keyboard input
                    stdin_open = false;
                    println!();
                    println!("{} Input closed, press ctrl-c to quit", color(CYAN, "[info]"));
                    render_line(&machine.view());
                    continue;
                };
                match line.trim() {
                    "" | "t" => {
                        let events = machine.toggle();
                        report_transitions(&events);
                    }
                    "s" => {
                        let (saved, events) = machine.save_focus_session();
                        report_transitions(&events);
                        match saved {
                            Some(session) => println!(
                                "{} Saved {}",
                                color(GREEN, "[ok]"),
                                format::duration(session.duration_seconds)
                            ),
                            None => println!("{} Nothing to save yet", color(CYAN, "[info]")),
                        }
                    }
                    "d" => {
                        machine.discard();
                        println!("{} Discarded", color(GREEN, "[ok]"));
                    }
                    "r" => {
                        machine.reset();
                        println!("{} Reset", color(GREEN, "[ok]"));
                    }
                    "i" => {
                        println!();
                        print_stats(&machine.statistics(), config.retention_hours);
                        println!();
                    }
                    "q" => break,
                    other => println!("{} Unknown key: {}", color(YELLOW, "[warn]"), other),
                }
            }
            _ = &mut shutdown => break,
        }

        ticker.sync(machine.is_ticking(), &tick_tx);
        render_line(&machine.view());
    }

    ticker.stop();
    println!();
    Ok(())
}

fn report_transitions(events: &[TransitionEvent]) {
    for event in events {
        match event.to {
            Phase::CountingDown if event.from == Phase::Paused => {
                println!("{} Resumed", color(GREEN, "[ok]"))
            }
            Phase::CountingDown => println!("{} Countdown started", color(GREEN, "[ok]")),
            Phase::Paused => println!("{} Paused", color(CYAN, "[info]")),
            Phase::Completed => println!(
                "{}",
                color(&format!("{}{}", BOLD, GREEN), "Two minutes done! Keep going?")
            ),
            Phase::StopwatchPaused => println!("{} Stopwatch paused", color(CYAN, "[info]")),
            Phase::RunningStopwatch if event.from == Phase::StopwatchPaused => {
                println!("{} Stopwatch resumed", color(GREEN, "[ok]"))
            }
            Phase::RunningStopwatch | Phase::Idle => {}
        }
    }
}

/// One-line live display, redrawn in place
fn render_line(view: &TimerView) {
    let line = match view.phase {
        Phase::Idle => format!("ready  {}", format::clock(view.remaining_seconds)),
        Phase::CountingDown | Phase::Paused => format!(
            "{}  {} [{}]",
            if view.phase == Phase::Paused { "paused " } else { "focus  " },
            format::clock(view.remaining_seconds),
            format::progress_bar(1.0 - view.progress(), 24)
        ),
        Phase::Completed | Phase::RunningStopwatch => {
            format!("+ {}", format::duration(view.elapsed_seconds))
        }
        Phase::StopwatchPaused => format!("paused + {}", format::duration(view.elapsed_seconds)),
    };
    print!("\r\x1b[2K{}", line);
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

fn print_status(view: &TimerView) {
    match view.phase {
        Phase::Idle => {
            println!("Timer ready: {}", format::clock(view.remaining_seconds));
            println!();
            println!("Start it with: twomin toggle");
        }
        Phase::CountingDown | Phase::Paused => {
            let title = if view.phase == Phase::Paused {
                "FOCUS PAUSED"
            } else {
                "FOCUS MODE ACTIVE"
            };
            let done = 1.0 - view.progress();
            println!("{}", color(&format!("{}{}", BOLD, MAGENTA), title));
            println!();
            println!(
                "  {} [{}] {}%",
                color(CYAN, "Progress:"),
                format::progress_bar(done, 30),
                (done * 100.0).round() as u32
            );
            println!(
                "  {} {}",
                color(CYAN, "Remaining:"),
                format::clock(view.remaining_seconds)
            );
        }
        Phase::Completed | Phase::RunningStopwatch | Phase::StopwatchPaused => {
            let title = if view.phase == Phase::StopwatchPaused {
                "STOPWATCH PAUSED"
            } else {
                "STOPWATCH RUNNING"
            };
            println!("{}", color(&format!("{}{}", BOLD, GREEN), title));
            println!();
            println!(
                "  {}  {}",
                color(CYAN, "Elapsed:"),
                format::duration(view.elapsed_seconds)
            );
            println!();
            println!("Run 'twomin save' to keep this session");
            println!("Run 'twomin discard' to drop it");
        }
    }
}

fn print_stats(stats: &StatisticsSnapshot, window_hours: u64) {
    println!("{}Focus Statistics{}", BOLD, NC);
    println!();
    println!("  {}", color(CYAN, &format!("Last {} hours", window_hours)));
    println!("    Sessions:      {}", stats.last_day_count);
    println!("    Focused:       {}", format::duration(stats.last_day_duration));
    if stats.last_day_count > 0 {
        println!("    Average:       {}", format::duration(stats.average_last_day()));
    }
    println!();
    println!("  {}", color(CYAN, "Lifetime"));
    println!("    Sessions:      {}", stats.lifetime_count);
    println!("    Focused:       {}", format::duration(stats.lifetime_duration));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_aliases_parse() {
        let cli = Cli::try_parse_from(["twomin", "t"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Toggle)));

        let cli = Cli::try_parse_from(["twomin", "st", "--json"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Status { json: true })));

        let cli = Cli::try_parse_from(["twomin", "--data-dir", "/tmp/x", "d"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Discard)));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn test_color_with_tty() {
        // Just verify the color function doesn't panic
        let result = color(GREEN, "test");
        assert!(result.contains("test"));
    }

    fn memory_machine() -> TimerMachine {
        TimerMachine::new(
            TimerSettings::default(),
            Arc::new(twomin::ManualClock::at_epoch_seconds(1_700_000_000)),
            Arc::new(twomin::MemoryStore::new()),
            Box::new(LogNotifier),
        )
    }

    fn fast_config() -> Config {
        Config {
            tick_interval_ms: 5,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_run_loop_applies_keys_until_quit() {
        let mut machine = memory_machine();
        let input: &[u8] = b"t\nq\nr\n";

        run_loop(&mut machine, &fast_config(), input, std::future::pending())
            .await
            .unwrap();

        // "r" after "q" is never read
        assert_eq!(machine.phase(), Phase::CountingDown);
    }

    #[tokio::test]
    async fn test_run_loop_keeps_ticking_after_input_ends() {
        let mut machine = memory_machine();
        machine.toggle();
        let mut views = machine.subscribe();
        views.borrow_and_update();

        let input: &[u8] = b"";
        let started = std::time::Instant::now();
        run_loop(
            &mut machine,
            &fast_config(),
            input,
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(views.has_changed().unwrap());
        assert_eq!(machine.phase(), Phase::CountingDown);
    }

    #[test]
    fn test_one_shot_commands_share_state() {
        let dir = std::env::temp_dir().join(format!("twomin_cli_test_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let paths = Paths::rooted(&dir);
        let config = Config::default();

        cmd_toggle(&paths, &config).unwrap();
        let machine = open_machine(&paths, &config, Box::new(LogNotifier)).unwrap();
        assert_eq!(machine.phase(), Phase::CountingDown);

        cmd_reset(&paths, &config).unwrap();
        let machine = open_machine(&paths, &config, Box::new(LogNotifier)).unwrap();
        assert_eq!(machine.phase(), Phase::Idle);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
