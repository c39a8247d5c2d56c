//! semqueue - run producers and consumers against one bounded buffer and report the totals.
//!
//! # Usage
//!
//! ```bash
//! semqueue --capacity 10 --producers 2 --consumers 2 --items 10
//! RUST_LOG=semqueue=trace semqueue --min-delay-ms 0 --max-delay-ms 0
//! ```
//!
//! Exit codes: 0 when the totals match, 1 on a configuration or task
//! failure, 2 when the totals do not match, 130 when interrupted.

use std::fmt::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use semqueue::{Config, Coordinator, Error, Pacing, Report, Result};

const RULE_WIDTH: usize = 72;

const EXIT_CONSISTENT: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_MISMATCH: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

/// Run a bounded-buffer producer-consumer simulation.
#[derive(Parser, Debug)]
#[command(name = "semqueue", version)]
#[command(about = "Producers and consumers coordinated through a semaphore-guarded bounded buffer")]
struct Cli {
    /// Buffer capacity.
    #[arg(long, default_value_t = 10)]
    capacity: usize,

    /// Number of producer threads.
    #[arg(long, default_value_t = 2)]
    producers: usize,

    /// Number of consumer threads.
    #[arg(long, default_value_t = 2)]
    consumers: usize,

    /// Items every producer puts.
    #[arg(long, default_value_t = 10)]
    items: usize,

    /// Items every consumer takes.
    ///
    /// Defaults to spreading the total supply evenly across consumers.
    #[arg(long)]
    items_per_consumer: Option<usize>,

    /// Shortest simulated work delay, in milliseconds.
    #[arg(long, default_value_t = 100)]
    min_delay_ms: u64,

    /// Longest simulated work delay, in milliseconds.
    #[arg(long, default_value_t = 500)]
    max_delay_ms: u64,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            capacity: self.capacity,
            producers: self.producers,
            consumers: self.consumers,
            items_per_producer: self.items,
            items_per_consumer: self.items_per_consumer,
            pacing: Pacing::new(
                Duration::from_millis(self.min_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            ),
        }
    }
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_thread_names(true).init();

    let config = Cli::parse().into_config();
    print!("{}", render_banner(&config));

    let outcome = run(config);
    match &outcome {
        Ok(report) => print!("{}", render_summary(report)),
        Err(Error::Interrupted) => {
            eprintln!("\n⚠️  Run interrupted by operator (Ctrl+C); shutting down without draining the buffer");
        }
        Err(_) => {}
    }
    ExitCode::from(exit_status(&outcome))
}

fn run(config: Config) -> Result<Report> {
    let coordinator = Coordinator::new(config).map_err(|err| {
        error!(error = %err, "invalid configuration");
        Error::from(err)
    })?;

    let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded(1);
    let mut coordinator = match ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    }) {
        Ok(()) => coordinator.with_interrupt(interrupt_rx),
        Err(err) => {
            warn!(error = %err, "could not install Ctrl+C handler; interrupts will not be reported");
            coordinator
        }
    };

    let outcome = coordinator.run();
    if let Err(err) = &outcome {
        if !matches!(err, Error::Interrupted) {
            error!(error = %err, phase = ?coordinator.phase(), "run failed");
        }
    }
    outcome
}

fn exit_status(outcome: &Result<Report>) -> u8 {
    match outcome {
        Ok(report) if report.is_consistent() => EXIT_CONSISTENT,
        Ok(_) => EXIT_MISMATCH,
        Err(Error::Interrupted) => EXIT_INTERRUPTED,
        Err(_) => EXIT_FAILED,
    }
}

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn render_banner(config: &Config) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "PRODUCER-CONSUMER");
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "  buffer capacity:    {}", config.capacity);
    let _ = writeln!(out, "  producers:          {}", config.producers);
    let _ = writeln!(out, "  consumers:          {}", config.consumers);
    let _ = writeln!(out, "  items per producer: {}", config.items_per_producer);
    let _ = match config.items_per_consumer {
        Some(items) => writeln!(out, "  items per consumer: {items}"),
        None => writeln!(out, "  items per consumer: balanced ({} total)", config.expected_total()),
    };
    let _ = writeln!(out, "  work delay:         {:?}..={:?}", config.pacing.min, config.pacing.max);
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out);
    out
}

fn render_summary(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "FINAL STATISTICS");
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "{report}");
    let _ = writeln!(out, "{}", rule());
    if report.is_consistent() {
        let _ = writeln!(out, "✅ All {} items were produced and consumed.", report.expected);
    } else {
        let _ = writeln!(
            out,
            "⚠️  Expected {} items, but produced={} consumed={}",
            report.expected, report.produced, report.consumed
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use semqueue::{ConfigError, Operation, Role};

    fn report(produced: usize, consumed: usize) -> Report {
        Report {
            config: Config::new(10, 2, 2, 10),
            produced,
            consumed,
            expected: 20,
            remaining: produced - consumed,
            peak: 10,
            elapsed: Duration::from_millis(1500),
            tasks: Vec::new(),
        }
    }

    #[test]
    fn consistent_run_exits_zero() {
        assert_eq!(exit_status(&Ok(report(20, 20))), EXIT_CONSISTENT);
    }

    #[test]
    fn mismatch_exits_two() {
        assert_eq!(exit_status(&Ok(report(20, 19))), EXIT_MISMATCH);
        assert_eq!(exit_status(&Ok(report(18, 18))), EXIT_MISMATCH);
    }

    #[test]
    fn interrupt_exits_130() {
        assert_eq!(exit_status(&Err(Error::Interrupted)), EXIT_INTERRUPTED);
    }

    #[test]
    fn failures_exit_one() {
        assert_eq!(exit_status(&Err(Error::Config(ConfigError::ZeroCapacity))), EXIT_FAILED);
        let failed = Error::TaskFailed {
            role: Role::Producer,
            id: 1,
            operation: Operation::Put,
            message: "boom".to_owned(),
        };
        assert_eq!(exit_status(&Err(failed)), EXIT_FAILED);
        assert_eq!(exit_status(&Err(Error::TasksLost { missing: 2 })), EXIT_FAILED);
    }

    #[test]
    fn invalid_cli_config_fails_before_spawning() {
        let cli = Cli::try_parse_from(["semqueue", "--producers", "0", "--consumers", "1", "--items", "5"]).unwrap();
        let outcome = run(cli.into_config());
        assert!(matches!(outcome, Err(Error::Config(ConfigError::NoProducers { demand: 5 }))));
        assert_eq!(exit_status(&outcome), EXIT_FAILED);
    }

    #[test]
    fn cli_defaults_match_config_defaults() {
        let config = Cli::try_parse_from(["semqueue"]).unwrap().into_config();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn banner_lists_configuration() {
        let banner = render_banner(&Config::new(3, 2, 1, 4).with_items_per_consumer(8));
        assert!(banner.contains("buffer capacity:    3"));
        assert!(banner.contains("producers:          2"));
        assert!(banner.contains("items per consumer: 8"));
        let balanced = render_banner(&Config::new(3, 2, 1, 4));
        assert!(balanced.contains("balanced (8 total)"));
    }

    #[test]
    fn summary_reports_outcome() {
        let ok = render_summary(&report(20, 20));
        assert!(ok.contains("FINAL STATISTICS"));
        assert!(ok.contains("total produced:      20"));
        assert!(ok.contains("All 20 items were produced and consumed"));

        let bad = render_summary(&report(20, 17));
        assert!(bad.contains("Expected 20 items, but produced=20 consumed=17"));
        assert!(bad.contains("remaining in buffer: 3"));
    }
}
