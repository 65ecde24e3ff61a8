//! `relaybot run`: wire config, transport and sink into a `Bot` and run it.

use std::sync::Arc;

use anyhow::Context;
use relaybot_core::{Bot, BotSettings, MessageSink, ShutdownHandle};
use relaybot_infra::connection::ReplayConnection;
use relaybot_infra::sink::build_sink;
use relaybot_types::config::{BridgeConfig, SourceConfig};
use relaybot_types::stats::RunReport;
use tracing::{info, warn};

use super::{RunArgs, resolve_config};

/// How a completed `run` command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Fatal,
}

impl Outcome {
    pub fn from_report(report: &RunReport) -> Self {
        if report.is_fatal() {
            Self::Fatal
        } else {
            Self::Completed
        }
    }

    /// Process exit status: 0 for a normal end, 2 for a fatal transport outcome.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::Fatal => 2,
        }
    }
}

pub async fn run(args: RunArgs) -> anyhow::Result<Outcome> {
    let config = resolve_config(args.config.as_deref(), &args.overrides)?;
    let report = run_bridge(&config).await?;

    eprintln!("{}", summary_line(&report));
    Ok(Outcome::from_report(&report))
}

async fn run_bridge(config: &BridgeConfig) -> anyhow::Result<RunReport> {
    let settings = BotSettings::from_config(config)?;
    let sink = build_sink(&config.sink)
        .await
        .context("failed to set up sink")?;

    let SourceConfig::Replay { path } = &config.source;
    let connection = Arc::new(ReplayConnection::new(path.clone()));

    let bot = Bot::new(sink);
    info!(
        channel = %settings.channel,
        sink = bot.sink().name(),
        source = %path.display(),
        "starting bridge"
    );

    let signals = tokio::spawn(forward_signals(bot.shutdown_handle()));
    let result = bot
        .run(connection, &config.connection, &settings)
        .await
        .context("bridge failed to start");
    signals.abort();

    result
}

/// Request a non-fatal shutdown on Ctrl-C or SIGTERM.
async fn forward_signals(handle: ShutdownHandle) {
    shutdown_signal().await;
    info!("signal received, shutting down");
    handle.shutdown();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn summary_line(report: &RunReport) -> String {
    let stats = &report.stats;
    let counts = format!(
        "received {} sent {} dropped {} failed {}",
        stats.received,
        stats.sent,
        stats.dropped(),
        stats.failed
    );
    match &report.fatal {
        Some(reason) => format!(
            "{} {counts} ({reason})",
            console::style("fatal:").for_stderr().red().bold()
        ),
        None => format!(
            "{} {counts} in {:.1}s",
            console::style("done:").for_stderr().green().bold(),
            report.elapsed.as_secs_f64()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ConfigOverrides;
    use relaybot_types::stats::StatsSnapshot;
    use std::io::Write;
    use std::time::Duration;

    fn report(fatal: Option<&str>) -> RunReport {
        RunReport {
            run_id: uuid::Uuid::nil(),
            stats: StatsSnapshot {
                received: 7,
                sent: 5,
                dropped_throttled: 1,
                dropped_overflow: 1,
                failed: 2,
            },
            fatal: fatal.map(str::to_string),
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn outcome_exit_codes() {
        assert_eq!(Outcome::from_report(&report(None)).exit_code(), 0);
        assert_eq!(Outcome::from_report(&report(Some("x"))).exit_code(), 2);
    }

    #[test]
    fn summary_reports_all_counters() {
        console::set_colors_enabled_stderr(false);
        console::set_colors_enabled(false);
        assert_eq!(
            summary_line(&report(None)),
            "done: received 7 sent 5 dropped 2 failed 2 in 1.5s"
        );
        assert_eq!(
            summary_line(&report(Some("handshake_error: bad role"))),
            "fatal: received 7 sent 5 dropped 2 failed 2 (handshake_error: bad role)"
        );
    }

    #[tokio::test]
    async fn replays_file_into_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jsonl");
        let output = dir.path().join("out.jsonl");
        let mut file = std::fs::File::create(&input).unwrap();
        writeln!(file, "{{\"n\":1}}\n{{\"n\":2}}").unwrap();

        let args = RunArgs {
            config: None,
            overrides: ConfigOverrides {
                channel: Some("replayed".to_string()),
                runtime: Some(1),
                no_heartbeat: true,
                replay: Some(input),
                sink: Some(format!("file:{}", output.display())),
                ..ConfigOverrides::default()
            },
        };

        let outcome = run(args).await.unwrap();

        assert_eq!(outcome, Outcome::Completed);
        let written = std::fs::read_to_string(&output).unwrap();
        assert_eq!(written, "{\"n\":1}\n{\"n\":2}\n");
    }

    #[tokio::test]
    async fn missing_replay_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            config: None,
            overrides: ConfigOverrides {
                channel: Some("replayed".to_string()),
                runtime: Some(5),
                no_heartbeat: true,
                replay: Some(dir.path().join("absent.jsonl")),
                sink: Some(format!("file:{}", dir.path().join("out.jsonl").display())),
                ..ConfigOverrides::default()
            },
        };

        assert_eq!(run(args).await.unwrap(), Outcome::Fatal);
    }
}
