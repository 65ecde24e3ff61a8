//! CLI command definitions for the `relaybot` binary.
//!
//! `relaybot run` bridges a replayed channel into the configured sink;
//! `relaybot check-config` resolves and prints a configuration without
//! running anything. Both accept the same override flags on top of the
//! TOML file.

pub mod check;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;
use relaybot_types::config::{BridgeConfig, SinkConfig, SourceConfig};
use relaybot_types::error::ConfigError;

/// Bridge a pub/sub channel into a sink.
#[derive(Parser, Debug)]
#[command(name = "relaybot", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans to stdout with OpenTelemetry (do not combine with the stdout sink).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Only log errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// More logging (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default tracing filter for the chosen verbosity. `RUST_LOG` wins over it.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "info",
            1 => "info,relaybot_core=debug,relaybot_infra=debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Subscribe and forward until the runtime elapses or a fatal error.
    Run(RunArgs),

    /// Print the resolved configuration and exit.
    #[command(name = "check-config")]
    CheckConfig(CheckConfigArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// TOML configuration file.
    #[arg(short, long, env = "RELAYBOT_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Print JSON instead of TOML.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

/// Command-line values that take precedence over the configuration file.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Channel to subscribe to.
    #[arg(long)]
    pub channel: Option<String>,

    /// Server-side filter expression.
    #[arg(long)]
    pub filter: Option<String>,

    /// Stream position to resume from.
    #[arg(long)]
    pub position: Option<String>,

    /// Queue bound; the oldest message is dropped beyond it.
    #[arg(long, value_name = "N")]
    pub max_queue_size: Option<usize>,

    /// Run for SECS seconds. Negative runs until a fatal error.
    #[arg(long, value_name = "SECS", allow_negative_numbers = true)]
    pub runtime: Option<i64>,

    /// Disable the stall watchdog.
    #[arg(long)]
    pub no_heartbeat: bool,

    /// Replay this JSON-lines file as the channel (`-` for stdin).
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Where to forward: `stdout`, `file:PATH` or an http(s) URL.
    #[arg(long, value_name = "SINK")]
    pub sink: Option<String>,

    /// Role presented when connecting.
    #[arg(long, env = "RELAYBOT_ROLE")]
    pub role: Option<String>,

    /// Role secret presented when connecting.
    #[arg(long, env = "RELAYBOT_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Log every message received and forwarded.
    #[arg(long)]
    pub log_messages: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut BridgeConfig) -> Result<(), ConfigError> {
        if let Some(channel) = &self.channel {
            config.channel = channel.clone();
        }
        if let Some(filter) = &self.filter {
            config.filter = filter.clone();
        }
        if let Some(position) = &self.position {
            config.position = position.clone();
        }
        if let Some(size) = self.max_queue_size {
            config.max_queue_size = size;
        }
        if let Some(secs) = self.runtime {
            config.runtime_secs = Some(secs);
        }
        if self.no_heartbeat {
            config.enable_heartbeat = false;
        }
        if let Some(path) = &self.replay {
            config.source = SourceConfig::Replay { path: path.clone() };
        }
        if let Some(sink) = &self.sink {
            config.sink = SinkConfig::parse_shorthand(sink)?;
        }
        if let Some(role) = &self.role {
            config.connection.role = role.clone();
        }
        if let Some(secret) = &self.secret {
            config.connection.secret = SecretString::from(secret.as_str());
        }
        if self.log_messages {
            config.verbose = true;
        }
        Ok(())
    }
}

/// Load `path` (or defaults when absent), apply overrides and validate.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> anyhow::Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            BridgeConfig::from_toml(&text)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => BridgeConfig::default(),
    };

    overrides.apply(&mut config)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn run_flags_parse() {
        let cli = parse(&[
            "relaybot",
            "-v",
            "run",
            "--channel",
            "alerts",
            "--runtime",
            "-1",
            "--no-heartbeat",
            "--sink",
            "file:/tmp/out.jsonl",
        ]);

        assert_eq!(cli.verbose, 1);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.overrides.channel.as_deref(), Some("alerts"));
        assert_eq!(args.overrides.runtime, Some(-1));
        assert!(args.overrides.no_heartbeat);
    }

    #[test]
    fn check_config_requires_a_file() {
        assert!(Cli::try_parse_from(["relaybot", "check-config"]).is_err());
        let cli = parse(&["relaybot", "check-config", "--config", "bot.toml", "--json"]);
        assert!(matches!(cli.command, Commands::CheckConfig(CheckConfigArgs { json: true, .. })));
    }

    #[test]
    fn verbosity_maps_to_filter() {
        assert_eq!(parse(&["relaybot", "--quiet", "run"]).log_filter(), "error");
        assert_eq!(parse(&["relaybot", "run"]).log_filter(), "info");
        assert_eq!(parse(&["relaybot", "-vv", "run"]).log_filter(), "trace");
    }

    #[test]
    fn overrides_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "channel = \"from-file\"\nmax_queue_size = 10\n\n[sink]\ntype = \"stdout\""
        )
        .unwrap();

        let overrides = ConfigOverrides {
            channel: Some("from-flag".to_string()),
            sink: Some("https://example.invalid/hook".to_string()),
            runtime: Some(30),
            ..ConfigOverrides::default()
        };
        let config = resolve_config(Some(file.path()), &overrides).unwrap();

        assert_eq!(config.channel, "from-flag");
        assert_eq!(config.max_queue_size, 10);
        assert_eq!(config.runtime_secs, Some(30));
        assert!(matches!(config.sink, SinkConfig::Webhook { .. }));
    }

    #[test]
    fn secret_flag_replaces_file_secret() {
        use secrecy::ExposeSecret;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "channel = \"c\"\n\n[connection]\nsecret = \"from-file\"").unwrap();

        let overrides = ConfigOverrides {
            secret: Some("from-flag".to_string()),
            ..ConfigOverrides::default()
        };
        let config = resolve_config(Some(file.path()), &overrides).unwrap();

        assert_eq!(config.connection.secret.expose_secret(), "from-flag");
        assert!(!format!("{config:?}").contains("from-flag"));
    }

    #[test]
    fn missing_channel_fails_validation() {
        let err = resolve_config(None, &ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("channel"));
    }

    #[test]
    fn unreadable_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = resolve_config(Some(&path), &ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn bad_sink_spec_is_rejected() {
        let overrides = ConfigOverrides {
            channel: Some("c".to_string()),
            sink: Some("carrier-pigeon".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(resolve_config(None, &overrides).is_err());
    }
}
