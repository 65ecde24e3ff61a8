//! `relaybot check-config`: resolve a configuration and print it.

use anyhow::Context;
use relaybot_types::config::BridgeConfig;

use super::{CheckConfigArgs, resolve_config};

pub fn check_config(args: &CheckConfigArgs) -> anyhow::Result<()> {
    let config = resolve_config(Some(&args.config), &args.overrides)?;
    println!("{}", render(&config, args.json)?);
    Ok(())
}

/// Render `config` as TOML or pretty JSON. The secret is never serialized.
fn render(config: &BridgeConfig, json: bool) -> anyhow::Result<String> {
    if json {
        serde_json::to_string_pretty(config).context("failed to encode configuration as JSON")
    } else {
        toml::to_string_pretty(config).context("failed to encode configuration as TOML")
    }
}
