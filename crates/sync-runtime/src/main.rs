//! Playground Sync - process entry point.
//!
//! stdout belongs to the consumer protocol, so all logging goes to stderr.
//!
//! ## Environment
//!
//! | Variable               | Default     | Meaning                                   |
//! |------------------------|-------------|-------------------------------------------|
//! | `PORT`                 | `4242`      | HTTP port                                 |
//! | `SYNC_HOST`            | `127.0.0.1` | HTTP bind address                         |
//! | `SYNC_SUBMIT_TIMEOUT`  | unset       | Give up on a blocked submitter (`90s`)    |
//! | `SYNC_SWEEP_INTERVAL`  | `10s`       | Orphaned waiter sweep period              |
//! | `SYNC_CONSUMER_IDLE`   | `300s`      | Idle time before `connected` goes false   |
//! | `SYNC_EXIT_ON_EOF`     | `true`      | Stop when the consumer closes stdin       |
//! | `RUST_LOG`             | `info`      | Log filter                                |

use anyhow::{Context, Result};
use std::time::Duration;
use sync_broker::domain::config::parse_duration;
use sync_broker::{BrokerConfig, SyncService};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Load configuration from the environment.
fn load_config() -> BrokerConfig {
    apply_env(BrokerConfig::default(), |key| std::env::var(key).ok())
}

/// Override `config` with whatever `lookup` finds. Bad values are logged and
/// the default is kept.
fn apply_env(mut config: BrokerConfig, lookup: impl Fn(&str) -> Option<String>) -> BrokerConfig {
    if let Some(port) = lookup("PORT") {
        match port.trim().parse() {
            Ok(p) => config.http.port = p,
            Err(_) => warn!(value = %port, "PORT is not a valid port, using {}", config.http.port),
        }
    }

    if let Some(host) = lookup("SYNC_HOST") {
        match host.trim().parse() {
            Ok(h) => config.http.host = h,
            Err(_) => warn!(value = %host, "SYNC_HOST is not an IP address"),
        }
    }

    if let Some(timeout) = env_duration(&lookup, "SYNC_SUBMIT_TIMEOUT") {
        config.http.submit_timeout = Some(timeout);
    }

    if let Some(interval) = env_duration(&lookup, "SYNC_SWEEP_INTERVAL") {
        config.cleanup.interval = interval;
    }

    if let Some(idle) = env_duration(&lookup, "SYNC_CONSUMER_IDLE") {
        config.cleanup.consumer_idle_timeout = idle;
    }

    if let Some(flag) = lookup("SYNC_EXIT_ON_EOF") {
        match parse_flag(&flag) {
            Some(exit) => config.mcp.exit_on_eof = exit,
            None => warn!(value = %flag, "SYNC_EXIT_ON_EOF must be true or false"),
        }
    }

    config
}

fn env_duration(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match parse_duration(&raw) {
        Ok(d) if !d.is_zero() => Some(d),
        Ok(_) => {
            warn!(key, "Duration must be positive, ignoring");
            None
        }
        Err(e) => {
            warn!(key, value = %raw, error = e, "Invalid duration, ignoring");
            None
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config();
    info!(
        addr = %config.http_addr(),
        submit_timeout = ?config.http.submit_timeout,
        exit_on_eof = config.mcp.exit_on_eof,
        "Starting playground-sync v{}",
        sync_broker::VERSION
    );

    let service = SyncService::new(config).context("invalid configuration")?;
    service
        .run_stdio(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("broker stopped with an error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = apply_env(BrokerConfig::default(), env(&[]));
        assert_eq!(config.http.port, 4242);
        assert_eq!(config.http.submit_timeout, None);
        assert!(config.mcp.exit_on_eof);
    }

    #[test]
    fn test_env_overrides() {
        let config = apply_env(
            BrokerConfig::default(),
            env(&[
                ("PORT", "5151"),
                ("SYNC_HOST", "0.0.0.0"),
                ("SYNC_SUBMIT_TIMEOUT", "90s"),
                ("SYNC_SWEEP_INTERVAL", "500ms"),
                ("SYNC_CONSUMER_IDLE", "2m"),
                ("SYNC_EXIT_ON_EOF", "false"),
            ]),
        );

        assert_eq!(config.http_addr().to_string(), "0.0.0.0:5151");
        assert_eq!(config.http.submit_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.cleanup.interval, Duration::from_millis(500));
        assert_eq!(config.cleanup.consumer_idle_timeout, Duration::from_secs(120));
        assert!(!config.mcp.exit_on_eof);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = apply_env(
            BrokerConfig::default(),
            env(&[
                ("PORT", "not-a-port"),
                ("SYNC_HOST", "localhost"),
                ("SYNC_SUBMIT_TIMEOUT", "0"),
                ("SYNC_SWEEP_INTERVAL", "soon"),
                ("SYNC_CONSUMER_IDLE", "9223372036854775807m"),
                ("SYNC_EXIT_ON_EOF", "maybe"),
            ]),
        );

        assert_eq!(config.http_addr().to_string(), "127.0.0.1:4242");
        assert_eq!(config.http.submit_timeout, None);
        assert_eq!(config.cleanup.interval, Duration::from_secs(10));
        assert_eq!(config.cleanup.consumer_idle_timeout, Duration::from_secs(300));
        assert!(config.mcp.exit_on_eof);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
