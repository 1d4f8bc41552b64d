use std::time::Duration;

use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Chat webhook that receives burst summaries. `None` disables ingestion.
    pub webhook_url: Option<String>,
    pub aggregation_window_ms: u64,
    pub hold_ms: u64,
    pub debug_max_chars: usize,
    pub rdns_timeout_ms: u64,
    pub count_mode: CountMode,
    /// Timezone used to render "first → last" timestamps in messages.
    pub display_timezone: Tz,
    pub geoip_path: String,
    /// Destination of the tracked-link redirect at `GET /go`.
    pub redirect_url: String,
}

/// What happens to a burst's tally once it has been flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    /// Count keeps growing across flushes until the key is evicted.
    Accumulate,
    /// The first merge after a flush starts a fresh tally in the same burst.
    Reset,
}

/// The subset of [`Config`] the aggregation store runs on.
#[derive(Debug, Clone, Copy)]
pub struct AggregationSettings {
    pub window: Duration,
    pub hold: Duration,
    pub count_mode: CountMode,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source. `from_env` is the
    /// production entry point; tests pass a closure over a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            port: non_empty("BURSTWATCH_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            webhook_url: non_empty("BURSTWATCH_WEBHOOK_URL")
                .or_else(|| non_empty("DISCORD_WEBHOOK_URL")),
            aggregation_window_ms: parse_number(
                "BURSTWATCH_AGG_WINDOW_MS",
                non_empty("BURSTWATCH_AGG_WINDOW_MS"),
                3_500,
            )?,
            hold_ms: parse_number("BURSTWATCH_HOLD_MS", non_empty("BURSTWATCH_HOLD_MS"), 12_000)?,
            debug_max_chars: parse_number(
                "BURSTWATCH_DEBUG_MAX_CHARS",
                non_empty("BURSTWATCH_DEBUG_MAX_CHARS"),
                1_400,
            )?,
            rdns_timeout_ms: parse_number(
                "BURSTWATCH_RDNS_TIMEOUT_MS",
                non_empty("BURSTWATCH_RDNS_TIMEOUT_MS"),
                350,
            )?,
            count_mode: {
                let raw =
                    non_empty("BURSTWATCH_COUNT_MODE").unwrap_or_else(|| "accumulate".to_string());
                match raw.trim().to_ascii_lowercase().as_str() {
                    "accumulate" => CountMode::Accumulate,
                    "reset" => CountMode::Reset,
                    other => return Err(format!("invalid BURSTWATCH_COUNT_MODE: {other}")),
                }
            },
            display_timezone: {
                let raw = non_empty("BURSTWATCH_DISPLAY_TZ")
                    .unwrap_or_else(|| "America/Los_Angeles".to_string());
                raw.trim()
                    .parse::<Tz>()
                    .map_err(|e| format!("invalid BURSTWATCH_DISPLAY_TZ: {e}"))?
            },
            geoip_path: non_empty("BURSTWATCH_GEOIP_PATH")
                .unwrap_or_else(|| "./GeoLite2-City.mmdb".to_string()),
            redirect_url: non_empty("BURSTWATCH_REDIRECT_URL")
                .or_else(|| non_empty("DEST_URL"))
                .unwrap_or_else(|| "https://example.com/".to_string()),
        })
    }

    pub fn aggregation_window(&self) -> Duration {
        Duration::from_millis(self.aggregation_window_ms)
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    pub fn rdns_timeout(&self) -> Duration {
        Duration::from_millis(self.rdns_timeout_ms)
    }

    pub fn aggregation_settings(&self) -> AggregationSettings {
        AggregationSettings {
            window: self.aggregation_window(),
            hold: self.hold(),
            count_mode: self.count_mode,
        }
    }
}

fn parse_number<T>(name: &str, raw: Option<String>, default: T) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| format!("invalid {name}: {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = config_from(&[]).expect("defaults");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.webhook_url, None);
        assert_eq!(cfg.aggregation_window_ms, 3_500);
        assert_eq!(cfg.hold_ms, 12_000);
        assert_eq!(cfg.debug_max_chars, 1_400);
        assert_eq!(cfg.rdns_timeout_ms, 350);
        assert_eq!(cfg.count_mode, CountMode::Accumulate);
        assert_eq!(cfg.display_timezone, chrono_tz::America::Los_Angeles);
    }

    #[test]
    fn legacy_webhook_variable_is_honoured() {
        let cfg = config_from(&[("DISCORD_WEBHOOK_URL", "https://discord.test/hook")])
            .expect("config");
        assert_eq!(cfg.webhook_url.as_deref(), Some("https://discord.test/hook"));

        let cfg = config_from(&[
            ("DISCORD_WEBHOOK_URL", "https://discord.test/old"),
            ("BURSTWATCH_WEBHOOK_URL", "https://discord.test/new"),
        ])
        .expect("config");
        assert_eq!(cfg.webhook_url.as_deref(), Some("https://discord.test/new"));
    }

    #[test]
    fn tunables_are_read_from_environment() {
        let cfg = config_from(&[
            ("BURSTWATCH_AGG_WINDOW_MS", "3000"),
            ("BURSTWATCH_HOLD_MS", "500"),
            ("BURSTWATCH_DEBUG_MAX_CHARS", "200"),
            ("BURSTWATCH_RDNS_TIMEOUT_MS", "50"),
            ("BURSTWATCH_COUNT_MODE", "Reset"),
            ("BURSTWATCH_DISPLAY_TZ", "Europe/Berlin"),
        ])
        .expect("config");
        let settings = cfg.aggregation_settings();
        assert_eq!(settings.window, Duration::from_millis(3000));
        assert_eq!(settings.hold, Duration::from_millis(500));
        assert_eq!(settings.count_mode, CountMode::Reset);
        assert_eq!(cfg.debug_max_chars, 200);
        assert_eq!(cfg.rdns_timeout(), Duration::from_millis(50));
        assert_eq!(cfg.display_timezone, chrono_tz::Europe::Berlin);
    }

    #[test]
    fn malformed_values_are_startup_errors() {
        assert!(config_from(&[("BURSTWATCH_HOLD_MS", "soon")]).is_err());
        assert!(config_from(&[("BURSTWATCH_COUNT_MODE", "sometimes")]).is_err());
        assert!(config_from(&[("BURSTWATCH_DISPLAY_TZ", "Mars/Olympus")]).is_err());
    }
}
