//! Runtime configuration from the environment (and `.env` via dotenvy)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// How long a disconnected participant keeps their seat
    pub grace_period: Duration,
    /// Slack after a phase deadline before the timeout fires
    pub timeout_grace: Duration,
    /// Interval of `time_remaining` broadcasts
    pub tick_interval: Duration,
    /// Static client served at `/`
    pub static_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 7480,
            grace_period: Duration::from_secs(60),
            timeout_grace: Duration::from_secs(2),
            tick_interval: Duration::from_secs(10),
            static_dir: "static".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(value) => match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!("Ignoring invalid {}={:?}", key, value);
                None
            }
        },
        Err(_) => None,
    }
}

impl EngineConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind = env_parse("SKETCHRELAY_BIND").unwrap_or(defaults.bind);
        let port = env_parse("SKETCHRELAY_PORT").unwrap_or(defaults.port);
        let grace_period = env_parse("SKETCHRELAY_GRACE_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.grace_period);
        let timeout_grace = env_parse("SKETCHRELAY_TIMEOUT_GRACE_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout_grace);
        // A zero interval would make tokio panic
        let tick_interval = env_parse::<u64>("SKETCHRELAY_TICK_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.tick_interval);
        let static_dir = std::env::var("SKETCHRELAY_STATIC_DIR").unwrap_or(defaults.static_dir);

        tracing::info!(
            %bind,
            port,
            grace_secs = grace_period.as_secs(),
            timeout_grace_secs = timeout_grace.as_secs(),
            tick_secs = tick_interval.as_secs(),
            static_dir = %static_dir,
            "Engine config loaded"
        );

        Self {
            bind,
            port,
            grace_period,
            timeout_grace,
            tick_interval,
            static_dir,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}
