use std::time::Duration;

/// Process-wide tunables, read once at startup. Every value has a default
/// and an environment-variable override.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// How long a seated player may stay disconnected before the game is
    /// forfeited as abandoned.
    pub disconnect_grace: Duration,
    /// How long a finished room is kept around for rematch offers.
    pub room_ttl_after_end: Duration,
    /// Application-level ping cadence for connection liveness.
    pub ping_interval: Duration,
    /// Time control used when a client does not pick one, and when two
    /// wildcard queue entries are paired.
    pub default_time_control: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "0.0.0.0:8080".to_string(),
            disconnect_grace: Duration::from_millis(60_000),
            room_ttl_after_end: Duration::from_millis(300_000),
            ping_interval: Duration::from_millis(30_000),
            default_time_control: "5+0".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = ServerConfig::default();
        ServerConfig {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            disconnect_grace: env_ms("DISCONNECT_GRACE_MS", defaults.disconnect_grace),
            room_ttl_after_end: env_ms("ROOM_TTL_AFTER_END_MS", defaults.room_ttl_after_end),
            ping_interval: env_ms("PING_INTERVAL_MS", defaults.ping_interval),
            default_time_control: std::env::var("DEFAULT_TIME_CONTROL")
                .unwrap_or(defaults.default_time_control),
        }
    }
}

fn env_ms(name: &str, default: Duration) -> Duration {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                tracing::warn!("Ignoring non-numeric {}: {:?}", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}
