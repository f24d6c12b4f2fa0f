use std::str::FromStr;
use std::time::Duration;

/// Runtime settings, read from `ROOMKEEPER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Delay after booking before an unoccupied reservation is withdrawn.
    pub grace_period: Duration,
    /// Occupant count at which a room counts as in use.
    pub occupancy_threshold: u32,
    /// How far in the past a reservation may start and still be accepted.
    pub start_tolerance: Duration,
    pub metrics_port: Option<u16>,
    /// `(rooms, default capacity)` to configure the office at startup.
    pub office: Option<(u32, u32)>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(300),
            occupancy_threshold: 2,
            start_tolerance: Duration::from_secs(60),
            metrics_port: None,
            office: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
    Incomplete(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
            ConfigError::Incomplete(msg) => write!(f, "incomplete configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build settings from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let grace_period = parse_var::<u64>(&lookup, "ROOMKEEPER_GRACE_SECS")?
            .map_or(defaults.grace_period, Duration::from_secs);
        let occupancy_threshold = parse_var(&lookup, "ROOMKEEPER_OCCUPANCY_THRESHOLD")?
            .unwrap_or(defaults.occupancy_threshold);
        let start_tolerance = parse_var::<u64>(&lookup, "ROOMKEEPER_START_TOLERANCE_SECS")?
            .map_or(defaults.start_tolerance, Duration::from_secs);
        let metrics_port = parse_var(&lookup, "ROOMKEEPER_METRICS_PORT")?;

        let rooms = parse_var::<u32>(&lookup, "ROOMKEEPER_ROOMS")?;
        let capacity = parse_var::<u32>(&lookup, "ROOMKEEPER_DEFAULT_CAPACITY")?;
        let office = match (rooms, capacity) {
            (Some(r), Some(c)) => Some((r, c)),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Incomplete(
                    "ROOMKEEPER_ROOMS and ROOMKEEPER_DEFAULT_CAPACITY must be set together",
                ));
            }
        };

        Ok(Self {
            grace_period,
            occupancy_threshold,
            start_tolerance,
            metrics_port,
            office,
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = lookup(var) else { return Ok(None) };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Invalid { var, value: raw })
}
