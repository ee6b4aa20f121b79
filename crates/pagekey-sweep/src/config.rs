//! Sweep configuration.

use pagekey_core::defaults::SWEEP_ON_STARTUP;

/// Configuration for the reconciliation sweep.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Dispatch a scan when the process starts.
    pub on_startup: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            on_startup: SWEEP_ON_STARTUP,
        }
    }
}

impl SweepConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PAGEKEY_SWEEP_ON_STARTUP` | `false` | Run a sweep when the process starts |
    pub fn from_env() -> Self {
        let on_startup = std::env::var("PAGEKEY_SWEEP_ON_STARTUP")
            .map(|v| parse_flag(&v))
            .unwrap_or(SWEEP_ON_STARTUP);

        Self { on_startup }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_default_is_off() {
        assert!(!SweepConfig::default().on_startup);
    }
}
