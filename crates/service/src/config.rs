#![forbid(unsafe_code)]

use crm_storage::StoreConfig;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_STORAGE_DIR: &str = ".crm_rust";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ServiceConfig {
    pub(crate) storage_dir: PathBuf,
    pub(crate) store: StoreConfig,
}

impl ServiceConfig {
    /// Flags win over environment variables; both fall back to defaults.
    pub(crate) fn parse(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        let mut storage_dir = env("CRM_STORAGE_DIR").filter(|v| !v.trim().is_empty());
        let mut busy_timeout = env("CRM_BUSY_TIMEOUT_MS");
        let mut retry_attempts = env("CRM_RETRY_ATTEMPTS");

        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            let slot = match arg.as_str() {
                "--storage-dir" => &mut storage_dir,
                "--busy-timeout-ms" => &mut busy_timeout,
                "--retry-attempts" => &mut retry_attempts,
                other => return Err(format!("unknown argument: {other}")),
            };
            let Some(value) = iter.next() else {
                return Err(format!("{arg} requires a value"));
            };
            *slot = Some(value.clone());
        }

        let busy_timeout_ms = match busy_timeout {
            Some(raw) => parse_number::<u64>("busy timeout", &raw)?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };
        let retry_attempts = match retry_attempts {
            Some(raw) => parse_number::<u32>("retry attempts", &raw)?,
            None => DEFAULT_RETRY_ATTEMPTS,
        };

        Ok(Self {
            storage_dir: PathBuf::from(
                storage_dir.unwrap_or_else(|| DEFAULT_STORAGE_DIR.to_string()),
            ),
            store: StoreConfig {
                busy_timeout: Duration::from_millis(busy_timeout_ms),
                retry_attempts: retry_attempts.clamp(1, 10),
                ..StoreConfig::default()
            },
        })
    }
}

fn parse_number<T: std::str::FromStr>(what: &str, raw: &str) -> Result<T, String> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| format!("invalid {what}: {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("crm_service")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn defaults_apply_without_flags_or_env() {
        let config = ServiceConfig::parse(&args(&[]), |_| None).unwrap();
        assert_eq!(config.storage_dir, PathBuf::from(".crm_rust"));
        assert_eq!(config.store.busy_timeout, Duration::from_millis(5_000));
        assert_eq!(config.store.retry_attempts, 3);
    }

    #[test]
    fn flags_override_environment() {
        let env = |key: &str| match key {
            "CRM_STORAGE_DIR" => Some("/from/env".to_string()),
            "CRM_RETRY_ATTEMPTS" => Some("5".to_string()),
            _ => None,
        };
        let config =
            ServiceConfig::parse(&args(&["--storage-dir", "/from/flag"]), env).unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("/from/flag"));
        assert_eq!(config.store.retry_attempts, 5);
    }

    #[test]
    fn retry_attempts_are_clamped() {
        let high = ServiceConfig::parse(&args(&["--retry-attempts", "99"]), |_| None).unwrap();
        assert_eq!(high.store.retry_attempts, 10);
        let low = ServiceConfig::parse(&args(&["--retry-attempts", "0"]), |_| None).unwrap();
        assert_eq!(low.store.retry_attempts, 1);
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(ServiceConfig::parse(&args(&["--busy-timeout-ms", "soon"]), |_| None).is_err());
        assert!(ServiceConfig::parse(&args(&["--storage-dir"]), |_| None).is_err());
        assert!(ServiceConfig::parse(&args(&["--verbose"]), |_| None).is_err());
    }
}
