use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    backoff::BackoffPolicy,
    deep_search::DeepSearchConfig,
    domain::{CredentialDefaults, SearchType},
    logging::LogFormat,
    Result,
};

/// Typed run configuration, read once from the environment (plus `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Platform credentials (process-wide defaults)
    pub api_id: Option<i64>,
    pub api_hash: Option<String>,

    // Search
    pub search_type: SearchType,
    pub limit: usize,
    pub deep_search: DeepSearchConfig,

    // Files
    pub accounts_dir: PathBuf,
    pub dead_dir: PathBuf,
    pub proxy_file: PathBuf,
    pub queries_file: PathBuf,
    pub results_channels: PathBuf,
    pub results_chats: PathBuf,
    pub run_report_file: Option<PathBuf>,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
    pub log_file: Option<PathBuf>,

    // Backoff
    pub base_backoff: Duration,
    pub backoff_cap: Duration,
    pub rate_limit_max_waits: u32,

    // Session gateway
    pub gateway_url: String,
    pub gateway_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process environment in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let api_id = get("TG_API_ID")
            .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
            .and_then(|s| s.parse::<i64>().ok());
        let api_hash = get("TG_API_HASH").and_then(non_empty);

        let search_type = match get("SEARCH_TYPE").and_then(non_empty) {
            Some(s) => s.parse::<SearchType>()?,
            None => SearchType::All,
        };
        let limit = get("LIMIT")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(50);

        let accounts_dir = PathBuf::from(get("ACCOUNTS_DIR").unwrap_or("Accounts".to_string()));
        let dead_dir = get("DEAD_DIR")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| accounts_dir.join("dead"));
        let proxy_file = PathBuf::from(get("PROXY_FILE").unwrap_or("proxy.txt".to_string()));
        let queries_file = PathBuf::from(get("QUERIES_FILE").unwrap_or("queries.txt".to_string()));
        let results_channels = PathBuf::from(
            get("RESULTS_CHANNELS").unwrap_or("results_channels.txt".to_string()),
        );
        let results_chats =
            PathBuf::from(get("RESULTS_CHATS").unwrap_or("results_chats.txt".to_string()));
        let run_report_file = get("RUN_REPORT_FILE").and_then(non_empty).map(PathBuf::from);

        let log_level = get("LOG_LEVEL")
            .and_then(non_empty)
            .unwrap_or("info".to_string())
            .to_lowercase();
        let log_format = get("LOG_FORMAT")
            .map(|s| LogFormat::from_setting(&s))
            .unwrap_or_default();
        let log_file = get("LOG_FILE").and_then(non_empty).map(PathBuf::from);

        let base_backoff = secs(get("BASE_BACKOFF")).unwrap_or(Duration::from_secs(1));
        let backoff_cap = secs(get("BACKOFF_CAP")).unwrap_or(Duration::from_secs(60));
        let rate_limit_max_waits = get("RATE_LIMIT_MAX_WAITS")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(10);

        let deep_search = DeepSearchConfig {
            enabled: flag_default_on(get("DEEP_SEARCH")),
            letters: flag_default_on(get("DEEP_LETTERS")),
            digits: flag_default_on(get("DEEP_DIGITS")),
            min_len_gate: get("DEEP_MIN_LEN")
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(2),
        };

        let gateway_url = get("GATEWAY_URL")
            .and_then(non_empty)
            .unwrap_or("http://127.0.0.1:8081".to_string());
        let gateway_timeout = Duration::from_secs(
            get("GATEWAY_TIMEOUT_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(30),
        );

        Ok(Self {
            api_id,
            api_hash,
            search_type,
            limit,
            deep_search,
            accounts_dir,
            dead_dir,
            proxy_file,
            queries_file,
            results_channels,
            results_chats,
            run_report_file,
            log_level,
            log_format,
            log_file,
            base_backoff,
            backoff_cap,
            rate_limit_max_waits,
            gateway_url,
            gateway_timeout,
        })
    }

    pub fn credential_defaults(&self) -> CredentialDefaults {
        CredentialDefaults {
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.base_backoff, self.backoff_cap)
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for (key, val) in contents.lines().filter_map(dotenv_entry) {
        // The real environment always wins over the file.
        if env::var_os(key).is_none() {
            env::set_var(key, val);
        }
    }
}

/// `KEY=value` with optional matching quotes; blanks and `#` comments yield
/// nothing.
fn dotenv_entry(raw: &str) -> Option<(&str, &str)> {
    let line = raw.trim();
    if line.starts_with('#') {
        return None;
    }
    let (key, val) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let val = val.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| val.strip_prefix(*q)?.strip_suffix(*q))
        .unwrap_or(val);
    Some((key, unquoted))
}

/// Switches that are on unless explicitly turned off.
fn flag_default_on(v: Option<String>) -> bool {
    match v {
        Some(s) => !matches!(s.to_lowercase().as_str(), "0" | "false" | "no" | "off"),
        None => true,
    }
}

/// Non-negative, finite seconds (fractions allowed).
fn secs(v: Option<String>) -> Option<Duration> {
    let f = v?.parse::<f64>().ok()?;
    if !f.is_finite() || f < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(f).ok()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = from_pairs(&[]).unwrap();
        assert_eq!(cfg.api_id, None);
        assert_eq!(cfg.search_type, SearchType::All);
        assert_eq!(cfg.limit, 50);
        assert_eq!(cfg.dead_dir, PathBuf::from("Accounts/dead"));
        assert_eq!(cfg.deep_search, DeepSearchConfig::default());
        assert_eq!(cfg.base_backoff, Duration::from_secs(1));
        assert_eq!(cfg.backoff_cap, Duration::from_secs(60));
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.log_format, LogFormat::Full);
        assert!(cfg.log_file.is_none());
    }

    #[test]
    fn reads_overrides() {
        let cfg = from_pairs(&[
            ("TG_API_ID", "12345"),
            ("TG_API_HASH", "abc"),
            ("SEARCH_TYPE", "CHAT"),
            ("LIMIT", "7"),
            ("ACCOUNTS_DIR", "/data/acc"),
            ("BASE_BACKOFF", "0.5"),
            ("DEEP_DIGITS", "false"),
            ("DEEP_MIN_LEN", "4"),
            ("LOG_LEVEL", "DEBUG"),
            ("LOG_FORMAT", "compact"),
        ])
        .unwrap();
        assert_eq!(cfg.api_id, Some(12345));
        assert_eq!(cfg.credential_defaults().api_hash.as_deref(), Some("abc"));
        assert_eq!(cfg.search_type, SearchType::Chat);
        assert_eq!(cfg.limit, 7);
        assert_eq!(cfg.dead_dir, PathBuf::from("/data/acc/dead"));
        assert_eq!(cfg.backoff().base, Duration::from_millis(500));
        assert!(!cfg.deep_search.digits);
        assert!(cfg.deep_search.letters);
        assert_eq!(cfg.deep_search.min_len_gate, 4);
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.log_format, LogFormat::Compact);
    }

    #[test]
    fn dotenv_lines_are_split_and_unquoted() {
        assert_eq!(dotenv_entry("LIMIT=10"), Some(("LIMIT", "10")));
        assert_eq!(
            dotenv_entry(" TG_API_HASH = \"ab cd\" "),
            Some(("TG_API_HASH", "ab cd"))
        );
        assert_eq!(dotenv_entry("X='1'"), Some(("X", "1")));
        assert_eq!(dotenv_entry("Y=\"unbalanced"), Some(("Y", "\"unbalanced")));
        assert_eq!(dotenv_entry("# LIMIT=3"), None);
        assert_eq!(dotenv_entry(""), None);
        assert_eq!(dotenv_entry("=orphan"), None);
        assert_eq!(dotenv_entry("novalue"), None);
    }

    #[test]
    fn non_digit_api_id_is_ignored() {
        let cfg = from_pairs(&[("TG_API_ID", "-5")]).unwrap();
        assert_eq!(cfg.api_id, None);
    }

    #[test]
    fn bad_backoff_values_fall_back() {
        let cfg = from_pairs(&[("BASE_BACKOFF", "-1"), ("BACKOFF_CAP", "nan")]).unwrap();
        assert_eq!(cfg.base_backoff, Duration::from_secs(1));
        assert_eq!(cfg.backoff_cap, Duration::from_secs(60));
    }

    #[test]
    fn invalid_search_type_is_a_config_error() {
        assert!(from_pairs(&[("SEARCH_TYPE", "users")]).is_err());
    }
}
