//! Layered lookup of configuration values.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::envfile::CredentialSet;
use crate::error::{ConfigError, Result};

/// Snapshot of the process environment taken at startup.
#[derive(Clone, Default)]
pub struct ProcessEnv {
    vars: BTreeMap<String, String>,
}

impl fmt::Debug for ProcessEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessEnv")
            .field("len", &self.vars.len())
            .finish()
    }
}

impl ProcessEnv {
    /// Captures the current process environment. Non-UTF-8 entries are skipped.
    #[must_use]
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    /// Builds a snapshot from explicit pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns the raw value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Layers values read from a file over the snapshot.
    ///
    /// Existing variables are replaced only when `overload` is set.
    #[must_use]
    pub fn with_file_values(mut self, file: &CredentialSet, overload: bool) -> Self {
        for key in file.keys() {
            if !overload && self.vars.contains_key(key) {
                continue;
            }
            if let Some(value) = file.get(key) {
                self.vars.insert(key.to_string(), value.to_string());
            }
        }
        self
    }
}

/// Credential set layered over the process environment.
///
/// Values from the credential file win. Blank values count as unset.
#[derive(Debug, Clone, Copy)]
pub struct EnvSource<'a> {
    credentials: &'a CredentialSet,
    process: &'a ProcessEnv,
}

impl<'a> EnvSource<'a> {
    /// Creates a new layered source.
    #[must_use]
    pub const fn new(credentials: &'a CredentialSet, process: &'a ProcessEnv) -> Self {
        Self {
            credentials,
            process,
        }
    }

    /// Returns the first non-blank value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.credentials.non_empty(key).or_else(|| {
            self.process
                .get(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
    }

    /// Returns the value for `key` as an owned string.
    #[must_use]
    pub fn get_owned(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    /// Returns the value for `key`, or `default`.
    #[must_use]
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Returns true if `key` has a non-blank value.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the value for `key` or a missing-token error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingToken` if the key is unset or blank.
    pub fn require_token(&self, key: &str) -> Result<&'a str> {
        self.get(key)
            .ok_or_else(|| ConfigError::missing_token(key).into())
    }
}

/// Returns true when `.env` values should replace existing process variables.
///
/// Development setups (no `APP_ENV`, or `development`) let the file win.
#[must_use]
pub fn should_override(app_env: Option<&str>) -> bool {
    app_env.is_none_or(|v| v.trim().is_empty() || v.trim().eq_ignore_ascii_case("development"))
}

/// Loads a `.env` file into the process environment.
///
/// A missing file is not an error. Returns whether a file was loaded.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be parsed.
pub fn load_dotenv(path: impl AsRef<Path>, overload: bool) -> Result<bool> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("No .env file at {}", path.display());
        return Ok(false);
    }

    let loaded = if overload {
        dotenvy::from_path_override(path)
    } else {
        dotenvy::from_path(path)
    };
    loaded.map_err(|e| ConfigError::env_file(path, format!("Failed to load: {e}")))?;

    info!("Loaded environment from {}", path.display());
    Ok(true)
}

/// Loads `path` and captures the resulting process environment.
///
/// Lines dotenvy rejects (unquoted spaces, quotes or backslashes) are not
/// fatal: the file is then read verbatim to end of line, like the
/// credential file, and layered over the snapshot.
#[must_use]
pub fn load_process_env(path: impl AsRef<Path>, overload: bool) -> ProcessEnv {
    let path = path.as_ref();
    let error = match load_dotenv(path, overload) {
        Ok(_) => return ProcessEnv::capture(),
        Err(e) => e,
    };

    warn!("{error}; reading values verbatim instead");
    let process = ProcessEnv::capture();
    match CredentialSet::load(path) {
        Ok(file) => process.with_file_values(&file, overload),
        Err(e) => {
            warn!("{e}");
            process
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_win_over_process() {
        let credentials = CredentialSet::parse("NEON_TOKEN=from-file\nBLANK=\n");
        let process = ProcessEnv::from_pairs([
            ("NEON_TOKEN", "from-process"),
            ("BLANK", "process-value"),
            ("ONLY_PROCESS", "  x  "),
        ]);
        let env = EnvSource::new(&credentials, &process);

        assert_eq!(env.get("NEON_TOKEN"), Some("from-file"));
        assert_eq!(env.get("BLANK"), Some("process-value"));
        assert_eq!(env.get("ONLY_PROCESS"), Some("x"));
        assert_eq!(env.get("MISSING"), None);
        assert_eq!(env.get_or("MISSING", "dflt"), "dflt");
    }

    #[test]
    fn test_require_token_reports_name() {
        let credentials = CredentialSet::new();
        let process = ProcessEnv::default();
        let env = EnvSource::new(&credentials, &process);

        let err = env.require_token("AIVEN_TOKEN").expect_err("should be missing");
        assert!(err.to_string().contains("AIVEN_TOKEN is not set"));
    }

    #[test]
    fn test_should_override() {
        assert!(should_override(None));
        assert!(should_override(Some("")));
        assert!(should_override(Some("Development")));
        assert!(!should_override(Some("production")));
    }

    #[test]
    fn test_file_values_respect_overload() {
        let file = CredentialSet::parse("APP_NAME=My App\nSHARED=from-file\n");
        let process = || ProcessEnv::from_pairs([("SHARED", "from-process")]);

        let kept = process().with_file_values(&file, false);
        assert_eq!(kept.get("SHARED"), Some("from-process"));
        assert_eq!(kept.get("APP_NAME"), Some("My App"));

        let replaced = process().with_file_values(&file, true);
        assert_eq!(replaced.get("SHARED"), Some("from-file"));
    }

    #[test]
    fn test_startup_accepts_unquoted_values() {
        let temp = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join(".env");
        std::fs::write(
            &path,
            "FORGE_ENV_TEST_NAME=My App\nFORGE_ENV_TEST_GREETING=it's fine\nFORGE_ENV_TEST_CMD=echo \"hi\" there\nFORGE_ENV_TEST_BS=a\\b\n",
        )
        .expect("write env");

        let process = load_process_env(&path, true);

        assert_eq!(process.get("FORGE_ENV_TEST_NAME"), Some("My App"));
        assert_eq!(process.get("FORGE_ENV_TEST_GREETING"), Some("it's fine"));
        assert_eq!(process.get("FORGE_ENV_TEST_CMD"), Some("echo \"hi\" there"));
        assert_eq!(process.get("FORGE_ENV_TEST_BS"), Some("a\\b"));
    }

    #[test]
    fn test_startup_without_file_captures_process() {
        let temp = tempfile::TempDir::new().expect("Failed to create temp dir");

        let process = load_process_env(temp.path().join(".env"), true);

        assert!(process.get("FORGE_ENV_TEST_ABSENT").is_none());
    }
}
