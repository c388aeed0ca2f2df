//! Credential set loading and `.env` file mutation.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::parse::{overlay_text, parse_assignment};

/// Template file looked up next to the credential file.
pub const TEMPLATE_FILE: &str = ".env.example";

/// Content used when neither the credential file nor a template exists.
const MINIMAL_DEFAULTS: &str = "APP_ENV=development\nSITE_BASE_URL=http://localhost:8080\n";

/// In-memory view of the credential file.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    values: BTreeMap<String, String>,
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CredentialSet {
    /// Creates an empty credential set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Loads the credential set from a file. A missing file yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("Credential file {} not found, starting empty", path.display());
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::env_file(path, format!("Failed to read: {e}")))?;

        let set = Self::parse(&content);
        debug!("Loaded {} credentials from {}", set.len(), path.display());
        Ok(set)
    }

    /// Parses credential file content. Later duplicates win.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let values = content
            .lines()
            .filter_map(parse_assignment)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { values }
    }

    /// Returns the raw value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the value for a key if it is non-empty after trimming.
    #[must_use]
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Returns true if the key holds a non-empty value.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.non_empty(key).is_some()
    }

    /// Sets a single value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Applies a batch of updates in memory.
    pub fn apply(&mut self, updates: &BTreeMap<String, String>) {
        for (key, value) in updates {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Iterates over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of an overlay write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayOutcome {
    /// Keys rewritten in place.
    pub rewritten: Vec<String>,
    /// Keys appended under the marker comment.
    pub appended: Vec<String>,
    /// Whether the file content changed.
    pub changed: bool,
}

/// Result of bootstrapping the credential file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The file already existed and was left alone.
    AlreadyPresent,
    /// The file was created from the sibling template.
    FromTemplate,
    /// The file was created from minimal defaults.
    Minimal,
}

/// Rewrites the credential file with `updates`, touching only the named keys.
///
/// A missing file is created. Nothing is written when the content would not change.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written.
pub fn apply_overlay(
    path: impl AsRef<Path>,
    updates: &BTreeMap<String, String>,
) -> Result<OverlayOutcome> {
    let path = path.as_ref();
    let existing = if path.exists() {
        Some(
            fs::read_to_string(path)
                .map_err(|e| ConfigError::env_file(path, format!("Failed to read: {e}")))?,
        )
    } else {
        None
    };

    let result = overlay_text(existing.as_deref().unwrap_or_default(), updates);
    let changed = existing.as_deref() != Some(result.content.as_str());

    if changed {
        write_file(path, &result.content, existing.is_none())?;
        info!(
            "Updated {} ({} rewritten, {} added)",
            path.display(),
            result.rewritten.len(),
            result.appended.len()
        );
    } else {
        debug!("{} already up to date", path.display());
    }

    Ok(OverlayOutcome {
        rewritten: result.rewritten,
        appended: result.appended,
        changed,
    })
}

/// Creates the credential file if it does not exist.
///
/// Uses the sibling `.env.example` as a template when present, else minimal
/// defaults. `overlay` is applied on top of the new content.
///
/// # Errors
///
/// Returns an error if the template cannot be read or the file cannot be written.
pub fn bootstrap(
    path: impl AsRef<Path>,
    overlay: &BTreeMap<String, String>,
) -> Result<BootstrapOutcome> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(BootstrapOutcome::AlreadyPresent);
    }

    let template = template_path(path);
    let (base, outcome) = if template.exists() {
        let content = fs::read_to_string(&template)
            .map_err(|e| ConfigError::env_file(&template, format!("Failed to read: {e}")))?;
        (content, BootstrapOutcome::FromTemplate)
    } else {
        (MINIMAL_DEFAULTS.to_string(), BootstrapOutcome::Minimal)
    };

    let content = overlay_text(&base, overlay).content;
    write_file(path, &content, true)?;
    info!("Created {} ({outcome:?})", path.display());

    Ok(outcome)
}

/// Returns the template path that sits next to `path`.
#[must_use]
pub fn template_path(path: &Path) -> PathBuf {
    path.parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        .join(TEMPLATE_FILE)
}

fn write_file(path: &Path, content: &str, create: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| ConfigError::env_file(parent, format!("Failed to create directory: {e}")))?;
    }

    let mut options = OpenOptions::new();
    options.write(true).truncate(true).create(create);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if create {
            options.mode(0o600);
        }
    }

    let mut file = options
        .open(path)
        .map_err(|e| ConfigError::env_file(path, format!("Failed to open for writing: {e}")))?;
    file.write_all(content.as_bytes())
        .map_err(|e| ConfigError::env_file(path, format!("Failed to write: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn updates(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let set = CredentialSet::load(temp.path().join(".env")).expect("Failed to load");

        assert!(set.is_empty());
    }

    #[test]
    fn test_load_parses_assignments() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join(".env");
        fs::write(&path, "# header\nA=1\n\nexport B = two \nA=3\nEMPTY=\n").expect("write");

        let set = CredentialSet::load(&path).expect("Failed to load");

        assert_eq!(set.get("A"), Some("3"));
        assert_eq!(set.get("B"), Some("two"));
        assert_eq!(set.get("EMPTY"), Some(""));
        assert!(!set.has("EMPTY"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_debug_hides_values() {
        let set = CredentialSet::parse("NEON_TOKEN=super-secret\n");
        let debug = format!("{set:?}");

        assert!(debug.contains("NEON_TOKEN"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_apply_overlay_preserves_structure() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join(".env");
        fs::write(&path, "FOO=1\n# comment\nBAR=2\n").expect("write");

        let outcome =
            apply_overlay(&path, &updates(&[("BAR", "9"), ("BAZ", "7")])).expect("overlay");
        let content = fs::read_to_string(&path).expect("read");

        assert!(outcome.changed);
        assert!(content.contains("FOO=1\n"));
        assert!(content.contains("# comment\n"));
        assert!(content.contains("BAR=9\n"));
        assert!(!content.contains("BAR=2"));
        let marker = content.find("# Added by forge deploy wizard").expect("marker");
        let baz = content.find("BAZ=7").expect("BAZ");
        assert!(marker < baz);
    }

    #[test]
    fn test_apply_overlay_twice_is_noop() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join(".env");
        let changes = updates(&[("DATABASE_URL", "postgres://x")]);

        let first = apply_overlay(&path, &changes).expect("first");
        let content = fs::read_to_string(&path).expect("read");
        let second = apply_overlay(&path, &changes).expect("second");

        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(fs::read_to_string(&path).expect("read"), content);
    }

    #[test]
    fn test_bootstrap_from_template() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join(".env");
        fs::write(temp.path().join(TEMPLATE_FILE), "# app\nJWT_SECRET=\nPORT=8080\n")
            .expect("write");

        let outcome = bootstrap(&path, &updates(&[("JWT_SECRET", "abc")])).expect("bootstrap");
        let content = fs::read_to_string(&path).expect("read");

        assert_eq!(outcome, BootstrapOutcome::FromTemplate);
        assert_eq!(content, "# app\nJWT_SECRET=abc\nPORT=8080\n");
    }

    #[test]
    fn test_bootstrap_minimal_and_existing() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join(".env");

        let first = bootstrap(&path, &BTreeMap::new()).expect("bootstrap");
        let second = bootstrap(&path, &updates(&[("X", "1")])).expect("bootstrap");

        assert_eq!(first, BootstrapOutcome::Minimal);
        assert_eq!(second, BootstrapOutcome::AlreadyPresent);
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            "APP_ENV=development\nSITE_BASE_URL=http://localhost:8080\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_new_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join(".env");
        apply_overlay(&path, &updates(&[("K", "v")])).expect("overlay");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
