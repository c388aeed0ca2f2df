//! Required secrets and their presence report.

use rand::RngCore;
use serde::Serialize;

use super::env::EnvSource;
use super::settings::{ProviderMode, WizardOptions, vars};

/// Number of random bytes in a generated secret.
const SECRET_BYTES: usize = 32;

/// How a required value is obtained when missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    /// Random value generated on request.
    Generated,
    /// Provider token the user has to supply.
    Token,
    /// Plain setting with a suggested default.
    Setting,
    /// Filled in by a provisioning step; never prompted.
    Provisioned,
}

/// A value the deployed application or a provider step needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequiredSecret {
    /// Variable name.
    pub key: &'static str,
    /// Short description.
    pub description: &'static str,
    /// How it is obtained.
    pub kind: SecretKind,
}

impl RequiredSecret {
    const fn new(key: &'static str, description: &'static str, kind: SecretKind) -> Self {
        Self {
            key,
            description,
            kind,
        }
    }

    /// Returns true if the value must never be echoed.
    #[must_use]
    pub const fn is_secret(&self) -> bool {
        matches!(
            self.kind,
            SecretKind::Generated | SecretKind::Token | SecretKind::Provisioned
        )
    }

    /// Returns true if the wizard may ask the user for this value.
    #[must_use]
    pub const fn is_promptable(&self) -> bool {
        !matches!(self.kind, SecretKind::Provisioned)
    }

    /// Suggested value offered at the prompt.
    #[must_use]
    pub fn suggested_default(&self) -> Option<String> {
        match self.kind {
            SecretKind::Generated => Some(generate_secret()),
            SecretKind::Setting if self.key == vars::SITE_BASE_URL => {
                Some(String::from("http://localhost:8080"))
            }
            _ => None,
        }
    }
}

/// Lists the values a run with `options` depends on.
///
/// Provider tokens are only listed for `Auto` steps whose connection
/// string is not already configured.
#[must_use]
pub fn required_secrets(options: &WizardOptions, env: &EnvSource<'_>) -> Vec<RequiredSecret> {
    let mut required = vec![
        RequiredSecret::new(vars::JWT_SECRET, "token signing secret", SecretKind::Generated),
        RequiredSecret::new(vars::CSRF_SECRET, "CSRF protection secret", SecretKind::Generated),
        RequiredSecret::new(vars::SITE_BASE_URL, "public base URL", SecretKind::Setting),
    ];

    if options.database != ProviderMode::Skip {
        required.push(RequiredSecret::new(
            vars::DATABASE_URL,
            "Postgres connection string",
            SecretKind::Provisioned,
        ));
        if options.database == ProviderMode::Auto && !env.has(vars::DATABASE_URL) {
            required.push(RequiredSecret::new(
                vars::NEON_TOKEN,
                "database platform API token",
                SecretKind::Token,
            ));
        }
    }

    if options.cache != ProviderMode::Skip {
        required.push(RequiredSecret::new(
            vars::REDIS_URL,
            "Valkey/Redis connection string",
            SecretKind::Provisioned,
        ));
        if options.cache == ProviderMode::Auto && !env.has(vars::REDIS_URL) {
            required.push(RequiredSecret::new(
                vars::AIVEN_TOKEN,
                "cache platform API token",
                SecretKind::Token,
            ));
            for (key, description) in [
                (vars::AIVEN_PROJECT, "cache platform project"),
                (vars::AIVEN_CLOUD, "cache cloud region"),
                (vars::AIVEN_PLAN, "cache service plan"),
            ] {
                required.push(RequiredSecret::new(key, description, SecretKind::Setting));
            }
        }
    }

    required
}

/// Presence of one value. Never carries the value itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretStatus {
    /// Variable name.
    pub key: String,
    /// Short description.
    pub description: String,
    /// Whether the value must never be echoed.
    pub secret: bool,
    /// Whether a non-blank value is set.
    pub present: bool,
}

/// Presence report over a list of values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecretReport {
    /// One entry per value, in request order.
    pub entries: Vec<SecretStatus>,
}

impl SecretReport {
    /// Checks each required value against the environment.
    #[must_use]
    pub fn build(required: &[RequiredSecret], env: &EnvSource<'_>) -> Self {
        let entries = required
            .iter()
            .map(|r| SecretStatus {
                key: r.key.to_string(),
                description: r.description.to_string(),
                secret: r.is_secret(),
                present: env.has(r.key),
            })
            .collect();
        Self { entries }
    }

    /// Keys that are not set.
    #[must_use]
    pub fn missing(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| !e.present)
            .map(|e| e.key.as_str())
            .collect()
    }

    /// Returns true if every value is set.
    #[must_use]
    pub fn all_present(&self) -> bool {
        self.entries.iter().all(|e| e.present)
    }
}

/// Generates a 32-byte random secret, hex-encoded.
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
