//! Provider settings resolved from the layered environment.

use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use super::env::EnvSource;

/// Names of the variables read and written by forge.
pub mod vars {
    /// Postgres connection string.
    pub const DATABASE_URL: &str = "DATABASE_URL";
    /// Redis-compatible connection string.
    pub const REDIS_URL: &str = "REDIS_URL";
    /// Application environment name.
    pub const APP_ENV: &str = "APP_ENV";
    /// Public base URL of the application.
    pub const SITE_BASE_URL: &str = "SITE_BASE_URL";
    /// Token signing secret.
    pub const JWT_SECRET: &str = "JWT_SECRET";
    /// CSRF token secret.
    pub const CSRF_SECRET: &str = "CSRF_SECRET";

    /// Database platform API token.
    pub const NEON_TOKEN: &str = "NEON_TOKEN";
    /// Database platform API base URL.
    pub const NEON_API_URL: &str = "NEON_API_URL";
    /// Database project name.
    pub const NEON_PROJECT_NAME: &str = "NEON_PROJECT_NAME";
    /// Database branch name.
    pub const NEON_BRANCH_NAME: &str = "NEON_BRANCH_NAME";
    /// Database name.
    pub const NEON_DB_NAME: &str = "NEON_DB_NAME";
    /// Database role name.
    pub const NEON_DB_USER: &str = "NEON_DB_USER";
    /// Database role password.
    pub const NEON_DB_PASSWORD: &str = "NEON_DB_PASSWORD";
    /// Database region.
    pub const NEON_REGION: &str = "NEON_REGION";

    /// Cache platform API token.
    pub const AIVEN_TOKEN: &str = "AIVEN_TOKEN";
    /// Cache platform API base URL.
    pub const AIVEN_API_URL: &str = "AIVEN_API_URL";
    /// Cache platform project.
    pub const AIVEN_PROJECT: &str = "AIVEN_PROJECT";
    /// Cache cloud/region.
    pub const AIVEN_CLOUD: &str = "AIVEN_CLOUD";
    /// Cache service plan.
    pub const AIVEN_PLAN: &str = "AIVEN_PLAN";
    /// Cache service name.
    pub const AIVEN_SERVICE_NAME: &str = "AIVEN_SERVICE_NAME";
    /// Cache service type.
    pub const AIVEN_SERVICE_TYPE: &str = "AIVEN_SERVICE_TYPE";

    /// Deploy project token.
    pub const RAILWAY_TOKEN: &str = "RAILWAY_TOKEN";
    /// Deploy account token.
    pub const RAILWAY_API_TOKEN: &str = "RAILWAY_API_TOKEN";

    /// Build command run before deploying.
    pub const FORGE_BUILD_CMD: &str = "FORGE_BUILD_CMD";
}

/// Default database platform API URL.
pub const DEFAULT_NEON_API_URL: &str = "https://console.neon.tech/api/v2";

/// Default cache platform API URL.
pub const DEFAULT_AIVEN_API_URL: &str = "https://api.aiven.io/v1";

/// How a provider step is carried out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// Provision through the provider API.
    #[default]
    Auto,
    /// Ask the user to paste a connection string.
    Manual,
    /// Leave the provider alone.
    Skip,
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Database provisioning settings.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    /// Project name, matched case-insensitively.
    pub project_name: String,
    /// Branch name.
    pub branch_name: String,
    /// Database name.
    pub database_name: String,
    /// Role (user) name.
    pub role_name: String,
    /// Role password, generated when absent.
    pub password: Option<String>,
    /// Region for new projects.
    pub region: Option<String>,
    /// API token.
    pub token: Option<String>,
    /// API base URL.
    pub api_url: String,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("project_name", &self.project_name)
            .field("branch_name", &self.branch_name)
            .field("database_name", &self.database_name)
            .field("role_name", &self.role_name)
            .field("password_set", &self.password.is_some())
            .field("region", &self.region)
            .field("token_set", &self.token.is_some())
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl DatabaseSettings {
    /// Resolves settings from the environment, applying defaults.
    #[must_use]
    pub fn resolve(env: &EnvSource<'_>) -> Self {
        Self {
            project_name: env.get_or(vars::NEON_PROJECT_NAME, "forge-app"),
            branch_name: env.get_or(vars::NEON_BRANCH_NAME, "main"),
            database_name: env.get_or(vars::NEON_DB_NAME, "appdb"),
            role_name: env.get_or(vars::NEON_DB_USER, "app"),
            password: env.get_owned(vars::NEON_DB_PASSWORD),
            region: env.get_owned(vars::NEON_REGION),
            token: env.get_owned(vars::NEON_TOKEN),
            api_url: env.get_or(vars::NEON_API_URL, DEFAULT_NEON_API_URL),
        }
    }

    /// Region label for display.
    #[must_use]
    pub fn region_label(&self) -> &str {
        self.region.as_deref().unwrap_or("(provider default)")
    }
}

/// Cache provisioning settings.
#[derive(Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// API token.
    pub token: Option<String>,
    /// Platform project.
    pub project: Option<String>,
    /// Cloud/region.
    pub cloud: Option<String>,
    /// Service plan.
    pub plan: Option<String>,
    /// Service name.
    pub service_name: String,
    /// Service type.
    pub service_type: String,
    /// API base URL.
    pub api_url: String,
}

impl fmt::Debug for CacheSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSettings")
            .field("token_set", &self.token.is_some())
            .field("project", &self.project)
            .field("cloud", &self.cloud)
            .field("plan", &self.plan)
            .field("service_name", &self.service_name)
            .field("service_type", &self.service_type)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl CacheSettings {
    /// Resolves settings from the environment, applying defaults.
    #[must_use]
    pub fn resolve(env: &EnvSource<'_>) -> Self {
        Self {
            token: env.get_owned(vars::AIVEN_TOKEN),
            project: env.get_owned(vars::AIVEN_PROJECT),
            cloud: env.get_owned(vars::AIVEN_CLOUD),
            plan: env.get_owned(vars::AIVEN_PLAN),
            service_name: env.get_or(vars::AIVEN_SERVICE_NAME, "forge-valkey"),
            service_type: env.get_or(vars::AIVEN_SERVICE_TYPE, "valkey"),
            api_url: env.get_or(vars::AIVEN_API_URL, DEFAULT_AIVEN_API_URL),
        }
    }

    /// Returns the first required variable that is unset.
    #[must_use]
    pub const fn first_missing(&self) -> Option<&'static str> {
        if self.project.is_none() {
            Some(vars::AIVEN_PROJECT)
        } else if self.cloud.is_none() {
            Some(vars::AIVEN_CLOUD)
        } else if self.plan.is_none() {
            Some(vars::AIVEN_PLAN)
        } else {
            None
        }
    }
}

/// Deploy CLI settings.
#[derive(Clone, PartialEq, Eq)]
pub struct DeploySettings {
    /// Project-scoped token.
    pub project_token: Option<String>,
    /// Account-scoped token.
    pub api_token: Option<String>,
    /// Directory the CLI runs in.
    pub project_dir: PathBuf,
    /// Whether a missing CLI may be installed.
    pub allow_install: bool,
    /// Whether an unlinked project may be initialized or linked.
    pub auto_init: bool,
    /// Link to an existing project instead of creating one.
    pub link_instead: bool,
}

impl fmt::Debug for DeploySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploySettings")
            .field("project_token_set", &self.project_token.is_some())
            .field("api_token_set", &self.api_token.is_some())
            .field("project_dir", &self.project_dir)
            .field("allow_install", &self.allow_install)
            .field("auto_init", &self.auto_init)
            .field("link_instead", &self.link_instead)
            .finish()
    }
}

impl DeploySettings {
    /// Resolves tokens from the environment; all choices default to off.
    #[must_use]
    pub fn resolve(env: &EnvSource<'_>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_token: env.get_owned(vars::RAILWAY_TOKEN),
            api_token: env.get_owned(vars::RAILWAY_API_TOKEN),
            project_dir: project_dir.into(),
            allow_install: false,
            auto_init: false,
            link_instead: false,
        }
    }
}

/// Options for one wizard invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardOptions {
    /// Only describe what would happen.
    pub dry_run: bool,
    /// Prompts may be shown.
    pub interactive: bool,
    /// Confirm the deploy without asking.
    pub assume_yes: bool,
    /// Database step mode.
    pub database: ProviderMode,
    /// Cache step mode.
    pub cache: ProviderMode,
    /// Whether the deploy step runs.
    pub deploy: bool,
    /// Whether a missing CLI may be installed.
    pub allow_install: bool,
    /// Whether an unlinked project may be initialized or linked.
    pub auto_init: bool,
    /// Link to an existing project instead of creating one.
    pub link_instead: bool,
    /// Project directory.
    pub project_dir: PathBuf,
    /// Credential file path.
    pub env_file: PathBuf,
}

impl WizardOptions {
    /// Creates dry-run defaults rooted at `project_dir`.
    #[must_use]
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        let project_dir = project_dir.as_ref().to_path_buf();
        Self {
            dry_run: true,
            interactive: true,
            assume_yes: false,
            database: ProviderMode::Auto,
            cache: ProviderMode::Auto,
            deploy: true,
            allow_install: false,
            auto_init: false,
            link_instead: false,
            env_file: project_dir.join(".env"),
            project_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessEnv;
    use crate::envfile::CredentialSet;

    #[test]
    fn test_database_defaults() {
        let credentials = CredentialSet::new();
        let process = ProcessEnv::default();
        let settings = DatabaseSettings::resolve(&EnvSource::new(&credentials, &process));

        assert_eq!(settings.project_name, "forge-app");
        assert_eq!(settings.branch_name, "main");
        assert_eq!(settings.database_name, "appdb");
        assert_eq!(settings.role_name, "app");
        assert_eq!(settings.api_url, DEFAULT_NEON_API_URL);
        assert_eq!(settings.region_label(), "(provider default)");
        assert!(settings.password.is_none());
    }

    #[test]
    fn test_settings_debug_redacts_secrets() {
        let credentials = CredentialSet::parse("NEON_TOKEN=tok-123\nNEON_DB_PASSWORD=pw-456\n");
        let process = ProcessEnv::default();
        let settings = DatabaseSettings::resolve(&EnvSource::new(&credentials, &process));
        let debug = format!("{settings:?}");

        assert!(!debug.contains("tok-123"));
        assert!(!debug.contains("pw-456"));
        assert!(debug.contains("token_set: true"));
    }

    #[test]
    fn test_cache_first_missing_order() {
        let credentials = CredentialSet::parse("AIVEN_PROJECT=p\nAIVEN_PLAN=startup-4\n");
        let process = ProcessEnv::default();
        let settings = CacheSettings::resolve(&EnvSource::new(&credentials, &process));

        assert_eq!(settings.first_missing(), Some(vars::AIVEN_CLOUD));
        assert_eq!(settings.service_name, "forge-valkey");
        assert_eq!(settings.service_type, "valkey");
    }

    #[test]
    fn test_wizard_options_defaults() {
        let options = WizardOptions::new("/srv/app");

        assert!(options.dry_run);
        assert_eq!(options.env_file, PathBuf::from("/srv/app/.env"));
        assert_eq!(options.database, ProviderMode::Auto);
    }
}
