//! Scoped deploy credentials.
//!
//! The deploy CLI accepts either a project token or a login session. Tokens
//! take precedence inside the CLI, so account-level actions (whoami, login,
//! init, link) must run with both tokens withheld. Rather than mutating the
//! process environment, the tokens live in a [`CredentialContext`] that is
//! applied to each child process, and [`TokenSuppression`] withholds them
//! for as long as the guard lives.

use std::fmt;
use std::ops::Deref;

use crate::config::{DeploySettings, vars};

use super::runner::CommandSpec;

/// Which credential the CLI will use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `RAILWAY_TOKEN` is passed to the CLI.
    ProjectToken,
    /// Only `RAILWAY_API_TOKEN` is passed to the CLI.
    AccountToken,
    /// No token; the CLI uses its login session.
    Session,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProjectToken => write!(f, "project token (RAILWAY_TOKEN)"),
            Self::AccountToken => write!(f, "account token (RAILWAY_API_TOKEN)"),
            Self::Session => write!(f, "login session"),
        }
    }
}

/// Tokens handed to deploy CLI subprocesses.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialContext {
    project_token: Option<String>,
    api_token: Option<String>,
}

impl fmt::Debug for CredentialContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialContext")
            .field("project_token_set", &self.project_token.is_some())
            .field("api_token_set", &self.api_token.is_some())
            .finish()
    }
}

impl CredentialContext {
    /// Creates a context. Blank tokens count as absent.
    #[must_use]
    pub fn new(project_token: Option<String>, api_token: Option<String>) -> Self {
        let clean = |t: Option<String>| t.filter(|v| !v.trim().is_empty());
        Self {
            project_token: clean(project_token),
            api_token: clean(api_token),
        }
    }

    /// Creates a context from deploy settings.
    #[must_use]
    pub fn from_settings(settings: &DeploySettings) -> Self {
        Self::new(settings.project_token.clone(), settings.api_token.clone())
    }

    /// Returns true if a project token is present.
    #[must_use]
    pub const fn has_project_token(&self) -> bool {
        self.project_token.is_some()
    }

    /// Returns true if either token is present.
    #[must_use]
    pub const fn has_any_token(&self) -> bool {
        self.project_token.is_some() || self.api_token.is_some()
    }

    /// Credential the CLI would use with this context.
    #[must_use]
    pub const fn auth_mode(&self) -> AuthMode {
        if self.project_token.is_some() {
            AuthMode::ProjectToken
        } else if self.api_token.is_some() {
            AuthMode::AccountToken
        } else {
            AuthMode::Session
        }
    }

    /// Sets present tokens on `spec` and strips absent ones.
    pub fn apply_to(&self, spec: &mut CommandSpec) {
        for (key, value) in [
            (vars::RAILWAY_TOKEN, &self.project_token),
            (vars::RAILWAY_API_TOKEN, &self.api_token),
        ] {
            match value {
                Some(token) => spec.set_env(key, token),
                None => spec.remove_env(key),
            }
        }
    }

    /// Withholds both tokens until the returned guard is dropped.
    pub fn suppress_tokens(&mut self) -> TokenSuppression<'_> {
        let saved = std::mem::take(self);
        TokenSuppression {
            context: self,
            saved,
        }
    }
}

/// Guard that restores withheld tokens on drop.
///
/// Dereferences to the (token-free) context so it can be applied to commands.
#[derive(Debug)]
pub struct TokenSuppression<'a> {
    context: &'a mut CredentialContext,
    saved: CredentialContext,
}

impl Deref for TokenSuppression<'_> {
    type Target = CredentialContext;

    fn deref(&self) -> &Self::Target {
        &*self.context
    }
}

impl Drop for TokenSuppression<'_> {
    fn drop(&mut self) {
        *self.context = std::mem::take(&mut self.saved);
    }
}
