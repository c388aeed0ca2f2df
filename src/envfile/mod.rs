//! Environment store for the `.env` credential file.
//!
//! This module handles:
//! - Loading the credential file into a [`CredentialSet`]
//! - Overlay writes that rewrite only the named keys and keep everything else
//! - Bootstrapping a missing file from `.env.example`

mod parse;
mod store;

pub use parse::{OVERLAY_MARKER, OverlayText, overlay_text, parse_assignment};
pub use store::{
    BootstrapOutcome, CredentialSet, OverlayOutcome, TEMPLATE_FILE, apply_overlay, bootstrap,
    template_path,
};
