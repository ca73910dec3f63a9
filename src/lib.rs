//! # atal-gate
//!
//! Session-aware request gate for the ATAL AI web application.
//!
//! Every page request passes through the gate before it reaches the front-end
//! origin. The gate exchanges the caller's session cookies with the hosted
//! identity provider, classifies the requested path and either forwards the
//! request or redirects it:
//!
//! - **Protected** paths (the authenticated app area) require a session;
//!   anonymous callers are sent to the login page.
//! - **Auth-only** paths (login, verification) are for anonymous callers;
//!   signed-in users are sent to their dashboard.
//! - Everything else is **public**.
//!
//! Cookie updates returned by the provider (rotated or expired session
//! tokens) are attached to every response, whatever the decision.

pub mod cli;
pub mod gate;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
