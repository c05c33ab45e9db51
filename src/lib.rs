//! # Pitboss (admin trust and audit backend)
//!
//! `pitboss` guards the administrative surface of a card-game platform: who may
//! act, how they prove it, and an append-only record of what they did.
//!
//! ## Authorization
//!
//! Five fixed roles map to a closed set of `domain:action` permissions. A
//! principal's effective permissions are the union over its roles, and every
//! privileged operation checks exactly one permission.
//!
//! ## Authentication
//!
//! Password login issues either a session token or, for principals with MFA
//! enabled, a short-lived challenge token that only a valid TOTP code can
//! exchange for a session. Every privileged call requires a session that has
//! completed MFA; a challenge token is never accepted in its place.
//!
//! ## Audit
//!
//! Audit records form a SHA-256 hash chain per partition. Appends are
//! serialized so the chain never forks, and `verify_integrity` replays the
//! chain to locate the first record that was edited, removed or re-linked.

pub mod api;
pub mod audit;
pub mod cli;
pub mod clock;
pub mod identity;
pub mod rbac;
pub mod session;
pub mod totp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
