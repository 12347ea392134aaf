//! Output destination helpers for plain paths and EOS URIs.
//!
//! EOS destinations are given as `root://eosuser.cern.ch//eos/user/...`.
//! `eos cp` needs the full URI, writing directly needs the local path.

use std::path::{Component, Path, PathBuf};

use crate::errors::ConfigError;

fn parts(path: &str) -> Vec<String> {
    Path::new(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(p) => Some(p.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

fn has_scheme(path: &str) -> bool {
    !path.starts_with('/') && parts(path).first().is_some_and(|p| p.ends_with(':'))
}

/// Returns true if the destination looks like an EOS URI.
///
/// Double slashes are not checked here; see [`validate_destination`].
#[must_use]
pub fn is_eos_uri(path: &str) -> bool {
    let parts = parts(path);
    has_scheme(path) && parts.len() >= 3 && parts[2] == "eos"
}

/// Checks that an EOS URI keeps both double slashes.
///
/// # Errors
///
/// Returns an error for URIs like `root:/server/eos/...`.
pub fn validate_destination(path: &str) -> Result<(), ConfigError> {
    if is_eos_uri(path) && !(path.contains("://") && path.contains("//eos/")) {
        return Err(ConfigError::new(format!(
            "The output destination '{path}' is an EOS-URI but missing '://' or '//eos' (double slashes?)."
        ))
        .with_keys(["output_destination"])
        .with_fix_hint("Use the format 'root://eosuser.cern.ch//eos/...'"));
    }
    Ok(())
}

/// Strips scheme and server from a URI, leaving the local path.
#[must_use]
pub fn uri_to_path(path: &str) -> PathBuf {
    if has_scheme(path) {
        let mut local = PathBuf::from("/");
        local.extend(parts(path).into_iter().skip(2));
        return local;
    }
    PathBuf::from(path)
}

/// Returns the scheme and server part of a URI (empty for plain paths).
///
/// E.g. `root://eosuser.cern.ch//eos/user/a/` gives `root://eosuser.cern.ch/`.
#[must_use]
pub fn server_from_uri(path: &str) -> String {
    if !has_scheme(path) {
        return String::new();
    }
    let local = uri_to_path(path).to_string_lossy().into_owned();
    let scheme_end = path.find("://").map_or(0, |i| i + 3);
    let server = path[scheme_end..]
        .find(&local)
        .map_or(path, |i| &path[..scheme_end + i]);
    match server.strip_suffix("//") {
        Some(trimmed) => format!("{trimmed}/"),
        None => server.to_string(),
    }
}
