//! SQLite DSN helpers.

use std::path::{Path, PathBuf};

/// Split `sqlite:` / `sqlite://` DSNs into the path part and the raw query.
fn split_dsn(dsn: &str) -> Option<(&str, Option<&str>)> {
    let rest = dsn
        .strip_prefix("sqlite://")
        .or_else(|| dsn.strip_prefix("sqlite:"))?;
    Some(match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    })
}

pub fn is_memory(dsn: &str) -> bool {
    let Some((path, query)) = split_dsn(dsn) else {
        return false;
    };
    if path == ":memory:" || path == "memory:" {
        return true;
    }
    query.is_some_and(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .any(|(k, v)| k.eq_ignore_ascii_case("mode") && v.eq_ignore_ascii_case("memory"))
    })
}

/// File path named by a SQLite DSN; `None` for in-memory databases.
pub fn file_path(dsn: &str) -> Option<PathBuf> {
    if is_memory(dsn) {
        return None;
    }
    let (path, _) = split_dsn(dsn)?;
    if path.is_empty() {
        return None;
    }
    Some(PathBuf::from(path))
}

/// Anchor a relative SQLite file path at `base`. Other DSNs are returned as-is.
pub fn resolve_dsn(dsn: &str, base: &Path) -> String {
    let Some(path) = file_path(dsn) else {
        return dsn.to_string();
    };
    if path.is_absolute() {
        return dsn.to_string();
    }
    let query = split_dsn(dsn)
        .and_then(|(_, q)| q)
        .map(|q| format!("?{q}"))
        .unwrap_or_default();
    format!("sqlite://{}{query}", base.join(path).display())
}

pub(crate) fn prepare_parent_dir(dsn: &str) -> std::io::Result<()> {
    if let Some(parent) = file_path(dsn).as_deref().and_then(Path::parent) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
