use crate::SvnInfoError;

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

#[cfg(windows)]
const SEPARATORS: &[char] = &['/', '\\'];
#[cfg(not(windows))]
const SEPARATORS: &[char] = &['/'];

fn canonicalize_rel_path(path: &str) -> Result<Cow<'_, str>, SvnInfoError> {
    #[cfg(windows)]
    if path.starts_with("\\\\") {
        return Err(SvnInfoError::InvalidPath(format!("unsafe path: {path}")));
    }

    let trimmed = path.trim_matches(SEPARATORS);

    if trimmed.is_empty() {
        return Ok(Cow::Borrowed(""));
    }

    #[cfg(windows)]
    if let Some((first, rest)) = trimmed.as_bytes().split_first()
        && rest.first() == Some(&b':')
        && first.is_ascii_alphabetic()
    {
        return Err(SvnInfoError::InvalidPath(format!("unsafe path: {path}")));
    }

    if trimmed.contains('\0') {
        return Err(SvnInfoError::InvalidPath(format!("unsafe path: {path:?}")));
    }

    let mut parts: Vec<&str> = Vec::new();
    let mut needs_alloc = cfg!(windows) && trimmed.contains('\\');

    for seg in trimmed.split(SEPARATORS) {
        if seg.is_empty() || seg == "." {
            needs_alloc = true;
            continue;
        }
        if seg == ".." {
            return Err(SvnInfoError::InvalidPath(format!(
                "path escapes the workspace: {path}"
            )));
        }
        parts.push(seg);
    }

    if parts.is_empty() {
        return Ok(Cow::Borrowed(""));
    }

    if !needs_alloc {
        return Ok(Cow::Borrowed(trimmed));
    }

    Ok(Cow::Owned(parts.join("/")))
}

/// Resolves a workspace-relative step path below `base`.
///
/// Separators and `.` segments are normalized and an empty path resolves to
/// `base` itself. Any `..` segment is rejected so the result never leaves
/// `base`.
pub(crate) fn resolve_child(base: &Path, rel: &str) -> Result<PathBuf, SvnInfoError> {
    let rel = canonicalize_rel_path(rel)?;
    let mut out = base.to_path_buf();
    for seg in rel.split('/').filter(|s| !s.is_empty()) {
        out.push(seg);
    }
    Ok(out)
}

/// Checks that `path` lies below `boundary` without following symlinks.
pub(crate) fn ensure_within(boundary: &Path, path: &Path) -> Result<(), SvnInfoError> {
    if !path.is_absolute() {
        return Err(SvnInfoError::InvalidPath(format!(
            "agent requires an absolute path: {}",
            path.display()
        )));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) || !path.starts_with(boundary)
    {
        return Err(SvnInfoError::InvalidPath(format!(
            "{} is outside {}",
            path.display(),
            boundary.display()
        )));
    }
    Ok(())
}
