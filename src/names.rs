//! Mapping between class names (`a.b.C`) and resource names (`a/b/C.class`).

use std::path::{Component, Path, PathBuf};

pub const CLASS_SUFFIX: &str = ".class";
pub const RESOURCE_SEPARATOR: char = '/';
pub const CLASS_SEPARATOR: char = '.';

const META_INF: &str = "META-INF";
const MODULE_INFO: &str = "module-info";

pub fn resource_name_from_class_name(class_name: &str) -> String {
    format!(
        "{}{CLASS_SUFFIX}",
        class_name.replace(CLASS_SEPARATOR, &RESOURCE_SEPARATOR.to_string())
    )
}

pub fn class_name_from_resource_name(resource_name: &str) -> String {
    let stem = resource_name
        .strip_suffix(CLASS_SUFFIX)
        .unwrap_or(resource_name);
    stem.replace(RESOURCE_SEPARATOR, &CLASS_SEPARATOR.to_string())
}

/// Provider names may carry one leading separator (`/a/B.class`). Dropping it
/// keeps the round trip exact whether or not the separator was there.
pub fn class_name_from_provider_resource_name(resource_name: &str) -> String {
    class_name_from_resource_name(strip_leading_separator(resource_name))
}

pub fn strip_leading_separator(name: &str) -> &str {
    name.strip_prefix(RESOURCE_SEPARATOR).unwrap_or(name)
}

pub fn is_class_resource(resource_name: &str) -> bool {
    resource_name.len() > CLASS_SUFFIX.len() && resource_name.ends_with(CLASS_SUFFIX)
}

pub fn is_directory_resource(resource_name: &str) -> bool {
    resource_name.ends_with(RESOURCE_SEPARATOR)
}

/// Index metadata (`META-INF/...`, any case) and module descriptors are never
/// handed to a streamer.
pub fn is_unsupported_class_name(class_name: &str) -> bool {
    let upper_prefix = class_name
        .get(..META_INF.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(META_INF));
    if upper_prefix {
        let rest = &class_name[META_INF.len()..];
        if rest.is_empty() || rest.starts_with(CLASS_SEPARATOR) || rest.starts_with(RESOURCE_SEPARATOR)
        {
            return true;
        }
    }
    class_name.ends_with(MODULE_INFO)
}

/// Slash separated form used for source names and every seed-set key.
pub fn canonicalize(name: &str) -> String {
    let replaced = name.replace('\\', "/");
    match replaced.trim_end_matches(RESOURCE_SEPARATOR) {
        "" if replaced.starts_with(RESOURCE_SEPARATOR) => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

pub fn canonical_path_name(path: &Path) -> String {
    canonicalize(&path.to_string_lossy())
}

/// Native relative path for a canonical resource name.
pub fn native_relative_path(resource_name: &str) -> PathBuf {
    strip_leading_separator(resource_name)
        .split(RESOURCE_SEPARATOR)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Canonical resource name for a native path relative to a source root.
/// `None` when the path leaves the root or is not valid UTF-8.
pub fn resource_name_from_relative_path(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

/// Joins a resource name under a container prefix, tolerating an empty prefix.
pub fn join_resource(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches(RESOURCE_SEPARATOR);
    let name = strip_leading_separator(name);
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
