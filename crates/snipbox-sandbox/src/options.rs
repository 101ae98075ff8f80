//! Per-run options and the dependency version grammar.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A Python package reference as accepted by the run API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

impl Dependency {
    /// Render the installer argument for this dependency.
    ///
    /// An empty version means no constraint. A version starting with a
    /// comparator (`=`, `<`, `>`) is passed verbatim, so ranges like
    /// `>=1.2,<2` survive untouched; anything else is pinned with `==`.
    pub fn specifier(&self) -> String {
        if self.version.is_empty() {
            return self.name.clone();
        }
        if self.version.starts_with(['=', '<', '>']) {
            format!("{}{}", self.name, self.version)
        } else {
            format!("{}=={}", self.name, self.version)
        }
    }
}

/// Options attached to a single execution request.
///
/// Policy checks against the global configuration happen in the dispatcher
/// before any runner sees these.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerOptions {
    #[serde(default)]
    pub enable_network: bool,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

/// Parse one line of a requirements manifest into `(name, version)`.
///
/// Tolerates `==`, `>=`, `<=`, `~=` and bare names; comments and blank
/// lines yield `None`.
pub fn parse_requirement_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    for delimiter in ["==", ">=", "<=", "~="] {
        if let Some((name, version)) = line.split_once(delimiter) {
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            return Some((name.to_string(), version.trim().to_string()));
        }
    }

    if line
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Some((line.to_string(), String::new()));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(name: &str, version: &str) -> Dependency {
        Dependency {
            name: name.into(),
            version: version.into(),
        }
    }

    #[test]
    fn specifier_empty_version_is_bare_name() {
        assert_eq!(dep("requests", "").specifier(), "requests");
    }

    #[test]
    fn specifier_plain_version_is_pinned() {
        assert_eq!(dep("requests", "2.31.0").specifier(), "requests==2.31.0");
    }

    #[test]
    fn specifier_comparator_passes_verbatim() {
        assert_eq!(dep("numpy", ">=1.2,<2").specifier(), "numpy>=1.2,<2");
        assert_eq!(dep("numpy", "==1.26").specifier(), "numpy==1.26");
        assert_eq!(dep("numpy", "<2").specifier(), "numpy<2");
    }

    #[test]
    fn requirement_line_variants() {
        assert_eq!(
            parse_requirement_line("requests==2.31.0"),
            Some(("requests".into(), "2.31.0".into()))
        );
        assert_eq!(
            parse_requirement_line("httpx>=0.27"),
            Some(("httpx".into(), "0.27".into()))
        );
        assert_eq!(
            parse_requirement_line("jinja2"),
            Some(("jinja2".into(), String::new()))
        );
        assert_eq!(parse_requirement_line("# a comment"), None);
        assert_eq!(parse_requirement_line("   "), None);
        assert_eq!(parse_requirement_line("-r other.txt"), None);
    }

    #[test]
    fn options_deserialize_defaults() {
        let options: RunnerOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.enable_network);
        assert!(options.dependencies.is_empty());
        assert!(options.files.is_empty());
    }
}
