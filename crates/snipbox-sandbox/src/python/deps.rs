//! Hermetic Python library tree and the dependency catalog.
//!
//! `prepare` copies every configured host library directory into
//! [`super::LIB_PATH`] as a shadow tree, so post-confinement imports never
//! need syscalls outside the allow list, then installs the requirements
//! manifest and registers each package in the catalog.
//!
//! The catalog maps `(name, version)` to a preload snippet: a small program
//! that imports the library and warms any lazy initialisation that would
//! otherwise first run inside the filter. Stdlib entries are seeded at
//! first use; installed packages register with a plain import.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{LazyLock, RwLock};

use tracing::{info, warn};

use crate::config::SandboxConfig;
use crate::error::{Result, RunnerError};
use crate::options::{parse_requirement_line, Dependency};
use crate::rootfs::copy_tree;

static CATALOG: LazyLock<RwLock<HashMap<(String, String), String>>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    seed_builtins(&mut map);
    RwLock::new(map)
});

const JINJA_PRELOAD_TEMPLATE: &str = r#"{% set fruits = ['Apple'] %}
{{ 'a' }}
{% for fruit in fruits %}
    <li>{{ fruit }}</li>
{% endfor %}
{% if fruits|length > 1 %}
1
{% endif %}
{% macro say_hello() %}a{{ 'b' }}{% endmacro %}
{{ s }}{{ say_hello() }}"#;

fn seed_builtins(map: &mut HashMap<(String, String), String>) {
    let plain = [
        "json",
        "math",
        "random",
        "re",
        "string",
        "sys",
        "time",
        "traceback",
        "uuid",
        "os",
        "base64",
        "hashlib",
        "hmac",
        "binascii",
        "collections",
        "functools",
        "operator",
        "itertools",
    ];
    for name in plain {
        map.insert(
            (name.to_string(), String::new()),
            format!("import {name}"),
        );
    }

    map.insert(
        ("datetime".into(), String::new()),
        "import datetime\nfrom datetime import datetime\ndatetime.strptime('2021-01-01', '%Y-%m-%d')"
            .into(),
    );

    // The first template render compiles machinery lazily; do it once here.
    map.insert(
        ("jinja2".into(), String::new()),
        format!(
            "import jinja2\ndef _jinja2_preload_():\n    template = jinja2.Template('''{JINJA_PRELOAD_TEMPLATE}''')\n    template.render(s='a')\n\nif __name__ == '__main__':\n    _jinja2_preload_()"
        ),
    );
    map.insert(
        ("requests".into(), String::new()),
        "import requests\nfrom netrc import netrc, NetrcParseError\nimport urllib3\nimport socket"
            .into(),
    );
    map.insert(
        ("httpx".into(), String::new()),
        "import httpx\nimport encodings.idna".into(),
    );
}

/// Register a package in the catalog, with a default import snippet when
/// none is supplied.
pub fn register(name: &str, version: &str, snippet: Option<String>) {
    let snippet = snippet.unwrap_or_else(|| format!("import {name}"));
    let mut catalog = CATALOG.write().unwrap_or_else(std::sync::PoisonError::into_inner);
    catalog.insert((name.to_string(), version.to_string()), snippet);
}

/// Look up the preload snippet for a package.
pub fn preload_snippet(name: &str, version: &str) -> Option<String> {
    let catalog = CATALOG.read().unwrap_or_else(std::sync::PoisonError::into_inner);
    catalog
        .get(&(name.to_string(), version.to_string()))
        .or_else(|| catalog.get(&(name.to_string(), String::new())))
        .cloned()
}

/// Registered dependencies, sorted by name for stable listings.
pub fn list() -> Vec<Dependency> {
    let catalog = CATALOG.read().unwrap_or_else(std::sync::PoisonError::into_inner);
    let mut deps: Vec<Dependency> = catalog
        .keys()
        .map(|(name, version)| Dependency {
            name: name.clone(),
            version: version.clone(),
        })
        .collect();
    deps.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.cmp(&b.version)));
    deps
}

/// Build the hermetic library tree, then install the requirements manifest.
pub fn prepare(config: &SandboxConfig) -> Result<()> {
    info!("preparing python dependency environment");
    let lib_root = Path::new(super::LIB_PATH);
    fs::create_dir_all(lib_root.join("tmp"))?;

    for lib_path in &config.python_lib_paths {
        let source = Path::new(lib_path);
        if !source.exists() {
            warn!(path = %lib_path, "python lib path not available, skipping");
            continue;
        }
        let relative = source.strip_prefix("/").unwrap_or(source);
        let target = lib_root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        copy_tree(source, &target)?;
    }

    install_requirements(config)?;
    info!("python dependency environment ready");
    Ok(())
}

/// Install the requirements manifest and register its packages.
///
/// A missing manifest is not an error; a failing installer is.
pub fn install_requirements(config: &SandboxConfig) -> Result<()> {
    let manifest = PathBuf::from(&config.python_requirements_path);
    let requirements = match fs::read_to_string(&manifest) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    if requirements.trim().is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new("pip3");
    cmd.arg("install").arg("-r").arg(&manifest);
    if !config.python_pip_mirror_url.is_empty() {
        cmd.arg("-i").arg(&config.python_pip_mirror_url);
    }

    let output = cmd
        .output()
        .map_err(|err| RunnerError::DependencyInstall(format!("pip3: {err}")))?;
    if !output.status.success() {
        return Err(RunnerError::DependencyInstall(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }

    for line in requirements.lines() {
        if let Some((name, version)) = parse_requirement_line(line) {
            info!(%name, %version, "python dependency installed");
            register(&name, &version, None);
        }
    }
    Ok(())
}

/// Re-run installation and return the resulting listing. Used by the
/// refresh endpoint and the background refresher.
pub fn refresh(config: &SandboxConfig) -> Vec<Dependency> {
    info!("updating python dependencies");
    if let Err(err) = install_requirements(config) {
        warn!(%err, "failed to update python dependencies");
    }
    list()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_seeded() {
        assert!(preload_snippet("json", "").is_some());
        assert!(preload_snippet("jinja2", "")
            .unwrap()
            .contains("_jinja2_preload_"));
        assert!(preload_snippet("requests", "").unwrap().contains("netrc"));
    }

    #[test]
    fn version_lookup_falls_back_to_unversioned() {
        assert!(preload_snippet("json", "9.9.9").is_some());
        assert!(preload_snippet("not-a-package", "").is_none());
    }

    #[test]
    fn register_default_snippet_is_an_import() {
        register("leftpad", "1.0", None);
        assert_eq!(
            preload_snippet("leftpad", "1.0").as_deref(),
            Some("import leftpad")
        );
        assert!(list()
            .iter()
            .any(|d| d.name == "leftpad" && d.version == "1.0"));
    }

    #[test]
    fn listing_is_sorted() {
        let deps = list();
        let mut sorted = deps.clone();
        sorted.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.cmp(&b.version)));
        assert_eq!(deps, sorted);
    }
}
