use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::classfile::JavaVersion;
use crate::classfile::version::resolve_spec_version;
use crate::cli::Cli;
use crate::model::WeavingModel;

/// Java binary used to detect the runtime version.
pub const JAVA_ENV: &str = "CLASS_WEAVER_JAVA";
/// Explicit `java.specification.version`, skipping detection.
pub const JAVA_VERSION_ENV: &str = "CLASS_WEAVER_JAVA_VERSION";

const SPEC_VERSION_PROPERTY: &str = "java.specification.version";

pub fn resolve_db_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.db.clone() {
        return Ok(p);
    }

    Ok(class_weaver_home()?.join("ledger.lmdb"))
}

pub fn clear_db(db_path: &Path) -> Result<()> {
    remove_file_if_exists(db_path, "db")?;
    remove_file_if_exists(&lmdb_lock_path(db_path), "db lock")?;
    Ok(())
}

/// Target runtime version: the explicit argument, then
/// `CLASS_WEAVER_JAVA_VERSION`, then whatever the java binary reports.
/// Detection failures fall back with a warning.
pub fn resolve_target_version(explicit: Option<&str>) -> &'static JavaVersion {
    if let Some(spec) = explicit {
        return resolve_spec_version(Some(spec));
    }
    if let Ok(spec) = env::var(JAVA_VERSION_ENV) {
        return resolve_spec_version(Some(&spec));
    }
    let java = env::var_os(JAVA_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("java"));
    match detect_spec_version(&java) {
        Ok(spec) => resolve_spec_version(Some(&spec)),
        Err(e) => {
            warn!(java = %java.display(), error = %format!("{e:#}"), "Java version detection failed");
            resolve_spec_version(None)
        }
    }
}

fn detect_spec_version(java: &Path) -> Result<String> {
    let output = Command::new(java)
        .args(["-XshowSettings:properties", "-version"])
        .output()
        .with_context(|| format!("Failed to execute {}", java.display()))?;
    // The settings dump goes to stderr.
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let spec = parse_spec_version(&stderr)
        .or_else(|| parse_spec_version(&stdout))
        .with_context(|| format!("{SPEC_VERSION_PROPERTY} not reported by {}", java.display()))?;
    debug!(java = %java.display(), version = spec, "Detected Java runtime");
    Ok(spec.to_string())
}

/// Extracts `java.specification.version = X` from a settings dump.
pub fn parse_spec_version(settings: &str) -> Option<&str> {
    settings.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        (key.trim() == SPEC_VERSION_PROPERTY)
            .then(|| value.trim())
            .filter(|v| !v.is_empty())
    })
}

/// Loads the model and returns it with the hex SHA-256 of the file.
pub fn load_model(path: &Path) -> Result<(WeavingModel, String)> {
    let raw = std::fs::read(path)
        .with_context(|| format!("Failed to read weaving model: {}", path.display()))?;
    let digest = hex::encode(Sha256::digest(&raw));
    let text = std::str::from_utf8(&raw)
        .with_context(|| format!("Weaving model is not UTF-8: {}", path.display()))?;
    let model = WeavingModel::from_json(text)
        .with_context(|| format!("Invalid weaving model: {}", path.display()))?;
    Ok((model, digest))
}

fn class_weaver_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("class-weaver"))
}

fn lmdb_lock_path(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_os_string();
    os.push("-lock");
    PathBuf::from(os)
}

fn remove_file_if_exists(path: &Path, kind: &str) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove {kind} file: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_settings_dump() {
        let dump = "Property settings:\n    file.encoding = UTF-8\n    java.specification.version = 17\n    java.version = 17.0.9\n";
        assert_eq!(parse_spec_version(dump), Some("17"));
        assert_eq!(parse_spec_version("java.specification.version =\n"), None);
        assert_eq!(parse_spec_version("openjdk version \"1.8.0\""), None);
    }

    #[test]
    fn explicit_version_wins() {
        assert_eq!(resolve_target_version(Some("11")).major, 55);
    }

    #[test]
    fn missing_java_binary_is_a_detection_error() {
        let missing = std::env::temp_dir().join("class-weaver-no-such-java");
        assert!(detect_spec_version(&missing).is_err());
    }

    #[test]
    fn model_digest_tracks_content() -> Result<()> {
        let path = std::env::temp_dir().join(format!("class-weaver-model-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"classes": [{"name": "com.acme.Employee"}]}"#)?;
        let (model, first) = load_model(&path)?;
        assert_eq!(model.len(), 1);
        assert_eq!(first.len(), 64);

        std::fs::write(&path, r#"{"classes": [{"name": "com.acme.Manager"}]}"#)?;
        let (_, second) = load_model(&path)?;
        assert_ne!(first, second);

        std::fs::write(&path, r#"{"classes": [{"name": 7}]}"#)?;
        assert!(load_model(&path).is_err());

        let _ = std::fs::remove_file(path);
        Ok(())
    }
}
