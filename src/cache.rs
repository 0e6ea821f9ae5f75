//! Persistent ledger of woven inputs.
//!
//! Uses LMDB (via heed) to remember, per input archive or directory, a
//! fingerprint of the input after weaving and the settings it was woven
//! with. An input whose fingerprint and settings both match is skipped.

use anyhow::{Context, Result};
use heed::types::Str;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::scan::scan_class_files;

pub const INPUTS_DB: &str = "inputs";

const DEFAULT_MAP_SIZE: usize = 64 * 1024 * 1024;
const DEFAULT_MAX_DBS: u32 = 4;

type StrDb = Database<Str, Str>;

/// Everything besides the input itself that decides what weaving produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaveSettings {
    pub model_sha256: String,
    pub target_major: u16,
    pub xml_transient: bool,
    /// Digest of the canonical `--classpath` entries, order ignored.
    pub classpath_sha256: String,
}

impl WeaveSettings {
    pub fn new(
        model_sha256: &str,
        target_major: u16,
        xml_transient: bool,
        classpath: &[PathBuf],
    ) -> Self {
        let mut keys: Vec<String> = classpath.iter().map(|p| input_key(p)).collect();
        keys.sort();
        keys.dedup();
        let mut hasher = Sha256::new();
        for key in &keys {
            hasher.update(key.as_bytes());
            hasher.update(b"\n");
        }
        Self {
            model_sha256: model_sha256.to_string(),
            target_major,
            xml_transient,
            classpath_sha256: hex::encode(hasher.finalize()),
        }
    }
}

/// One ledger row, stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub fingerprint: String,
    pub settings: WeaveSettings,
    pub output: String,
    pub classes: usize,
    pub woven: usize,
    pub woven_at: u64,
}

#[derive(Debug)]
pub struct WeaveLedger {
    env: Arc<Env>,
    db_path: PathBuf,
    inputs: StrDb,
}

impl WeaveLedger {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create ledger directory: {}", parent.display())
            })?;
        }

        let env = Arc::new(open_env(&db_path)?);
        let mut wtxn = env.write_txn()?;
        let inputs = env.create_database::<Str, Str>(&mut wtxn, Some(INPUTS_DB))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db_path,
            inputs,
        })
    }

    pub fn get(&self, input: &Path) -> Result<Option<LedgerEntry>> {
        let rtxn = self.env.read_txn()?;
        let Some(raw) = self.inputs.get(&rtxn, &input_key(input))? else {
            return Ok(None);
        };
        // An unreadable or older-format row is treated as absent and
        // rewritten on the next weave.
        Ok(serde_json::from_str(raw).ok())
    }

    /// Whether `input` was woven with `settings` into `output` and has not
    /// been modified since.
    pub fn is_current(&self, input: &Path, output: &Path, settings: &WeaveSettings) -> Result<bool> {
        let Some(entry) = self.get(input)? else {
            return Ok(false);
        };
        Ok(entry.settings == *settings
            && entry.output == input_key(output)
            && output.exists()
            && !entry.fingerprint.is_empty()
            && entry.fingerprint == input_fingerprint(input))
    }

    /// Records a finished weave. Fingerprints the input now, so in-place
    /// weaving records the rewritten files.
    pub fn record(
        &self,
        input: &Path,
        output: &Path,
        settings: &WeaveSettings,
        classes: usize,
        woven: usize,
    ) -> Result<()> {
        let entry = LedgerEntry {
            fingerprint: input_fingerprint(input),
            settings: settings.clone(),
            output: input_key(output),
            classes,
            woven,
            woven_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        };
        let value = serde_json::to_string(&entry)?;
        let mut wtxn = self.env.write_txn()?;
        self.inputs.put(&mut wtxn, &input_key(input), &value)?;
        wtxn.commit()?;
        Ok(())
    }

    pub fn stats(&self) -> Result<LedgerStats> {
        let rtxn = self.env.read_txn()?;
        let inputs = table_len(&self.inputs, &rtxn)?;
        let mut woven_classes = 0u64;
        let mut recent = Vec::new();
        for item in self.inputs.iter(&rtxn)? {
            let (k, v) = item?;
            let Ok(entry) = serde_json::from_str::<LedgerEntry>(v) else {
                continue;
            };
            woven_classes += entry.woven as u64;
            recent.push(RecentInput {
                input: k.to_string(),
                woven: entry.woven,
                woven_at: entry.woven_at,
            });
        }
        recent.sort_by(|a, b| {
            b.woven_at
                .cmp(&a.woven_at)
                .then_with(|| a.input.cmp(&b.input))
        });
        recent.truncate(10);
        Ok(LedgerStats {
            db_path: self.db_path.to_string_lossy().to_string(),
            inputs,
            woven_classes,
            recent,
        })
    }
}

fn input_key(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

/// Modification time in nanoseconds, or 0 when unavailable.
pub fn mtime_nanos(path: &Path) -> u64 {
    let mtime = path
        .metadata()
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let nanos = mtime
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    u64::try_from(nanos).unwrap_or(u64::MAX)
}

fn file_len(path: &Path) -> u64 {
    path.metadata().map(|m| m.len()).unwrap_or(0)
}

/// Fingerprint of an input: mtime and size of a file, or for a directory
/// the class count plus a digest over every class file's relative path,
/// mtime and size. Empty when a directory cannot be walked.
pub fn input_fingerprint(path: &Path) -> String {
    if !path.is_dir() {
        return format!("{}:{}", mtime_nanos(path), file_len(path));
    }
    let Ok(files) = scan_class_files(path) else {
        return String::new();
    };
    let mut hasher = Sha256::new();
    for file in &files {
        let relative = file.strip_prefix(path).unwrap_or(file);
        hasher.update(
            format!(
                "{}\t{}\t{}\n",
                relative.to_string_lossy(),
                mtime_nanos(file),
                file_len(file)
            )
            .as_bytes(),
        );
    }
    format!("{}:{}", files.len(), hex::encode(hasher.finalize()))
}

fn open_env(db_path: &Path) -> Result<Env> {
    let mut options = EnvOpenOptions::new();
    options.map_size(DEFAULT_MAP_SIZE);
    options.max_dbs(DEFAULT_MAX_DBS);
    // SAFETY: We do not use NO_LOCK and keep default LMDB locking guarantees.
    // NO_SUB_DIR keeps the ledger a single file at --db.
    unsafe {
        options.flags(EnvFlags::NO_SUB_DIR);
        options
            .open(db_path)
            .with_context(|| format!("Failed to create/open db env: {}", db_path.display()))
    }
}

fn table_len(db: &StrDb, rtxn: &RoTxn<'_>) -> Result<u64> {
    let mut count = 0u64;
    for item in db.iter(rtxn)? {
        let _ = item?;
        count += 1;
    }
    Ok(count)
}

#[derive(Debug, Serialize)]
pub struct RecentInput {
    pub input: String,
    pub woven: usize,
    pub woven_at: u64,
}

#[derive(Debug, Serialize)]
pub struct LedgerStats {
    pub db_path: String,
    pub inputs: u64,
    pub woven_classes: u64,
    pub recent: Vec<RecentInput>,
}
