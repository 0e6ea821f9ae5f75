//! Presence checks for optional classes on a classpath of jars and
//! directories.

use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::scan::{class_name_to_class_path, scan_jars};
use crate::weaver::names::XML_TRANSIENT_CLASS;

pub fn jar_contains_class(jar_path: &Path, class_path: &str) -> Result<bool> {
    let file = File::open(jar_path)
        .with_context(|| format!("Failed to open jar: {}", jar_path.display()))?;
    // SAFETY: the mapping is read-only and dropped before this function returns.
    let mmap = unsafe {
        Mmap::map(&file).with_context(|| format!("Failed to mmap: {}", jar_path.display()))?
    };
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", jar_path.display()))?;
    Ok(archive.by_name(class_path).is_ok())
}

/// Whether any classpath entry provides `class_name` (dotted or internal).
/// Unreadable entries are skipped with a warning.
pub fn classpath_contains(classpath: &[PathBuf], class_name: &str) -> bool {
    let class_path = class_name_to_class_path(&class_name.replace('/', "."));
    for entry in classpath {
        let found = if entry.is_dir() {
            directory_contains(entry, &class_path)
        } else {
            jar_contains_class(entry, &class_path)
        };
        match found {
            Ok(true) => {
                debug!(class = class_name, entry = %entry.display(), "Found on classpath");
                return true;
            }
            Ok(false) => {}
            Err(e) => warn!(entry = %entry.display(), error = %e, "Skipping unreadable classpath entry"),
        }
    }
    false
}

/// A directory provides a class either as a loose file or through any jar
/// below it, as a `lib/` folder would.
fn directory_contains(dir: &Path, class_path: &str) -> Result<bool> {
    if dir.join(class_path).is_file() {
        return Ok(true);
    }
    for jar in scan_jars(dir)? {
        match jar_contains_class(&jar, class_path) {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => warn!(jar = %jar.display(), error = %e, "Skipping unreadable jar"),
        }
    }
    Ok(false)
}

/// Whether the JAXB `XmlTransient` annotation is available to woven classes.
pub fn xml_transient_available(classpath: &[PathBuf]) -> bool {
    classpath_contains(classpath, XML_TRANSIENT_CLASS)
}
