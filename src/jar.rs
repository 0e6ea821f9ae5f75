//! Weaving of whole archives and class directories.
//!
//! Every class is woven in memory first; output is written only after all of
//! them succeeded, through temporary files renamed into place. A failing
//! class therefore leaves the previous output untouched.

use anyhow::{Context, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::{FileOptions, ZipWriter};
use zip::{CompressionMethod, DateTime, ZipArchive};

use crate::error::WeaveError;
use crate::scan::{class_name_of_entry, class_name_of_file, scan_class_files};
use crate::weaver::{ClassWeaver, WeaveContext, WeaveOutcome, WeaveReport};

/// What one archive or directory run did.
#[derive(Debug, Default, Serialize)]
pub struct ArchiveSummary {
    pub input: String,
    pub output: String,
    pub classes: usize,
    pub woven: usize,
    pub already_woven: usize,
    pub reports: Vec<WeaveReport>,
}

struct ArchiveEntry {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
    is_dir: bool,
    modified: DateTime,
    unix_mode: Option<u32>,
}

impl ArchiveEntry {
    fn options(&self) -> FileOptions {
        let method = match self.compression {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let options = FileOptions::default()
            .compression_method(method)
            .last_modified_time(self.modified);
        match self.unix_mode {
            Some(mode) => options.unix_permissions(mode & 0o777),
            None => options,
        }
    }
}

/// Jar signature files under `META-INF/`. They stop verifying once any
/// class changes.
fn is_signature_entry(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    let Some(file) = upper.strip_prefix("META-INF/") else {
        return false;
    };
    !file.contains('/')
        && (file.starts_with("SIG-")
            || [".SF", ".RSA", ".DSA", ".EC"].iter().any(|ext| file.ends_with(ext)))
}

enum EntryResult {
    Untouched,
    AlreadyWoven,
    Woven(Vec<u8>, WeaveReport),
}

fn weave_entry(weaver: &ClassWeaver<'_>, name: &str, bytes: &[u8]) -> Result<EntryResult, WeaveError> {
    if weaver.model().get(name).is_none() {
        return Ok(EntryResult::Untouched);
    }
    Ok(match weaver.weave(bytes)? {
        WeaveOutcome::AlreadyWoven => EntryResult::AlreadyWoven,
        WeaveOutcome::Woven { bytes, report } => EntryResult::Woven(bytes, report),
    })
}

fn read_archive(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let file = File::open(path).with_context(|| format!("Failed to open jar: {}", path.display()))?;
    // SAFETY: the mapping is read-only and every entry is copied out before it
    // is dropped at the end of this function.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to mmap jar: {}", path.display()))?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", path.display()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("Failed to read {} in {}", entry.name(), path.display()))?;
        entries.push(ArchiveEntry {
            name: entry.name().to_string(),
            data,
            compression: entry.compression(),
            is_dir: entry.is_dir(),
            modified: entry.last_modified(),
            unix_mode: entry.unix_mode(),
        });
    }
    Ok(entries)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Writes the content for `path` into its sibling temp file and returns
/// that file's path. Nothing is left behind on failure.
fn stage(path: &Path, write: impl FnOnce(File) -> Result<()>) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let tmp = temp_path_for(path);
    let file = File::create(&tmp).with_context(|| format!("Failed to create: {}", tmp.display()))?;
    if let Err(e) = write(file) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(tmp)
}

fn commit(tmp: &Path, path: &Path) -> Result<()> {
    std::fs::rename(tmp, path).with_context(|| {
        format!(
            "Failed to atomically replace output file: {}",
            path.display()
        )
    })
}

/// Writes through a sibling temp file and renames it over `path`.
fn replace_file(path: &Path, write: impl FnOnce(File) -> Result<()>) -> Result<()> {
    let tmp = stage(path, write)?;
    commit(&tmp, path)
}

/// Stages every file before renaming any of them, so a write error leaves
/// all targets as they were.
fn replace_files(files: &[(PathBuf, Vec<u8>)]) -> Result<()> {
    let mut staged = Vec::with_capacity(files.len());
    for (target, data) in files {
        let result = stage(target, |mut f| {
            f.write_all(data)
                .with_context(|| format!("Failed to write: {}", target.display()))
        });
        match result {
            Ok(tmp) => staged.push((tmp, target)),
            Err(e) => {
                for (tmp, _) in &staged {
                    let _ = std::fs::remove_file(tmp);
                }
                return Err(e);
            }
        }
    }
    for (tmp, target) in &staged {
        commit(tmp, target)?;
    }
    Ok(())
}

fn write_archive(path: &Path, entries: &[ArchiveEntry]) -> Result<()> {
    replace_file(path, |file| {
        let mut zip = ZipWriter::new(file);
        for entry in entries {
            if entry.is_dir {
                zip.add_directory(entry.name.as_str(), entry.options())?;
                continue;
            }
            zip.start_file(entry.name.as_str(), entry.options())?;
            zip.write_all(&entry.data)?;
        }
        zip.finish()?;
        Ok(())
    })
}

fn record(summary: &mut ArchiveSummary, result: &EntryResult) {
    match result {
        EntryResult::Untouched => {}
        EntryResult::AlreadyWoven => summary.already_woven += 1,
        EntryResult::Woven(..) => summary.woven += 1,
    }
}

/// Header pre-pass over a jar: records classes that implement change
/// tracking themselves. Returns the number of classes seen.
pub fn observe_jar(path: &Path, context: &mut WeaveContext) -> Result<usize> {
    let mut seen = 0;
    for entry in read_archive(path)? {
        if entry.is_dir || class_name_of_entry(&entry.name).is_none() {
            continue;
        }
        seen += 1;
        if let Err(e) = context.observe(&entry.data) {
            warn!(entry = %entry.name, jar = %path.display(), error = %e, "Skipping unreadable class");
        }
    }
    Ok(seen)
}

/// Same pre-pass over a directory of class files.
pub fn observe_directory(root: &Path, context: &mut WeaveContext) -> Result<usize> {
    let files = scan_class_files(root)?;
    for file in &files {
        let bytes = std::fs::read(file).with_context(|| format!("Failed to read: {}", file.display()))?;
        if let Err(e) = context.observe(&bytes) {
            warn!(file = %file.display(), error = %e, "Skipping unreadable class");
        }
    }
    Ok(files.len())
}

/// Weaves every model class in `input` into the archive at `output`, which
/// may be the input itself. Other entries are copied unchanged.
pub fn weave_jar(input: &Path, output: &Path, weaver: &ClassWeaver<'_>) -> Result<ArchiveSummary> {
    let mut entries = read_archive(input)?;

    let results: Vec<EntryResult> = entries
        .par_iter()
        .map(|entry| match class_name_of_entry(&entry.name) {
            Some(name) if !entry.is_dir => weave_entry(weaver, name, &entry.data)
                .with_context(|| format!("Failed to weave {} in {}", entry.name, input.display())),
            _ => Ok(EntryResult::Untouched),
        })
        .collect::<Result<_>>()?;

    let mut summary = ArchiveSummary {
        input: input.to_string_lossy().to_string(),
        output: output.to_string_lossy().to_string(),
        classes: entries
            .iter()
            .filter(|e| !e.is_dir && class_name_of_entry(&e.name).is_some())
            .count(),
        ..Default::default()
    };
    for (entry, result) in entries.iter_mut().zip(results) {
        record(&mut summary, &result);
        if let EntryResult::Woven(bytes, report) = result {
            debug!(entry = %entry.name, "Replacing entry");
            entry.data = bytes;
            summary.reports.push(report);
        }
    }

    if summary.woven > 0 {
        let before = entries.len();
        entries.retain(|e| !is_signature_entry(&e.name));
        if entries.len() < before {
            warn!(
                jar = %input.display(),
                removed = before - entries.len(),
                "Dropped jar signature; the woven archive is unsigned"
            );
        }
    }

    write_archive(output, &entries)?;
    info!(
        jar = %input.display(),
        classes = summary.classes,
        woven = summary.woven,
        already_woven = summary.already_woven,
        "Woven archive"
    );
    Ok(summary)
}

/// Weaves the class files below `input` into the same relative paths below
/// `output`. Classes outside the model are copied when the directories
/// differ. Every output file is staged before the first one is renamed into
/// place, and the caller records the ledger row only after this returns.
pub fn weave_directory(
    input: &Path,
    output: &Path,
    weaver: &ClassWeaver<'_>,
) -> Result<ArchiveSummary> {
    let files = scan_class_files(input)?;
    let in_place = input == output;

    let results: Vec<(PathBuf, Vec<u8>, EntryResult)> = files
        .par_iter()
        .map(|file| -> Result<(PathBuf, Vec<u8>, EntryResult)> {
            let bytes =
                std::fs::read(file).with_context(|| format!("Failed to read: {}", file.display()))?;
            let result = match class_name_of_file(input, file) {
                Some(name) => weave_entry(weaver, &name, &bytes)
                    .with_context(|| format!("Failed to weave {}", file.display()))?,
                None => EntryResult::Untouched,
            };
            Ok((file.clone(), bytes, result))
        })
        .collect::<Result<_>>()?;

    let mut summary = ArchiveSummary {
        input: input.to_string_lossy().to_string(),
        output: output.to_string_lossy().to_string(),
        classes: files.len(),
        ..Default::default()
    };
    let mut writes = Vec::new();
    for (file, original, result) in results {
        record(&mut summary, &result);
        let relative = file.strip_prefix(input).unwrap_or(&file);
        let data = match result {
            EntryResult::Woven(bytes, report) => {
                summary.reports.push(report);
                bytes
            }
            _ if in_place => continue,
            _ => original,
        };
        writes.push((output.join(relative), data));
    }
    replace_files(&writes)?;

    info!(
        dir = %input.display(),
        classes = summary.classes,
        woven = summary.woven,
        already_woven = summary.already_woven,
        "Woven directory"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::ClassFile;
    use crate::classfile::JavaType;
    use crate::model::{AttributeDetails, ClassDetails, WeavingModel};
    use crate::weaver::fixtures::{EntityClass, employee_class};
    use crate::weaver::names::{CHANGE_TRACKER, PERSISTENCE_WEAVED};
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_path(suffix: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "class-weaver-jar-{}-{}-{n}{suffix}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    fn employee_model() -> WeavingModel {
        let mut d = ClassDetails::new("com.acme.Employee");
        d.weave_internal = true;
        d.weave_change_tracking = true;
        d.attributes = vec![
            AttributeDetails::new("manager", JavaType::object("com/acme/Employee")),
            AttributeDetails::new("salary", JavaType::Int),
        ];
        WeavingModel::from_classes(vec![d]).unwrap()
    }

    fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        zip.add_directory("com/acme/", FileOptions::default()).unwrap();
        for (name, data) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn read_entry(path: &Path, name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        data
    }

    #[test]
    fn weaves_model_classes_and_copies_the_rest() {
        let input = temp_path(".jar");
        let output = temp_path("-woven.jar");
        let other = EntityClass::new("com/acme/Other", "java/lang/Object").build();
        write_jar(
            &input,
            &[
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".to_vec()),
                ("com/acme/Employee.class", employee_class()),
                ("com/acme/Other.class", other.clone()),
            ],
        );

        let model = employee_model();
        let context = WeaveContext::default();
        let summary = weave_jar(&input, &output, &ClassWeaver::new(&model, &context)).unwrap();
        assert_eq!(summary.classes, 2);
        assert_eq!(summary.woven, 1);
        assert_eq!(summary.reports[0].class, "com/acme/Employee");

        let woven = ClassFile::parse(&read_entry(&output, "com/acme/Employee.class")).unwrap();
        assert!(woven.interface_names().unwrap().iter().any(|i| i == PERSISTENCE_WEAVED));
        assert_eq!(read_entry(&output, "com/acme/Other.class"), other);
        assert_eq!(read_entry(&output, "META-INF/MANIFEST.MF"), b"Manifest-Version: 1.0\n");
        assert!(!temp_path_for(&output).exists());

        // Weaving the output again changes nothing.
        let again = temp_path("-again.jar");
        let summary = weave_jar(&output, &again, &ClassWeaver::new(&model, &context)).unwrap();
        assert_eq!((summary.woven, summary.already_woven), (0, 1));
        assert_eq!(
            read_entry(&again, "com/acme/Employee.class"),
            read_entry(&output, "com/acme/Employee.class")
        );

        for p in [input, output, again] {
            let _ = fs::remove_file(p);
        }
    }

    #[test]
    fn keeps_entry_metadata_and_drops_stale_signature() {
        let input = temp_path(".jar");
        let output = temp_path("-woven.jar");
        let stamp = DateTime::from_date_and_time(2001, 2, 3, 4, 5, 6).unwrap();
        let options = FileOptions::default()
            .last_modified_time(stamp)
            .unix_permissions(0o755);
        let mut zip = ZipWriter::new(File::create(&input).unwrap());
        for (name, data) in [
            ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".to_vec()),
            ("META-INF/APP.SF", b"sig".to_vec()),
            ("META-INF/APP.RSA", b"block".to_vec()),
            ("com/acme/Employee.class", employee_class()),
            ("bin/run.sh", b"#!/bin/sh\n".to_vec()),
        ] {
            zip.start_file(name, options).unwrap();
            zip.write_all(&data).unwrap();
        }
        zip.finish().unwrap();

        let model = employee_model();
        let context = WeaveContext::default();
        weave_jar(&input, &output, &ClassWeaver::new(&model, &context)).unwrap();

        let mut archive = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        assert!(archive.by_name("META-INF/APP.SF").is_err());
        assert!(archive.by_name("META-INF/APP.RSA").is_err());
        assert!(archive.by_name("META-INF/MANIFEST.MF").is_ok());
        for name in ["com/acme/Employee.class", "bin/run.sh"] {
            let entry = archive.by_name(name).unwrap();
            let modified = entry.last_modified();
            assert_eq!(
                (modified.year(), modified.month(), modified.day()),
                (2001, 2, 3),
                "{name}"
            );
            assert_eq!(
                (modified.hour(), modified.minute(), modified.second()),
                (4, 5, 6),
                "{name}"
            );
            assert_eq!(entry.unix_mode().map(|m| m & 0o777), Some(0o755), "{name}");
        }

        let _ = fs::remove_file(input);
        let _ = fs::remove_file(output);
    }

    #[test]
    fn unwoven_jar_keeps_its_signature() {
        let input = temp_path(".jar");
        let output = temp_path("-copy.jar");
        let other = EntityClass::new("com/acme/Other", "java/lang/Object").build();
        write_jar(
            &input,
            &[("META-INF/APP.SF", b"sig".to_vec()), ("com/acme/Other.class", other)],
        );

        let model = employee_model();
        let context = WeaveContext::default();
        weave_jar(&input, &output, &ClassWeaver::new(&model, &context)).unwrap();
        assert_eq!(read_entry(&output, "META-INF/APP.SF"), b"sig");

        let _ = fs::remove_file(input);
        let _ = fs::remove_file(output);
    }

    #[test]
    fn signature_entries_are_recognized() {
        assert!(is_signature_entry("META-INF/APP.SF"));
        assert!(is_signature_entry("meta-inf/app.rsa"));
        assert!(is_signature_entry("META-INF/SIG-FOO"));
        assert!(!is_signature_entry("META-INF/MANIFEST.MF"));
        assert!(!is_signature_entry("META-INF/services/APP.SF"));
        assert!(!is_signature_entry("com/acme/APP.SF"));
    }

    #[test]
    fn failing_class_leaves_existing_output_alone() {
        let input = temp_path(".jar");
        write_jar(&input, &[("com/acme/Employee.class", b"\xca\xfe\xba\xbe broken".to_vec())]);

        let model = employee_model();
        let context = WeaveContext::default();
        let err = weave_jar(&input, &input, &ClassWeaver::new(&model, &context)).unwrap_err();
        assert!(format!("{err:#}").contains("com/acme/Employee.class"));
        assert_eq!(read_entry(&input, "com/acme/Employee.class"), b"\xca\xfe\xba\xbe broken");
        assert!(!temp_path_for(&input).exists());

        let _ = fs::remove_file(input);
    }

    #[test]
    fn observe_finds_native_change_trackers() {
        let input = temp_path(".jar");
        let tracker = EntityClass::new("com/acme/Employee", "java/lang/Object")
            .implements(CHANGE_TRACKER)
            .build();
        write_jar(
            &input,
            &[("com/acme/Employee.class", tracker), ("README", b"x".to_vec())],
        );

        let mut context = WeaveContext::default();
        assert_eq!(observe_jar(&input, &mut context).unwrap(), 1);
        assert_eq!(context.native_change_tracker_count(), 1);

        let _ = fs::remove_file(input);
    }

    #[test]
    fn weaves_class_directory_into_separate_output() {
        let input = temp_path("-classes");
        let output = temp_path("-woven");
        let package = input.join("com/acme");
        fs::create_dir_all(&package).unwrap();
        fs::write(package.join("Employee.class"), employee_class()).unwrap();
        let other = EntityClass::new("com/acme/Other", "java/lang/Object").build();
        fs::write(package.join("Other.class"), &other).unwrap();

        let model = employee_model();
        let mut context = WeaveContext::default();
        assert_eq!(observe_directory(&input, &mut context).unwrap(), 2);
        let summary = weave_directory(&input, &output, &ClassWeaver::new(&model, &context)).unwrap();
        assert_eq!((summary.classes, summary.woven), (2, 1));

        let woven = fs::read(output.join("com/acme/Employee.class")).unwrap();
        assert_ne!(woven, employee_class());
        assert_eq!(fs::read(output.join("com/acme/Other.class")).unwrap(), other);
        assert_eq!(fs::read(package.join("Employee.class")).unwrap(), employee_class());

        let _ = fs::remove_dir_all(input);
        let _ = fs::remove_dir_all(output);
    }

    #[test]
    fn directory_write_error_leaves_no_partial_output() {
        let input = temp_path("-classes");
        let output = temp_path("-woven");
        let package = input.join("com/acme");
        fs::create_dir_all(&package).unwrap();
        fs::write(package.join("Employee.class"), employee_class()).unwrap();
        let other = EntityClass::new("com/acme/Other", "java/lang/Object").build();
        fs::write(package.join("Other.class"), &other).unwrap();
        // A directory where the temp file for Other.class must go.
        fs::create_dir_all(output.join("com/acme/Other.class.tmp")).unwrap();

        let model = employee_model();
        let context = WeaveContext::default();
        let err = weave_directory(&input, &output, &ClassWeaver::new(&model, &context));
        assert!(err.is_err());
        assert!(!output.join("com/acme/Employee.class").exists());
        assert!(!output.join("com/acme/Employee.class.tmp").exists());
        assert!(!output.join("com/acme/Other.class").exists());

        let _ = fs::remove_dir_all(input);
        let _ = fs::remove_dir_all(output);
    }
}
