use anyhow::Result;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

const CLASS_SUFFIX: &str = ".class";

fn walk_with_extension(base_path: &Path, extension: &'static str) -> Result<Vec<PathBuf>> {
    if !base_path.is_dir() {
        anyhow::bail!("Not a directory: {}", base_path.display());
    }
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(base_path)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if path.is_file() && path.extension().is_some_and(|e| e == extension) {
                    let _ = tx.send(path.to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut found: Vec<PathBuf> = rx.iter().collect();
    found.sort();
    Ok(found)
}

pub fn scan_jars(base_path: &Path) -> Result<Vec<PathBuf>> {
    walk_with_extension(base_path, "jar")
}

/// Every `.class` file below `base_path`, sorted.
pub fn scan_class_files(base_path: &Path) -> Result<Vec<PathBuf>> {
    walk_with_extension(base_path, "class")
}

pub fn class_name_to_class_path(class_name: &str) -> String {
    format!("{}{CLASS_SUFFIX}", class_name.replace('.', "/"))
}

/// Internal class name of a jar entry such as `com/acme/Employee.class`.
/// Metadata entries and module descriptors have none.
pub fn class_name_of_entry(entry: &str) -> Option<&str> {
    let name = entry.strip_suffix(CLASS_SUFFIX)?;
    if name.is_empty()
        || entry.starts_with("META-INF/")
        || name.ends_with("module-info")
        || name.ends_with("package-info")
    {
        return None;
    }
    Some(name)
}

/// Internal class name of a class file below `root`.
pub fn class_name_of_file(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    let joined = parts.join("/");
    class_name_of_entry(&joined).map(str::to_string)
}
