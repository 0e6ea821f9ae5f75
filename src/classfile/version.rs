//! Java SE release table.
//!
//! Ordered oldest to newest. Lookups that miss fall back to the nearest end
//! of the table with a warning, never an error.

use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JavaVersion {
    pub name: &'static str,
    pub major: u16,
    pub minor: u16,
}

/// First class-file version whose verifier requires `StackMapTable`.
pub const STACK_MAP_MAJOR: u16 = 50;

pub const VERSIONS: &[JavaVersion] = &[
    JavaVersion { name: "1.1", major: 45, minor: 3 },
    JavaVersion { name: "1.2", major: 46, minor: 0 },
    JavaVersion { name: "1.3", major: 47, minor: 0 },
    JavaVersion { name: "1.4", major: 48, minor: 0 },
    JavaVersion { name: "1.5", major: 49, minor: 0 },
    JavaVersion { name: "1.6", major: 50, minor: 0 },
    JavaVersion { name: "1.7", major: 51, minor: 0 },
    JavaVersion { name: "1.8", major: 52, minor: 0 },
    JavaVersion { name: "9", major: 53, minor: 0 },
    JavaVersion { name: "10", major: 54, minor: 0 },
    JavaVersion { name: "11", major: 55, minor: 0 },
    JavaVersion { name: "12", major: 56, minor: 0 },
    JavaVersion { name: "13", major: 57, minor: 0 },
    JavaVersion { name: "14", major: 58, minor: 0 },
    JavaVersion { name: "15", major: 59, minor: 0 },
    JavaVersion { name: "16", major: 60, minor: 0 },
    JavaVersion { name: "17", major: 61, minor: 0 },
    JavaVersion { name: "18", major: 62, minor: 0 },
    JavaVersion { name: "19", major: 63, minor: 0 },
    JavaVersion { name: "20", major: 64, minor: 0 },
    JavaVersion { name: "21", major: 65, minor: 0 },
    JavaVersion { name: "22", major: 66, minor: 0 },
    JavaVersion { name: "23", major: 67, minor: 0 },
    JavaVersion { name: "24", major: 68, minor: 0 },
    JavaVersion { name: "25", major: 69, minor: 0 },
];

impl JavaVersion {
    pub fn oldest() -> &'static JavaVersion {
        &VERSIONS[0]
    }

    pub fn latest() -> &'static JavaVersion {
        &VERSIONS[VERSIONS.len() - 1]
    }

    /// Feature release number: 8 for `1.8`, 17 for `17`.
    pub fn feature(&self) -> u32 {
        feature_number(self.name).unwrap_or(0)
    }

    pub fn has_stack_maps(&self) -> bool {
        self.major >= STACK_MAP_MAJOR
    }
}

fn feature_number(spec: &str) -> Option<u32> {
    let mut parts = spec.trim().split(['.', '-', '+', '_']);
    let first: u32 = parts.next()?.parse().ok()?;
    if first == 1 {
        parts.next()?.parse().ok()
    } else {
        Some(first)
    }
}

/// Resolves a runtime `java.specification.version` value. `None` means the
/// value could not be read, which selects the oldest release.
pub fn resolve_spec_version(spec: Option<&str>) -> &'static JavaVersion {
    let Some(spec) = spec else {
        warn!(
            fallback = JavaVersion::oldest().name,
            "Cannot read java.specification.version"
        );
        return JavaVersion::oldest();
    };
    let Some(feature) = feature_number(spec) else {
        warn!(version = spec, fallback = JavaVersion::oldest().name, "Unrecognized Java SE version");
        return JavaVersion::oldest();
    };
    if let Some(v) = VERSIONS.iter().find(|v| v.feature() == feature) {
        debug!(version = v.name, major = v.major, "Resolved Java SE version");
        return v;
    }
    if feature > JavaVersion::latest().feature() {
        warn!(
            version = spec,
            fallback = JavaVersion::latest().name,
            "Java SE version is not fully supported yet"
        );
        JavaVersion::latest()
    } else {
        warn!(version = spec, fallback = JavaVersion::oldest().name, "Java SE version is too old");
        JavaVersion::oldest()
    }
}

/// Release a class-file major version belongs to, clamped into the table.
/// The flag is true when clamping happened.
pub fn for_class_major(major: u16) -> (&'static JavaVersion, bool) {
    if let Some(v) = VERSIONS.iter().find(|v| v.major == major) {
        return (v, false);
    }
    if major > JavaVersion::latest().major {
        (JavaVersion::latest(), true)
    } else {
        (JavaVersion::oldest(), true)
    }
}
