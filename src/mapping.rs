//! Mapping catalog: turns a directory of segment dumps into executable
//! [`MemoryMapping`]s.
//!
//! Segment files are named `<base>_<end>_<perm>_<perm>[_<rest>...]`, where
//! `<base>` is the hexadecimal start address of the segment and the two
//! permission fields together carry the `r`/`w`/`x` markers.

use crate::error::{Result, TraceError};
use bitflags::bitflags;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FIELD_SEPARATOR: char = '_';
const MIN_FIELDS: usize = 4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u8 {
        const READ = 0b001;
        const WRITE = 0b010;
        const EXECUTE = 0b100;
    }
}

impl Permissions {
    /// Collect the `r`, `w` and `x` markers in `marks`; anything else
    /// (`-`, `p`, `s`) is ignored.
    pub fn parse(marks: &str) -> Self {
        marks.chars().fold(Self::empty(), |perms, c| match c {
            'r' => perms | Self::READ,
            'w' => perms | Self::WRITE,
            'x' => perms | Self::EXECUTE,
            _ => perms,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMapping {
    pub path: PathBuf,
    pub base_address: u64,
    pub permissions: Permissions,
}

impl MemoryMapping {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TraceError::MalformedMappingName {
                name: path.display().to_string(),
                reason: "file name is not valid UTF-8".into(),
            })?;
        let (base_address, permissions) = parse_mapping_name(name)?;
        Ok(Self {
            path,
            base_address,
            permissions,
        })
    }

    /// File name of the segment dump
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn is_executable(&self) -> bool {
        self.permissions.contains(Permissions::EXECUTE)
    }
}

/// Parse a segment file name into its base address and permissions.
pub fn parse_mapping_name(name: &str) -> Result<(u64, Permissions)> {
    let malformed = |reason: String| TraceError::MalformedMappingName {
        name: name.to_string(),
        reason,
    };

    let fields: Vec<&str> = name.split(FIELD_SEPARATOR).collect();
    if fields.len() < MIN_FIELDS {
        return Err(malformed(format!(
            "expected at least {MIN_FIELDS} fields, found {}",
            fields.len()
        )));
    }

    let base = fields[0];
    let digits = base
        .strip_prefix("0x")
        .or_else(|| base.strip_prefix("0X"))
        .unwrap_or(base);
    let base_address = u64::from_str_radix(digits, 16)
        .map_err(|e| malformed(format!("base address {base:?} is not hexadecimal: {e}")))?;

    let permissions = Permissions::parse(&fields[2..4].concat());
    Ok((base_address, permissions))
}

/// List the executable mappings in `dir`, in directory enumeration order.
///
/// Only failing to read the directory itself is an error; entries with
/// malformed names are logged and skipped.
pub fn list_executable_mappings(dir: &Path) -> Result<Vec<MemoryMapping>> {
    let mut mappings = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        let mapping = match MemoryMapping::from_path(entry.path()) {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!(error = %e, "Skipping mapping");
                continue;
            }
        };

        if mapping.is_executable() {
            mappings.push(mapping);
        } else {
            debug!(mapping = mapping.name(), "Not executable");
        }
    }

    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_parse_base_and_permissions() {
        let (base, perms) = parse_mapping_name("7f12a4000000_7f12a4021000_r_x_libc_so_6").unwrap();
        assert_eq!(base, 0x7f12a4000000);
        assert_eq!(perms, Permissions::READ | Permissions::EXECUTE);
    }

    #[test]
    fn test_permission_fields_are_concatenated() {
        let (_, perms) = parse_mapping_name("400000_401000_rw_x").unwrap();
        assert!(perms.contains(Permissions::EXECUTE));
        assert!(perms.contains(Permissions::WRITE));

        let (_, perms) = parse_mapping_name("400000_401000_r-_-p_heap").unwrap();
        assert_eq!(perms, Permissions::READ);
    }

    #[test]
    fn test_execute_marker_only_counts_in_permission_fields() {
        // "x" appears in the trailing name, not in fields 2-3
        let (_, perms) = parse_mapping_name("400000_401000_r_w_xul").unwrap();
        assert!(!perms.contains(Permissions::EXECUTE));
    }

    #[test]
    fn test_hex_prefix_accepted() {
        let (base, _) = parse_mapping_name("0x1000_2000_r_x").unwrap();
        assert_eq!(base, 0x1000);
    }

    #[test]
    fn test_malformed_names() {
        for name in ["400000_401000_r", "zzzz_401000_r_x", "_401000_r_x", "trace_list"] {
            assert!(
                matches!(
                    parse_mapping_name(name),
                    Err(TraceError::MalformedMappingName { .. })
                ),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_listing_filters_and_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "400000_401000_r_x_hello",
            "601000_602000_rw_p_hello",
            "not-a-mapping",
            "7f0000000000_7f0000001000_r_x_libc_so",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let mut names: Vec<String> = list_executable_mappings(dir.path())
            .unwrap()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            ["400000_401000_r_x_hello", "7f0000000000_7f0000001000_r_x_libc_so"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_listing_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let invalid = dir.path().join(OsStr::from_bytes(b"\xff_1_r_x"));
        File::create(&invalid).unwrap();
        File::create(dir.path().join("400000_401000_r_x_hello")).unwrap();

        assert!(matches!(
            MemoryMapping::from_path(&invalid),
            Err(TraceError::MalformedMappingName { .. })
        ));
        let mappings = list_executable_mappings(dir.path()).unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].name(), "400000_401000_r_x_hello");
    }

    #[test]
    fn test_listing_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("memory");
        assert!(matches!(
            list_executable_mappings(&missing),
            Err(TraceError::Io(_))
        ));
    }
}
