//! Resource location: the in-memory resource registry (the classpath
//! analog applications and tests register mapper XML into), filesystem
//! lookup, and package enumeration across registry, directory and archive
//! strategies.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::{LazyLock, RwLock};

use crate::error::{Result, SqlMapperError};

/// Magic prefix identifying an archive file.
pub const ARCHIVE_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

static REGISTRY: LazyLock<RwLock<HashMap<String, Vec<u8>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Static access to named resources.
pub struct Resources;

impl Resources {
    /// Register an in-memory resource under a logical name
    /// (`mappers/UserMapper.xml`). Replaces any previous registration.
    pub fn register(name: &str, content: impl Into<Vec<u8>>) {
        REGISTRY
            .write()
            .expect("resource registry poisoned")
            .insert(name.to_string(), content.into());
    }

    /// Drop every registered in-memory resource.
    pub fn clear_registry() {
        REGISTRY
            .write()
            .expect("resource registry poisoned")
            .clear();
    }

    #[must_use]
    pub fn exists(name: &str) -> bool {
        REGISTRY
            .read()
            .expect("resource registry poisoned")
            .contains_key(name)
            || Path::new(name).is_file()
    }

    /// Resolve a resource to bytes: the registry first, then the
    /// filesystem.
    pub fn load_bytes(name: &str) -> Result<Vec<u8>> {
        if let Some(found) = REGISTRY
            .read()
            .expect("resource registry poisoned")
            .get(name)
        {
            return Ok(found.clone());
        }
        std::fs::read(name).map_err(|e| {
            SqlMapperError::Config(format!("could not find resource '{name}': {e}"))
        })
    }

    pub fn load_string(name: &str) -> Result<String> {
        let bytes = Self::load_bytes(name)?;
        String::from_utf8(bytes).map_err(|_| {
            SqlMapperError::Config(format!("resource '{name}' is not valid UTF-8"))
        })
    }

    /// Enumerate child resource names under a package path. Strategies in
    /// order: registry prefix scan, filesystem directory, archive walk,
    /// and finally a pseudo-listing resource verified line by line.
    pub fn list(package: &str) -> Result<Vec<String>> {
        let prefix = package.replace('.', "/");

        let from_registry = registry_children(&prefix);
        if !from_registry.is_empty() {
            return Ok(from_registry);
        }

        let path = Path::new(&prefix);
        if path.is_dir() {
            return directory_children(path);
        }
        if path.is_file() {
            let bytes = Resources::load_bytes(&prefix)?;
            if bytes.starts_with(&ARCHIVE_MAGIC) {
                return archive_entries(&bytes);
            }
        }

        if let Ok(listing) = Resources::load_string(&prefix) {
            return pseudo_listing_children(&prefix, &listing);
        }

        Ok(Vec::new())
    }
}

fn registry_children(prefix: &str) -> Vec<String> {
    let dir_prefix = format!("{prefix}/");
    let registry = REGISTRY.read().expect("resource registry poisoned");
    let mut children: Vec<String> = registry
        .keys()
        .filter(|name| name.starts_with(&dir_prefix))
        .cloned()
        .collect();
    children.sort();
    children
}

fn directory_children(path: &Path) -> Result<Vec<String>> {
    let mut children = Vec::new();
    let entries = std::fs::read_dir(path).map_err(|e| {
        SqlMapperError::Config(format!("could not list directory '{}': {e}", path.display()))
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| {
            SqlMapperError::Config(format!("could not list directory '{}': {e}", path.display()))
        })?;
        children.push(entry.path().to_string_lossy().into_owned());
    }
    children.sort();
    Ok(children)
}

/// Walk an archive's local file headers, collecting entry names. Only
/// names and sizes are needed, so payloads are skipped by their recorded
/// lengths; entries using data descriptors abort the strategy.
fn archive_entries(bytes: &[u8]) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    let mut cursor = std::io::Cursor::new(bytes);
    let mut header = [0u8; 30];
    loop {
        let mut signature = [0u8; 4];
        if cursor.read_exact(&mut signature).is_err() {
            break;
        }
        if signature != ARCHIVE_MAGIC {
            // Central directory reached; the local entries are done.
            break;
        }
        cursor
            .read_exact(&mut header[4..])
            .map_err(|e| SqlMapperError::Config(format!("truncated archive header: {e}")))?;
        let flags = u16::from_le_bytes([header[6], header[7]]);
        if flags & 0x0008 != 0 {
            return Err(SqlMapperError::Config(
                "archive uses data descriptors; cannot walk entries sequentially".into(),
            ));
        }
        let compressed_size = u32::from_le_bytes([header[18], header[19], header[20], header[21]]);
        let name_len = u16::from_le_bytes([header[26], header[27]]) as usize;
        let extra_len = u16::from_le_bytes([header[28], header[29]]) as usize;

        let mut name = vec![0u8; name_len];
        cursor
            .read_exact(&mut name)
            .map_err(|e| SqlMapperError::Config(format!("truncated archive entry name: {e}")))?;
        entries.push(String::from_utf8_lossy(&name).into_owned());

        let skip = extra_len as u64 + u64::from(compressed_size);
        cursor.set_position(cursor.position() + skip);
    }
    Ok(entries)
}

/// A directory resource served as a text listing: each line is a
/// candidate child, verified by a further lookup. Any line that fails
/// verification aborts the whole strategy.
fn pseudo_listing_children(prefix: &str, listing: &str) -> Result<Vec<String>> {
    let mut children = Vec::new();
    for line in listing.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let candidate = format!("{prefix}/{line}");
        if !Resources::exists(&candidate) {
            return Err(SqlMapperError::Config(format!(
                "directory listing for '{prefix}' names '{line}' but no such resource exists"
            )));
        }
        children.push(candidate);
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive_with(names: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, data) in names {
            out.extend_from_slice(&ARCHIVE_MAGIC);
            out.extend_from_slice(&[0u8; 2]); // version
            out.extend_from_slice(&[0u8; 2]); // flags
            out.extend_from_slice(&[0u8; 2]); // method: stored
            out.extend_from_slice(&[0u8; 4]); // time/date
            out.extend_from_slice(&[0u8; 4]); // crc
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes()); // extra len
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(data);
        }
        // Central directory signature terminates the walk.
        out.extend_from_slice(&[0x50, 0x4B, 0x01, 0x02]);
        out
    }

    #[test]
    fn walks_archive_local_headers() {
        let archive = archive_with(&[("mappers/A.xml", b"<a/>"), ("mappers/B.xml", b"<b/>")]);
        assert!(archive.starts_with(&ARCHIVE_MAGIC));
        let entries = archive_entries(&archive).unwrap();
        assert_eq!(entries, vec!["mappers/A.xml", "mappers/B.xml"]);
    }

    #[test]
    fn registry_prefix_scan() {
        Resources::register("scan_pkg/one.xml", "<a/>");
        Resources::register("scan_pkg/two.xml", "<b/>");
        Resources::register("other_pkg/three.xml", "<c/>");
        let children = Resources::list("scan_pkg").unwrap();
        assert_eq!(children, vec!["scan_pkg/one.xml", "scan_pkg/two.xml"]);
    }

    #[test]
    fn pseudo_listing_aborts_on_unverifiable_line() {
        // A listing resource with no registered children falls through to
        // the pseudo-listing strategy, and a line that fails the lookup
        // aborts it.
        Resources::register("listed_bad", "missing.xml");
        assert!(Resources::list("listed_bad").is_err());
    }

    #[test]
    fn registry_scan_precedes_pseudo_listing() {
        Resources::register("listed_ok", "good.xml");
        Resources::register("listed_ok/good.xml", "<a/>");
        let children = Resources::list("listed_ok").unwrap();
        assert_eq!(children, vec!["listed_ok/good.xml"]);
    }
}
