//! Core value types for logical paths, physical URLs and replica metadata.
//!
//! Naming convention, inherited from the grid tooling this layer fronts:
//! a *logical path* is the catalog-rooted path users see; a *physical URL*
//! is where one replica of that file actually lives on a storage element.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// An absolute, slash-separated path in the logical file catalog.
///
/// Immutable; `join` and `parent` construct new values. Construction
/// collapses duplicate slashes and strips trailing ones, so two spellings
/// of the same path compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalPath(String);

impl LogicalPath {
    /// Parse an absolute catalog path. Relative paths are rejected.
    pub fn new(path: &str) -> Result<Self> {
        if !path.starts_with('/') {
            return Err(StorageError::InvalidPath {
                path: path.to_string(),
            });
        }
        let mut normalised = String::with_capacity(path.len());
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            normalised.push('/');
            normalised.push_str(segment);
        }
        if normalised.is_empty() {
            normalised.push('/');
        }
        Ok(LogicalPath(normalised))
    }

    /// The catalog root, `/`.
    pub fn root() -> Self {
        LogicalPath("/".to_string())
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Construct the path of a child entry.
    pub fn join(&self, name: &str) -> LogicalPath {
        if self.0 == "/" {
            LogicalPath(format!("/{}", name))
        } else {
            LogicalPath(format!("{}/{}", self.0, name))
        }
    }

    /// The containing directory, or `None` at the root.
    pub fn parent(&self) -> Option<LogicalPath> {
        if self.0 == "/" {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(LogicalPath::root()),
            Some(idx) => Some(LogicalPath(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// The final path segment; empty only for the root.
    pub fn base_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }
}

impl std::fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The physical location of one replica, e.g. `srm://se.example:8444/...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysicalUrl(String);

impl PhysicalUrl {
    /// Wrap a URL string.
    pub fn new(url: impl Into<String>) -> Self {
        PhysicalUrl(url.into())
    }

    /// The URL as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into (authority, path), dropping the scheme.
    ///
    /// For `root://host:1097/pool/a/b` this is `("host:1097", "/pool/a/b")`.
    /// A URL with no scheme separator is treated as all-authority.
    pub fn host_and_path(&self) -> (&str, &str) {
        let rest = match self.0.find("://") {
            Some(idx) => &self.0[idx + 3..],
            None => self.0.as_str(),
        };
        match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        }
    }
}

impl std::fmt::Display for PhysicalUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A replica checksum as reported by the middleware (ADLER32 hex).
///
/// The middleware reports `?` when it cannot compute one; such values
/// never compare equal to anything, including themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Wrap a backend-reported checksum string.
    pub fn new(value: impl Into<String>) -> Self {
        Checksum(value.into())
    }

    /// Checksum of an in-memory byte buffer (CRC32, hex-encoded).
    ///
    /// Used by the in-process backends and tests, where no middleware is
    /// around to compute ADLER32.
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(data);
        Checksum(format!("{:08x}", hasher.finalize()))
    }

    /// The checksum string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the backend actually produced a value.
    pub fn is_known(&self) -> bool {
        !self.0.is_empty() && !self.0.contains('?')
    }

    /// Case-insensitive comparison; unknown checksums match nothing.
    pub fn matches(&self, other: &Checksum) -> bool {
        self.is_known() && other.is_known() && self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accessibility of one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaState {
    /// Immediately readable.
    Online,
    /// Tape-resident; needs staging before transfer.
    Nearline,
    /// The backend could not report a state.
    Unknown,
}

impl ReplicaState {
    /// Parse a middleware status attribute such as `ONLINE_AND_NEARLINE`.
    pub fn from_status_str(status: &str) -> Self {
        let s = status.trim();
        if s.starts_with("ONLINE") {
            ReplicaState::Online
        } else if s.starts_with("NEARLINE") {
            ReplicaState::Nearline
        } else {
            ReplicaState::Unknown
        }
    }
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
}

/// One entry of a catalog or storage-element listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Base name of the entry (no path component).
    pub name: String,
    /// File or directory.
    pub kind: EntryKind,
    /// Size in bytes, when the listing reported one.
    pub size: Option<u64>,
    /// Modification timestamp as reported, unparsed.
    pub modified: Option<String>,
}

impl DirectoryEntry {
    /// Parse one `ls -l` style row: mode links uid gid size date... name.
    ///
    /// Both the storage listing tools and the catalog listing tools print
    /// this shape. Rows that do not fit are skipped by callers; listings
    /// may print full URLs in the name column, so only the base name is
    /// kept.
    pub fn from_ls_row(line: &str) -> Option<DirectoryEntry> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            return None;
        }
        let kind = if fields[0].starts_with('d') {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let size = fields[4].parse::<u64>().ok();
        let name = fields[fields.len() - 1];
        let modified = fields[5..fields.len() - 1].join(" ");
        Some(DirectoryEntry {
            name: name.rsplit('/').next().unwrap_or(name).to_string(),
            kind,
            size,
            modified: if modified.is_empty() {
                None
            } else {
                Some(modified)
            },
        })
    }

    /// A file entry with the given name and size.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        DirectoryEntry {
            name: name.into(),
            kind: EntryKind::File,
            size: Some(size),
            modified: None,
        }
    }

    /// A directory entry with the given name.
    pub fn directory(name: impl Into<String>) -> Self {
        DirectoryEntry {
            name: name.into(),
            kind: EntryKind::Directory,
            size: None,
            modified: None,
        }
    }
}

/// Size and modification time of a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// Size in bytes.
    pub size: u64,
    /// Modification timestamp as reported, unparsed.
    pub modified: Option<String>,
}

/// Handle for an asynchronous bring-online request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTicket {
    /// Unique ticket identifier.
    pub id: uuid::Uuid,
    /// URL being brought online.
    pub url: PhysicalUrl,
}

impl StageTicket {
    /// New ticket for the given URL.
    pub fn new(url: PhysicalUrl) -> Self {
        StageTicket {
            id: uuid::Uuid::new_v4(),
            url,
        }
    }
}

/// Poll result for a stage ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    /// Still being recalled from tape.
    Pending,
    /// The replica is online and ready for transfer.
    Ready,
    /// The backend gave up on the request.
    Failed {
        /// Backend-reported reason.
        reason: String,
    },
}
