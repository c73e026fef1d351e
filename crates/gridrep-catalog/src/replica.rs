//! The replica record: one physical copy of a logical file.

use serde::{Deserialize, Serialize};

use gridrep_storage::{Checksum, LogicalPath, PhysicalUrl, ReplicaState};

/// One physical copy of a logical file at a specific storage element.
///
/// `se` is always the resolved element name: clients either store it at
/// registration time or resolve it from the URL through the registry, and
/// an unresolvable URL is a reported error rather than a record with a
/// missing element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    /// The logical file this is a copy of.
    pub path: LogicalPath,
    /// Name of the storage element holding the copy.
    pub se: String,
    /// Where the copy physically lives.
    pub url: PhysicalUrl,
    /// Catalog checksum; may be unknown (`?`) when the middleware could
    /// not compute one.
    pub checksum: Checksum,
    /// Last known accessibility, `Unknown` until a backend is asked.
    pub state: ReplicaState,
}

impl Replica {
    /// A replica record in the `Unknown` state.
    pub fn new(
        path: LogicalPath,
        se: impl Into<String>,
        url: PhysicalUrl,
        checksum: Checksum,
    ) -> Self {
        Replica {
            path,
            se: se.into(),
            url,
            checksum,
            state: ReplicaState::Unknown,
        }
    }
}
