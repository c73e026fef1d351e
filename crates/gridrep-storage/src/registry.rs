//! Storage element registry: the immutable catalog of known SEs.
//!
//! Built once at startup from configuration and passed by reference to the
//! walker and the operation engine; there is no ambient global lookup.
//!
//! URL-to-SE resolution matches the URL's host component, not the whole
//! URL string. An SE's `host` is its authority (`host[:port]`), optionally
//! followed by a path qualifier used to tell apart elements that share an
//! endpoint (an XRootD door fronting both a disk pool and a tape archive).
//! Resolution failure is a reported error, never a silently absent SE.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::types::{LogicalPath, PhysicalUrl};

/// Technology family of a storage element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeTech {
    /// Disk pool; replicas are always online.
    Disk,
    /// Tape archive; replicas need staging before transfer.
    Tape,
    /// Disk cache in front of tape; treated as stageable.
    Hybrid,
}

impl SeTech {
    /// Whether replicas here may be tape-resident and need staging.
    pub fn is_tape_family(&self) -> bool {
        matches!(self, SeTech::Tape | SeTech::Hybrid)
    }
}

impl std::fmt::Display for SeTech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeTech::Disk => f.write_str("disk"),
            SeTech::Tape => f.write_str("tape"),
            SeTech::Hybrid => f.write_str("hybrid"),
        }
    }
}

/// One known grid storage element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageElement {
    /// Unique identifier, e.g. `UKI-LT2-QMUL2-disk`.
    pub name: String,
    /// Authority (`host[:port]`), optionally followed by a path qualifier.
    pub host: String,
    /// Technology family.
    pub tech: SeTech,
    /// Informational location hierarchy, e.g. `/europe/uk/ral`.
    #[serde(default)]
    pub location: String,
    /// Base URL prefix for standard storage paths on this element.
    pub basepath: String,
    /// Base URL prefix for direct access, when it differs from `basepath`.
    #[serde(default)]
    pub directpath: Option<String>,
    /// Known-bad element: excluded from new writes and repairs, but
    /// existing replicas remain queryable.
    #[serde(default)]
    pub broken: bool,
    /// Administratively excluded from everything.
    #[serde(default)]
    pub disabled: bool,
}

impl StorageElement {
    /// Whether this element may be used for new writes and repairs.
    pub fn is_usable(&self) -> bool {
        !self.broken && !self.disabled
    }

    /// Build the physical URL of a logical path on this element.
    ///
    /// `basedir` is the shared namespace root under which the whole
    /// catalog lives on every element.
    pub fn storage_url(&self, basedir: &str, path: &LogicalPath, direct: bool) -> PhysicalUrl {
        let base = if direct {
            self.directpath.as_deref().unwrap_or(&self.basepath)
        } else {
            &self.basepath
        };
        PhysicalUrl::new(format!("{}{}{}", base, basedir, path.as_str()))
    }

    /// Split the configured host into (authority, path qualifier).
    fn host_parts(&self) -> (&str, Option<&str>) {
        match self.host.find('/') {
            Some(idx) => (&self.host[..idx], Some(&self.host[idx + 1..])),
            None => (self.host.as_str(), None),
        }
    }

    /// Match a URL against this element's host.
    ///
    /// Returns the match specificity (number of qualifier segments, 0 for
    /// a bare authority) or `None`. The authority must be equal, not a
    /// substring; a qualifier must match whole leading path segments.
    pub fn matches_url(&self, url: &PhysicalUrl) -> Option<usize> {
        let (url_host, url_path) = url.host_and_path();
        let (authority, qualifier) = self.host_parts();
        if url_host != authority {
            return None;
        }
        match qualifier {
            None => Some(0),
            Some(q) => {
                let q = q.trim_matches('/');
                let rest = url_path.strip_prefix('/')?;
                if rest == q
                    || (rest.starts_with(q) && rest.as_bytes().get(q.len()) == Some(&b'/'))
                {
                    Some(q.split('/').count())
                } else {
                    None
                }
            }
        }
    }
}

impl std::fmt::Display for StorageElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}) [{}]", self.name, self.host, self.location)?;
        if self.broken {
            write!(f, " BROKEN")?;
        }
        if self.disabled {
            write!(f, " DISABLED")?;
        }
        Ok(())
    }
}

/// Immutable registry of all configured storage elements.
///
/// Iteration order is configuration order, which is also the deterministic
/// tie-break used by replica selection.
pub struct SeRegistry {
    basedir: String,
    elements: Vec<StorageElement>,
    by_name: HashMap<String, usize>,
}

impl SeRegistry {
    /// Build a registry from configuration. Duplicate names are rejected.
    pub fn new(basedir: impl Into<String>, elements: Vec<StorageElement>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(elements.len());
        for (idx, se) in elements.iter().enumerate() {
            if by_name.insert(se.name.clone(), idx).is_some() {
                return Err(StorageError::DuplicateElement {
                    name: se.name.clone(),
                });
            }
        }
        Ok(SeRegistry {
            basedir: basedir.into(),
            elements,
            by_name,
        })
    }

    /// The shared namespace root prepended to every storage URL.
    pub fn basedir(&self) -> &str {
        &self.basedir
    }

    /// Look up an element by name.
    pub fn lookup(&self, name: &str) -> Result<&StorageElement> {
        self.get(name).ok_or_else(|| StorageError::UnknownElement {
            name: name.to_string(),
        })
    }

    /// Look up an element by name, `None` when absent.
    pub fn get(&self, name: &str) -> Option<&StorageElement> {
        self.by_name.get(name).map(|&idx| &self.elements[idx])
    }

    /// Position of an element in configuration order.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Resolve a physical URL to the one element that owns it.
    ///
    /// The most specific match (longest path qualifier) wins; a residual
    /// tie is `AmbiguousUrl` and no match at all is `HostNotRecognized`.
    /// Neither case ever degrades to a silently absent element.
    pub fn resolve_by_url(&self, url: &PhysicalUrl) -> Result<&StorageElement> {
        let mut best: Vec<&StorageElement> = Vec::new();
        let mut best_specificity = 0usize;
        for se in &self.elements {
            if let Some(specificity) = se.matches_url(url) {
                if best.is_empty() || specificity > best_specificity {
                    best.clear();
                    best.push(se);
                    best_specificity = specificity;
                } else if specificity == best_specificity {
                    best.push(se);
                }
            }
        }
        match best.len() {
            0 => Err(StorageError::HostNotRecognized {
                url: url.as_str().to_string(),
            }),
            1 => Ok(best[0]),
            _ => Err(StorageError::AmbiguousUrl {
                url: url.as_str().to_string(),
                matched: best.iter().map(|se| se.name.clone()).collect(),
            }),
        }
    }

    /// Usable elements in configuration order.
    ///
    /// Disabled elements are always excluded; broken ones only when
    /// `include_broken` is false. `tech` narrows to one family.
    pub fn list_usable(&self, tech: Option<SeTech>, include_broken: bool) -> Vec<&StorageElement> {
        self.elements
            .iter()
            .filter(|se| !se.disabled)
            .filter(|se| include_broken || !se.broken)
            .filter(|se| tech.map_or(true, |t| se.tech == t))
            .collect()
    }

    /// All elements in configuration order, including unusable ones.
    pub fn elements(&self) -> impl Iterator<Item = &StorageElement> {
        self.elements.iter()
    }

    /// Number of configured elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn se(name: &str, host: &str, tech: SeTech) -> StorageElement {
        StorageElement {
            name: name.to_string(),
            host: host.to_string(),
            tech,
            location: "/europe/test".to_string(),
            basepath: format!("srm://{}/data", host),
            directpath: None,
            broken: false,
            disabled: false,
        }
    }

    fn registry() -> SeRegistry {
        SeRegistry::new(
            "/exp.org",
            vec![
                se("RAL-disk", "srm.ral.ac.uk:8444", SeTech::Disk),
                StorageElement {
                    basepath: "root://door.in2p3.fr:1097/pool/disk/exp.org".to_string(),
                    ..se("IN2P3-disk", "door.in2p3.fr:1097/pool/disk", SeTech::Disk)
                },
                StorageElement {
                    basepath: "root://door.in2p3.fr:1097/pool/tape/exp.org".to_string(),
                    ..se("IN2P3-tape", "door.in2p3.fr:1097/pool/tape", SeTech::Tape)
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = SeRegistry::new(
            "/exp.org",
            vec![
                se("RAL-disk", "a.example", SeTech::Disk),
                se("RAL-disk", "b.example", SeTech::Disk),
            ],
        );
        assert!(matches!(
            result,
            Err(StorageError::DuplicateElement { name }) if name == "RAL-disk"
        ));
    }

    #[test]
    fn test_lookup_by_name() {
        let reg = registry();
        assert_eq!(reg.lookup("RAL-disk").unwrap().tech, SeTech::Disk);
        assert!(matches!(
            reg.lookup("nowhere"),
            Err(StorageError::UnknownElement { .. })
        ));
    }

    #[test]
    fn test_resolve_by_url_exact_authority() {
        let reg = registry();
        let url = PhysicalUrl::new("srm://srm.ral.ac.uk:8444/data/exp.org/run1.gz");
        assert_eq!(reg.resolve_by_url(&url).unwrap().name, "RAL-disk");
    }

    #[test]
    fn test_resolve_by_url_unknown_host_is_error() {
        let reg = registry();
        let url = PhysicalUrl::new("srm://unknown.example:8444/data/run1.gz");
        assert!(matches!(
            reg.resolve_by_url(&url),
            Err(StorageError::HostNotRecognized { .. })
        ));
    }

    #[test]
    fn test_resolve_by_url_no_loose_substring_match() {
        let reg = registry();
        // Authority must be equal, not merely contained in the URL.
        let url = PhysicalUrl::new("srm://srm.ral.ac.uk.evil.example:8444/data/run1.gz");
        assert!(reg.resolve_by_url(&url).is_err());
    }

    #[test]
    fn test_resolve_by_url_shared_authority_disambiguated_by_qualifier() {
        let reg = registry();
        let disk = PhysicalUrl::new("root://door.in2p3.fr:1097/pool/disk/exp.org/run1.gz");
        let tape = PhysicalUrl::new("root://door.in2p3.fr:1097/pool/tape/exp.org/run1.gz");
        assert_eq!(reg.resolve_by_url(&disk).unwrap().name, "IN2P3-disk");
        assert_eq!(reg.resolve_by_url(&tape).unwrap().name, "IN2P3-tape");
    }

    #[test]
    fn test_resolve_by_url_qualifier_segment_boundary() {
        let reg = registry();
        // "diskier" must not match the "disk" qualifier.
        let url = PhysicalUrl::new("root://door.in2p3.fr:1097/pool/diskier/exp.org/run1.gz");
        assert!(matches!(
            reg.resolve_by_url(&url),
            Err(StorageError::HostNotRecognized { .. })
        ));
    }

    #[test]
    fn test_resolve_by_url_ambiguity_reported() {
        let reg = SeRegistry::new(
            "/exp.org",
            vec![
                se("A", "door.example:1094", SeTech::Disk),
                se("B", "door.example:1094", SeTech::Tape),
            ],
        )
        .unwrap();
        let url = PhysicalUrl::new("root://door.example:1094/data/run1.gz");
        match reg.resolve_by_url(&url) {
            Err(StorageError::AmbiguousUrl { matched, .. }) => {
                assert_eq!(matched, vec!["A".to_string(), "B".to_string()]);
            }
            other => panic!("expected AmbiguousUrl, got {:?}", other.map(|se| &se.name)),
        }
    }

    #[test]
    fn test_list_usable_ordering_and_flags() {
        let mut elements = vec![
            se("A-disk", "a.example", SeTech::Disk),
            se("B-tape", "b.example", SeTech::Tape),
            se("C-disk", "c.example", SeTech::Disk),
        ];
        elements[2].broken = true;
        let mut disabled = se("D-disk", "d.example", SeTech::Disk);
        disabled.disabled = true;
        elements.push(disabled);
        let reg = SeRegistry::new("/exp.org", elements).unwrap();

        let usable: Vec<_> = reg
            .list_usable(None, false)
            .iter()
            .map(|se| se.name.clone())
            .collect();
        assert_eq!(usable, vec!["A-disk", "B-tape"]);

        let with_broken: Vec<_> = reg
            .list_usable(Some(SeTech::Disk), true)
            .iter()
            .map(|se| se.name.clone())
            .collect();
        assert_eq!(with_broken, vec!["A-disk", "C-disk"]);
    }

    #[test]
    fn test_storage_url_construction() {
        let reg = registry();
        let path = LogicalPath::new("/data/run1.gz").unwrap();
        let se = reg.lookup("RAL-disk").unwrap();
        assert_eq!(
            se.storage_url(reg.basedir(), &path, false).as_str(),
            "srm://srm.ral.ac.uk:8444/data/exp.org/data/run1.gz"
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Every element's own storage URLs resolve back to it, whatever
            // the logical path looks like.
            #[test]
            fn prop_own_storage_urls_resolve_back(
                segments in proptest::collection::vec("[a-z0-9_.]{1,12}", 1..4)
            ) {
                let reg = registry();
                let mut path = LogicalPath::root();
                for s in &segments {
                    path = path.join(s);
                }
                for se in reg.elements() {
                    let url = se.storage_url(reg.basedir(), &path, false);
                    let resolved = reg.resolve_by_url(&url).unwrap();
                    prop_assert_eq!(&resolved.name, &se.name);
                }
            }
        }
    }

    #[test]
    fn test_storage_url_direct_falls_back_to_basepath() {
        let mut element = se("X", "x.example", SeTech::Disk);
        element.directpath = Some("root://x.example/direct".to_string());
        let path = LogicalPath::new("/a").unwrap();
        assert_eq!(
            element.storage_url("/exp.org", &path, true).as_str(),
            "root://x.example/direct/exp.org/a"
        );
        element.directpath = None;
        assert_eq!(
            element.storage_url("/exp.org", &path, true).as_str(),
            "srm://x.example/data/exp.org/a"
        );
    }
}
