//! Replica source selection.
//!
//! Candidates are ordered deterministically: usable elements before broken
//! ones (broken SEs are a last resort, still readable), disk family before
//! tape family, and registry (configuration) order among equals. The
//! registry-order tie-break also covers the pure-tape multi-replica case.
//! Disabled elements never appear.
//!
//! Every replica URL is resolved through the registry here; a URL no
//! element recognises fails the whole selection rather than dropping the
//! replica silently.

use gridrep_catalog::Replica;
use gridrep_storage::{SeRegistry, StorageElement};

use crate::error::Result;

/// One replica with its resolved storage element.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The catalog replica record.
    pub replica: Replica,
    /// The element owning the replica's URL.
    pub se: StorageElement,
    /// Position of the element in the registry.
    pub registry_index: usize,
}

/// Resolve and order replica candidates for a read.
pub fn order_candidates(registry: &SeRegistry, replicas: &[Replica]) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::with_capacity(replicas.len());
    for replica in replicas {
        let se = registry.resolve_by_url(&replica.url)?;
        if se.disabled {
            continue;
        }
        candidates.push(Candidate {
            replica: replica.clone(),
            se: se.clone(),
            registry_index: registry.index_of(&se.name).unwrap_or(usize::MAX),
        });
    }
    candidates.sort_by_key(|c| {
        (
            c.se.broken,
            c.se.tech.is_tape_family(),
            c.registry_index,
        )
    });
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    use gridrep_storage::{
        Checksum, LogicalPath, PhysicalUrl, SeTech, StorageError,
    };

    fn se(name: &str, host: &str, tech: SeTech, broken: bool, disabled: bool) -> StorageElement {
        StorageElement {
            name: name.to_string(),
            host: host.to_string(),
            tech,
            location: String::new(),
            basepath: format!("srm://{}/data", host),
            directpath: None,
            broken,
            disabled,
        }
    }

    fn registry() -> SeRegistry {
        SeRegistry::new(
            "/exp.org",
            vec![
                se("TAPE-1", "tape1.example", SeTech::Tape, false, false),
                se("DISK-1", "disk1.example", SeTech::Disk, false, false),
                se("DISK-2", "disk2.example", SeTech::Disk, false, false),
                se("DISK-BAD", "bad.example", SeTech::Disk, true, false),
                se("DISK-OFF", "off.example", SeTech::Disk, false, true),
            ],
        )
        .unwrap()
    }

    fn replica_at(host: &str) -> Replica {
        Replica::new(
            LogicalPath::new("/data/run1.gz").unwrap(),
            "",
            PhysicalUrl::new(format!("srm://{}/data/exp.org/data/run1.gz", host)),
            Checksum::new("11111111"),
        )
    }

    #[test]
    fn test_disk_before_tape_then_registry_order() {
        let reg = registry();
        let replicas = vec![
            replica_at("tape1.example"),
            replica_at("disk2.example"),
            replica_at("disk1.example"),
        ];
        let ordered = order_candidates(&reg, &replicas).unwrap();
        let names: Vec<&str> = ordered.iter().map(|c| c.se.name.as_str()).collect();
        assert_eq!(names, vec!["DISK-1", "DISK-2", "TAPE-1"]);
    }

    #[test]
    fn test_broken_is_last_resort() {
        let reg = registry();
        let replicas = vec![replica_at("bad.example"), replica_at("tape1.example")];
        let ordered = order_candidates(&reg, &replicas).unwrap();
        let names: Vec<&str> = ordered.iter().map(|c| c.se.name.as_str()).collect();
        assert_eq!(names, vec!["TAPE-1", "DISK-BAD"]);
    }

    #[test]
    fn test_disabled_is_excluded() {
        let reg = registry();
        let replicas = vec![replica_at("off.example"), replica_at("disk1.example")];
        let ordered = order_candidates(&reg, &replicas).unwrap();
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].se.name, "DISK-1");
    }

    #[test]
    fn test_unresolvable_url_fails_selection() {
        let reg = registry();
        let replicas = vec![replica_at("disk1.example"), replica_at("stranger.example")];
        let err = order_candidates(&reg, &replicas).unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Storage(StorageError::HostNotRecognized { .. })
        ));
    }
}
