//! Replica catalog clients.
//!
//! The catalog maps logical paths to replica records. [`ReplicaCatalog`]
//! is the seam the walker and operation engine depend on; [`GridCatalog`]
//! talks to an LFC-style catalog through the grid command boundary.
//!
//! Mutating callers follow a strict order: physical action first, catalog
//! update second. The client itself never touches physical storage.

use std::sync::Arc;

use async_trait::async_trait;

use gridrep_storage::command::{classify_failure, CommandRunner};
use gridrep_storage::{
    Checksum, DirectoryEntry, EntryKind, LogicalPath, PhysicalUrl, SeRegistry, StorageError,
};

use crate::error::{CatalogError, Result};
use crate::replica::Replica;

/// Client for the authoritative logical-path → replicas mapping.
#[async_trait]
pub trait ReplicaCatalog: Send + Sync {
    /// List the entries of a logical directory.
    async fn list_dir(&self, path: &LogicalPath) -> Result<Vec<DirectoryEntry>>;

    /// Whether a logical path is a file or a directory.
    async fn entry_kind(&self, path: &LogicalPath) -> Result<EntryKind>;

    /// All replica records of a logical file. An empty set is a valid,
    /// reportable state, distinct from a missing catalog entry.
    async fn list_replicas(&self, path: &LogicalPath) -> Result<Vec<Replica>>;

    /// Record a new replica of `path` at element `se`.
    ///
    /// Called only after the physical copy exists and its checksum has
    /// been verified.
    async fn register_replica(
        &self,
        path: &LogicalPath,
        se: &str,
        url: &PhysicalUrl,
        checksum: &Checksum,
    ) -> Result<()>;

    /// Drop the replica record of `path` at element `se`. Idempotent: a
    /// record that is already gone is not an error.
    async fn remove_replica_entry(&self, path: &LogicalPath, se: &str) -> Result<()>;

    /// Drop the whole logical entry once its last replica is gone.
    async fn remove_entry(&self, path: &LogicalPath) -> Result<()>;
}

const CATALOG_LS_CMD: &str = "lfc-ls";
const REPLICAS_CMD: &str = "lcg-lr";
const REPLICA_CHECKSUM_CMD: &str = "lcg-get-checksum";
const REGISTER_CMD: &str = "lcg-rf";
const UNREGISTER_CMD: &str = "lcg-uf";
const REMOVE_ENTRY_CMD: &str = "lfc-rm";

/// LFC-style catalog client over the grid command boundary.
///
/// Replica URLs are resolved to their owning storage element through the
/// registry as they are read; a URL no registered element recognises
/// surfaces as `HostNotRecognized` instead of a record with a missing
/// element.
pub struct GridCatalog {
    runner: Arc<dyn CommandRunner>,
    registry: Arc<SeRegistry>,
    /// Catalog namespace prefix for logical URLs, e.g. `lfn:/grid`.
    prefix: String,
}

impl GridCatalog {
    /// New client issuing commands through `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>, registry: Arc<SeRegistry>, prefix: impl Into<String>) -> Self {
        GridCatalog {
            runner,
            registry,
            prefix: prefix.into(),
        }
    }

    /// Namespace path as the catalog tools expect it.
    fn catalog_path(&self, path: &LogicalPath) -> String {
        format!("{}{}", self.registry.basedir(), path.as_str())
    }

    /// Logical URL for replica-level tools.
    fn lurl(&self, path: &LogicalPath) -> String {
        format!("{}{}", self.prefix, self.catalog_path(path))
    }

    async fn run_checked(
        &self,
        program: &str,
        args: Vec<String>,
        path: &LogicalPath,
    ) -> Result<String> {
        let output = self
            .runner
            .run(program, &args)
            .await
            .map_err(CatalogError::Storage)?;
        if output.success() {
            return Ok(output.stdout);
        }
        match classify_failure(program, &output) {
            StorageError::NotFound { .. } => Err(CatalogError::NotFound {
                path: path.as_str().to_string(),
            }),
            StorageError::BackendUnavailable { reason } => {
                Err(CatalogError::Unavailable { reason })
            }
            other => Err(CatalogError::Storage(other)),
        }
    }
}

#[async_trait]
impl ReplicaCatalog for GridCatalog {
    async fn list_dir(&self, path: &LogicalPath) -> Result<Vec<DirectoryEntry>> {
        let stdout = self
            .run_checked(
                CATALOG_LS_CMD,
                vec!["-l".to_string(), self.catalog_path(path)],
                path,
            )
            .await?;
        Ok(stdout.lines().filter_map(DirectoryEntry::from_ls_row).collect())
    }

    async fn entry_kind(&self, path: &LogicalPath) -> Result<EntryKind> {
        let stdout = self
            .run_checked(
                CATALOG_LS_CMD,
                vec!["-d".to_string(), "-l".to_string(), self.catalog_path(path)],
                path,
            )
            .await?;
        let entry = stdout
            .lines()
            .find_map(DirectoryEntry::from_ls_row)
            .ok_or_else(|| CatalogError::Parse {
                detail: format!("no listing row for {}", path),
            })?;
        Ok(entry.kind)
    }

    async fn list_replicas(&self, path: &LogicalPath) -> Result<Vec<Replica>> {
        let stdout = self
            .run_checked(REPLICAS_CMD, vec![self.lurl(path)], path)
            .await?;
        let mut replicas = Vec::new();
        for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let url = PhysicalUrl::new(line);
            let se = self.registry.resolve_by_url(&url)?;
            // Per-replica checksum; the tools report "?" when they cannot
            // compute one and that is preserved as an unknown checksum.
            let checksum = match self
                .run_checked(REPLICA_CHECKSUM_CMD, vec![line.to_string()], path)
                .await
            {
                Ok(out) => Checksum::new(out.split_whitespace().next().unwrap_or("?")),
                Err(e) if e.is_transient() => return Err(e),
                Err(_) => Checksum::new("?"),
            };
            replicas.push(Replica::new(path.clone(), &se.name, url, checksum));
        }
        Ok(replicas)
    }

    async fn register_replica(
        &self,
        path: &LogicalPath,
        se: &str,
        url: &PhysicalUrl,
        checksum: &Checksum,
    ) -> Result<()> {
        tracing::info!(path = %path, se, checksum = %checksum, "registering replica");
        self.run_checked(
            REGISTER_CMD,
            vec![
                "-l".to_string(),
                self.lurl(path),
                url.as_str().to_string(),
            ],
            path,
        )
        .await?;
        Ok(())
    }

    async fn remove_replica_entry(&self, path: &LogicalPath, se: &str) -> Result<()> {
        let replicas = match self.list_replicas(path).await {
            Ok(replicas) => replicas,
            Err(CatalogError::NotFound { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };
        let Some(replica) = replicas.iter().find(|r| r.se == se) else {
            tracing::debug!(path = %path, se, "replica record already gone");
            return Ok(());
        };
        tracing::info!(path = %path, se, "deregistering replica");
        self.run_checked(
            UNREGISTER_CMD,
            vec![self.lurl(path), replica.url.as_str().to_string()],
            path,
        )
        .await?;
        Ok(())
    }

    async fn remove_entry(&self, path: &LogicalPath) -> Result<()> {
        tracing::info!(path = %path, "removing catalog entry");
        match self
            .run_checked(REMOVE_ENTRY_CMD, vec![self.catalog_path(path)], path)
            .await
        {
            Ok(_) => Ok(()),
            Err(CatalogError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use gridrep_storage::command::CommandOutput;
    use gridrep_storage::{SeTech, StorageElement};

    struct ScriptedRunner {
        outputs: Mutex<Vec<gridrep_storage::Result<CommandOutput>>>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedRunner {
        fn new(outputs: Vec<gridrep_storage::Result<CommandOutput>>) -> Self {
            ScriptedRunner {
                outputs: Mutex::new(outputs),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn ok(stdout: &str) -> gridrep_storage::Result<CommandOutput> {
            Ok(CommandOutput {
                status: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            })
        }

        fn fail(stderr: &str) -> gridrep_storage::Result<CommandOutput> {
            Ok(CommandOutput {
                status: 1,
                stdout: String::new(),
                stderr: stderr.to_string(),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
        ) -> gridrep_storage::Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            self.outputs.lock().unwrap().remove(0)
        }
    }

    fn registry() -> Arc<SeRegistry> {
        Arc::new(
            SeRegistry::new(
                "/exp.org",
                vec![StorageElement {
                    name: "RAL-disk".to_string(),
                    host: "srm.ral.ac.uk:8444".to_string(),
                    tech: SeTech::Disk,
                    location: "/europe/uk/ral".to_string(),
                    basepath: "srm://srm.ral.ac.uk:8444/data".to_string(),
                    directpath: None,
                    broken: false,
                    disabled: false,
                }],
            )
            .unwrap(),
        )
    }

    fn path() -> LogicalPath {
        LogicalPath::new("/data/run1.gz").unwrap()
    }

    #[tokio::test]
    async fn test_list_replicas_resolves_elements() {
        let runner = Arc::new(ScriptedRunner::new(vec![
            ScriptedRunner::ok("srm://srm.ral.ac.uk:8444/data/exp.org/data/run1.gz\n"),
            ScriptedRunner::ok("6a5d41cb -"),
        ]));
        let catalog = GridCatalog::new(runner.clone(), registry(), "lfn:/grid");
        let replicas = catalog.list_replicas(&path()).await.unwrap();
        assert_eq!(replicas.len(), 1);
        assert_eq!(replicas[0].se, "RAL-disk");
        assert_eq!(replicas[0].checksum.as_str(), "6a5d41cb");

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].0, "lcg-lr");
        assert_eq!(calls[0].1, vec!["lfn:/grid/exp.org/data/run1.gz"]);
    }

    #[tokio::test]
    async fn test_list_replicas_unknown_host_is_error() {
        let runner = Arc::new(ScriptedRunner::new(vec![ScriptedRunner::ok(
            "srm://stranger.example:8444/data/run1.gz\n",
        )]));
        let catalog = GridCatalog::new(runner, registry(), "lfn:/grid");
        let err = catalog.list_replicas(&path()).await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Storage(StorageError::HostNotRecognized { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_replicas_checksum_failure_degrades_to_unknown() {
        let runner = Arc::new(ScriptedRunner::new(vec![
            ScriptedRunner::ok("srm://srm.ral.ac.uk:8444/data/exp.org/data/run1.gz\n"),
            ScriptedRunner::fail("checksum not supported"),
        ]));
        let catalog = GridCatalog::new(runner, registry(), "lfn:/grid");
        let replicas = catalog.list_replicas(&path()).await.unwrap();
        assert!(!replicas[0].checksum.is_known());
    }

    #[tokio::test]
    async fn test_list_dir_parses_rows() {
        let runner = Arc::new(ScriptedRunner::new(vec![ScriptedRunner::ok(
            "-rw-r--r-- 1 prod prod 42 Jul 14 09:30 run1.gz\n\
             drwxr-xr-x 1 prod prod 0 Jul 14 09:31 sub",
        )]));
        let catalog = GridCatalog::new(runner.clone(), registry(), "lfn:/grid");
        let entries = catalog
            .list_dir(&LogicalPath::new("/data").unwrap())
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[1].kind, EntryKind::Directory);

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].0, "lfc-ls");
        assert_eq!(calls[0].1, vec!["-l", "/exp.org/data"]);
    }

    #[tokio::test]
    async fn test_missing_entry_is_not_found() {
        let runner = Arc::new(ScriptedRunner::new(vec![ScriptedRunner::fail(
            "No such file or directory",
        )]));
        let catalog = GridCatalog::new(runner, registry(), "lfn:/grid");
        assert!(matches!(
            catalog.entry_kind(&path()).await,
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_replica_entry_is_idempotent_when_gone() {
        // lcg-lr reports no entry at all: nothing to deregister.
        let runner = Arc::new(ScriptedRunner::new(vec![ScriptedRunner::fail(
            "No such file or directory",
        )]));
        let catalog = GridCatalog::new(runner, registry(), "lfn:/grid");
        catalog
            .remove_replica_entry(&path(), "RAL-disk")
            .await
            .unwrap();
    }
}
