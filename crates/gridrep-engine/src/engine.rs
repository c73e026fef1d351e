//! The bulk operation engine.
//!
//! Executes one [`OperationRequest`] as a set of independent per-file
//! operations over the resolved file list: bounded fan-out, transient
//! retries, tape stage waits, and per-path serialisation of catalog
//! mutations. One file's failure never aborts its siblings; the aggregate
//! report preserves resolution order.
//!
//! Ordering rule for every mutating action: physical action first, catalog
//! update second. A catalog update that fails after the physical action
//! succeeded is reported as a distinct warning and never retried, so the
//! physical action cannot be repeated.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use gridrep_catalog::{CatalogError, DirCache, Replica, ReplicaCatalog};
use gridrep_storage::stage::{StageConfig, StagePoller};
use gridrep_storage::{
    Checksum, EntryKind, LogicalPath, PhysicalUrl, ReplicaState, SeRegistry, SeTech,
    StorageBackend, StorageElement, StorageError,
};

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result};
use crate::request::{Action, OperationReport, OperationRequest, OperationResult};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::select::{order_candidates, Candidate};
use crate::walker::Walker;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Concurrent per-file operations (default: 4).
    pub max_workers: usize,
    /// Retry policy for transient per-file failures.
    pub retry: RetryConfig,
    /// Tape stage polling configuration.
    pub stage: StageConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_workers: 4,
            retry: RetryConfig::default(),
            stage: StageConfig::default(),
        }
    }
}

struct Shared {
    registry: Arc<SeRegistry>,
    catalog: Arc<dyn ReplicaCatalog>,
    disk: Arc<dyn StorageBackend>,
    tape: Arc<dyn StorageBackend>,
    cache: Arc<DirCache>,
    poller: StagePoller,
    retry: RetryExecutor,
    max_workers: usize,
    locks: DashMap<LogicalPath, Arc<Mutex<()>>>,
}

impl Shared {
    fn backend_for(&self, se: &StorageElement) -> Arc<dyn StorageBackend> {
        if se.tech.is_tape_family() {
            Arc::clone(&self.tape)
        } else {
            Arc::clone(&self.disk)
        }
    }

    /// Per-path mutual exclusion, held only around catalog updates.
    async fn path_lock(&self, path: &LogicalPath) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.entry(path.clone()).or_default().value());
        lock.lock_owned().await
    }
}

/// Executes bulk requests against the storage and catalog layers.
pub struct OperationEngine {
    shared: Arc<Shared>,
}

impl OperationEngine {
    /// Build an engine over the injected collaborators.
    pub fn new(
        registry: Arc<SeRegistry>,
        catalog: Arc<dyn ReplicaCatalog>,
        disk: Arc<dyn StorageBackend>,
        tape: Arc<dyn StorageBackend>,
        cache: Arc<DirCache>,
        config: EngineConfig,
    ) -> Self {
        OperationEngine {
            shared: Arc::new(Shared {
                registry,
                catalog,
                disk,
                tape,
                cache,
                poller: StagePoller::new(config.stage),
                retry: RetryExecutor::new(config.retry),
                max_workers: config.max_workers.max(1),
                locks: DashMap::new(),
            }),
        }
    }

    /// A walker sharing this engine's catalog client and listing cache.
    pub fn walker(&self) -> Walker {
        Walker::new(
            Arc::clone(&self.shared.catalog),
            Arc::clone(&self.shared.cache),
        )
    }

    /// Execute a bulk request.
    ///
    /// Request-level validation failures (unknown element, missing
    /// arguments, invalid regex) error out before any per-file work.
    /// Cancellation stops submission of new files; in-flight files finish
    /// and the partial aggregate is returned.
    pub async fn run(
        &self,
        request: OperationRequest,
        cancel: CancelToken,
    ) -> Result<OperationReport> {
        let ctx = Arc::new(self.validate(&request)?);

        let files: Vec<LogicalPath> = if request.action == Action::Put {
            vec![request.root.clone()]
        } else {
            self.walker()
                .resolve(&request.root, request.recursive, request.filter.as_deref())
                .await?
        };
        tracing::info!(
            action = %request.action,
            root = %request.root,
            files = files.len(),
            "resolved bulk request"
        );

        let semaphore = Arc::new(Semaphore::new(self.shared.max_workers));
        let mut join_set: JoinSet<(usize, OperationResult)> = JoinSet::new();
        let mut cancelled = false;

        for (idx, path) in files.iter().cloned().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let ctx = Arc::clone(&ctx);
            join_set.spawn(async move {
                let result = run_file(ctx, path).await;
                drop(permit);
                (idx, result)
            });
        }

        let mut slots: Vec<Option<OperationResult>> = vec![None; files.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => tracing::error!(error = %e, "per-file task aborted"),
            }
        }

        let mut report = OperationReport::new(request.action);
        report.cancelled = cancelled;
        report.results = slots.into_iter().flatten().collect();
        if cancelled {
            tracing::warn!(
                completed = report.results.len(),
                total = files.len(),
                "request cancelled; returning partial aggregate"
            );
        }
        Ok(report)
    }

    /// Fail-fast request validation; resolves the target element once.
    fn validate(&self, request: &OperationRequest) -> Result<FileCtx> {
        let registry = &self.shared.registry;
        let target = match &request.target_se {
            Some(name) => Some(
                registry
                    .lookup(name)
                    .map_err(|e| EngineError::Configuration {
                        reason: e.to_string(),
                    })?
                    .clone(),
            ),
            None => None,
        };

        let target = match request.action {
            Action::Replicate | Action::Remove => {
                let Some(se) = target else {
                    return Err(EngineError::Configuration {
                        reason: format!("{} requires a target storage element", request.action),
                    });
                };
                if request.action == Action::Replicate && !se.is_usable() {
                    return Err(EngineError::Configuration {
                        reason: format!("target element {} is not usable for writes", se.name),
                    });
                }
                Some(se)
            }
            Action::Put => {
                let se = match target {
                    Some(se) => se,
                    // Default destination: first usable disk element.
                    None => registry
                        .list_usable(Some(SeTech::Disk), false)
                        .first()
                        .cloned()
                        .cloned()
                        .ok_or_else(|| EngineError::Configuration {
                            reason: "no usable disk element to put to".to_string(),
                        })?,
                };
                if !se.is_usable() {
                    return Err(EngineError::Configuration {
                        reason: format!("target element {} is not usable for writes", se.name),
                    });
                }
                Some(se)
            }
            _ => target,
        };

        if matches!(request.action, Action::Get | Action::Put) && request.local.is_none() {
            return Err(EngineError::Configuration {
                reason: format!("{} requires a local path", request.action),
            });
        }

        Ok(FileCtx {
            shared: Arc::clone(&self.shared),
            action: request.action,
            target,
            force: request.force,
            local: request.local.clone(),
        })
    }
}

struct FileCtx {
    shared: Arc<Shared>,
    action: Action,
    target: Option<StorageElement>,
    force: bool,
    local: Option<PathBuf>,
}

/// One per-file operation with the retry policy applied.
async fn run_file(ctx: Arc<FileCtx>, path: LogicalPath) -> OperationResult {
    let retry = ctx.shared.retry.clone();
    let outcome = retry
        .execute(|| {
            let ctx = Arc::clone(&ctx);
            let path = path.clone();
            async move {
                match ctx.action {
                    Action::Get => ctx.get(&path).await,
                    Action::Put => ctx.put(&path).await,
                    Action::Replicate => ctx.replicate(&path).await,
                    Action::Check => ctx.check(&path).await,
                    Action::Remove => ctx.remove(&path).await,
                    Action::Repair => ctx.repair(&path).await,
                }
            }
        })
        .await;
    match outcome {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "per-file operation failed");
            OperationResult::failed(path, ctx.target.as_ref().map(|se| se.name.clone()), &e)
        }
    }
}

fn file_url(path: &std::path::Path) -> PhysicalUrl {
    PhysicalUrl::new(format!("file://{}", path.display()))
}

impl FileCtx {
    fn registry(&self) -> &SeRegistry {
        &self.shared.registry
    }

    fn basedir(&self) -> &str {
        self.shared.registry.basedir()
    }

    /// Select sources and pick one: the best ONLINE replica, or the first
    /// stageable one brought online when nothing is ONLINE yet.
    async fn pick_source<'a>(&self, candidates: &'a [Candidate]) -> Result<&'a Candidate> {
        let mut stageable: Option<&Candidate> = None;
        let mut last_err: Option<EngineError> = None;
        for candidate in candidates {
            let backend = self.shared.backend_for(&candidate.se);
            match backend.state(&candidate.replica.url).await {
                Ok(ReplicaState::Online) => return Ok(candidate),
                Ok(_) if candidate.se.tech.is_tape_family() => {
                    if stageable.is_none() {
                        stageable = Some(candidate);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        url = %candidate.replica.url,
                        error = %e,
                        "state probe failed, skipping candidate"
                    );
                    last_err = Some(e.into());
                }
            }
        }
        if let Some(candidate) = stageable {
            let backend = self.shared.backend_for(&candidate.se);
            self.shared
                .poller
                .wait_until_online(backend.as_ref(), &candidate.replica.url)
                .await?;
            return Ok(candidate);
        }
        Err(last_err.unwrap_or_else(|| EngineError::NoReplica {
            path: candidates
                .first()
                .map(|c| c.replica.path.as_str().to_string())
                .unwrap_or_default(),
        }))
    }

    async fn get(&self, path: &LogicalPath) -> Result<OperationResult> {
        let replicas = self.shared.catalog.list_replicas(path).await?;
        let mut candidates = order_candidates(self.registry(), &replicas)?;
        if let Some(target) = &self.target {
            candidates.retain(|c| c.se.name == target.name);
        }
        if candidates.is_empty() {
            return Err(EngineError::NoReplica {
                path: path.as_str().to_string(),
            });
        }

        let local = self.local.as_ref().ok_or_else(|| EngineError::Configuration {
            reason: "get requires a local path".to_string(),
        })?;
        let mut dest = local.clone();
        if tokio::fs::metadata(&dest)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            dest = dest.join(path.base_name());
        }
        if tokio::fs::metadata(&dest).await.is_ok() && !self.force {
            return Err(EngineError::Storage(StorageError::LocalFileExists {
                path: dest.display().to_string(),
            }));
        }

        let chosen = self.pick_source(&candidates).await?;
        let backend = self.shared.backend_for(&chosen.se);
        // Any failure past this point removes the partial local file, so a
        // retry does not trip over our own leftovers.
        let transferred = async {
            backend.fetch(&chosen.replica.url, &dest).await?;
            backend.checksum(&file_url(&dest)).await
        }
        .await;
        let computed = match transferred {
            Ok(computed) => computed,
            Err(e) => {
                let _ = tokio::fs::remove_file(&dest).await;
                return Err(e.into());
            }
        };
        self.verify_or_cleanup(
            &chosen.replica.checksum,
            computed,
            CleanupTarget::Local(&dest),
        )
        .await?;
        tracing::info!(path = %path, se = %chosen.se.name, dest = %dest.display(), "fetched");
        Ok(OperationResult::success(
            path.clone(),
            Some(chosen.se.name.clone()),
        ))
    }

    async fn put(&self, path: &LogicalPath) -> Result<OperationResult> {
        let local = self.local.as_ref().ok_or_else(|| EngineError::Configuration {
            reason: "put requires a local path".to_string(),
        })?;
        let meta = tokio::fs::metadata(local)
            .await
            .map_err(StorageError::Io)?;
        if !meta.is_file() {
            return Err(EngineError::Storage(StorageError::NotFound {
                what: local.display().to_string(),
            }));
        }

        // Putting into a directory appends the local base name.
        let dest_path = match self.shared.catalog.entry_kind(path).await {
            Ok(EntryKind::Directory) => {
                let name = local
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| EngineError::Configuration {
                        reason: format!("cannot derive a file name from {}", local.display()),
                    })?;
                path.join(&name)
            }
            Ok(EntryKind::File) => {
                return Err(EngineError::AlreadyExists {
                    path: path.as_str().to_string(),
                })
            }
            Err(CatalogError::NotFound { .. }) => path.clone(),
            Err(e) => return Err(e.into()),
        };
        if dest_path != *path
            && matches!(
                self.shared.catalog.entry_kind(&dest_path).await,
                Ok(EntryKind::File)
            )
        {
            return Err(EngineError::AlreadyExists {
                path: dest_path.as_str().to_string(),
            });
        }

        let target = self.target.as_ref().ok_or_else(|| EngineError::Configuration {
            reason: "put requires a destination element".to_string(),
        })?;
        let backend = self.shared.backend_for(target);
        let target_url = target.storage_url(self.basedir(), &dest_path, false);
        let probe_url = target.storage_url(self.basedir(), &dest_path, true);

        let expected = backend.checksum(&file_url(local)).await?;
        backend.push(local, &target_url).await?;
        self.verify_or_cleanup(
            &expected,
            backend.checksum(&probe_url).await?,
            CleanupTarget::Remote(backend.as_ref(), &target_url),
        )
        .await?;

        self.finish_registration(&dest_path, target, &target_url, &expected, "put")
            .await
    }

    async fn replicate(&self, path: &LogicalPath) -> Result<OperationResult> {
        let target = self.target.as_ref().ok_or_else(|| EngineError::Configuration {
            reason: "replicate requires a target element".to_string(),
        })?;
        let replicas = self.shared.catalog.list_replicas(path).await?;
        let backend = self.shared.backend_for(target);
        let target_url = target.storage_url(self.basedir(), path, false);
        let probe_url = target.storage_url(self.basedir(), path, true);

        let has_catalog = replicas.iter().any(|r| r.se == target.name);
        let physical = backend.exists(&probe_url).await?;

        if has_catalog && physical {
            return Ok(OperationResult::skipped(
                path.clone(),
                Some(target.name.clone()),
                "replica already present",
            ));
        }
        if physical {
            // Dark copy: physically there, unknown to the catalog.
            tracing::info!(path = %path, se = %target.name, "registering dark replica");
            let checksum = backend.checksum(&probe_url).await?;
            return self
                .finish_registration(path, target, &target_url, &checksum, "replicate")
                .await
                .map(|r| r.with_message("registered existing dark replica"));
        }
        if has_catalog {
            return Err(EngineError::Storage(StorageError::NotFound {
                what: format!(
                    "{} is registered at {} but the physical copy is missing",
                    path, target.name
                ),
            }));
        }

        let sources = order_candidates(self.registry(), &replicas)?;
        if sources.is_empty() {
            return Err(EngineError::NoReplica {
                path: path.as_str().to_string(),
            });
        }
        let checksum = self
            .copy_to_target(path, &sources, target, &target_url, &probe_url)
            .await?;
        self.finish_registration(path, target, &target_url, &checksum, "replicate")
            .await
    }

    async fn check(&self, path: &LogicalPath) -> Result<OperationResult> {
        let replicas = self.shared.catalog.list_replicas(path).await?;
        match &self.target {
            Some(target) => {
                let registered = replicas.iter().any(|r| r.se == target.name);
                if !registered || target.broken {
                    return Err(EngineError::NoReplica {
                        path: path.as_str().to_string(),
                    });
                }
                let backend = self.shared.backend_for(target);
                let probe_url = target.storage_url(self.basedir(), path, true);
                if backend.exists(&probe_url).await? {
                    Ok(OperationResult::success(
                        path.clone(),
                        Some(target.name.clone()),
                    ))
                } else {
                    Err(EngineError::Storage(StorageError::NotFound {
                        what: format!(
                            "{} is registered at {} but the physical copy is missing",
                            path, target.name
                        ),
                    }))
                }
            }
            None => {
                if replicas.is_empty() {
                    Err(EngineError::NoReplica {
                        path: path.as_str().to_string(),
                    })
                } else {
                    Ok(
                        OperationResult::success(path.clone(), None).with_message(format!(
                            "{} replica(s)",
                            replicas.len()
                        )),
                    )
                }
            }
        }
    }

    async fn remove(&self, path: &LogicalPath) -> Result<OperationResult> {
        let target = self.target.as_ref().ok_or_else(|| EngineError::Configuration {
            reason: "remove requires a target element".to_string(),
        })?;
        let replicas = self.shared.catalog.list_replicas(path).await?;
        let Some(target_replica) = replicas.iter().find(|r| r.se == target.name) else {
            return Ok(OperationResult::skipped(
                path.clone(),
                Some(target.name.clone()),
                "no replica at target element",
            ));
        };

        // Count replicas that could still serve the file: on known,
        // usable elements and physically present.
        let mut valid = 0usize;
        for replica in &replicas {
            let Ok(se) = self.registry().resolve_by_url(&replica.url) else {
                continue;
            };
            if !se.is_usable() {
                continue;
            }
            let probe_url = se.storage_url(self.basedir(), path, true);
            if self
                .shared
                .backend_for(se)
                .exists(&probe_url)
                .await
                .unwrap_or(false)
            {
                valid += 1;
            }
        }
        if valid <= 1 && !self.force {
            return Err(EngineError::LastReplicaProtected {
                path: path.as_str().to_string(),
                se: target.name.clone(),
            });
        }

        let backend = self.shared.backend_for(target);
        match backend.delete(&target_replica.url).await {
            Ok(()) => {}
            // Already gone physically; still drop the record.
            Err(StorageError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let last = replicas.len() == 1;
        let guard = self.shared.path_lock(path).await;
        let update = async {
            self.shared
                .catalog
                .remove_replica_entry(path, &target.name)
                .await?;
            if last {
                self.shared.catalog.remove_entry(path).await?;
            }
            Ok::<(), CatalogError>(())
        }
        .await;
        drop(guard);
        self.shared.cache.invalidate(path);

        match update {
            Ok(()) => {
                tracing::info!(path = %path, se = %target.name, "removed replica");
                Ok(OperationResult::success(
                    path.clone(),
                    Some(target.name.clone()),
                ))
            }
            Err(e) => Ok(OperationResult::warning(
                path.clone(),
                Some(target.name.clone()),
                format!("replica deleted but catalog update failed: {}", e),
            )),
        }
    }

    async fn repair(&self, path: &LogicalPath) -> Result<OperationResult> {
        let replicas = self.shared.catalog.list_replicas(path).await?;
        if replicas.is_empty() {
            return Err(EngineError::NoReplica {
                path: path.as_str().to_string(),
            });
        }

        let mut stale: Vec<(Replica, StorageElement)> = Vec::new();
        let mut lost_elements: Vec<StorageElement> = Vec::new();
        let mut survivors: Vec<Replica> = Vec::new();
        for replica in &replicas {
            let se = self.registry().resolve_by_url(&replica.url)?.clone();
            if !se.is_usable() {
                stale.push((replica.clone(), se));
                continue;
            }
            let probe_url = se.storage_url(self.basedir(), path, true);
            if self.shared.backend_for(&se).exists(&probe_url).await? {
                survivors.push(replica.clone());
            } else {
                lost_elements.push(se.clone());
                stale.push((replica.clone(), se));
            }
        }

        if stale.is_empty() {
            return Ok(OperationResult::skipped(
                path.clone(),
                None,
                "replicas consistent",
            ));
        }
        if survivors.is_empty() {
            // Nothing left to restore from; mutate nothing.
            return Err(EngineError::NoReplica {
                path: path.as_str().to_string(),
            });
        }

        let dropped = stale.len();
        for (_, se) in &stale {
            let guard = self.shared.path_lock(path).await;
            let update = self.shared.catalog.remove_replica_entry(path, &se.name).await;
            drop(guard);
            if let Err(e) = update {
                self.shared.cache.invalidate(path);
                return Ok(OperationResult::warning(
                    path.clone(),
                    Some(se.name.clone()),
                    format!("stale record could not be dropped: {}", e),
                ));
            }
            tracing::info!(path = %path, se = %se.name, "dropped stale replica record");
        }

        let sources = order_candidates(self.registry(), &survivors)?;
        let mut restored = 0usize;
        for se in &lost_elements {
            let target_url = se.storage_url(self.basedir(), path, false);
            let probe_url = se.storage_url(self.basedir(), path, true);
            let checksum = self
                .copy_to_target(path, &sources, se, &target_url, &probe_url)
                .await?;
            let result = self
                .finish_registration(path, se, &target_url, &checksum, "repair")
                .await?;
            if result.outcome == crate::request::Outcome::Warning {
                return Ok(result);
            }
            restored += 1;
        }

        self.shared.cache.invalidate(path);
        Ok(
            OperationResult::success(path.clone(), None).with_message(format!(
                "dropped {} stale record(s), restored {} replica(s)",
                dropped, restored
            )),
        )
    }

    /// Spool a source replica through local disk to the target element and
    /// verify the copy. Returns the verified checksum.
    ///
    /// Sources are tried in selection order; tape sources are staged
    /// first. A stage timeout fails the file outright, anything else falls
    /// through to the next source.
    async fn copy_to_target(
        &self,
        path: &LogicalPath,
        sources: &[Candidate],
        target: &StorageElement,
        target_url: &PhysicalUrl,
        probe_url: &PhysicalUrl,
    ) -> Result<Checksum> {
        let spool = std::env::temp_dir().join(format!("gridrep-{}.spool", uuid::Uuid::new_v4()));
        let target_backend = self.shared.backend_for(target);
        let mut last_err: Option<EngineError> = None;

        for source in sources {
            if source.se.name == target.name {
                continue;
            }
            let source_backend = self.shared.backend_for(&source.se);
            if source.se.tech.is_tape_family() {
                match self
                    .shared
                    .poller
                    .wait_until_online(source_backend.as_ref(), &source.replica.url)
                    .await
                {
                    Ok(()) => {}
                    Err(e @ StorageError::StageTimeout { .. }) => {
                        let _ = tokio::fs::remove_file(&spool).await;
                        return Err(e.into());
                    }
                    Err(e) => {
                        last_err = Some(e.into());
                        continue;
                    }
                }
            }

            tracing::info!(
                path = %path,
                from = %source.se.name,
                to = %target.name,
                "copying replica"
            );
            let copied = async {
                source_backend.fetch(&source.replica.url, &spool).await?;
                target_backend.push(&spool, target_url).await?;
                Ok::<(), StorageError>(())
            }
            .await;
            match copied {
                Ok(()) => {
                    let _ = tokio::fs::remove_file(&spool).await;
                    let computed = target_backend.checksum(probe_url).await?;
                    self.verify_or_cleanup(
                        &source.replica.checksum,
                        computed.clone(),
                        CleanupTarget::Remote(target_backend.as_ref(), target_url),
                    )
                    .await?;
                    return Ok(computed);
                }
                Err(e) => {
                    last_err = Some(e.into());
                }
            }
        }

        let _ = tokio::fs::remove_file(&spool).await;
        Err(last_err.unwrap_or_else(|| EngineError::NoReplica {
            path: path.as_str().to_string(),
        }))
    }

    /// Compare a transferred copy against the expected checksum; on
    /// mismatch the partial artifact is removed before the error returns.
    /// An unknown expected checksum skips verification with a warning.
    async fn verify_or_cleanup(
        &self,
        expected: &Checksum,
        computed: Checksum,
        cleanup: CleanupTarget<'_>,
    ) -> Result<()> {
        if !expected.is_known() {
            tracing::warn!("no catalog checksum to verify against, accepting transfer");
            return Ok(());
        }
        if expected.matches(&computed) {
            return Ok(());
        }
        match cleanup {
            CleanupTarget::Local(path) => {
                let _ = tokio::fs::remove_file(path).await;
            }
            CleanupTarget::Remote(backend, url) => {
                if let Err(e) = backend.delete(url).await {
                    tracing::warn!(url = %url, error = %e, "failed to clean up mismatched copy");
                }
            }
        }
        Err(EngineError::Storage(StorageError::ChecksumMismatch {
            expected: expected.as_str().to_string(),
            computed: computed.as_str().to_string(),
        }))
    }

    /// Catalog registration under the per-path lock. A failure here, after
    /// the physical copy succeeded, is the distinct catalog-inconsistency
    /// warning and is not retried.
    async fn finish_registration(
        &self,
        path: &LogicalPath,
        se: &StorageElement,
        url: &PhysicalUrl,
        checksum: &Checksum,
        action: &str,
    ) -> Result<OperationResult> {
        let guard = self.shared.path_lock(path).await;
        let update = self
            .shared
            .catalog
            .register_replica(path, &se.name, url, checksum)
            .await;
        drop(guard);
        self.shared.cache.invalidate(path);
        match update {
            Ok(()) => Ok(OperationResult::success(
                path.clone(),
                Some(se.name.clone()),
            )),
            Err(e) => Ok(OperationResult::warning(
                path.clone(),
                Some(se.name.clone()),
                format!("{} copied but catalog registration failed: {}", action, e),
            )),
        }
    }
}

enum CleanupTarget<'a> {
    Local(&'a std::path::Path),
    Remote(&'a dyn StorageBackend, &'a PhysicalUrl),
}

#[cfg(test)]
mod tests {
    use super::*;

    use gridrep_catalog::MemoryCatalog;
    use gridrep_storage::disk::DiskBackend;
    use gridrep_storage::tape::TapeBackend;

    fn engine_with(elements: Vec<StorageElement>) -> OperationEngine {
        let registry = Arc::new(SeRegistry::new("/exp.org", elements).unwrap());
        let runner = Arc::new(gridrep_storage::command::SubprocessRunner);
        OperationEngine::new(
            registry,
            Arc::new(MemoryCatalog::new()),
            Arc::new(DiskBackend::new(runner.clone())),
            Arc::new(TapeBackend::new(runner)),
            Arc::new(DirCache::default()),
            EngineConfig::default(),
        )
    }

    fn disk_se(name: &str) -> StorageElement {
        StorageElement {
            name: name.to_string(),
            host: format!("{}.example", name),
            tech: SeTech::Disk,
            location: String::new(),
            basepath: format!("srm://{}.example/data", name),
            directpath: None,
            broken: false,
            disabled: false,
        }
    }

    fn p(path: &str) -> LogicalPath {
        LogicalPath::new(path).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_target_fails_before_resolution() {
        let engine = engine_with(vec![disk_se("disk1")]);
        let request = OperationRequest::new(Action::Replicate, p("/data")).with_target("nowhere");
        let err = engine.run(request, CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_remove_without_target_is_configuration_error() {
        let engine = engine_with(vec![disk_se("disk1")]);
        let request = OperationRequest::new(Action::Remove, p("/data"));
        let err = engine.run(request, CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_get_without_local_is_configuration_error() {
        let engine = engine_with(vec![disk_se("disk1")]);
        let request = OperationRequest::new(Action::Get, p("/data"));
        let err = engine.run(request, CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_replicate_to_broken_target_is_configuration_error() {
        let mut broken = disk_se("disk1");
        broken.broken = true;
        let engine = engine_with(vec![broken]);
        let request = OperationRequest::new(Action::Replicate, p("/data")).with_target("disk1");
        let err = engine.run(request, CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_put_with_no_usable_disk_is_configuration_error() {
        let mut off = disk_se("disk1");
        off.disabled = true;
        let engine = engine_with(vec![off]);
        let request = OperationRequest::new(Action::Put, p("/data/new.gz")).with_local("/tmp/x");
        let err = engine.run(request, CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_invalid_filter_fails_whole_request() {
        let engine = engine_with(vec![disk_se("disk1")]);
        let request = OperationRequest::new(Action::Check, p("/data")).with_filter("run[0-");
        let err = engine.run(request, CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }
}
