//! Disk-family backend adapter over the gfal command set.
//!
//! Disk replicas are always online, so `stage` is a no-op whose ticket
//! reports READY on the first poll.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::StorageBackend;
use crate::command::{classify_failure, CommandOutput, CommandRunner};
use crate::error::{Result, StorageError};
use crate::types::{
    Checksum, DirectoryEntry, EntryKind, FileStat, PhysicalUrl, ReplicaState, StageStatus,
    StageTicket,
};

const LS_CMD: &str = "gfal-ls";
const SUM_CMD: &str = "gfal-sum";
const COPY_CMD: &str = "gfal-copy";
const RM_CMD: &str = "gfal-rm";
const CHECKSUM_TYPE: &str = "ADLER32";

/// Backend adapter for disk pools and plain XRootD/dCache endpoints.
pub struct DiskBackend {
    runner: Arc<dyn CommandRunner>,
}

impl DiskBackend {
    /// New adapter issuing commands through `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        DiskBackend { runner }
    }

    pub(crate) async fn run_checked(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let output = self.runner.run(program, args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(classify_failure(program, &output))
        }
    }

    async fn stat_entry(&self, url: &PhysicalUrl) -> Result<DirectoryEntry> {
        let output = self
            .run_checked(
                LS_CMD,
                &["-d".to_string(), "-l".to_string(), url.as_str().to_string()],
            )
            .await?;
        output
            .stdout
            .lines()
            .find_map(DirectoryEntry::from_ls_row)
            .ok_or_else(|| StorageError::CommandFailed {
                program: LS_CMD.to_string(),
                detail: format!("unparseable listing for {}", url),
            })
    }
}

#[async_trait]
impl StorageBackend for DiskBackend {
    async fn list(&self, url: &PhysicalUrl) -> Result<Vec<DirectoryEntry>> {
        let output = self
            .run_checked(LS_CMD, &["-l".to_string(), url.as_str().to_string()])
            .await?;
        Ok(output
            .stdout
            .lines()
            .filter_map(DirectoryEntry::from_ls_row)
            .collect())
    }

    async fn exists(&self, url: &PhysicalUrl) -> Result<bool> {
        match self.stat_entry(url).await {
            Ok(entry) => Ok(entry.kind == EntryKind::File),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn stat(&self, url: &PhysicalUrl) -> Result<FileStat> {
        let entry = self.stat_entry(url).await?;
        Ok(FileStat {
            size: entry.size.unwrap_or(0),
            modified: entry.modified,
        })
    }

    async fn checksum(&self, url: &PhysicalUrl) -> Result<Checksum> {
        let output = self
            .run_checked(
                SUM_CMD,
                &[url.as_str().to_string(), CHECKSUM_TYPE.to_string()],
            )
            .await?;
        // Output format: "<url> <checksum>".
        let value = output
            .stdout
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| StorageError::ChecksumUnavailable {
                url: url.as_str().to_string(),
            })?;
        Ok(Checksum::new(value))
    }

    async fn state(&self, url: &PhysicalUrl) -> Result<ReplicaState> {
        if self.exists(url).await? {
            Ok(ReplicaState::Online)
        } else {
            Err(StorageError::NotFound {
                what: url.as_str().to_string(),
            })
        }
    }

    async fn stage(&self, url: &PhysicalUrl) -> Result<StageTicket> {
        Ok(StageTicket::new(url.clone()))
    }

    async fn stage_status(&self, _ticket: &StageTicket) -> Result<StageStatus> {
        Ok(StageStatus::Ready)
    }

    async fn fetch(&self, url: &PhysicalUrl, local_dest: &Path) -> Result<()> {
        self.run_checked(
            COPY_CMD,
            &[
                "-f".to_string(),
                "--checksum".to_string(),
                CHECKSUM_TYPE.to_string(),
                url.as_str().to_string(),
                local_dest.to_string_lossy().into_owned(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn push(&self, local_src: &Path, url: &PhysicalUrl) -> Result<()> {
        self.run_checked(
            COPY_CMD,
            &[
                "--checksum".to_string(),
                CHECKSUM_TYPE.to_string(),
                local_src.to_string_lossy().into_owned(),
                url.as_str().to_string(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, url: &PhysicalUrl) -> Result<()> {
        self.run_checked(RM_CMD, &[url.as_str().to_string()])
            .await?;
        Ok(())
    }
}
