//! The `gridrep` command line: builds [`OperationRequest`] values from
//! subcommands, renders the aggregate report, and maps it to the process
//! exit code.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use gridrep_storage::LogicalPath;

use crate::cancel::{cancel_pair, CancelReason};
use crate::engine::OperationEngine;
use crate::request::{Action, OperationReport, OperationRequest};

/// Grid dataset replica manager.
#[derive(Parser)]
#[command(name = "gridrep")]
#[command(about = "Manage dataset replicas across grid storage elements", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML or JSON).
    #[arg(
        short,
        long,
        default_value = "/etc/gridrep/config.toml",
        env = "GRIDREP_CONFIG"
    )]
    pub config: PathBuf,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// One `gridrep` subcommand.
#[derive(Subcommand)]
pub enum Command {
    /// List a logical directory.
    Ls {
        /// Logical directory path.
        path: String,
    },
    /// Download files to a local destination.
    Get {
        /// Logical file or directory path.
        path: String,
        /// Local destination file or directory.
        dest: PathBuf,
        /// Descend into subdirectories.
        #[arg(short, long)]
        recursive: bool,
        /// Regex applied to file base names.
        #[arg(short, long)]
        filter: Option<String>,
        /// Restrict the source to one storage element.
        #[arg(short, long)]
        se: Option<String>,
        /// Overwrite existing local files.
        #[arg(long)]
        force: bool,
    },
    /// Upload a local file and register it.
    Put {
        /// Local source file.
        local: PathBuf,
        /// Logical destination path (file, or existing directory).
        path: String,
        /// Destination element; defaults to the first usable disk element.
        #[arg(short, long)]
        se: Option<String>,
    },
    /// Copy files to a target element and register the new replicas.
    Replicate {
        /// Logical file or directory path.
        path: String,
        /// Target storage element.
        se: String,
        /// Descend into subdirectories.
        #[arg(short, long)]
        recursive: bool,
        /// Regex applied to file base names.
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Report replica presence without mutating anything.
    Check {
        /// Logical file or directory path.
        path: String,
        /// Element to check; with none, any replica counts.
        #[arg(short, long)]
        se: Option<String>,
        /// Descend into subdirectories.
        #[arg(short, long)]
        recursive: bool,
        /// Regex applied to file base names.
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Delete replicas at a target element and deregister them.
    Remove {
        /// Logical file or directory path.
        path: String,
        /// Target storage element.
        se: String,
        /// Descend into subdirectories.
        #[arg(short, long)]
        recursive: bool,
        /// Regex applied to file base names.
        #[arg(short, long)]
        filter: Option<String>,
        /// Allow deleting a file's last remaining replica.
        #[arg(long)]
        force: bool,
    },
    /// Drop stale replica records and restore lost copies.
    Repair {
        /// Logical file or directory path.
        path: String,
        /// Descend into subdirectories.
        #[arg(short, long)]
        recursive: bool,
        /// Regex applied to file base names.
        #[arg(short, long)]
        filter: Option<String>,
    },
}

impl Cli {
    /// Run the selected subcommand; returns the process exit code.
    pub async fn run(self, engine: &OperationEngine) -> Result<i32> {
        match self.command {
            Command::Ls { path } => {
                let path = LogicalPath::new(&path)?;
                let entries = engine.walker().list(&path).await?;
                for entry in entries {
                    let marker = match entry.kind {
                        gridrep_storage::EntryKind::Directory => "/",
                        gridrep_storage::EntryKind::File => "",
                    };
                    match entry.size {
                        Some(size) => println!("{:>12}  {}{}", size, entry.name, marker),
                        None => println!("{:>12}  {}{}", "-", entry.name, marker),
                    }
                }
                Ok(0)
            }
            Command::Get {
                path,
                dest,
                recursive,
                filter,
                se,
                force,
            } => {
                let mut request =
                    OperationRequest::new(Action::Get, LogicalPath::new(&path)?).with_local(dest);
                request.recursive = recursive;
                request.filter = filter;
                request.target_se = se;
                request.force = force;
                Self::execute(engine, request).await
            }
            Command::Put { local, path, se } => {
                let mut request =
                    OperationRequest::new(Action::Put, LogicalPath::new(&path)?).with_local(local);
                request.target_se = se;
                Self::execute(engine, request).await
            }
            Command::Replicate {
                path,
                se,
                recursive,
                filter,
            } => {
                let mut request = OperationRequest::new(Action::Replicate, LogicalPath::new(&path)?)
                    .with_target(se);
                request.recursive = recursive;
                request.filter = filter;
                Self::execute(engine, request).await
            }
            Command::Check {
                path,
                se,
                recursive,
                filter,
            } => {
                let mut request = OperationRequest::new(Action::Check, LogicalPath::new(&path)?);
                request.target_se = se;
                request.recursive = recursive;
                request.filter = filter;
                Self::execute(engine, request).await
            }
            Command::Remove {
                path,
                se,
                recursive,
                filter,
                force,
            } => {
                let mut request =
                    OperationRequest::new(Action::Remove, LogicalPath::new(&path)?).with_target(se);
                request.recursive = recursive;
                request.filter = filter;
                request.force = force;
                Self::execute(engine, request).await
            }
            Command::Repair {
                path,
                recursive,
                filter,
            } => {
                let mut request = OperationRequest::new(Action::Repair, LogicalPath::new(&path)?);
                request.recursive = recursive;
                request.filter = filter;
                Self::execute(engine, request).await
            }
        }
    }

    async fn execute(engine: &OperationEngine, request: OperationRequest) -> Result<i32> {
        let (token, handle) = cancel_pair();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping submission of new files");
                handle.cancel(CancelReason::UserRequested);
            }
        });

        let report = engine.run(request, token).await?;
        print!("{}", render_report(&report));
        Ok(report.exit_code())
    }
}

/// Render the aggregate report, one line per file plus a summary.
pub fn render_report(report: &OperationReport) -> String {
    let mut out = String::new();
    for result in &report.results {
        out.push_str(&format!("{:8}", result.outcome.to_string()));
        out.push(' ');
        out.push_str(result.path.as_str());
        if let Some(se) = &result.se {
            out.push_str(&format!(" @{}", se));
        }
        match (&result.reason, &result.message) {
            (Some(reason), Some(message)) => {
                out.push_str(&format!(" ({}: {})", reason, message));
            }
            (Some(reason), None) => out.push_str(&format!(" ({})", reason)),
            (None, Some(message)) => out.push_str(&format!(" ({})", message)),
            (None, None) => {}
        }
        out.push('\n');
    }
    if report.cancelled {
        out.push_str("request cancelled: partial results above\n");
    }
    out.push_str(&report.summary());
    out.push('\n');
    out
}
