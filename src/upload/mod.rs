//! # Upload Module
//!
//! Sends pending log files to the collector and archives the accepted ones.
//!
//! A pass holds the log buffer lock and the pending directory lock from
//! start to end, so no file can be written into the pending directory, by
//! this process or another one, while it is being listed, read and moved. Before any file is sent, the collector's interface version is
//! checked against the configured one.

pub mod transport;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info};

use crate::config::UploadConfig;
use crate::error::{LoggerError, Result};
use crate::events::{EventBus, LoggerEvent};
use crate::logbuf::dirlock::{self, DirLock};
use crate::logbuf::SharedLogBuffer;

pub use transport::{FilePart, HttpResponse, ReqwestTransport, TransportError, UploadTransport};

/// Line of the version document carrying the server interface version
pub const VERSION_KEY: &str = "MappingManagerVersion";

/// Form field names expected by the collector
pub const LOGIN_FIELD: &str = "openBmap_login";
pub const PASSWORD_FIELD: &str = "openBmap_passwd";
pub const FILE_FIELD: &str = "file";

/// Server verdict for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Accepted and stored
    Uploaded,
    /// The server already has this file
    Duplicate,
    Failed,
}

/// Classify a collector response by status and body
pub fn classify(response: &HttpResponse) -> UploadOutcome {
    if !response.is_success() {
        UploadOutcome::Failed
    } else if response.body.starts_with("Stored in") {
        UploadOutcome::Uploaded
    } else if response.body.trim().ends_with("already exists.") {
        UploadOutcome::Duplicate
    } else {
        UploadOutcome::Failed
    }
}

/// Extract the announced interface version from the version document
pub fn parse_api_version(document: &str) -> Option<&str> {
    document.lines().find_map(|line| {
        line.strip_prefix(VERSION_KEY)
            .and_then(|rest| rest.strip_prefix('='))
            .map(str::trim)
    })
}

/// Counts of one completed pass. `uploaded` excludes duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub all_succeeded: bool,
    pub uploaded: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub total: usize,
}

/// Runs upload passes over the pending directory
pub struct UploadCoordinator {
    transport: Arc<dyn UploadTransport>,
    buffer: SharedLogBuffer,
    processed_dir: PathBuf,
    settings: UploadConfig,
    events: EventBus,
}

impl std::fmt::Debug for UploadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCoordinator")
            .field("processed_dir", &self.processed_dir)
            .field("upload_url", &self.settings.upload_url)
            .finish_non_exhaustive()
    }
}

impl UploadCoordinator {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        buffer: SharedLogBuffer,
        processed_dir: PathBuf,
        settings: UploadConfig,
        events: EventBus,
    ) -> Self {
        Self {
            transport,
            buffer,
            processed_dir,
            settings,
            events,
        }
    }

    /// Fetch the server version document and compare it to ours
    pub async fn check_api_version(&self) -> Result<()> {
        debug!("Checking the server interface version...");
        info!("We support API version: {}", self.settings.api_version);

        let document = self
            .transport
            .get_text(&self.settings.api_check_url)
            .await
            .map_err(|e| LoggerError::UploadTransport {
                message: e.to_string(),
                uploaded: 0,
                attempted: 0,
            })?;

        let server = parse_api_version(&document);
        info!("Server API version: {:?}", server);
        if server == Some(self.settings.api_version.as_str()) {
            Ok(())
        } else {
            error!("Server API version not supported, is this software up to date?");
            Err(LoggerError::UploadVersionMismatch {
                server: server.map(str::to_string),
                local: self.settings.api_version.clone(),
            })
        }
    }

    /// Upload every pending file once.
    ///
    /// Accepted and duplicate files are moved to the processed directory,
    /// rejected ones stay pending and clear `all_succeeded`. Transport and
    /// filesystem failures abort the pass and report how far it got.
    pub async fn upload_pending(&self) -> Result<UploadReport> {
        let buffer = self.buffer.lock().await;
        let result = match lock_pending_dir(buffer.pending_dir()).await {
            Ok(_dir_lock) => {
                info!("Log file lock acquired");
                self.upload_locked(buffer.pending_dir()).await
            }
            Err(e) => Err(e),
        };

        drop(buffer);
        info!("Log file lock released");

        let report = result?;
        self.events.publish(LoggerEvent::UploadFinished {
            all_succeeded: report.all_succeeded,
            uploaded: report.uploaded,
            total: report.total,
        });
        Ok(report)
    }

    async fn upload_locked(&self, pending_dir: &Path) -> Result<UploadReport> {
        self.check_api_version().await?;

        let files = pending_files(pending_dir).map_err(|source| LoggerError::UploadIo {
            path: pending_dir.to_path_buf(),
            source,
            uploaded: 0,
            attempted: 0,
        })?;

        let fields = [
            (LOGIN_FIELD.to_string(), self.settings.login.clone()),
            (PASSWORD_FIELD.to_string(), self.settings.password.clone()),
        ];
        let mut report = UploadReport {
            all_succeeded: true,
            ..Default::default()
        };

        for path in files {
            report.total += 1;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!("Try uploading '{}'", file_name);

            let content = fs::read(&path).map_err(|source| LoggerError::UploadIo {
                path: path.clone(),
                source,
                uploaded: report.uploaded,
                attempted: report.total,
            })?;

            let response = self
                .transport
                .post_multipart(
                    &self.settings.upload_url,
                    &fields,
                    vec![FilePart {
                        field: FILE_FIELD.to_string(),
                        file_name: file_name.clone(),
                        content: Bytes::from(content),
                    }],
                )
                .await
                .map_err(|e| {
                    error!("Error while sending logged data: {}", e);
                    LoggerError::UploadTransport {
                        message: e.to_string(),
                        uploaded: report.uploaded,
                        attempted: report.total,
                    }
                })?;
            debug!(
                "Upload response status:{}, reason:{}, body:{}",
                response.status, response.reason, response.body
            );

            match classify(&response) {
                UploadOutcome::Uploaded => {
                    let target = self.archive(&path, &file_name, &report)?;
                    info!("File '{}' successfully uploaded, moved to {}", file_name, target.display());
                    report.uploaded += 1;
                }
                UploadOutcome::Duplicate => {
                    let target = self.archive(&path, &file_name, &report)?;
                    info!("File '{}' probably already uploaded, moved to {}", file_name, target.display());
                    report.duplicates += 1;
                }
                UploadOutcome::Failed => {
                    error!("Unable to upload file '{}'", file_name);
                    report.failed += 1;
                    report.all_succeeded = false;
                }
            }
        }

        info!(
            "Upload pass done: {} uploaded, {} duplicate(s), {} failed, {} total",
            report.uploaded, report.duplicates, report.failed, report.total
        );
        Ok(report)
    }

    fn archive(&self, path: &Path, file_name: &str, report: &UploadReport) -> Result<PathBuf> {
        let target = self.processed_dir.join(file_name);
        fs::rename(path, &target).map_err(|source| LoggerError::UploadIo {
            path: path.to_path_buf(),
            source,
            uploaded: report.uploaded,
            attempted: report.total,
        })?;
        Ok(target)
    }
}

/// Wait for the pending directory lock without blocking the runtime
async fn lock_pending_dir(dir: &Path) -> Result<DirLock> {
    let owned = dir.to_path_buf();
    tokio::task::spawn_blocking(move || DirLock::acquire(&owned))
        .await
        .unwrap_or_else(|e| Err(std::io::Error::other(e)))
        .map_err(|source| LoggerError::UploadIo {
            path: dir.to_path_buf(),
            source,
            uploaded: 0,
            attempted: 0,
        })
}

/// Log files of `dir`, sorted by name
fn pending_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() && !dirlock::is_lock_file(&entry.file_name().to_string_lossy()) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
