//! On-disk store for the current artifact and its backups.
//!
//! Layout under the root directory:
//!
//! ```text
//! swagger.yaml                      current artifact
//! swagger_20240501120000.yaml       superseded at 12:00:00 UTC
//! swagger_20240501120000_1.yaml     second supersession within that second
//! .swagger.yaml.<uuid>.partial      upload in flight
//! ```
//!
//! Writers are serialised by a mutex. The previous artifact is linked (or
//! copied) to its backup name while still in place, and the new bytes are
//! renamed over the current name, so readers never see a missing or
//! half-written artifact.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::ArtifactError;

/// Backup names tried per second before giving up.
pub const MAX_BACKUP_ATTEMPTS: u32 = 100;

const BACKUP_STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// File name the previous artifact was preserved under.
    pub backup: Option<String>,
}

#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    name: String,
    write_lock: Mutex<()>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_path(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    /// MIME type to serve the artifact with, from its extension.
    pub fn content_type(&self) -> &'static str {
        match Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => "application/yaml",
            Some("json") => "application/json",
            _ => "application/octet-stream",
        }
    }

    /// Create the storage directory if it is missing.
    pub async fn ensure_root(&self) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Replace the current artifact, keeping the previous one as a backup.
    pub async fn upload(
        &self,
        bytes: &[u8],
        filename_hint: Option<&str>,
    ) -> Result<UploadOutcome, ArtifactError> {
        self.upload_at(bytes, filename_hint, Utc::now()).await
    }

    /// Like [`upload`](Self::upload), with `now` used for the backup name.
    pub async fn upload_at(
        &self,
        bytes: &[u8],
        filename_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<UploadOutcome, ArtifactError> {
        self.ensure_root().await?;

        let _guard = self.write_lock.lock().await;

        let staged = self.stage(bytes).await?;
        let current = self.current_path();

        let backup = match fs::try_exists(&current).await {
            Ok(true) => match self.preserve_current(now).await {
                Ok(name) => Some(name),
                Err(e) => {
                    discard(&staged).await;
                    return Err(e);
                }
            },
            Ok(false) => None,
            Err(e) => {
                discard(&staged).await;
                return Err(e.into());
            }
        };

        let backup = replace_current(&staged, &current, backup).await?;

        tracing::info!(
            artifact = %self.name,
            bytes = bytes.len(),
            filename_hint = filename_hint.unwrap_or("-"),
            backup = backup.as_deref().unwrap_or("-"),
            "Artifact replaced"
        );

        Ok(UploadOutcome { backup })
    }

    /// Contents of the current artifact.
    pub async fn read_current(&self) -> Result<Vec<u8>, ArtifactError> {
        match fs::read(self.current_path()).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ArtifactError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// File names of all backups, oldest first.
    pub async fn backups(&self) -> Result<Vec<String>, ArtifactError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Some((stamp, collision)) = self.parse_backup_name(&name) {
                backups.push((stamp, collision, name));
            }
        }

        backups.sort();
        Ok(backups.into_iter().map(|(_, _, name)| name).collect())
    }

    /// Write `bytes` to a hidden file next to the current artifact.
    async fn stage(&self, bytes: &[u8]) -> Result<PathBuf, ArtifactError> {
        let staged = self
            .root
            .join(format!(".{}.{}.partial", self.name, Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&staged).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            Ok::<(), io::Error>(())
        }
        .await;

        if let Err(e) = written {
            discard(&staged).await;
            return Err(e.into());
        }
        Ok(staged)
    }

    /// Give the current artifact a second name without touching the first.
    /// Existing backups are never overwritten.
    async fn preserve_current(&self, now: DateTime<Utc>) -> Result<String, ArtifactError> {
        let stamp = now.format(BACKUP_STAMP_FORMAT).to_string();
        let current = self.current_path();

        for attempt in 0..MAX_BACKUP_ATTEMPTS {
            let name = self.backup_name(&stamp, attempt);
            match link_or_copy(&current, &self.root.join(&name)).await {
                Ok(()) => return Ok(name),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(ArtifactError::ConcurrentUploadConflict { stamp })
    }

    fn backup_name(&self, stamp: &str, attempt: u32) -> String {
        let (stem, ext) = self.name_parts();
        let collision = if attempt == 0 {
            String::new()
        } else {
            format!("_{}", attempt)
        };

        match ext {
            Some(ext) => format!("{}_{}{}.{}", stem, stamp, collision, ext),
            None => format!("{}_{}{}", stem, stamp, collision),
        }
    }

    /// Inverse of `backup_name`: the stamp and collision counter, or `None`
    /// for files that are not backups of this artifact.
    fn parse_backup_name(&self, name: &str) -> Option<(String, u32)> {
        let (stem, ext) = self.name_parts();
        let rest = name.strip_prefix(stem)?.strip_prefix('_')?;
        let rest = match ext {
            Some(ext) => rest.strip_suffix(ext)?.strip_suffix('.')?,
            None => rest,
        };

        let (stamp, collision) = match rest.split_once('_') {
            Some((stamp, n)) => (stamp, n.parse().ok()?),
            None => (rest, 0),
        };
        if stamp.len() != 14 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some((stamp.to_string(), collision))
    }

    fn name_parts(&self) -> (&str, Option<&str>) {
        let path = Path::new(&self.name);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name);
        let ext = path.extension().and_then(|e| e.to_str());
        (stem, ext)
    }
}

/// Move the staged file over the current name. A failed rename removes the
/// staged file; if the current name is gone afterwards the backup is the only
/// surviving copy and the failure is reported as partial.
async fn replace_current(
    staged: &Path,
    current: &Path,
    backup: Option<String>,
) -> Result<Option<String>, ArtifactError> {
    match fs::rename(staged, current).await {
        Ok(()) => Ok(backup),
        Err(e) => {
            discard(staged).await;
            let current_missing = matches!(fs::try_exists(current).await, Ok(false));
            if backup.is_some() && current_missing {
                return Err(ArtifactError::PartialUploadFailure { backup, source: e });
            }
            Err(e.into())
        }
    }
}

async fn link_or_copy(source: &Path, target: &Path) -> io::Result<()> {
    match fs::hard_link(source, target).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(e),
        Err(e) => {
            tracing::debug!("Hard link failed ({}), copying backup instead", e);
            copy_new(source, target).await
        }
    }
}

async fn copy_new(source: &Path, target: &Path) -> io::Result<()> {
    let mut from = File::open(source).await?;
    let mut to = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .await?;

    let copied = async {
        tokio::io::copy(&mut from, &mut to).await?;
        to.sync_all().await
    }
    .await;

    if copied.is_err() {
        discard(target).await;
    }
    copied
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
