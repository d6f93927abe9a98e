//! Deployment descriptor model
//!
//! The descriptor is supplied by the caller (typically parsed from a TOML
//! file), sanitized once, and treated as read-only by the core afterwards.
//! Partitioning and block-device discovery act on the disk declarations but
//! are external collaborators; this crate only models the data.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use atomos_errors::{DeploymentError, Error};
use atomos_hash::Digest;

/// Kind of content a deployment source points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "path")]
pub enum SourceKind {
    /// A local directory tree
    Dir(PathBuf),
    /// A gzip-compressed tarball
    Tar(PathBuf),
}

impl SourceKind {
    /// Filesystem path of the source
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Dir(p) | Self::Tar(p) => p,
        }
    }
}

/// OS content source plus the digest recorded once it has been synchronized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsSource {
    #[serde(flatten)]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    digest: Option<Digest>,
}

impl OsSource {
    /// Create a directory source
    #[must_use]
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: SourceKind::Dir(path.into()),
            digest: None,
        }
    }

    /// Create a tarball source
    #[must_use]
    pub fn tar(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: SourceKind::Tar(path.into()),
            digest: None,
        }
    }

    /// Digest of the content this source produced, if synchronized
    #[must_use]
    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// Record the digest produced by synchronizing this source
    pub fn set_digest(&mut self, digest: Digest) {
        self.digest = Some(digest);
    }
}

/// Role a partition plays in the deployed system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionRole {
    /// EFI system partition
    Efi,
    /// Root of the deployed OS, holds the snapshots
    System,
    /// Persistent data, survives OS updates
    Data,
}

/// A single partition declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub label: String,
    pub role: PartitionRole,
    /// Stable identifier (filesystem UUID) used to match probed devices
    #[serde(default)]
    pub uuid: String,
    /// Size in MiB; zero means "rest of the disk"
    #[serde(default)]
    pub size_mib: u64,
    #[serde(default = "default_fs")]
    pub file_system: String,
}

fn default_fs() -> String {
    "btrfs".to_string()
}

/// A target disk with its ordered partition list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub device: PathBuf,
    pub partitions: Vec<Partition>,
}

/// The full deployment descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    // Scalar fields first so TOML serialization emits them before tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg_script: Option<PathBuf>,
    pub disks: Vec<Disk>,
    pub source_os: OsSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_tree: Option<OsSource>,
}

impl Deployment {
    /// Default single-disk layout: EFI partition plus a system partition
    /// taking the rest of the disk. The device is filled in by the caller.
    #[must_use]
    pub fn default_layout(source_os: OsSource) -> Self {
        Self {
            disks: vec![Disk {
                device: PathBuf::new(),
                partitions: vec![
                    Partition {
                        label: "EFI".to_string(),
                        role: PartitionRole::Efi,
                        uuid: String::new(),
                        size_mib: 1024,
                        file_system: "vfat".to_string(),
                    },
                    Partition {
                        label: "SYSTEM".to_string(),
                        role: PartitionRole::System,
                        uuid: String::new(),
                        size_mib: 0,
                        file_system: default_fs(),
                    },
                ],
            }],
            source_os,
            overlay_tree: None,
            cfg_script: None,
        }
    }

    /// Load a descriptor from a TOML file
    ///
    /// # Errors
    /// Returns an error if the file is missing or does not parse.
    pub async fn from_file(path: &Path) -> Result<Self, Error> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| DeploymentError::NotFound {
                path: path.display().to_string(),
            })?;

        let deployment: Self = toml::from_str(&raw).map_err(|e| DeploymentError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(deployment)
    }

    /// Validate and normalize the descriptor. Called once before the
    /// descriptor reaches the install orchestrator.
    ///
    /// # Errors
    /// Returns an error on structural problems: no disks, no partitions,
    /// missing source path, or a relative hook path.
    pub fn sanitize(&self) -> Result<(), Error> {
        if self.disks.is_empty() {
            return Err(DeploymentError::NoDisks.into());
        }
        for disk in &self.disks {
            if disk.device.as_os_str().is_empty() {
                return Err(DeploymentError::Invalid {
                    message: "disk declared without a device".to_string(),
                }
                .into());
            }
            if disk.partitions.is_empty() {
                return Err(DeploymentError::Invalid {
                    message: format!("disk {} declares no partitions", disk.device.display()),
                }
                .into());
            }
        }
        if self.source_os.kind.path().as_os_str().is_empty() {
            return Err(DeploymentError::NoSource.into());
        }
        if let Some(script) = &self.cfg_script {
            if !script.is_absolute() {
                return Err(DeploymentError::Invalid {
                    message: format!(
                        "configuration hook path must be absolute: {}",
                        script.display()
                    ),
                }
                .into());
            }
        }
        Ok(())
    }

    /// The disk carrying the system partition, used as the install target
    #[must_use]
    pub fn system_disk(&self) -> Option<&Disk> {
        self.disks.iter().find(|d| {
            d.partitions
                .iter()
                .any(|p| p.role == PartitionRole::System)
        })
    }
}
