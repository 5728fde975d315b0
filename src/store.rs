//! Flat, filesystem-backed artifact store.
//!
//! Every file lives directly under the root and is named
//! `<kind prefix><key>[_n][_suffix]`, where the key is a UNIX timestamp in seconds.

use crate::error::{PipelineError, Result};
use regex::Regex;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Synthesized narration
    Output,
    /// Pre-tempo-adjustment narration
    Temp,
    /// Uploaded background
    Background,
    Video,
    /// Normalized narration used for composition
    Converted,
    Captions,
}

impl ArtifactKind {
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Output => "output_",
            Self::Temp => "temp_",
            Self::Background => "bg_",
            Self::Video => "video_",
            Self::Converted => "converted_",
            Self::Captions => "captions_",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open the store, creating the root directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserve a request key by creating an empty `kind` artifact for it.
    /// The caller owns that file and removes it if the request fails.
    pub fn new_key(&self, kind: ArtifactKind, extension: &str) -> Result<String> {
        let base = chrono::Utc::now().timestamp().to_string();
        let mut key = base.clone();
        let mut n = 1;
        while !claim(&self.path_for(kind, &key, extension))? {
            key = format!("{base}_{n}");
            n += 1;
        }
        debug!("Reserved key {} for {}", key, kind.prefix());
        Ok(key)
    }

    #[must_use]
    pub fn file_name(kind: ArtifactKind, key: &str, extension: &str) -> String {
        format!("{}{key}.{extension}", kind.prefix())
    }

    #[must_use]
    pub fn path_for(&self, kind: ArtifactKind, key: &str, extension: &str) -> PathBuf {
        self.root.join(Self::file_name(kind, key, extension))
    }

    /// Path for an uploaded background, keeping a sanitized form of its name.
    #[must_use]
    pub fn background_path(&self, key: &str, original_name: &str) -> PathBuf {
        self.root.join(format!(
            "{}{key}_{}",
            ArtifactKind::Background.prefix(),
            sanitize_filename(original_name)
        ))
    }

    /// Map a client-supplied file name to a path inside the store.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name == "."
            || name.contains("..")
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(PipelineError::InvalidInput(format!(
                "invalid artifact name: {name}"
            )));
        }
        Ok(self.root.join(name))
    }

    /// Resolve a name that must refer to an existing artifact.
    pub fn existing(&self, name: &str) -> Result<PathBuf> {
        let path = self.resolve(name)?;
        if !path.is_file() {
            return Err(PipelineError::InvalidInput(format!(
                "artifact not found: {name}"
            )));
        }
        Ok(path)
    }

    /// Copy an uploaded background into the store under a fresh key.
    pub fn ingest_background(&self, source: &Path) -> Result<PathBuf> {
        let original = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let base = chrono::Utc::now().timestamp().to_string();
        let mut path = self.background_path(&base, &original);
        let mut n = 1;
        while !claim(&path)? {
            path = self.background_path(&format!("{base}_{n}"), &original);
            n += 1;
        }
        std::fs::copy(source, &path).map_err(|e| {
            self.remove_quietly(&path);
            PipelineError::InvalidInput(format!(
                "cannot read background {}: {e}",
                source.display()
            ))
        })?;
        debug!("Stored background as {}", path.display());
        Ok(path)
    }

    /// Copy a stored artifact out to `dest`, returning the bytes copied.
    pub fn copy_out(&self, name: &str, dest: &Path) -> Result<u64> {
        let path = self.existing(name)?;
        Ok(std::fs::copy(path, dest)?)
    }

    /// Best-effort delete used on cleanup paths.
    pub fn remove_quietly(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed intermediate {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

/// Create an empty file at `path` unless one exists. `false` means taken.
fn claim(path: &Path) -> std::io::Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// Whether a tool actually wrote `path`, as opposed to it being a bare reservation.
#[must_use]
pub fn is_written(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

/// Public download reference for a stored file.
#[must_use]
pub fn download_ref(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("/download/{name}")
}

/// Reduce an uploaded file name to `[A-Za-z0-9._-]`, never empty or hidden.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));

    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = re.replace_all(base.trim(), "_");
    let cleaned = cleaned.trim_start_matches(['.', '_']);
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
