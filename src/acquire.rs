//! Download and extraction of voice assets.
//!
//! Acquisition only runs when [`assets::resolve`] reports a voice as not
//! ready. Archived models are unpacked into a scratch directory inside the
//! voice directory and the files the architecture needs are moved into the
//! canonical layout. Everything is written under a `.part` name first and
//! renamed into place, so a failed attempt never clobbers a good file.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use walkdir::WalkDir;

use crate::assets::{self, AssetKind, ResolvedPaths, SHARED_VOCODER_URL};
use crate::catalog::ModelDescriptor;

const SCRATCH_DIR: &str = ".acquire";
const SHARED_VOCODER_LOCK: &str = "\0shared-vocoder";

#[derive(thiserror::Error, Debug)]
pub enum AcquisitionError {
    #[error("Download of {url} failed: {cause}")]
    Download { url: String, cause: String },
    #[error("Failed to extract {}: {cause}", .archive.display())]
    Extract { archive: PathBuf, cause: String },
    #[error("Unsupported archive format for {0} (expected .tar.bz2, .tar.gz, .tgz, .tar or .zip)")]
    UnsupportedArchive(String),
    #[error("Model '{id}' is still incomplete after acquisition; missing: {missing}")]
    Incomplete { id: String, missing: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport used to fetch model files.
pub trait Downloader: Send + Sync {
    /// Fetch `url` into the file at `dest`, returning the number of bytes written.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, AcquisitionError>;
}

/// Blocking HTTP(S) downloader.
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(30))
                .build(),
        }
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, AcquisitionError> {
        let resp = self
            .agent
            .get(url)
            .call()
            .map_err(|e| AcquisitionError::Download {
                url: url.to_string(),
                cause: e.to_string(),
            })?;

        let total_bytes = resp
            .header("content-length")
            .and_then(|v| v.parse::<u64>().ok());
        log::info!(
            "Downloading {url} ({})",
            total_bytes
                .map(|n| format!("{:.1} MB", n as f64 / 1_048_576.0))
                .unwrap_or_else(|| "unknown size".to_string())
        );

        let mut file = File::create(dest)?;
        let mut reader = resp.into_reader();
        let written = std::io::copy(&mut reader, &mut file).map_err(|e| {
            AcquisitionError::Download {
                url: url.to_string(),
                cause: format!("read error: {e}"),
            }
        })?;
        file.sync_all()?;
        Ok(written)
    }
}

/// Archive containers the published model bundles come in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarBz2,
    TarGz,
    Tar,
    Zip,
}

impl ArchiveFormat {
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        if path.ends_with(".tar.bz2") || path.ends_with(".tbz2") {
            Some(ArchiveFormat::TarBz2)
        } else if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if path.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else if path.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else {
            None
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::TarBz2 => "tar.bz2",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Zip => "zip",
        }
    }
}

/// Brings voice directories to the ready state.
///
/// Concurrent calls for the same model id are serialized; the second caller
/// re-checks readiness after taking the lock and usually finds nothing to do.
pub struct AcquisitionManager {
    downloader: Arc<dyn Downloader>,
    vocoder_url: String,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for AcquisitionManager {
    fn default() -> Self {
        Self::new(Arc::new(HttpDownloader::default()))
    }
}

impl AcquisitionManager {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self {
            downloader,
            vocoder_url: SHARED_VOCODER_URL.to_string(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override where the shared two-stage vocoder is fetched from.
    pub fn with_vocoder_url(mut self, url: impl Into<String>) -> Self {
        self.vocoder_url = url.into();
        self
    }

    /// Make sure every asset of `descriptor` is present under `base_dir`.
    ///
    /// Returns immediately without touching the network when the voice
    /// directory is already complete.
    pub fn ensure_ready(
        &self,
        base_dir: &Path,
        descriptor: &ModelDescriptor,
    ) -> Result<ResolvedPaths, AcquisitionError> {
        let resolved = assets::resolve(base_dir, descriptor);
        if resolved.is_ready {
            log::debug!("Model '{}' already present", descriptor.id);
            return Ok(resolved);
        }

        let lock = self.lock_for(&descriptor.id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let resolved = assets::resolve(base_dir, descriptor);
        if resolved.is_ready {
            return Ok(resolved);
        }

        log::info!(
            "Acquiring model '{}', missing: {}",
            descriptor.id,
            resolved.missing_names().join(", ")
        );

        let voice_missing: Vec<AssetKind> = resolved
            .missing
            .iter()
            .copied()
            .filter(|k| !k.is_shared())
            .collect();

        if !voice_missing.is_empty() {
            std::fs::create_dir_all(&resolved.voice_dir)?;
            if descriptor.compressed {
                self.acquire_archive(&resolved.voice_dir, descriptor, &voice_missing)?;
            } else {
                self.acquire_files(&resolved.voice_dir, descriptor, &voice_missing)?;
            }
        }

        if resolved.missing.contains(&AssetKind::Vocoder) {
            self.ensure_shared_vocoder(base_dir)?;
        }

        let resolved = assets::resolve(base_dir, descriptor);
        if !resolved.is_ready {
            return Err(AcquisitionError::Incomplete {
                id: descriptor.id.clone(),
                missing: resolved.missing_names().join(", "),
            });
        }
        log::info!("Model '{}' is ready at {}", descriptor.id, resolved.voice_dir.display());
        Ok(resolved)
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Download the bundle, unpack it and move the wanted entries into place.
    fn acquire_archive(
        &self,
        voice_dir: &Path,
        descriptor: &ModelDescriptor,
        wanted: &[AssetKind],
    ) -> Result<(), AcquisitionError> {
        let format = ArchiveFormat::from_url(&descriptor.url)
            .ok_or_else(|| AcquisitionError::UnsupportedArchive(descriptor.url.clone()))?;

        let scratch = voice_dir.join(SCRATCH_DIR);
        if scratch.exists() {
            std::fs::remove_dir_all(&scratch)?;
        }
        std::fs::create_dir_all(&scratch)?;

        let result = (|| -> Result<(), AcquisitionError> {
            let archive = scratch.join(format!("bundle.{}", format.extension()));
            self.download(&descriptor.url, &archive)?;

            let extracted = scratch.join("extracted");
            std::fs::create_dir_all(&extracted)?;
            log::info!("Extracting {}", archive.display());
            extract(&archive, format, &extracted)?;

            let found = locate_assets(&extracted, wanted);
            for &kind in wanted {
                match found.get(&kind) {
                    Some(src) => {
                        let dest = voice_dir.join(kind.file_name());
                        if kind.is_dir() {
                            install_dir(src, &dest)?;
                        } else {
                            install_file(src, &dest)?;
                        }
                    }
                    None => log::warn!(
                        "Archive for '{}' has no {}",
                        descriptor.id,
                        kind.file_name()
                    ),
                }
            }
            Ok(())
        })();

        if let Err(e) = std::fs::remove_dir_all(&scratch) {
            log::debug!("Could not remove {}: {e}", scratch.display());
        }
        result
    }

    /// Fetch each missing file from `<url>/<canonical name>`.
    fn acquire_files(
        &self,
        voice_dir: &Path,
        descriptor: &ModelDescriptor,
        wanted: &[AssetKind],
    ) -> Result<(), AcquisitionError> {
        let base_url = descriptor.url.trim_end_matches('/');
        for &kind in wanted {
            if kind.is_dir() {
                log::warn!(
                    "'{}' needs the {} directory, which cannot be fetched file by file",
                    descriptor.id,
                    kind.file_name()
                );
                continue;
            }
            let url = format!("{base_url}/{}", kind.file_name());
            self.download(&url, &voice_dir.join(kind.file_name()))?;
        }
        Ok(())
    }

    fn ensure_shared_vocoder(&self, base_dir: &Path) -> Result<(), AcquisitionError> {
        let lock = self.lock_for(SHARED_VOCODER_LOCK);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let dest = base_dir.join(AssetKind::Vocoder.file_name());
        if assets::is_present(&dest, false) {
            return Ok(());
        }
        std::fs::create_dir_all(base_dir)?;
        log::info!("Fetching shared vocoder into {}", dest.display());
        self.download(&self.vocoder_url, &dest)
    }

    /// Download to `<dest>.part`, then rename over `dest`.
    fn download(&self, url: &str, dest: &Path) -> Result<(), AcquisitionError> {
        let partial = partial_path(dest);
        let outcome = self.downloader.fetch(url, &partial).and_then(|written| {
            if written == 0 {
                return Err(AcquisitionError::Download {
                    url: url.to_string(),
                    cause: "empty response body".to_string(),
                });
            }
            std::fs::rename(&partial, dest)?;
            Ok(())
        });
        if outcome.is_err() && partial.exists() {
            let _ = std::fs::remove_file(&partial);
        }
        outcome
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!("{name}.part"))
}

/// Unpack `archive` into `dest`.
pub fn extract(archive: &Path, format: ArchiveFormat, dest: &Path) -> Result<(), AcquisitionError> {
    let file = File::open(archive)?;
    let to_extract_err = |cause: String| AcquisitionError::Extract {
        archive: archive.to_path_buf(),
        cause,
    };

    match format {
        ArchiveFormat::TarBz2 => tar::Archive::new(bzip2::read::BzDecoder::new(file))
            .unpack(dest)
            .map_err(|e| to_extract_err(e.to_string())),
        ArchiveFormat::TarGz => tar::Archive::new(flate2::read::GzDecoder::new(file))
            .unpack(dest)
            .map_err(|e| to_extract_err(e.to_string())),
        ArchiveFormat::Tar => tar::Archive::new(file)
            .unpack(dest)
            .map_err(|e| to_extract_err(e.to_string())),
        ArchiveFormat::Zip => {
            let mut zip =
                zip::ZipArchive::new(file).map_err(|e| to_extract_err(e.to_string()))?;
            zip.extract(dest).map_err(|e| to_extract_err(e.to_string()))
        }
    }
}

/// Match extracted entries to asset kinds by name.
///
/// Models are picked by the `.onnx` extension (the largest wins when there
/// are several, skipping vocoders), tokens, lexicon and voice packs by
/// name (`voices.bin` or a `voices*.npz` archive), and the phoneme-data and dictionary trees by directory name.
/// Nothing inside an already matched directory is considered.
pub fn locate_assets(root: &Path, wanted: &[AssetKind]) -> BTreeMap<AssetKind, PathBuf> {
    let mut found: BTreeMap<AssetKind, PathBuf> = BTreeMap::new();
    let mut model_size = 0u64;

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if found
            .iter()
            .any(|(kind, dir)| kind.is_dir() && path.starts_with(dir))
        {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();

        let kind = if entry.file_type().is_dir() {
            match name.as_str() {
                assets::PHONEME_DATA_DIR => Some(AssetKind::PhonemeData),
                assets::DICT_DIR => Some(AssetKind::Dict),
                _ => None,
            }
        } else if name.ends_with(".onnx") {
            if name.contains("vocoder") || name.contains("hifigan") || name.contains("vocos") {
                None
            } else {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                if found.contains_key(&AssetKind::Model) && size <= model_size {
                    None
                } else {
                    model_size = size;
                    found.remove(&AssetKind::Model);
                    Some(AssetKind::Model)
                }
            }
        } else if name.ends_with("tokens.txt") {
            Some(AssetKind::Tokens)
        } else if name == assets::LEXICON_FILE
            || (name.ends_with("lexicon.txt") && !found.contains_key(&AssetKind::Lexicon))
        {
            found.remove(&AssetKind::Lexicon);
            Some(AssetKind::Lexicon)
        } else if name.ends_with("voices.bin")
            || (name.starts_with("voices") && name.ends_with(".npz"))
        {
            Some(AssetKind::VoiceEmbeddings)
        } else {
            None
        };

        if let Some(kind) = kind {
            if wanted.contains(&kind) {
                found.entry(kind).or_insert_with(|| path.to_path_buf());
            }
        }
    }

    found
}

/// Copy a file into place unless a usable copy is already there.
fn install_file(src: &Path, dest: &Path) -> Result<(), AcquisitionError> {
    if assets::is_present(dest, false) {
        return Ok(());
    }
    let partial = partial_path(dest);
    std::fs::copy(src, &partial)?;
    std::fs::rename(&partial, dest)?;
    Ok(())
}

/// Recursively copy a directory into place unless a non-empty one exists.
fn install_dir(src: &Path, dest: &Path) -> Result<(), AcquisitionError> {
    if assets::is_present(dest, true) {
        return Ok(());
    }
    let partial = partial_path(dest);
    if partial.exists() {
        std::fs::remove_dir_all(&partial)?;
    }
    copy_dir_all(src, &partial)?;
    if dest.exists() {
        // Only an empty directory can reach this point.
        std::fs::remove_dir_all(dest)?;
    }
    std::fs::rename(&partial, dest)?;
    Ok(())
}

fn copy_dir_all(src: &Path, dest: &Path) -> Result<(), AcquisitionError> {
    for entry in WalkDir::new(src).into_iter() {
        let entry = entry.map_err(|e| AcquisitionError::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| AcquisitionError::Io(std::io::Error::other(e)))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
