//! Native inference runtime discovery and loading.
//!
//! The ONNX Runtime shared library is not linked at build time. It is looked
//! up at run time in a runtime directory holding the unpacked release package
//! for the host platform:
//!
//! ```text
//! <runtime dir>/
//! └── onnxruntime-linux-x64-1.22.0/
//!     └── lib/libonnxruntime.so
//! ```
//!
//! `ORT_DYLIB_PATH`, when set, names the library file directly and skips the
//! package lookup.
//!
//! Problems are reported as an [`EnvironmentCheck`] rather than a panic from
//! the native loader, so callers can fall back to degraded synthesis.

pub mod platform;

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

pub use platform::Platform;

pub const RUNTIME_DIR_ENV: &str = "OFFLINE_TTS_RUNTIME_DIR";
pub const DYLIB_PATH_ENV: &str = "ORT_DYLIB_PATH";

const INSTALL_HINT: &str = "https://github.com/microsoft/onnxruntime/releases";

/// Result of probing the host for the native runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentCheck {
    pub can_run: bool,
    /// The runtime directory (or `ORT_DYLIB_PATH` file) exists.
    pub has_main_package: bool,
    /// A release package for this platform was found.
    pub has_platform_package: bool,
    /// The shared library is inside that package.
    pub has_native_module: bool,
    pub platform_key: String,
    pub expected_package: Option<String>,
    pub issues: Vec<String>,
    /// Shared library that would be loaded when `can_run` is true.
    pub library_path: Option<PathBuf>,
}

/// Opaque proof that the runtime is loaded in this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHandle {
    platform: Platform,
    library_path: PathBuf,
}

impl BackendHandle {
    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn library_path(&self) -> &Path {
        &self.library_path
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum LoadError {
    #[error("Native backend unavailable: {}", .check.issues.join("; "))]
    Unavailable { check: EnvironmentCheck },
    #[error("Native backend failed to initialize from {}: {cause}", .path.display())]
    Init {
        path: PathBuf,
        cause: String,
        check: EnvironmentCheck,
    },
}

impl LoadError {
    pub fn check(&self) -> &EnvironmentCheck {
        match self {
            LoadError::Unavailable { check } | LoadError::Init { check, .. } => check,
        }
    }
}

/// Locates and loads the runtime once, then hands out the cached outcome.
///
/// Construct one per process (see [`NativeBackend::shared`]) and pass it to
/// the controllers that need it. Separate instances are useful in tests; they
/// never share a memoized result.
#[derive(Debug)]
pub struct NativeBackend {
    platform: Option<Platform>,
    runtime_dir: PathBuf,
    dylib_override: Option<PathBuf>,
    loaded: OnceLock<Result<BackendHandle, LoadError>>,
}

impl NativeBackend {
    /// Look for the runtime package under `runtime_dir`.
    pub fn new(runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            platform: Platform::detect(),
            runtime_dir: runtime_dir.into(),
            dylib_override: None,
            loaded: OnceLock::new(),
        }
    }

    /// Load this exact library file instead of searching for a package.
    pub fn with_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.dylib_override = Some(path.into());
        self
    }

    /// Pretend to run on `platform`. Probing only; loading a foreign
    /// platform's library will fail.
    pub fn with_platform(mut self, platform: Option<Platform>) -> Self {
        self.platform = platform;
        self
    }

    /// Configure from `OFFLINE_TTS_RUNTIME_DIR` and `ORT_DYLIB_PATH`.
    pub fn from_env() -> Self {
        let runtime_dir = std::env::var_os(RUNTIME_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_runtime_dir);
        let backend = Self::new(runtime_dir);
        match std::env::var_os(DYLIB_PATH_ENV) {
            Some(path) if !path.is_empty() => backend.with_library(path),
            _ => backend,
        }
    }

    /// The process-wide instance, configured from the environment on first use.
    pub fn shared() -> Arc<NativeBackend> {
        static SHARED: OnceLock<Arc<NativeBackend>> = OnceLock::new();
        SHARED
            .get_or_init(|| Arc::new(NativeBackend::from_env()))
            .clone()
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// Inspect the host without loading anything.
    pub fn probe(&self) -> EnvironmentCheck {
        let mut check = EnvironmentCheck {
            can_run: false,
            has_main_package: false,
            has_platform_package: false,
            has_native_module: false,
            platform_key: self
                .platform
                .map(|p| p.key().to_string())
                .unwrap_or_else(|| {
                    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
                }),
            expected_package: self.platform.map(|p| p.package().to_string()),
            issues: Vec::new(),
            library_path: None,
        };

        let Some(platform) = self.platform else {
            let supported: Vec<&str> = Platform::ALL.iter().map(|p| p.key()).collect();
            check.issues.push(format!(
                "Unsupported platform {}; supported platforms are {}",
                check.platform_key,
                supported.join(", ")
            ));
            return check;
        };

        if let Some(path) = &self.dylib_override {
            if path.is_file() {
                check.has_main_package = true;
                check.has_platform_package = true;
                check.has_native_module = true;
                check.library_path = Some(path.clone());
            } else {
                check.issues.push(format!(
                    "{DYLIB_PATH_ENV} points to {}, which is not a file",
                    path.display()
                ));
            }
            check.can_run = check.issues.is_empty();
            return check;
        }

        check.has_main_package = self.runtime_dir.is_dir();
        if !check.has_main_package {
            check.issues.push(format!(
                "Runtime directory {} does not exist. Download {} from {INSTALL_HINT} and unpack it there, or set {DYLIB_PATH_ENV}",
                self.runtime_dir.display(),
                platform.package()
            ));
            return check;
        }

        let Some(package_dir) = find_package_dir(&self.runtime_dir, platform.package()) else {
            check.issues.push(format!(
                "No {} package in {}. Download it from {INSTALL_HINT} and unpack it there",
                platform.package(),
                self.runtime_dir.display()
            ));
            return check;
        };
        check.has_platform_package = true;

        let candidates = [
            package_dir.join("lib").join(platform.library_name()),
            package_dir.join(platform.library_name()),
        ];
        match candidates.iter().find(|p| p.is_file()) {
            Some(lib) => {
                check.has_native_module = true;
                check.library_path = Some(lib.clone());
            }
            None => check.issues.push(format!(
                "{} has no {}; the package looks incomplete, reinstall it from {INSTALL_HINT}",
                package_dir.display(),
                platform.library_name()
            )),
        }

        check.can_run = check.has_main_package
            && check.has_platform_package
            && check.has_native_module
            && check.issues.is_empty();
        check
    }

    /// Load the runtime, at most once per instance.
    ///
    /// Fails fast without touching the native loader when the probe says the
    /// runtime cannot run. The outcome, success or failure, is cached.
    pub fn load(&self) -> Result<BackendHandle, LoadError> {
        self.loaded.get_or_init(|| self.load_uncached()).clone()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.loaded.get(), Some(Ok(_)))
    }

    fn load_uncached(&self) -> Result<BackendHandle, LoadError> {
        let check = self.probe();
        let (Some(platform), Some(library_path), true) =
            (self.platform, check.library_path.clone(), check.can_run)
        else {
            for issue in &check.issues {
                log::warn!("Native backend: {issue}");
            }
            return Err(LoadError::Unavailable { check });
        };

        if let Some(dir) = library_path.parent() {
            prepend_library_path(platform.library_path_var(), dir);
        }

        log::info!("Loading ONNX Runtime from {}", library_path.display());
        let builder = ort::init_from(&library_path).map_err(|e| LoadError::Init {
            path: library_path.clone(),
            cause: e.to_string(),
            check: check.clone(),
        })?;
        let _ = builder.with_name("offline-tts").commit();

        Ok(BackendHandle {
            platform,
            library_path,
        })
    }
}

fn default_runtime_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("offline-tts")
        .join("runtime")
}

/// Find `<root>/<package>` or a versioned `<root>/<package>-<version>`.
/// The lexically last match wins, which picks the newest version.
fn find_package_dir(root: &Path, package: &str) -> Option<PathBuf> {
    let versioned = format!("{package}-");
    let mut matches: Vec<PathBuf> = std::fs::read_dir(root)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name == package || name.starts_with(&versioned)
        })
        .map(|e| e.path())
        .collect();
    matches.sort();
    matches.pop()
}

/// Put `dir` first on the loader search path held in `var`.
fn prepend_library_path(var: &str, dir: &Path) {
    let mut paths: Vec<PathBuf> = std::env::var_os(var)
        .map(|v| std::env::split_paths(&v).collect())
        .unwrap_or_default();
    if paths.iter().any(|p| p == dir) {
        return;
    }
    paths.insert(0, dir.to_path_buf());
    match std::env::join_paths(paths) {
        Ok(joined) => {
            log::debug!("Setting {var} to include {}", dir.display());
            std::env::set_var(var, joined);
        }
        Err(e) => log::warn!("Could not extend {var} with {}: {e}", dir.display()),
    }
}
