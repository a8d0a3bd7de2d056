//! Host platforms the native runtime ships for.

/// A supported OS/CPU pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    DarwinArm64,
    DarwinX64,
    LinuxArm64,
    LinuxX64,
    WinX64,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::DarwinArm64,
        Platform::DarwinX64,
        Platform::LinuxArm64,
        Platform::LinuxX64,
        Platform::WinX64,
    ];

    /// The platform this process runs on, if supported.
    pub fn detect() -> Option<Self> {
        Self::from_os_arch(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map Rust's `target_os`/`target_arch` names to a platform.
    pub fn from_os_arch(os: &str, arch: &str) -> Option<Self> {
        match (os, arch) {
            ("macos", "aarch64") => Some(Platform::DarwinArm64),
            ("macos", "x86_64") => Some(Platform::DarwinX64),
            ("linux", "aarch64") => Some(Platform::LinuxArm64),
            ("linux", "x86_64") => Some(Platform::LinuxX64),
            ("windows", "x86_64") => Some(Platform::WinX64),
            _ => None,
        }
    }

    /// Short key used in diagnostics, e.g. `linux-x64`.
    pub fn key(self) -> &'static str {
        match self {
            Platform::DarwinArm64 => "darwin-arm64",
            Platform::DarwinX64 => "darwin-x64",
            Platform::LinuxArm64 => "linux-arm64",
            Platform::LinuxX64 => "linux-x64",
            Platform::WinX64 => "win32-x64",
        }
    }

    /// Name of the ONNX Runtime release package for this platform. Unpacked
    /// releases may carry a version suffix (`onnxruntime-linux-x64-1.22.0`).
    pub fn package(self) -> &'static str {
        match self {
            Platform::DarwinArm64 => "onnxruntime-osx-arm64",
            Platform::DarwinX64 => "onnxruntime-osx-x86_64",
            Platform::LinuxArm64 => "onnxruntime-linux-aarch64",
            Platform::LinuxX64 => "onnxruntime-linux-x64",
            Platform::WinX64 => "onnxruntime-win-x64",
        }
    }

    /// File name of the shared library inside the package's `lib/` directory.
    pub fn library_name(self) -> &'static str {
        match self {
            Platform::DarwinArm64 | Platform::DarwinX64 => "libonnxruntime.dylib",
            Platform::LinuxArm64 | Platform::LinuxX64 => "libonnxruntime.so",
            Platform::WinX64 => "onnxruntime.dll",
        }
    }

    /// Environment variable the dynamic loader searches for dependencies.
    pub fn library_path_var(self) -> &'static str {
        match self {
            Platform::DarwinArm64 | Platform::DarwinX64 => "DYLD_LIBRARY_PATH",
            Platform::LinuxArm64 | Platform::LinuxX64 => "LD_LIBRARY_PATH",
            Platform::WinX64 => "PATH",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_supported_os_arch_pairs() {
        assert_eq!(Platform::from_os_arch("macos", "aarch64"), Some(Platform::DarwinArm64));
        assert_eq!(Platform::from_os_arch("macos", "x86_64"), Some(Platform::DarwinX64));
        assert_eq!(Platform::from_os_arch("linux", "aarch64"), Some(Platform::LinuxArm64));
        assert_eq!(Platform::from_os_arch("linux", "x86_64"), Some(Platform::LinuxX64));
        assert_eq!(Platform::from_os_arch("windows", "x86_64"), Some(Platform::WinX64));
    }

    #[test]
    fn rejects_unsupported_pairs() {
        assert_eq!(Platform::from_os_arch("windows", "aarch64"), None);
        assert_eq!(Platform::from_os_arch("freebsd", "x86_64"), None);
        assert_eq!(Platform::from_os_arch("linux", "riscv64"), None);
    }

    #[test]
    fn every_platform_has_a_distinct_package() {
        let mut packages: Vec<&str> = Platform::ALL.iter().map(|p| p.package()).collect();
        packages.sort_unstable();
        packages.dedup();
        assert_eq!(packages.len(), Platform::ALL.len());
    }
}
