//! OS and CPU classification into the closed set of published scanner builds.
//!
//! Both classifiers are pure functions of their input strings. The asset names
//! follow Go's `GOOS`/`GOARCH` spelling used by the release archives.
use crate::error::{Result, StepError};
use std::fmt;

/// Architecture substrings that have no published build. Matching any of them
/// is an error instead of falling through to the 32-bit default. Covers both
/// the JVM/uname spellings (`ppc64le`) and Rust's `std::env::consts::ARCH`
/// spellings (`powerpc64`, `loongarch64`).
const UNSUPPORTED_ARCH_TOKENS: [&str; 14] = [
    "mips", "ppc", "powerpc", "risc", "sparc", "wasm", "s390", "loongarch", "csky", "m68k",
    "bpf", "nvptx", "hexagon", "xtensa",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Platform segment of a release asset name.
    pub fn asset_name(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "linux",
        }
    }

    /// File name suffix of executables on this platform.
    pub fn executable_suffix(self) -> &'static str {
        match self {
            Platform::Windows => ".exe",
            Platform::MacOs | Platform::Linux => "",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.asset_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86,
    Amd64,
    Arm64,
    Arm,
}

impl Architecture {
    /// Architecture segment of a release asset name.
    pub fn asset_name(self) -> &'static str {
        match self {
            Architecture::X86 => "386",
            Architecture::Amd64 => "amd64",
            Architecture::Arm64 => "arm64",
            Architecture::Arm => "armv6",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.asset_name())
    }
}

pub fn classify_os(raw: &str) -> Result<Platform> {
    if raw.trim().is_empty() {
        return Err(StepError::UnsupportedPlatform(
            "operating system name is empty".to_string(),
        ));
    }
    let value = raw.to_lowercase();
    // "darwin" contains "win", so macOS is matched first.
    if value.contains("mac") || value.contains("darwin") {
        Ok(Platform::MacOs)
    } else if value.contains("win") {
        Ok(Platform::Windows)
    } else if value.contains("nux") {
        Ok(Platform::Linux)
    } else {
        Err(StepError::UnsupportedPlatform(raw.to_string()))
    }
}

pub fn classify_arch(raw: &str) -> Result<Architecture> {
    if raw.trim().is_empty() {
        return Err(StepError::UnsupportedArchitecture(
            "architecture name is empty".to_string(),
        ));
    }
    let value = raw.to_lowercase();
    if UNSUPPORTED_ARCH_TOKENS
        .iter()
        .any(|token| value.contains(token))
    {
        return Err(StepError::UnsupportedArchitecture(raw.to_string()));
    }
    let result = if value.contains("64") {
        if value.contains("arm") || value.contains("aarch") {
            Architecture::Arm64
        } else {
            Architecture::Amd64
        }
    } else if value.contains("arm") {
        Architecture::Arm
    } else {
        Architecture::X86
    };
    Ok(result)
}

/// Classify the OS this process runs on.
pub fn current_platform() -> Result<Platform> {
    classify_os(std::env::consts::OS)
}

/// Classify the CPU this process runs on.
pub fn current_architecture() -> Result<Architecture> {
    classify_arch(std::env::consts::ARCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_os_names_case_insensitively() {
        assert_eq!(classify_os("Windows 10").unwrap(), Platform::Windows);
        assert_eq!(classify_os("windows").unwrap(), Platform::Windows);
        assert_eq!(classify_os("Linux").unwrap(), Platform::Linux);
        assert_eq!(classify_os("Mac OS X").unwrap(), Platform::MacOs);
        assert_eq!(classify_os("DARWIN").unwrap(), Platform::MacOs);
        assert_eq!(classify_os("macos").unwrap(), Platform::MacOs);
        assert_eq!(classify_os("darwin").unwrap(), Platform::MacOs);
        assert_eq!(classify_os("Darwin 23.1.0").unwrap(), Platform::MacOs);
    }

    #[test]
    fn rejects_unmapped_or_empty_os_names() {
        for raw in ["", "   ", "freebsd", "SunOS", "plan9"] {
            assert!(
                matches!(classify_os(raw), Err(StepError::UnsupportedPlatform(_))),
                "expected {raw:?} to be rejected"
            );
        }
    }

    #[test]
    fn classifies_64_bit_architectures() {
        assert_eq!(classify_arch("amd64").unwrap(), Architecture::Amd64);
        assert_eq!(classify_arch("x86_64").unwrap(), Architecture::Amd64);
        assert_eq!(classify_arch("aarch64").unwrap(), Architecture::Arm64);
        assert_eq!(classify_arch("ARM64").unwrap(), Architecture::Arm64);
    }

    #[test]
    fn classifies_32_bit_architectures() {
        assert_eq!(classify_arch("arm").unwrap(), Architecture::Arm);
        assert_eq!(classify_arch("armv7l").unwrap(), Architecture::Arm);
        assert_eq!(classify_arch("x86").unwrap(), Architecture::X86);
        assert_eq!(classify_arch("i686").unwrap(), Architecture::X86);
    }

    #[test]
    fn deny_list_wins_over_other_tokens() {
        for raw in ["mips64", "ppc64le", "riscv64", "sparc64", "wasm32", "s390x", "MIPS"] {
            assert!(
                matches!(
                    classify_arch(raw),
                    Err(StepError::UnsupportedArchitecture(_))
                ),
                "expected {raw:?} to be rejected"
            );
        }
        assert!(classify_arch("").is_err());
    }

    #[test]
    fn rust_arch_constants_without_builds_are_rejected() {
        for raw in [
            "powerpc",
            "powerpc64",
            "loongarch64",
            "riscv64",
            "s390x",
            "sparc64",
            "mips64",
            "csky",
            "m68k",
            "bpf",
            "nvptx64",
            "hexagon",
            "xtensa",
            "wasm32",
        ] {
            assert!(
                matches!(
                    classify_arch(raw),
                    Err(StepError::UnsupportedArchitecture(_))
                ),
                "expected {raw:?} to be rejected"
            );
        }
        for (raw, expected) in [
            ("x86", Architecture::X86),
            ("x86_64", Architecture::Amd64),
            ("arm", Architecture::Arm),
            ("aarch64", Architecture::Arm64),
        ] {
            assert_eq!(classify_arch(raw).unwrap(), expected, "for {raw:?}");
        }
    }

    #[test]
    fn asset_names_follow_release_convention() {
        assert_eq!(Platform::MacOs.asset_name(), "macOS");
        assert_eq!(Architecture::X86.asset_name(), "386");
        assert_eq!(Architecture::Arm.asset_name(), "armv6");
        assert_eq!(Platform::Windows.executable_suffix(), ".exe");
        assert_eq!(Platform::Linux.executable_suffix(), "");
    }

    #[test]
    fn current_host_is_classifiable() {
        assert!(current_platform().is_ok());
    }
}
