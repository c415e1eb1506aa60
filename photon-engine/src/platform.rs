//! Host platform detection for engine binary names.
//!
//! Engine binaries are published per platform. Statically linked builds are
//! named `linux-static-<arch>`, dynamically linked ones carry the distribution
//! family and OpenSSL line, e.g. `debian-openssl-3.0.x`.

use std::process::Command;
use std::sync::OnceLock;

use tracing::{debug, warn};

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    /// Linux.
    Linux,
    /// macOS.
    Darwin,
    /// Windows.
    Windows,
}

impl Os {
    /// Detect the current operating system.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Self::Darwin,
            "windows" => Self::Windows,
            _ => Self::Linux,
        }
    }

    /// Name used in binary file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }
}

/// CPU architecture, as spelled in binary names.
pub fn arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => {
            warn!(arch = other, "unsupported architecture, falling back to x64");
            "x64"
        }
    }
}

/// Everything needed to name an engine binary for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// Architecture (`x64` or `arm64`).
    pub arch: &'static str,
    /// Distribution family and OpenSSL line on Linux, e.g. `debian-openssl-3.0.x`.
    pub linux_variant: Option<String>,
}

static CURRENT: OnceLock<Platform> = OnceLock::new();

impl Platform {
    /// Detect the host platform. Probing runs once per process.
    pub fn current() -> &'static Platform {
        CURRENT.get_or_init(|| {
            let os = Os::current();
            let linux_variant = (os == Os::Linux).then(|| {
                let distro = std::fs::read_to_string("/etc/os-release")
                    .map(|s| parse_linux_distro(&s))
                    .unwrap_or("debian");
                let ssl = Command::new("openssl")
                    .args(["version", "-v"])
                    .output()
                    .map(|out| parse_openssl_version(&String::from_utf8_lossy(&out.stdout)))
                    .unwrap_or_else(|_| "3.0.x".to_string());
                format!("{}-openssl-{}", distro, ssl)
            });
            let platform = Platform { os, arch: arch(), linux_variant };
            debug!(?platform, "detected platform");
            platform
        })
    }

    /// Name of the statically linked build, e.g. `linux-static-x64` or `darwin-arm64`.
    pub fn static_name(&self) -> String {
        match self.os {
            Os::Linux => format!("linux-static-{}", self.arch),
            Os::Darwin if self.arch == "arm64" => "darwin-arm64".to_string(),
            other => other.as_str().to_string(),
        }
    }

    /// Name of the build matching this exact host, e.g. `debian-openssl-3.0.x`.
    pub fn exact_name(&self) -> String {
        match (&self.os, &self.linux_variant) {
            (Os::Linux, Some(variant)) => variant.clone(),
            _ => self.static_name(),
        }
    }

    /// Append the executable extension where the host needs one.
    pub fn with_extension(&self, file: String) -> String {
        if self.os == Os::Windows {
            format!("{}.exe", file)
        } else {
            file
        }
    }
}

fn os_release_value<'a>(contents: &'a str, key: &str) -> Option<&'a str> {
    contents.lines().find_map(|line| {
        line.strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
            .map(|v| v.trim().trim_matches('"'))
    })
}

/// Map `/etc/os-release` contents to a distribution family.
pub fn parse_linux_distro(contents: &str) -> &'static str {
    let id = os_release_value(contents, "ID").unwrap_or_default();
    let id_like = os_release_value(contents, "ID_LIKE").unwrap_or_default();

    if id == "alpine" {
        return "alpine";
    }
    if ["centos", "fedora", "rhel"].iter().any(|d| id_like.contains(d)) || id == "fedora" {
        return "rhel";
    }
    "debian"
}

/// Reduce `openssl version` output to the published line: `1.1.x`, `3.0.x`.
pub fn parse_openssl_version(output: &str) -> String {
    let version = output
        .strip_prefix("OpenSSL")
        .map(str::trim_start)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_default();
    let mut parts = version.split('.');
    match (parts.next(), parts.next()) {
        (Some("1"), Some(minor)) if !minor.is_empty() => format!("1.{}.x", minor),
        (Some(major), Some(_)) if major.chars().all(|c| c.is_ascii_digit()) && !major.is_empty() => {
            format!("{}.0.x", major)
        }
        _ => "3.0.x".to_string(),
    }
}
