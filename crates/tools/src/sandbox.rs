//! Sandbox policies: filesystem allowlist, domain allowlist, resource
//! limits, bundled into one [`SandboxManager`].

use std::path::{Path, PathBuf};

use agentsdk_domain::error::{Error, Result};

/// Accepts a path iff its cleaned absolute form lies under one of the
/// allowed roots. `..` components that would escape a root are rejected.
pub struct FilesystemAllowList {
    roots: Vec<PathBuf>,
}

impl FilesystemAllowList {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots: roots.into_iter().map(clean_path).collect() }
    }

    pub fn check_path(&self, path: &Path) -> Result<()> {
        let candidate = clean_path(path.to_path_buf());
        if self.roots.iter().any(|root| candidate.starts_with(root)) {
            Ok(())
        } else {
            Err(Error::Validation(format!("path `{}` is outside the allowed roots", path.display())))
        }
    }
}

/// Lexically normalizes `.` and `..` components without touching the
/// filesystem (no symlink resolution) so a non-existent path can still be
/// checked. A leading `..` that would escape the root collapses to `/`,
/// which then fails every real allowed root's `starts_with` check.
fn clean_path(path: PathBuf) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Accepts exact hostnames and leading-`*.` wildcard patterns matching any
/// subdomain.
pub struct DomainAllowList {
    patterns: Vec<String>,
}

impl DomainAllowList {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    pub fn check_network(&self, host: &str) -> Result<()> {
        let host = host.trim_end_matches('.');
        let allowed = self.patterns.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix("*.") {
                host == suffix || host.ends_with(&format!(".{suffix}"))
            } else {
                host == pattern
            }
        });
        if allowed {
            Ok(())
        } else {
            Err(Error::Validation(format!("host `{host}` is not in the domain allowlist")))
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
}

pub struct ResourceLimiter {
    pub max_cpu_percent: f64,
    pub max_memory_bytes: u64,
    pub max_disk_bytes: u64,
}

impl ResourceLimiter {
    pub fn enforce(&self, usage: ResourceUsage) -> Result<()> {
        if usage.cpu_percent > self.max_cpu_percent {
            return Err(Error::ResourceExceeded(format!(
                "cpu usage {:.1}% exceeds limit {:.1}%",
                usage.cpu_percent, self.max_cpu_percent
            )));
        }
        if usage.memory_bytes > self.max_memory_bytes {
            return Err(Error::ResourceExceeded(format!(
                "memory usage {} exceeds limit {}",
                usage.memory_bytes, self.max_memory_bytes
            )));
        }
        if usage.disk_bytes > self.max_disk_bytes {
            return Err(Error::ResourceExceeded(format!(
                "disk usage {} exceeds limit {}",
                usage.disk_bytes, self.max_disk_bytes
            )));
        }
        Ok(())
    }
}

/// Bundles the three policies. `enforce` checks path, host, and usage
/// together; any single violation fails the whole call.
pub struct SandboxManager {
    pub filesystem: FilesystemAllowList,
    pub domains: DomainAllowList,
    pub limits: ResourceLimiter,
}

impl SandboxManager {
    pub fn enforce(&self, path: Option<&Path>, host: Option<&str>, usage: ResourceUsage) -> Result<()> {
        if let Some(path) = path {
            self.filesystem.check_path(path)?;
        }
        if let Some(host) = host {
            self.domains.check_network(host)?;
        }
        self.limits.enforce(usage)
    }
}
