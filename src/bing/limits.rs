use std::ops::RangeInclusive;

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// Client-side resource limits for a download run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SystemLimits {
    /// Upper bound on pooled connections.
    max_connections: u32,
    /// Upper bound on a single image body, in MB.
    memory_mb: u32,
}

impl SystemLimits {
    pub(crate) const DEFAULT_CONNECTIONS: u32 = 1024;
    pub(crate) const DEFAULT_MEMORY_MB: u32 = 1024;
    pub(crate) const SAFE_MEMORY_MB: u32 = 512;
    pub(crate) const STEP: u32 = 256;
    pub(crate) const CONNECTION_RANGE: RangeInclusive<u32> = 256..=65536;
    pub(crate) const MEMORY_RANGE: RangeInclusive<u32> = 256..=16384;

    pub(crate) fn new(max_connections: u32, memory_mb: u32) -> Self {
        Self { max_connections, memory_mb }
    }

    /// Whether the UI should offer limits on this platform.
    pub(crate) fn platform_supported() -> bool {
        cfg!(target_os = "macos")
    }

    pub(crate) fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub(crate) fn memory_mb(&self) -> u32 {
        self.memory_mb
    }

    /// The memory cap in bytes.
    pub(crate) fn max_body_bytes(&self) -> u64 {
        u64::from(self.memory_mb) * 1024 * 1024
    }

    /// Replaces values the machine can't honor with safe defaults.
    pub(crate) fn resolve(self) -> Self {
        self.resolve_against(total_memory_mb())
    }

    /// Same as [`SystemLimits::resolve`] with the machine's total memory given in MB.
    pub(crate) fn resolve_against(self, total_memory_mb: Option<u64>) -> Self {
        let mut resolved = self;

        if !Self::CONNECTION_RANGE.contains(&resolved.max_connections) {
            warn!(
                "Max connections {} is out of range, using default of {}",
                resolved.max_connections,
                Self::DEFAULT_CONNECTIONS
            );
            resolved.max_connections = Self::DEFAULT_CONNECTIONS;
        }

        let exceeds_machine = total_memory_mb.is_some_and(|total| u64::from(resolved.memory_mb) > total);
        if !Self::MEMORY_RANGE.contains(&resolved.memory_mb) || exceeds_machine {
            warn!(
                "Memory limit {} MB can't be used, using safe default of {} MB",
                resolved.memory_mb,
                Self::SAFE_MEMORY_MB
            );
            resolved.memory_mb = Self::SAFE_MEMORY_MB;
        }

        resolved
    }
}

impl Default for SystemLimits {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CONNECTIONS, Self::DEFAULT_MEMORY_MB)
    }
}

/// Total memory of this machine in MB, if it can be determined.
fn total_memory_mb() -> Option<u64> {
    let mut system = System::new_with_specifics(RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()));
    system.refresh_memory();
    match system.total_memory() {
        0 => None,
        bytes => Some(bytes / 1024 / 1024),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_limits_are_kept() {
        let limits = SystemLimits::new(2048, 1024).resolve_against(Some(8192));
        assert_eq!(limits, SystemLimits::new(2048, 1024));
        assert_eq!(limits.max_body_bytes(), 1024 * 1024 * 1024);
    }

    #[test]
    fn test_out_of_range_falls_back() {
        let limits = SystemLimits::new(10, 100_000).resolve_against(None);
        assert_eq!(limits.max_connections(), SystemLimits::DEFAULT_CONNECTIONS);
        assert_eq!(limits.memory_mb(), SystemLimits::SAFE_MEMORY_MB);
    }

    #[test]
    fn test_memory_above_machine_falls_back() {
        let limits = SystemLimits::new(1024, 8192).resolve_against(Some(4096));
        assert_eq!(limits.memory_mb(), SystemLimits::SAFE_MEMORY_MB);
        assert_eq!(limits.max_connections(), 1024);
    }
}
