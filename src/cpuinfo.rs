//! The CPU-feature-probing collaborator (spec §6: out of scope for the
//! core, "assumed to return a feature bit set"; consulted by the
//! Compiler to pick between equivalent instructions and by the caller to
//! gate SSE variants).

/// A single gateable instruction-set extension.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CpuFeature {
    Sse2,
    Sse3,
    Ssse3,
    Sse41,
    Sse42,
    Avx,
}

/// A read-only feature bit set plus vendor string, as spec §6 describes.
/// The core never probes the CPUID instruction itself beyond this
/// narrow trait — the actual probing plumbing (vendor string parsing,
/// leaf walking) is an external collaborator's problem, not the core's.
pub trait CpuInfo {
    /// True if `feature` is present.
    fn has(&self, feature: CpuFeature) -> bool;

    /// A short vendor identifier, e.g. `"GenuineIntel"` or
    /// `"AuthenticAMD"`. Implementations that don't probe this may
    /// return `"unknown"`.
    fn vendor(&self) -> &str;
}

/// The one concrete, std-only [`CpuInfo`] this crate ships: features are
/// captured once at construction via `std::is_x86_feature_detected!`.
/// Vendor identification is out of scope (spec §1) so `vendor()` always
/// reports `"unknown"`.
pub struct HostCpuInfo {
    sse2: bool,
    sse3: bool,
    ssse3: bool,
    sse41: bool,
    sse42: bool,
    avx: bool,
}

impl HostCpuInfo {
    /// Probes the running process's CPU via the standard library's
    /// runtime feature detection.
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    pub fn detect() -> Self {
        HostCpuInfo {
            sse2: std::is_x86_feature_detected!("sse2"),
            sse3: std::is_x86_feature_detected!("sse3"),
            ssse3: std::is_x86_feature_detected!("ssse3"),
            sse41: std::is_x86_feature_detected!("sse4.1"),
            sse42: std::is_x86_feature_detected!("sse4.2"),
            avx: std::is_x86_feature_detected!("avx"),
        }
    }

    /// On a non-x86 host (cross-compiling a generator whose output
    /// targets x86 elsewhere) nothing can be runtime-probed; every
    /// feature reports absent.
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    pub fn detect() -> Self {
        HostCpuInfo {
            sse2: false,
            sse3: false,
            ssse3: false,
            sse41: false,
            sse42: false,
            avx: false,
        }
    }

    /// Builds a [`HostCpuInfo`] reporting every feature as present,
    /// useful for tests that want to exercise SSE4.2 encodings on a host
    /// that may not have the real instruction.
    pub fn all_features() -> Self {
        HostCpuInfo {
            sse2: true,
            sse3: true,
            ssse3: true,
            sse41: true,
            sse42: true,
            avx: true,
        }
    }
}

impl CpuInfo for HostCpuInfo {
    fn has(&self, feature: CpuFeature) -> bool {
        match feature {
            CpuFeature::Sse2 => self.sse2,
            CpuFeature::Sse3 => self.sse3,
            CpuFeature::Ssse3 => self.ssse3,
            CpuFeature::Sse41 => self.sse41,
            CpuFeature::Sse42 => self.sse42,
            CpuFeature::Avx => self.avx,
        }
    }

    fn vendor(&self) -> &str {
        "unknown"
    }
}
