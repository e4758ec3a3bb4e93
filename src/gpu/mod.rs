//! GPU capability probing
//!
//! Detects an NVIDIA accelerator, reads its total/free memory, and turns
//! free memory into the layer-offload tier the inference sidecar is started
//! with. Every probe fails closed: errors read as "no GPU" and zero memory.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::system::{CommandRunner, HostPlatform};

/// Requested tier meaning "derive from free memory"
pub const AUTO_TIER: i32 = -1;

/// Free-memory thresholds (MiB, inclusive) and the tier each unlocks,
/// highest first
pub const TIER_THRESHOLDS: [(u64, i32); 3] = [(16 * 1024, 33), (8 * 1024, 16), (4 * 1024, 8)];

/// Memory query producing `total, free` in MiB
pub const MEMORY_QUERY: &str =
    "nvidia-smi --query-gpu=memory.total,memory.free --format=csv,noheader,nounits";

/// Accelerator memory and the offload tier derived from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuInfo {
    pub total_mib: u64,
    pub free_mib: u64,
    /// Layers offloaded to the GPU; 0 means none
    pub offload_tier: i32,
}

impl GpuInfo {
    /// No usable accelerator
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Memory reading with an automatically derived tier
    pub fn from_memory(total_mib: u64, free_mib: u64) -> Self {
        Self {
            total_mib,
            free_mib,
            offload_tier: tier_for(free_mib, AUTO_TIER),
        }
    }

    /// Re-derive the tier for an explicit caller request
    pub fn with_requested_tier(mut self, requested: i32) -> Self {
        self.offload_tier = tier_for(self.free_mib, requested);
        self
    }

    pub fn has_memory(&self) -> bool {
        self.total_mib > 0
    }
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Resolve the offload tier for `free_mib` of free GPU memory.
///
/// Zero free memory always yields 0, even for an explicit request, since the
/// engine cannot allocate memory that is not there. A negative request picks
/// the highest tier whose threshold is met. Any other request is returned
/// unchanged.
pub fn tier_for(free_mib: u64, requested: i32) -> i32 {
    if free_mib == 0 {
        return 0;
    }
    if requested >= 0 {
        return requested;
    }
    TIER_THRESHOLDS
        .iter()
        .find(|(threshold, _)| free_mib >= *threshold)
        .map(|(_, tier)| *tier)
        .unwrap_or(0)
}

/// Parse a `GPU_LAYERS` setting; anything non-numeric means automatic
pub fn parse_requested_tier(value: &str) -> i32 {
    match value.trim().parse::<i32>() {
        Ok(tier) => tier,
        Err(_) => {
            warn!("Invalid GPU layer setting {:?}, using automatic tiering", value);
            AUTO_TIER
        }
    }
}

/// Parse `nvidia-smi` CSV output (`total, free` per GPU) from the first GPU.
/// Returns `None` for anything that is not two integers.
pub fn parse_memory_report(output: &str) -> Option<(u64, u64)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut fields = line.split(',').map(str::trim);
    let total = fields.next()?.parse().ok()?;
    let free = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some((total, free))
}

/// Whether a PCI listing mentions an NVIDIA device
pub fn lists_nvidia_device(listing: &str) -> bool {
    listing.to_lowercase().contains("nvidia")
}

// ============================================================================
// SBIO: Probe with I/O (uses CommandRunner)
// ============================================================================

/// Probes the host for an accelerator through external tools
pub struct GpuProbe {
    runner: Arc<dyn CommandRunner>,
    platform: HostPlatform,
    native: bool,
}

impl GpuProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, platform: HostPlatform) -> Self {
        Self {
            runner,
            platform,
            native: false,
        }
    }

    /// Also ask the NVIDIA driver library directly (requires the `gpu` feature)
    pub fn with_native_probe(mut self, enabled: bool) -> Self {
        self.native = enabled;
        self
    }

    /// Whether an NVIDIA GPU is present
    pub async fn detect(&self) -> bool {
        let present = match self.platform {
            HostPlatform::Linux => {
                if self.native && native_device_present() {
                    true
                } else {
                    self.listing_mentions_nvidia("lspci").await
                }
            }
            HostPlatform::Windows => {
                self.listing_mentions_nvidia("wmic path win32_VideoController get name")
                    .await
            }
            HostPlatform::MacOs => {
                info!("NVIDIA GPU support is not available on macOS.");
                false
            }
            HostPlatform::Unsupported => {
                warn!("GPU detection is not supported on {}", self.platform);
                false
            }
        };
        debug!("NVIDIA GPU present: {}", present);
        present
    }

    /// Total and free GPU memory; (0, 0) when the query fails
    pub async fn memory_info(&self) -> GpuInfo {
        let output = match self.runner.run(MEMORY_QUERY).await {
            Ok(out) if out.success => out.stdout,
            Ok(out) => {
                warn!("GPU memory query failed: {}", out.stderr.trim());
                return GpuInfo::unavailable();
            }
            Err(e) => {
                debug!("GPU memory query unavailable: {}", e);
                return GpuInfo::unavailable();
            }
        };

        match parse_memory_report(&output) {
            Some((total, free)) => GpuInfo::from_memory(total, free),
            None => {
                if !output.trim().is_empty() {
                    warn!("Unrecognised GPU memory report: {:?}", output.trim());
                }
                GpuInfo::unavailable()
            }
        }
    }

    async fn listing_mentions_nvidia(&self, command: &str) -> bool {
        match self.runner.run(command).await {
            Ok(out) if out.success => lists_nvidia_device(&out.stdout),
            Ok(_) => false,
            Err(e) => {
                debug!("GPU listing failed: {}", e);
                false
            }
        }
    }
}

/// Device count from NVML (requires `gpu` feature)
#[cfg(feature = "gpu")]
fn native_device_present() -> bool {
    use nvml_wrapper::Nvml;

    match Nvml::init() {
        Ok(nvml) => nvml.device_count().map(|count| count > 0).unwrap_or(false),
        Err(_) => false,
    }
}

/// Device count - stub when GPU feature is disabled
#[cfg(not(feature = "gpu"))]
fn native_device_present() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::testing::ScriptedRunner;
    use crate::system::CommandOutput;

    #[test]
    fn test_auto_tiers() {
        assert_eq!(tier_for(20 * 1024, AUTO_TIER), 33);
        assert_eq!(tier_for(10 * 1024, AUTO_TIER), 16);
        assert_eq!(tier_for(5 * 1024, AUTO_TIER), 8);
        assert_eq!(tier_for(1024, AUTO_TIER), 0);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        assert_eq!(tier_for(16 * 1024, AUTO_TIER), 33);
        assert_eq!(tier_for(16 * 1024 - 1, AUTO_TIER), 16);
        assert_eq!(tier_for(8 * 1024, AUTO_TIER), 16);
        assert_eq!(tier_for(4 * 1024, AUTO_TIER), 8);
        assert_eq!(tier_for(4 * 1024 - 1, AUTO_TIER), 0);
    }

    #[test]
    fn test_zero_free_memory_forces_zero() {
        for requested in [AUTO_TIER, 0, 8, 33, 99] {
            assert_eq!(tier_for(0, requested), 0);
        }
    }

    #[test]
    fn test_explicit_tier_passes_through() {
        assert_eq!(tier_for(1024, 20), 20);
        assert_eq!(tier_for(64 * 1024, 4), 4);
        assert_eq!(tier_for(64 * 1024, 0), 0);
    }

    #[test]
    fn test_auto_tier_is_monotonic() {
        let mut last = 0;
        for free in (0..=40 * 1024).step_by(256) {
            let tier = tier_for(free, AUTO_TIER);
            assert!(tier >= last);
            last = tier;
        }
    }

    #[test]
    fn test_parse_requested_tier() {
        assert_eq!(parse_requested_tier("16"), 16);
        assert_eq!(parse_requested_tier(" -1 "), AUTO_TIER);
        assert_eq!(parse_requested_tier("lots"), AUTO_TIER);
    }

    #[test]
    fn test_parse_memory_report() {
        assert_eq!(parse_memory_report("24576, 20480\n"), Some((24576, 20480)));
        assert_eq!(
            parse_memory_report("24576, 20480\n8192, 100\n"),
            Some((24576, 20480))
        );
        assert_eq!(parse_memory_report(""), None);
        assert_eq!(parse_memory_report("N/A, N/A"), None);
        assert_eq!(parse_memory_report("24576"), None);
        assert_eq!(parse_memory_report("1, 2, 3"), None);
    }

    #[tokio::test]
    async fn test_memory_info_parses_report() {
        let runner = Arc::new(ScriptedRunner::new().on("nvidia-smi", CommandOutput::ok("24576, 10240\n")));
        let probe = GpuProbe::new(runner, HostPlatform::Linux);

        let info = probe.memory_info().await;
        assert_eq!(info.total_mib, 24576);
        assert_eq!(info.free_mib, 10240);
        assert_eq!(info.offload_tier, 16);
    }

    #[tokio::test]
    async fn test_empty_report_degrades_to_zero_and_forces_tier_zero() {
        let runner = Arc::new(ScriptedRunner::new().on("nvidia-smi", CommandOutput::ok("")));
        let probe = GpuProbe::new(runner, HostPlatform::Linux);

        let info = probe.memory_info().await;
        assert_eq!((info.total_mib, info.free_mib), (0, 0));
        assert_eq!(info.with_requested_tier(33).offload_tier, 0);
        assert_eq!(info.with_requested_tier(AUTO_TIER).offload_tier, 0);
    }

    #[tokio::test]
    async fn test_missing_tool_degrades_to_zero() {
        let runner = Arc::new(ScriptedRunner::new().unavailable("nvidia-smi"));
        let probe = GpuProbe::new(runner, HostPlatform::Windows);
        assert_eq!(probe.memory_info().await, GpuInfo::unavailable());
    }

    #[tokio::test]
    async fn test_failed_query_degrades_to_zero() {
        let runner = Arc::new(
            ScriptedRunner::new().on("nvidia-smi", CommandOutput::failed(9, "driver mismatch")),
        );
        let probe = GpuProbe::new(runner, HostPlatform::Linux);
        assert_eq!(probe.memory_info().await, GpuInfo::unavailable());
    }

    #[tokio::test]
    async fn test_detect_linux_via_lspci() {
        let runner = Arc::new(ScriptedRunner::new().on(
            "lspci",
            CommandOutput::ok("01:00.0 VGA compatible controller: NVIDIA Corporation GA102\n"),
        ));
        let probe = GpuProbe::new(runner, HostPlatform::Linux);
        assert!(probe.detect().await);
    }

    #[tokio::test]
    async fn test_detect_linux_without_nvidia() {
        let runner = Arc::new(ScriptedRunner::new().on(
            "lspci",
            CommandOutput::ok("00:02.0 VGA compatible controller: Intel Corporation UHD\n"),
        ));
        let probe = GpuProbe::new(runner, HostPlatform::Linux);
        assert!(!probe.detect().await);
    }

    #[tokio::test]
    async fn test_detect_windows() {
        let runner = Arc::new(ScriptedRunner::new().on(
            "win32_VideoController",
            CommandOutput::ok("Name\nNVIDIA GeForce RTX 4090\n"),
        ));
        let probe = GpuProbe::new(runner, HostPlatform::Windows);
        assert!(probe.detect().await);
    }

    #[tokio::test]
    async fn test_detect_fails_closed() {
        let runner = Arc::new(ScriptedRunner::new().unavailable("lspci"));
        assert!(!GpuProbe::new(runner, HostPlatform::Linux).detect().await);

        let runner = Arc::new(ScriptedRunner::new());
        let mac = GpuProbe::new(runner.clone(), HostPlatform::MacOs);
        assert!(!mac.detect().await);
        let other = GpuProbe::new(runner.clone(), HostPlatform::Unsupported);
        assert!(!other.detect().await);
        assert!(runner.calls().is_empty());
    }
}
