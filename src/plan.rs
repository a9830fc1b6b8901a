//! Allocation sizing policy.
//!
//! Computes how many bytes one benchmark run should allocate, pushing as
//! close to 100% of physical memory as possible while leaving the OS a
//! fixed 128 MiB reserve. The target may intentionally exceed available
//! memory: forcing the OS to page is an accepted consequence of requesting
//! near-total usage, not a bug.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::probe::MemoryInfo;

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Headroom left for the OS out of total memory.
const RESERVE: u64 = 128 * MIB;
/// Margin subtracted from available memory on the fallback path.
const FALLBACK_MARGIN: u64 = 64 * MIB;
/// Smallest allocation ever planned.
const FLOOR: u64 = 256 * MIB;
/// Fixed plan when the memory probe is degraded.
const DEGRADED_PLAN: u64 = GIB;

/// Byte budget for one benchmark run. Consumed exactly once by the engine
/// at allocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub target_bytes: u64,
}

/// Compute the allocation size for a run from a fresh memory snapshot.
///
/// `target = max(256 MiB, total - 128 MiB)`, capped by
/// `max(256 MiB, available - 64 MiB)` when available is known. A degraded
/// probe (total = 0) yields a fixed 1 GiB plan.
pub fn plan_allocation(info: &MemoryInfo) -> AllocationPlan {
    if info.total == 0 {
        debug!("memory probe degraded; planning fixed 1 GiB allocation");
        return AllocationPlan {
            target_bytes: DEGRADED_PLAN,
        };
    }

    let target = FLOOR.max(info.total.saturating_sub(RESERVE));
    let hard_fallback = if info.available > 0 {
        FLOOR.max(info.available.saturating_sub(FALLBACK_MARGIN))
    } else {
        target
    };
    let target_bytes = FLOOR.max(target.min(hard_fallback));

    debug!(
        total = info.total,
        available = info.available,
        target_bytes,
        "planned benchmark allocation"
    );

    AllocationPlan { target_bytes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(total: u64, available: u64) -> MemoryInfo {
        MemoryInfo {
            total,
            available,
            used: total.saturating_sub(available),
            percent_used: 0.0,
        }
    }

    #[test]
    fn degraded_probe_plans_one_gib() {
        let plan = plan_allocation(&info(0, 0));
        assert_eq!(plan.target_bytes, GIB);
    }

    #[test]
    fn ample_available_targets_total_minus_reserve() {
        // 16 GiB total, 12 GiB available: the fallback cap does not bite.
        let plan = plan_allocation(&info(16 * GIB, 12 * GIB));
        assert_eq!(plan.target_bytes, 12 * GIB - FALLBACK_MARGIN);

        // With available within 64 MiB of total, the reserve is the
        // binding constraint: target is total minus the reserve.
        let plan = plan_allocation(&info(16 * GIB, 16 * GIB - 32 * MIB));
        assert_eq!(plan.target_bytes, 16 * GIB - RESERVE);

        // Just outside that band the fallback cap wins again.
        let plan = plan_allocation(&info(16 * GIB, 16 * GIB - 256 * MIB));
        assert_eq!(plan.target_bytes, 16 * GIB - 256 * MIB - FALLBACK_MARGIN);
    }

    #[test]
    fn scarce_available_caps_the_target() {
        let plan = plan_allocation(&info(8 * GIB, 2 * GIB));
        assert_eq!(plan.target_bytes, 2 * GIB - FALLBACK_MARGIN);
    }

    #[test]
    fn zero_available_falls_back_to_total_target() {
        let plan = plan_allocation(&info(8 * GIB, 0));
        assert_eq!(plan.target_bytes, 8 * GIB - RESERVE);
    }

    #[test]
    fn floor_applies_to_tiny_systems() {
        let plan = plan_allocation(&info(512 * MIB, 100 * MIB));
        assert_eq!(plan.target_bytes, FLOOR);
    }

    #[test]
    fn target_never_exceeds_total_on_realistic_systems() {
        for total_gib in [1u64, 2, 4, 8, 16, 64, 256] {
            let total = total_gib * GIB;
            for available in [total / 4, total / 2, total] {
                let plan = plan_allocation(&info(total, available));
                assert!(plan.target_bytes >= FLOOR);
                assert!(
                    plan.target_bytes <= total,
                    "target {} exceeds total {}",
                    plan.target_bytes,
                    total
                );
            }
        }
    }
}
