//! Per-battery condition bitflags.
//!
//! Derived by the estimator on every accepted tick and carried in the
//! snapshot as raw bits. Flags are presentation-side data: they never feed
//! back into the accumulators. The CRITICAL flag marks over-discharge
//! (raw SoC below 0%), which sinks are expected to surface prominently.

use bitflags::bitflags;

bitflags! {
    /// Battery condition flags.
    ///
    /// CRITICAL flags: OVER_DISCHARGE.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConditionFlags: u8 {
        /// Current sample drew charge from the battery.
        const DISCHARGING    = 0x01;
        /// Current sample fed charge into the battery.
        const CHARGING       = 0x02;
        /// No tracked deficit; battery considered full.
        const FULL           = 0x04;
        /// Tracked deficit reached nominal capacity.
        const EMPTY          = 0x08;
        /// Deficit exceeds nominal capacity (negative raw SoC). **CRITICAL**.
        const OVER_DISCHARGE = 0x10;
    }
}

impl ConditionFlags {
    /// Mask of all CRITICAL flags.
    pub const CRITICAL_MASK: Self = Self::from_bits_truncate(Self::OVER_DISCHARGE.bits());

    /// Returns true if any CRITICAL flag is set.
    #[inline]
    pub const fn has_critical(&self) -> bool {
        self.intersects(Self::CRITICAL_MASK)
    }
}

impl Default for ConditionFlags {
    fn default() -> Self {
        Self::empty()
    }
}
