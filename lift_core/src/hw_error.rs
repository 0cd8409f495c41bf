//! Maps `Box<dyn Error>` from trait boundaries to typed `LiftError`.
//!
//! The traits in `lift_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to our typed error enum, with an
//! optional feature-gated path for `lift_hardware::HwError` downcasting.

use crate::error::LiftError;

/// Map a trait-boundary error to a typed `LiftError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> LiftError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<lift_hardware::error::HwError>() {
            return match hw {
                lift_hardware::error::HwError::Fault(msg) => {
                    LiftError::HardwareFault(msg.clone())
                }
                other => LiftError::Hardware(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("fault") {
        LiftError::HardwareFault(s)
    } else {
        LiftError::Hardware(s)
    }
}
