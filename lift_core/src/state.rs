//! Operator-visible machine states.

use std::fmt;

/// Top-level mode of the lift controller.
///
/// Transitions between states run the exit action of the old state and the
/// entry action of the new one; see `Controller::change_state_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiftState {
    /// Normal jog and positioning operation.
    DefaultStart,
    /// Driving toward the top end-stop for a tool change.
    GotoToolchange,
    /// Backed off the end-stop, holding position for the tool change.
    FinishToolchange,
    /// Driving down toward the tool-length sensor for auto-zero.
    GotoToolLength,
    /// Retracting by the probe height to finish auto-zero.
    FinishToolLength,
    /// Field editor is active.
    SettingsMenu,
    /// Restoring factory defaults.
    Reset,
    /// Latched fault; motor held until acknowledged.
    Error,
}

impl LiftState {
    /// Stable lower-case label for logs and machine-readable status lines.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DefaultStart => "default_start",
            Self::GotoToolchange => "goto_toolchange",
            Self::FinishToolchange => "finish_toolchange",
            Self::GotoToolLength => "goto_tool_length",
            Self::FinishToolLength => "finish_tool_length",
            Self::SettingsMenu => "settings_menu",
            Self::Reset => "reset",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LiftState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
