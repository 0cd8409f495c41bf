//! Controller status snapshot produced once per tick.

use crate::menu::MenuPage;
use crate::state::LiftState;

/// Armed workspace bounds and the carriage position relative to them. The
/// display flags the edges so the operator knows why jogging stopped.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorkspaceStatus {
    /// Raw lower step bound in display units (the physical top with the
    /// stock direction of -1).
    pub lower_mm: f32,
    /// Raw upper step bound in display units.
    pub upper_mm: f32,
    pub at_lower: bool,
    pub at_upper: bool,
}

/// The settings editor screen content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuScreen {
    pub page: MenuPage,
    pub title: &'static str,
    pub value: String,
}

/// Snapshot of everything the operator display and the status stream need.
#[derive(Debug, Clone, PartialEq)]
pub struct LiftStatus {
    pub state: LiftState,
    /// Signed display position in millimetres, rounded to hundredths.
    pub position_mm: f32,
    /// Raw step counter, before the direction sign.
    pub position_steps: i64,
    /// Slow jog mode active (encoder and jog speeds halved).
    pub slow_mode: bool,
    /// Display height captured when the target lock was armed.
    pub target_height_mm: Option<f32>,
    /// Present while the workspace limits are armed.
    pub workspace: Option<WorkspaceStatus>,
    /// The tool-length probe is plugged in and enabled.
    pub tool_length_enabled: bool,
    /// Present while the settings editor is open.
    pub menu: Option<MenuScreen>,
    /// Fault label while in the error state.
    pub message: Option<String>,
}
