//! Soft travel limits: the operator workspace and the tool-length target lock.
//!
//! Both limits are expressed in raw motor steps and checked by pure
//! predicates; callers decide what to do on a denied move (the controller
//! halts the motor). Positions here are signed step counts straight from the
//! drive, before the display direction sign is applied.

/// What the motor is about to do, as far as the guard cares.
#[derive(Debug, Clone, Copy)]
pub enum Motion {
    /// Constant-speed stepping; the sign of `speed` gives the direction.
    Constant { speed: f32 },
    /// Ramped move toward an absolute step target.
    Ramped { target: i64 },
}

/// Operator workspace: a closed band of allowed positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Workspace {
    pub lower: i64,
    pub upper: i64,
}

impl Workspace {
    /// True when `motion` from `pos` stays inside the band.
    ///
    /// Moves away from a violated bound are allowed, so a carriage sitting on
    /// a limit can always drive back in.
    #[must_use]
    pub fn permits(&self, pos: i64, motion: Motion) -> bool {
        match motion {
            Motion::Constant { speed } => {
                (speed < 0.0 && pos > self.lower) || (speed > 0.0 && pos < self.upper)
            }
            Motion::Ramped { target } => {
                (target < pos && pos > self.lower) || (target > pos && pos < self.upper)
            }
        }
    }
}

/// Lock protecting the auto-zeroed tool length: downward travel stops at the
/// position where the lock was armed, upward travel is unrestricted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetLock {
    /// Display height at the moment the lock was armed.
    pub height_mm: f32,
    /// Lowest step position the carriage may reach while locked.
    pub lower_limit: i64,
}

impl TargetLock {
    #[must_use]
    pub fn permits(&self, pos: i64, motion: Motion) -> bool {
        match motion {
            Motion::Constant { speed } => (speed < 0.0 && pos > self.lower_limit) || speed > 0.0,
            Motion::Ramped { target } => (target < pos && pos > self.lower_limit) || target > pos,
        }
    }
}

/// The combined travel envelope. Either limit may be active independently.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    workspace: Option<Workspace>,
    target: Option<TargetLock>,
}

impl Envelope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the workspace with `pos` as the lower bound and `span_steps` of
    /// travel above it.
    pub fn activate_workspace(&mut self, pos: i64, span_steps: i64) {
        self.workspace = Some(Workspace {
            lower: pos,
            upper: pos + span_steps,
        });
    }

    pub fn deactivate_workspace(&mut self) {
        self.workspace = None;
    }

    #[must_use]
    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    /// Arm the target lock at `pos`, remembering the display height for the
    /// status line.
    pub fn activate_target(&mut self, pos: i64, height_mm: f32) {
        self.target = Some(TargetLock {
            height_mm,
            lower_limit: pos,
        });
    }

    pub fn deactivate_target(&mut self) {
        self.target = None;
    }

    #[must_use]
    pub fn target(&self) -> Option<&TargetLock> {
        self.target.as_ref()
    }

    /// Arm the target lock if it is off, drop it if it is on.
    pub fn toggle_target(&mut self, pos: i64, height_mm: f32) {
        if self.target.is_some() {
            self.target = None;
        } else {
            self.activate_target(pos, height_mm);
        }
    }

    /// Shift every stored step position by `-offset` after the step counter
    /// is rebased to zero.
    pub fn rebase(&mut self, offset: i64) {
        if let Some(ws) = &mut self.workspace {
            ws.lower -= offset;
            ws.upper -= offset;
        }
        if let Some(t) = &mut self.target {
            t.lower_limit -= offset;
        }
    }

    /// True when every active limit allows `motion` from `pos`.
    #[must_use]
    pub fn permits(&self, pos: i64, motion: Motion) -> bool {
        self.workspace.is_none_or(|w| w.permits(pos, motion))
            && self.target.is_none_or(|t| t.permits(pos, motion))
    }
}
