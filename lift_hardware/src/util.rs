//! Pure input-decode helpers shared by the GPIO panel and its tests.

/// Press-versus-hold threshold. A button released before this fires a press
/// edge; crossing it while still down fires a single hold edge and swallows
/// the release.
pub const HOLD_MS: u64 = 750;

/// Level flips closer together than this are treated as contact bounce.
pub const DEBOUNCE_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Press,
    Hold,
}

/// Debounce and press/hold classification for one button.
///
/// Feed it the sampled level on every poll; `down` means the contact is
/// closed. Time comes from the caller so the logic stays clock-free.
#[derive(Debug, Default)]
pub struct ButtonTracker {
    down: bool,
    pressed_at: Option<u64>,
    hold_fired: bool,
    last_flip_ms: u64,
}

impl ButtonTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, now_ms: u64, down: bool) -> Option<ButtonEvent> {
        if down != self.down {
            if now_ms.saturating_sub(self.last_flip_ms) < DEBOUNCE_MS {
                return None;
            }
            self.down = down;
            self.last_flip_ms = now_ms;
            if down {
                self.pressed_at = Some(now_ms);
                self.hold_fired = false;
                return None;
            }
            let pressed_at = self.pressed_at.take();
            if self.hold_fired {
                // The hold edge already fired; the release is silent.
                self.hold_fired = false;
                return None;
            }
            return pressed_at.map(|_| ButtonEvent::Press);
        }

        if down && !self.hold_fired
            && let Some(t0) = self.pressed_at
            && now_ms.saturating_sub(t0) >= HOLD_MS
        {
            self.hold_fired = true;
            return Some(ButtonEvent::Hold);
        }
        None
    }

    /// Live level after debouncing, for the jog buttons.
    #[must_use]
    pub fn is_down(&self) -> bool {
        self.down
    }
}

/// Index by `(previous state << 2) | current state`; value is the quarter-step
/// movement for that transition, 0 for illegal jumps.
const QUAD_TABLE: [i8; 16] = [0, -1, 1, 0, 1, 0, 0, -1, -1, 0, 0, 1, 0, 1, -1, 0];

/// Gray-code decoder for the hand-wheel encoder. One detent is four quarter
/// steps; partial movement between detents accumulates without emitting.
#[derive(Debug, Default)]
pub struct QuadratureDecoder {
    prev: u8,
    accum: i8,
}

impl QuadratureDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the sampled A/B levels; returns the signed detents completed by
    /// this transition (-1, 0 or 1).
    pub fn update(&mut self, a: bool, b: bool) -> i64 {
        let cur = (u8::from(a) << 1) | u8::from(b);
        let idx = (self.prev << 2) | cur;
        self.prev = cur;
        self.accum += QUAD_TABLE[idx as usize];
        if self.accum >= 4 {
            self.accum -= 4;
            1
        } else if self.accum <= -4 {
            self.accum += 4;
            -1
        } else {
            0
        }
    }
}
