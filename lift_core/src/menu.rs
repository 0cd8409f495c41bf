//! The operator settings editor: a ring of pages, one editable field each.
//!
//! Page order and edit scales follow the panel layout the operators know.
//! Every edit is clamped and persisted immediately, so pulling power while
//! the editor is open never loses a change.

use lift_config::MachineCfg;
use lift_traits::SettingsStore;

use crate::settings::LiftSettings;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

pub const PAGE_COUNT: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuPage {
    MaxSpeed,
    Acceleration,
    StepsPerRevolution,
    Direction,
    ToolLengthHeight,
    ThreadPitch,
    EncoderSlow,
    EncoderFast,
    ToolchangeSpeed,
    AutoZeroSpeed,
    WorkspaceHeight,
    PowerOnToolchange,
    ToolLengthEnablePolarity,
    ToolLengthPolarity,
    EndStopPolarity,
}

impl MenuPage {
    pub const ALL: [Self; PAGE_COUNT as usize] = [
        Self::MaxSpeed,
        Self::Acceleration,
        Self::StepsPerRevolution,
        Self::Direction,
        Self::ToolLengthHeight,
        Self::ThreadPitch,
        Self::EncoderSlow,
        Self::EncoderFast,
        Self::ToolchangeSpeed,
        Self::AutoZeroSpeed,
        Self::WorkspaceHeight,
        Self::PowerOnToolchange,
        Self::ToolLengthEnablePolarity,
        Self::ToolLengthPolarity,
        Self::EndStopPolarity,
    ];

    #[must_use]
    pub fn index(self) -> i64 {
        Self::ALL.iter().position(|p| *p == self).unwrap_or(0) as i64
    }

    /// Wrapping lookup; any integer maps onto the ring.
    #[must_use]
    pub fn from_index(i: i64) -> Self {
        Self::ALL[i.rem_euclid(PAGE_COUNT) as usize]
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::MaxSpeed => "Maximal Speed",
            Self::Acceleration => "Acceleration",
            Self::StepsPerRevolution => "Steps per Rev.",
            Self::Direction => "Motor Direction",
            Self::ToolLengthHeight => "TL-Sensor Height",
            Self::ThreadPitch => "Thread Pitch",
            Self::EncoderSlow => "Encoder Slow",
            Self::EncoderFast => "Encoder Fast",
            Self::ToolchangeSpeed => "Toolchange Speed",
            Self::AutoZeroSpeed => "Autozero Speed",
            Self::WorkspaceHeight => "Workspace Height",
            Self::PowerOnToolchange => "PowerUp-Toolch.",
            Self::ToolLengthEnablePolarity => "TL-Sensor Enable",
            Self::ToolLengthPolarity => "TL-Sensor",
            Self::EndStopPolarity => "Endstop-Sensor",
        }
    }

    /// Current value of this page's field, formatted for the display.
    #[must_use]
    pub fn value_text(self, s: &LiftSettings) -> String {
        match self {
            Self::MaxSpeed => format!("{} steps/sec", s.max_speed),
            Self::Acceleration => format!("{} steps/sec^2", s.acceleration),
            Self::StepsPerRevolution => format!("{}", s.steps_per_revolution),
            Self::Direction => {
                if s.direction == -1 {
                    "CCW".to_owned()
                } else {
                    "CW".to_owned()
                }
            }
            Self::ToolLengthHeight => format!("{:.2} mm", s.tool_length_height_mm),
            Self::ThreadPitch => format!("{:.2} mm", s.thread_pitch_mm),
            Self::EncoderSlow => {
                format!("{:.2} mm/step", s.steps_slow as f32 * s.mm_per_step())
            }
            Self::EncoderFast => {
                format!("{:.2} mm/step", s.steps_fast as f32 * s.mm_per_step())
            }
            Self::ToolchangeSpeed => format!("{} steps/sec", s.toolchange_speed),
            Self::AutoZeroSpeed => format!("{} steps/sec", s.auto_zero_speed),
            Self::WorkspaceHeight => format!("{:.2} mm", s.workspace_height_mm),
            Self::PowerOnToolchange => {
                if s.power_on_toolchange {
                    "OK".to_owned()
                } else {
                    "--".to_owned()
                }
            }
            Self::ToolLengthEnablePolarity => {
                polarity_text(s.tool_length_enable_normally_closed)
            }
            Self::ToolLengthPolarity => polarity_text(s.tool_length_normally_closed),
            Self::EndStopPolarity => polarity_text(s.end_stop_normally_closed),
        }
    }
}

fn polarity_text(normally_closed: bool) -> String {
    if normally_closed { "NC" } else { "NO" }.to_owned()
}

/// Editor position. The page survives leaving and re-entering the menu.
#[derive(Debug, Clone, Copy, Default)]
pub struct Menu {
    index: i64,
}

impl Menu {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn page(&self) -> MenuPage {
        MenuPage::from_index(self.index)
    }

    pub fn back(&mut self) {
        self.index = (self.index - 1).rem_euclid(PAGE_COUNT);
    }

    pub fn forward(&mut self) {
        self.index = (self.index + 1).rem_euclid(PAGE_COUNT);
    }

    /// Apply `detents` encoder detents to the current page's field and
    /// persist the result. Callers only invoke this with a nonzero count;
    /// toggle pages flip once per call regardless of magnitude or sign.
    pub fn apply<S: SettingsStore + ?Sized>(
        &self,
        settings: &mut LiftSettings,
        store: &mut S,
        defaults: &MachineCfg,
        detents: i64,
    ) -> Result<(), BoxedError> {
        match self.page() {
            MenuPage::MaxSpeed => {
                let v = (settings.max_speed + detents * 10).max(0);
                settings.set_max_speed(store, v)
            }
            MenuPage::Acceleration => {
                let v = (settings.acceleration + detents * 10).max(0);
                settings.set_acceleration(store, v)
            }
            MenuPage::StepsPerRevolution => {
                let v = (settings.steps_per_revolution + detents * 100).max(0);
                settings.set_steps_per_revolution(store, v)
            }
            MenuPage::Direction => {
                let v = if settings.direction == -1 { 1 } else { -1 };
                settings.set_direction(store, v)
            }
            MenuPage::ToolLengthHeight => {
                // The probe height may legitimately sit below the zero plane.
                let v = settings.tool_length_height_mm + detents as f32 / 10.0;
                settings.set_tool_length_height_mm(store, v)
            }
            MenuPage::ThreadPitch => {
                let v = (settings.thread_pitch_mm + detents as f32 / 10.0).max(0.0);
                settings.set_thread_pitch_mm(store, v)
            }
            MenuPage::EncoderSlow => {
                let v = (settings.steps_slow + detents * settings.slow_detent_steps())
                    .max(LiftSettings::factory_steps_slow(defaults));
                settings.set_steps_slow(store, v)
            }
            MenuPage::EncoderFast => {
                let v = (settings.steps_fast + detents * settings.fast_detent_steps())
                    .max(LiftSettings::factory_steps_fast(defaults));
                settings.set_steps_fast(store, v)
            }
            MenuPage::ToolchangeSpeed => {
                let v = (settings.toolchange_speed + detents * 10).max(0);
                settings.set_toolchange_speed(store, v)
            }
            MenuPage::AutoZeroSpeed => {
                let v = (settings.auto_zero_speed + detents * 10).max(0);
                settings.set_auto_zero_speed(store, v)
            }
            MenuPage::WorkspaceHeight => {
                let v = (settings.workspace_height_mm + detents as f32 / 10.0).max(0.0);
                settings.set_workspace_height_mm(store, v)
            }
            MenuPage::PowerOnToolchange => {
                let v = !settings.power_on_toolchange;
                settings.set_power_on_toolchange(store, v)
            }
            MenuPage::ToolLengthEnablePolarity => {
                let v = !settings.tool_length_enable_normally_closed;
                settings.set_tool_length_enable_normally_closed(store, v)
            }
            MenuPage::ToolLengthPolarity => {
                let v = !settings.tool_length_normally_closed;
                settings.set_tool_length_normally_closed(store, v)
            }
            MenuPage::EndStopPolarity => {
                let v = !settings.end_stop_normally_closed;
                settings.set_end_stop_normally_closed(store, v)
            }
        }
    }
}
