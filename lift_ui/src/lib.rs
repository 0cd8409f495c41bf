#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Operator display model: renders a `LiftStatus` snapshot into the text
//! frame the panel shows. The layout follows the original face plate: the
//! position line on top, mode and target below it, armed limits and the
//! probe dot on the bottom line.

use lift_core::{LiftState, LiftStatus};

/// One display refresh, top to bottom. Lines are already formatted; the
/// frontend only places them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub lines: Vec<String>,
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Render the frame for a status snapshot.
///
/// Fault and reset screens replace everything else; the settings editor
/// shows its page; any other state shows the operating frame.
#[must_use]
pub fn render(status: &LiftStatus) -> Frame {
    match status.state {
        LiftState::Error => error_frame(status),
        LiftState::Reset => Frame {
            lines: vec!["RESET".to_owned(), "VALUES".to_owned()],
        },
        _ => {
            if let Some(menu) = &status.menu {
                Frame {
                    lines: vec![menu.title.to_owned(), menu.value.clone()],
                }
            } else {
                operating_frame(status)
            }
        }
    }
}

fn error_frame(status: &LiftStatus) -> Frame {
    let message = status.message.as_deref().unwrap_or("");
    Frame {
        lines: vec!["ERROR:".to_owned(), message.to_owned()],
    }
}

fn operating_frame(status: &LiftStatus) -> Frame {
    let mut lines = vec![format!("{:.2} mm", status.position_mm)];

    let mut mode = if status.slow_mode { "SLOW" } else { "FAST" }.to_owned();
    if let Some(h) = status.target_height_mm {
        mode.push_str(&format!(" {h:.2}mm"));
    }
    lines.push(mode);

    let mut flags: Vec<String> = Vec::new();
    if let Some(ws) = &status.workspace {
        let mut marker = "WS".to_owned();
        if ws.at_lower {
            marker.push_str(" MAX");
        } else if ws.at_upper {
            marker.push_str(" MIN");
        }
        flags.push(marker);
    }
    if status.tool_length_enabled {
        flags.push(".".to_owned());
    }
    if !flags.is_empty() {
        lines.push(flags.join(" "));
    }

    Frame { lines }
}
