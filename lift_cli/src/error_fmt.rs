//! Human-readable error descriptions and structured JSON error formatting.

use lift_core::error::{BuildError, LiftError};

use crate::run::error_reason_name;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingDevice => {
                "What happened: No step device was provided to the controller.\nLikely causes: The step/dir driver failed to initialize or was not wired into the builder.\nHow to fix: Ensure the driver is created successfully and passed via with_device(...).".to_string()
            }
            BuildError::MissingSensors => {
                "What happened: No sensor port was provided to the controller.\nLikely causes: The end-stop/tool-length inputs failed to initialize or were not wired into the builder.\nHow to fix: Ensure the sensor port is created successfully and passed via with_sensors(...).".to_string()
            }
            BuildError::MissingPanel => {
                "What happened: No control panel was provided to the controller.\nLikely causes: The button/encoder inputs failed to initialize or were not wired into the builder.\nHow to fix: Ensure the panel is created successfully and passed via with_panel(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid machine profile ({msg}).\nLikely causes: Out-of-range values in the [machine] table.\nHow to fix: Edit the config file, then rerun. See README for a sample."
            ),
        };
    }

    if let Some(le) = err.downcast_ref::<LiftError>() {
        return match le {
            LiftError::EndStopRecovery { limit_steps } => format!(
                "What happened: The end-stop stayed closed through {limit_steps} recovery steps.\nLikely causes: Carriage jammed at the top, a stuck switch, or the wrong end-stop polarity for this revision.\nHow to fix: Clear the carriage, check the switch, and verify machine.end_stop_normally_closed matches the installed hardware."
            ),
            LiftError::ToolLengthRecovery { limit_steps } => format!(
                "What happened: The tool-length sensor stayed closed through {limit_steps} recovery steps.\nLikely causes: The probe is held down, mis-wired, or its polarity does not match the config.\nHow to fix: Free the probe and verify machine.tool_length_normally_closed, then run auto-zero again."
            ),
            LiftError::HardwareFault(msg) => format!(
                "What happened: The drive electronics reported a fault ({msg}).\nLikely causes: Driver over-temperature or supply trouble on the step driver.\nHow to fix: Power-cycle the driver and check its fault LED before running again."
            ),
            LiftError::Hardware(msg) => format!(
                "What happened: A hardware port failed ({msg}).\nLikely causes: GPIO wiring, pin permissions, or a disconnected panel.\nHow to fix: Check the [pins] table and the wiring, and rerun with --log-level=debug for detail."
            ),
            LiftError::Config(msg) => format!(
                "What happened: Configuration rejected ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            LiftError::State(msg) => format!(
                "What happened: The controller hit an invalid state transition ({msg}).\nLikely causes: This is an internal invariant violation, not an operator problem.\nHow to fix: Re-run with --log-level=debug and report the log."
            ),
            LiftError::Io(msg) => format!(
                "What happened: A file operation failed ({msg}).\nLikely causes: Bad settings path or insufficient permissions.\nHow to fix: Check [settings].path and the directory permissions."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config. Scan the
    // whole context chain, not just the outermost message.
    let chain = format!("{err:#}");
    let lower = chain.to_ascii_lowercase();

    if lower.contains("parse settings store") {
        return "What happened: The calibration store could not be parsed.\nLikely causes: The settings TOML was hand-edited or truncated.\nHow to fix: Fix or delete the file; the controller rebuilds it with factory values on the next save.".to_string();
    }

    if lower.contains("gpio") || lower.contains("open step driver pins") || lower.contains("open panel pins") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("read config") || lower.contains("parse config") || lower.contains("validate config") {
        return format!(
            "What happened: The deployment profile could not be loaded.\nLikely causes: Wrong --config path, or a typo/out-of-range value in the TOML.\nHow to fix: Point --config at a valid profile and try again. Original: {chain}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {chain}"
    )
}

/// Map the domain error (if present) to stable exit codes; other errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(le) = err.downcast_ref::<LiftError>() {
        return match le {
            LiftError::Hardware(_) => 2,
            LiftError::HardwareFault(_) => 3,
            LiftError::EndStopRecovery { .. } => 4,
            LiftError::ToolLengthRecovery { .. } => 5,
            LiftError::State(_) => 6,
            LiftError::Config(_) | LiftError::Io(_) => 1,
        };
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    if let Some(le) = err.downcast_ref::<LiftError>() {
        let msg = humanize(err);
        let reason = error_reason_name(le);

        let detail_obj = match le {
            LiftError::EndStopRecovery { limit_steps }
            | LiftError::ToolLengthRecovery { limit_steps } => {
                Some(json!({ "limit_steps": limit_steps }))
            }
            _ => None,
        };

        let obj = if let Some(d) = detail_obj {
            json!({
                "reason": reason,
                "label": le.display_label(),
                "details": d,
                "message": msg,
            })
        } else {
            json!({ "reason": reason, "label": le.display_label(), "message": msg })
        };
        return obj.to_string();
    }

    // Generic error JSON
    json!({ "reason": "Error", "message": humanize(err) }).to_string()
}
