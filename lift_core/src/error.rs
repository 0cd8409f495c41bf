use thiserror::Error;

/// Display label for an end-stop recovery failure.
pub const ERROR_END_STOP: &str = "ENDSTOP ERR";
/// Display label for a tool-length recovery or auto-zero failure.
pub const ERROR_AUTO_ZERO: &str = "AUTOZERO ERR";
/// Display label for a state-machine transition that should not exist.
pub const ERROR_INVALID_STATE: &str = "INVALID STATE";

#[derive(Debug, Error, Clone)]
pub enum LiftError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("end-stop still closed after {limit_steps} recovery steps")]
    EndStopRecovery { limit_steps: i64 },
    #[error("tool-length sensor still closed after {limit_steps} recovery steps")]
    ToolLengthRecovery { limit_steps: i64 },
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
}

impl LiftError {
    /// Short fixed-width label for the operator display.
    #[must_use]
    pub fn display_label(&self) -> &'static str {
        match self {
            Self::EndStopRecovery { .. } => ERROR_END_STOP,
            Self::ToolLengthRecovery { .. } => ERROR_AUTO_ZERO,
            Self::State(_) => ERROR_INVALID_STATE,
            Self::Hardware(_) | Self::HardwareFault(_) => "HARDWARE ERR",
            Self::Config(_) => "CONFIG ERR",
            Self::Io(_) => "IO ERR",
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing step device")]
    MissingDevice,
    #[error("missing sensor port")]
    MissingSensors,
    #[error("missing control panel")]
    MissingPanel,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
