//! Error types for the Linux GPIO backend

use thiserror::Error;

/// Linux GPIO backend errors
#[derive(Debug, Error)]
pub enum LinuxGpioError {
    /// Failed to request a GPIO line
    #[error("Failed to request GPIO line {offset} on '{chip}': {source}")]
    LineRequestFailed {
        chip: String,
        offset: u32,
        #[source]
        source: gpiocdev::Error,
    },

    /// Failed to access the PWM channel driving the FPGA clock
    #[error("Failed to access PWM '{path}': {source}")]
    PwmFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Missing required parameter
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// GPIO chip or device not specified
    #[error("No GPIO chip specified. Use dev=/dev/gpiochipN or gpiochip=N")]
    NoDevice,
}

/// Result type for Linux GPIO backend operations
pub type Result<T> = std::result::Result<T, LinuxGpioError>;
