use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fli_capture::{DebugLevel, FrameType, Transport};

/// Interface to enumerate and open devices on.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq, Copy)]
pub enum TransportArg {
    /// USB
    Usb,
    /// Parallel port
    Parallel,
    /// Serial port
    Serial,
    /// Network
    Inet,
}

impl From<TransportArg> for Transport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Usb => Self::Usb,
            TransportArg::Parallel => Self::ParallelPort,
            TransportArg::Serial => Self::Serial,
            TransportArg::Inet => Self::Inet,
        }
    }
}

/// Exposure frame type.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq, Copy)]
pub enum FrameTypeArg {
    /// Shutter open
    Normal,
    /// Shutter closed
    Dark,
    /// Flood the sensor
    Flood,
    /// RBI flush
    RbiFlush,
}

impl From<FrameTypeArg> for FrameType {
    fn from(arg: FrameTypeArg) -> Self {
        match arg {
            FrameTypeArg::Normal => Self::Normal,
            FrameTypeArg::Dark => Self::Dark,
            FrameTypeArg::Flood => Self::Flood,
            FrameTypeArg::RbiFlush => Self::RbiFlush,
        }
    }
}

/// libfli diagnostic output.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq, Copy)]
pub enum DebugLevelArg {
    /// Silent
    None,
    /// Failures only
    Fail,
    /// Warnings and failures
    Warn,
    /// Info, warnings and failures
    All,
    /// Everything, including transport I/O
    Io,
}

impl From<DebugLevelArg> for DebugLevel {
    fn from(arg: DebugLevelArg) -> Self {
        match arg {
            DebugLevelArg::None => Self::NONE,
            DebugLevelArg::Fail => Self::FAIL,
            DebugLevelArg::Warn => Self::WARN | Self::FAIL,
            DebugLevelArg::All => Self::ALL,
            DebugLevelArg::Io => Self::ALL | Self::IO,
        }
    }
}

/// Command-line arguments for fli-capture.
///
/// Arguments can be given on the command line or through environment
/// variables.
///
/// # Example
///
/// ```bash
/// fli-capture list
/// fli-capture capture --exposure-ms 5000 --output m42.raw
///
/// # Without hardware
/// fli-capture --simulate capture --rows --frame-type dark
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Use the built-in simulated camera instead of libfli
    #[arg(long, env = "FLI_SIMULATE")]
    pub simulate: bool,

    /// Path to libfli, overriding the configuration file
    #[arg(long, env = "FLI_LIBRARY")]
    pub library: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "FLI_CAPTURE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Interface devices are attached through
    #[arg(long, env = "FLI_TRANSPORT", default_value = "usb", value_enum)]
    pub transport: TransportArg,

    /// libfli's own diagnostic output (left unchanged when omitted)
    #[arg(long, env = "FLI_DEBUG", value_enum)]
    pub lib_debug: Option<DebugLevelArg>,

    /// Action to perform
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List attached cameras
    List,
    /// Show identity, geometry and temperatures of a camera
    Info {
        /// Device file name (first listed camera when omitted)
        #[arg(short, long, env = "FLI_DEVICE")]
        device: Option<String>,
    },
    /// Take one exposure and write the raw frame to a file
    Capture(CaptureArgs),
}

/// Options for a single exposure.
#[derive(clap::Args, Debug, Clone)]
pub struct CaptureArgs {
    /// Device file name (first listed camera when omitted)
    #[arg(short, long, env = "FLI_DEVICE")]
    pub device: Option<String>,

    /// Exposure time in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    pub exposure_ms: u64,

    /// Frame type
    #[arg(long, default_value = "normal", value_enum)]
    pub frame_type: FrameTypeArg,

    /// Horizontal binning
    #[arg(long, default_value_t = 1)]
    pub hbin: i32,

    /// Vertical binning
    #[arg(long, default_value_t = 1)]
    pub vbin: i32,

    /// Read 8-bit samples instead of 16-bit
    #[arg(long)]
    pub eight_bit: bool,

    /// Sensor region as "ul_x ul_y lr_x lr_y" (visible area when omitted)
    #[arg(long, value_delimiter = ' ', num_args = 4)]
    pub area: Option<Vec<i32>>,

    /// Cooler setpoint in degrees Celsius
    #[arg(long, allow_negative_numbers = true)]
    pub temperature: Option<f64>,

    /// Give up if the camera is not ready after this many milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Read row by row, writing each row as it arrives
    #[arg(long)]
    pub rows: bool,

    /// Output file for raw sample data
    #[arg(short, long, default_value = "frame.raw")]
    pub output: PathBuf,
}
