//! Command line interface for the `visionframe` server binary.
//!
//! Shared with the build script, which renders a man page from it, so this
//! file depends on nothing but `clap` and `std`.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, ValueEnum};

/// Analysis applied to every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Count people with an ONNX person detector (requires `--model`).
    Detect,
    /// Report width, height, channels, format, and byte size.
    Analyze,
}

/// Maximum log level emitted by the binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Command line arguments for the `visionframe` binary.
#[derive(Debug, Parser)]
#[command(
    name = "visionframe",
    version,
    about = "Streaming image-analysis server: send base64 frames over a WebSocket, get one JSON \
             result per frame"
)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Accept-loop worker tasks (defaults to the number of CPUs).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Request path accepted for the WebSocket upgrade.
    #[arg(long, default_value = "/ws")]
    pub path: String,

    /// Analysis applied to every frame.
    #[arg(long, value_enum, default_value_t = Mode::Analyze)]
    pub mode: Mode,

    /// YOLOv8 ONNX export used by `--mode detect`.
    #[arg(long, required_if_eq("mode", "detect"))]
    pub model: Option<PathBuf>,

    /// Minimum detection confidence.
    #[arg(long, default_value_t = 0.25, value_parser = parse_unit_interval)]
    pub confidence: f32,

    /// IoU threshold for non-maximum suppression.
    #[arg(long, default_value_t = 0.45, value_parser = parse_unit_interval)]
    pub iou: f32,

    /// Largest accepted inbound message in bytes.
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    pub max_message_size: usize,

    /// Time a client has to complete the WebSocket upgrade, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub handshake_timeout_ms: u64,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Maximum log level.
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
}

fn parse_unit_interval(value: &str) -> Result<f32, String> {
    let parsed: f32 = value.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(format!("{parsed} is outside 0.0..=1.0"))
    }
}
