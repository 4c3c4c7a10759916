//! `visionframe` server binary.
//!
//! Parses CLI arguments, installs logging and (optionally) the Prometheus
//! exporter, loads the detector once, and serves until Ctrl-C.

mod cli;

use std::{error::Error, sync::Arc, time::Duration};

use clap::Parser;
use cli::{Cli, LogLevel, Mode};
use tracing::level_filters::LevelFilter;
use visionframe::{analysis::FrameAnalyzer, detect::Detector, server::FrameServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(level_filter(cli.log_level))
        .init();

    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "prometheus exporter listening");
    }
    #[cfg(not(feature = "metrics"))]
    if cli.metrics_addr.is_some() {
        tracing::warn!("--metrics-addr ignored: built without the `metrics` feature");
    }

    let analyzer = build_analyzer(&cli)?;
    tracing::info!(mode = ?cli.mode, variant = analyzer.variant().name(), "analyzer ready");

    let mut server = FrameServer::new(analyzer)
        .path(&cli.path)
        .max_message_size(cli.max_message_size)
        .handshake_timeout(Duration::from_millis(cli.handshake_timeout_ms));
    if let Some(workers) = cli.workers {
        server = server.workers(workers);
    }
    server.bind(cli.bind)?.run().await?;
    Ok(())
}

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    }
}

fn build_analyzer(cli: &Cli) -> Result<FrameAnalyzer, Box<dyn Error>> {
    match cli.mode {
        Mode::Analyze => Ok(FrameAnalyzer::image_summary()),
        Mode::Detect => Ok(FrameAnalyzer::people_detection(load_detector(cli)?)),
    }
}

#[cfg(feature = "onnx")]
fn load_detector(cli: &Cli) -> Result<Arc<dyn Detector>, Box<dyn Error>> {
    use visionframe::detect::onnx::{OnnxDetectorConfig, OnnxPersonDetector};

    let model = cli.model.as_ref().ok_or("--mode detect requires --model")?;
    let config = OnnxDetectorConfig {
        confidence: cli.confidence,
        iou: cli.iou,
        ..OnnxDetectorConfig::default()
    };
    Ok(Arc::new(OnnxPersonDetector::load(model, config)?))
}

#[cfg(not(feature = "onnx"))]
fn load_detector(_cli: &Cli) -> Result<Arc<dyn Detector>, Box<dyn Error>> {
    Err("--mode detect needs a binary built with the `onnx` feature".into())
}
