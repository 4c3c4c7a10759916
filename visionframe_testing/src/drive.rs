//! In-memory WebSocket driver for a single connection pipeline.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{Message, protocol::Role},
};
use tokio_util::sync::CancellationToken;
use visionframe::{
    analysis::FrameAnalyzer,
    error::TransportError,
    pipeline::{ConnectionPipeline, PipelineReport},
    response::{AnalysisPayload, WireMessage},
    session::ConnectionId,
};

use crate::TestResult;

/// Capacity of each direction of the in-memory duplex stream.
const DUPLEX_CAPACITY: usize = 4 * 1024 * 1024;

/// How the scripted client leaves once every reply has arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ending {
    /// Perform the close handshake.
    Close,
    /// Drop the connection without a close frame.
    Disconnect,
}

/// Everything observed while driving one pipeline.
#[derive(Debug)]
pub struct PipelineRun {
    /// Every text message the server sent, in order, greeting included.
    pub messages: Vec<WireMessage>,
    /// What the pipeline returned.
    pub report: Result<PipelineReport, TransportError>,
}

impl PipelineRun {
    /// Payloads of the `image_analysis` messages, in order.
    pub fn analyses(&self) -> impl Iterator<Item = &AnalysisPayload> {
        self.messages.iter().filter_map(|m| match m {
            WireMessage::ImageAnalysis { data } => Some(data),
            _ => None,
        })
    }

    /// Texts of the `error` messages, in order.
    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().filter_map(|m| match m {
            WireMessage::Error { message } => Some(message.as_str()),
            _ => None,
        })
    }
}

/// Run `analyzer` over `frames` sent as text messages, then close cleanly.
///
/// # Errors
///
/// Propagates failures from [`drive_pipeline`].
pub async fn drive_text_frames<I, T>(analyzer: FrameAnalyzer, frames: I) -> TestResult<PipelineRun>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let messages = frames
        .into_iter()
        .map(|frame| {
            let text: String = frame.into();
            Message::text(text)
        })
        .collect();
    drive_pipeline(analyzer, messages, Ending::Close).await
}

/// Drive a pipeline with a scripted client.
///
/// All `frames` are written back to back without waiting for replies; the
/// client then reads until it has the greeting plus one reply per text or
/// binary frame, and finally leaves as `ending` says.
///
/// # Errors
///
/// Returns an error if a reply is not valid JSON or the client cannot send.
pub async fn drive_pipeline(
    analyzer: FrameAnalyzer,
    frames: Vec<Message>,
    ending: Ending,
) -> TestResult<PipelineRun> {
    let (server_io, client_io) = tokio::io::duplex(DUPLEX_CAPACITY);
    let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let client_ws = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

    let pipeline = ConnectionPipeline::new(
        ConnectionId::next(),
        server_ws,
        Arc::new(analyzer),
        CancellationToken::new(),
    );
    let server = tokio::spawn(pipeline.run());

    let expected = 1 + frames
        .iter()
        .filter(|m| m.is_text() || m.is_binary())
        .count();
    let (mut sink, mut stream) = client_ws.split();
    let writer = tokio::spawn(async move {
        for frame in frames {
            sink.send(frame).await?;
        }
        Ok::<_, tokio_tungstenite::tungstenite::Error>(sink)
    });

    let mut messages: Vec<WireMessage> = Vec::with_capacity(expected);
    while messages.len() < expected {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => messages.push(serde_json::from_str(&text)?),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
            None => break,
        }
    }

    let mut sink = writer.await??;
    match ending {
        Ending::Close => {
            sink.close().await?;
            while let Some(Ok(message)) = stream.next().await {
                if let Message::Text(text) = message {
                    messages.push(serde_json::from_str(&text)?);
                }
            }
        }
        Ending::Disconnect => drop((sink, stream)),
    }

    let report = server.await?;
    Ok(PipelineRun { messages, report })
}
