//! Tests for `FrameServer` over real loopback TCP connections.

use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use rstest::rstest;
use serial_test::serial;
use tokio::time::timeout;
use tokio_tungstenite::{
    MaybeTlsStream,
    WebSocketStream,
    connect_async,
    tungstenite::{self, Message, http::StatusCode},
};
use visionframe::{
    analysis::FrameAnalyzer,
    pipeline::active_connection_count,
    response::{AnalysisPayload, WireMessage},
    server::FrameServer,
};
use visionframe_testing::{
    LoggerHandle,
    PanickingDetector,
    TestResult,
    TestServer,
    logger,
    people,
    png_data_url,
};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const STEP: Duration = Duration::from_secs(5);

async fn next_message(client: &mut Client) -> TestResult<WireMessage> {
    loop {
        let message = timeout(STEP, client.next())
            .await?
            .ok_or("connection closed")??;
        if let Message::Text(text) = message {
            return Ok(serde_json::from_str(&text)?);
        }
    }
}

async fn connect(server: &TestServer) -> TestResult<Client> {
    let (mut client, _) = connect_async(server.url()).await?;
    assert_eq!(next_message(&mut client).await?, WireMessage::greeting());
    Ok(client)
}

#[tokio::test]
async fn client_receives_greeting_and_analysis() -> TestResult {
    let server = TestServer::start(FrameServer::new(FrameAnalyzer::image_summary()).workers(2)).await?;
    let mut client = connect(&server).await?;

    client.send(Message::text(png_data_url(12, 7))).await?;
    let WireMessage::ImageAnalysis { data } = next_message(&mut client).await? else {
        return Err("expected image_analysis".into());
    };
    assert!(matches!(
        data,
        AnalysisPayload::Image { width: 12, height: 7, channels: 3, success: true, .. }
    ));

    client.close(None).await?;
    server.shutdown().await
}

#[tokio::test]
async fn oversized_frame_only_ends_its_own_connection() -> TestResult {
    let server = TestServer::start(
        FrameServer::new(FrameAnalyzer::image_summary()).max_message_size(4096),
    )
    .await?;
    let mut bystander = connect(&server).await?;
    let mut offender = connect(&server).await?;

    offender.send(Message::text("A".repeat(10_000))).await?;
    loop {
        match timeout(STEP, offender.next()).await? {
            Some(Ok(Message::Close(_)) | Err(_)) | None => break,
            Some(Ok(_)) => {}
        }
    }

    bystander.send(Message::text(png_data_url(3, 2))).await?;
    let WireMessage::ImageAnalysis { data } = next_message(&mut bystander).await? else {
        return Err("expected image_analysis".into());
    };
    assert!(matches!(data, AnalysisPayload::Image { width: 3, height: 2, success: true, .. }));

    bystander.close(None).await?;
    server.shutdown().await
}

#[tokio::test]
async fn unknown_path_is_refused_with_404() -> TestResult {
    let server = TestServer::start(FrameServer::new(FrameAnalyzer::image_summary()).path("/stream")).await?;

    match connect_async(server.url_for("/ws")).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
        other => return Err(format!("expected 404, got {:?}", other.map(|_| ())).into()),
    }

    let client = connect(&server).await?;
    drop(client);
    server.shutdown().await
}

#[tokio::test]
async fn connections_are_independent() -> TestResult {
    let analyzer = FrameAnalyzer::people_detection(Arc::new(people(2)));
    let server = TestServer::start(FrameServer::new(analyzer)).await?;
    let mut first = connect(&server).await?;
    let mut second = connect(&server).await?;

    first.send(Message::text("garbage")).await?;
    second.send(Message::text(png_data_url(5, 5))).await?;

    let WireMessage::ImageAnalysis { data: bad } = next_message(&mut first).await? else {
        return Err("expected image_analysis on first".into());
    };
    let WireMessage::ImageAnalysis { data: good } = next_message(&mut second).await? else {
        return Err("expected image_analysis on second".into());
    };
    assert!(bad.error().is_some());
    assert_eq!(good, AnalysisPayload::People {
        people_count: 2,
        error: None
    });

    first.close(None).await?;
    second.close(None).await?;
    server.shutdown().await
}

#[tokio::test]
async fn shutdown_closes_open_connections() -> TestResult {
    let server = TestServer::start(FrameServer::new(FrameAnalyzer::image_summary())).await?;
    let mut client = connect(&server).await?;

    let shutdown = tokio::spawn(server.shutdown());
    let closing = timeout(STEP, client.next()).await?;
    assert!(
        matches!(closing, Some(Ok(Message::Close(_))) | None),
        "expected close, got {closing:?}"
    );
    timeout(STEP, shutdown).await???;
    Ok(())
}

#[tokio::test]
async fn server_survives_a_panicking_detector() -> TestResult {
    let analyzer = FrameAnalyzer::people_detection(Arc::new(PanickingDetector("boom")));
    let server = TestServer::start(FrameServer::new(analyzer)).await?;
    let mut client = connect(&server).await?;

    for _ in 0..2 {
        client.send(Message::text(png_data_url(3, 3))).await?;
        assert_eq!(
            next_message(&mut client).await?,
            WireMessage::processing_error("boom")
        );
    }
    client.close(None).await?;

    let again = connect(&server).await?;
    drop(again);
    server.shutdown().await
}

#[rstest]
#[tokio::test]
#[serial]
async fn connection_lifecycle_is_logged(mut logger: LoggerHandle) -> TestResult {
    let server = TestServer::start(FrameServer::new(FrameAnalyzer::image_summary())).await?;
    let mut client = connect(&server).await?;
    assert!(active_connection_count() >= 1);
    client.close(None).await?;
    while timeout(STEP, client.next()).await?.is_some() {}
    server.shutdown().await?;

    let messages = logger.messages();
    assert!(
        messages.iter().any(|m| m.contains("websocket client connected")),
        "missing connect log in {messages:?}"
    );
    assert!(messages.iter().any(|m| m.contains("connection closed")));
    Ok(())
}
