//! WebSocket side of the annotation channel
//!
//! Outbound events are forwarded as JSON. Inbound messages are
//! [`InboundEvent`]s; a bare text frame is taken as a verdict.

use crate::pipeline::PipelineHandle;
use crate::routes::AppState;
use activestream_core::{InboundEvent, OutboundEvent};
use activestream_ingest::KeywordRequest;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.pipeline.bus.subscribe();
    info!(subscribers = state.pipeline.bus.subscriber_count(), "Annotation client connected");

    // Bring a fresh client up to date
    if let Some(report) = state.pipeline.board.latest() {
        if let Ok(msg) = serde_json::to_string(&OutboundEvent::StatusReport(report)) {
            let _ = sender.send(Message::Text(msg)).await;
        }
    }

    let stop = state.pipeline.stop.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = stop.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!("Failed to serialize event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Annotation client fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let pipeline = state.pipeline.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Text(text) => route_inbound(&pipeline, &text).await,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    info!("Annotation client disconnected");
}

/// Dispatch one inbound message to the annotation loop or the ingestion
/// controller
pub async fn route_inbound(pipeline: &PipelineHandle, text: &str) {
    let event = serde_json::from_str::<InboundEvent>(text)
        .unwrap_or_else(|_| InboundEvent::Verdict(text.trim().to_string()));

    match event {
        InboundEvent::Verdict(verdict) => {
            debug!(verdict = %verdict, "Verdict received");
            pipeline.verdicts.publish(verdict);
        }
        InboundEvent::AddKeyword { word } => {
            forward_keyword(pipeline, KeywordRequest::add(word)).await;
        }
        InboundEvent::RemoveKeyword { word } => {
            forward_keyword(pipeline, KeywordRequest::remove(word)).await;
        }
    }
}

async fn forward_keyword(pipeline: &PipelineHandle, request: KeywordRequest) {
    debug!(word = %request.word, action = ?request.action, "Keyword request received");
    if pipeline.keyword_requests.send(request).await.is_err() {
        warn!("Ingestion controller is gone, keyword request dropped");
    }
}
