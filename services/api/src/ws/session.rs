//! Manages the WebSocket connection lifecycle for a lecture session.

use super::protocol::{Capabilities, ClientMessage, ServerMessage, SessionView};
use super::speech::BrowserSpeech;
use crate::state::AppState;
use anyhow::{Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, instrument, warn};
use tutor_core::session::{SessionEvent, TutorSession};
use tutor_core::speech::{SpeechOutcome, Voice};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// Waits for the `init` handshake, builds a [`TutorSession`] wired to the
/// browser's speech capabilities and then pumps messages both ways until
/// the client goes away.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", tracing::field::display(&session_id));
    info!("New WebSocket connection. Awaiting initialization...");

    let (mut socket_tx, mut socket_rx) = socket.split();

    // The first message from the client must be an `init` message.
    let init = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => parse_init(&text),
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        _ => {
            info!("Client disconnected before sending init message.");
            return;
        }
    };
    let (capabilities, voices) = match init {
        Ok(init) => init,
        Err(e) => {
            error!("Session initialization failed: {:?}", e);
            let _ = send_msg(
                &mut socket_tx,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };
    info!(?capabilities, voices = voices.len(), "Client initialized");

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let browser = Arc::new(BrowserSpeech::new(outbound_tx.clone(), capabilities, voices));
    let (session, channels) = TutorSession::new(
        state.settings.clone(),
        state.providers.clone(),
        browser.clone(),
        browser.clone(),
        state.session_options(),
    );
    let events = session.sender();

    if outbound_tx
        .send(ServerMessage::Initialized {
            snapshot: SessionView::from(session.snapshot()),
        })
        .is_err()
    {
        return;
    }

    let writer = tokio::spawn(write_outbound(socket_tx, outbound_rx).in_current_span());

    let forward_tx = outbound_tx.clone();
    let mut updates = channels.updates;
    let forwarder = tokio::spawn(
        async move {
            while let Some(update) = updates.recv().await {
                if forward_tx.send(ServerMessage::from(update)).is_err() {
                    break;
                }
            }
        }
        .in_current_span(),
    );

    let session_span = tracing::info_span!("tutor_session", %session_id);
    let runtime = tokio::spawn(session.run(channels.events).instrument(session_span));

    if let Err(e) = read_inbound(socket_rx, &browser, &events, &outbound_tx).await {
        error!(error = ?e, "Lecture session terminated with error.");
    }

    let _ = events.send(SessionEvent::Shutdown);
    if let Err(e) = runtime.await {
        warn!(error = %e, "Session runtime did not shut down cleanly");
    }
    forwarder.abort();
    writer.abort();
    info!("WebSocket connection closed and lecture session terminated.");
}

fn parse_init(text: &str) -> Result<(Capabilities, Vec<Voice>)> {
    match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Init {
            capabilities,
            voices,
        } => Ok((capabilities, voices)),
        _ => Err(anyhow!("First message must be `init`")),
    }
}

/// Routes client messages: speech reports go to the browser adapter, the
/// rest become session events.
async fn read_inbound(
    mut socket_rx: SplitStream<WebSocket>,
    browser: &BrowserSpeech,
    events: &mpsc::UnboundedSender<SessionEvent>,
    outbound: &mpsc::UnboundedSender<ServerMessage>,
) -> Result<()> {
    while let Some(msg_result) = socket_rx.next().await {
        let text = match msg_result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!("Client sent close frame. Shutting down session.");
                break;
            }
            Ok(_) => continue,
            Err(e) => return Err(anyhow!("Error receiving from client WebSocket: {e}")),
        };

        let msg = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed client message");
                let _ = outbound.send(ServerMessage::Error {
                    message: format!("Malformed message: {e}"),
                });
                continue;
            }
        };

        if let Some(event) = route(msg, browser) {
            if events.send(event).is_err() {
                break;
            }
        }
    }
    Ok(())
}

fn route(msg: ClientMessage, browser: &BrowserSpeech) -> Option<SessionEvent> {
    let event = match msg {
        ClientMessage::Init { .. } => {
            debug!("Ignoring repeated init");
            return None;
        }
        ClientMessage::VoicesChanged { voices } => {
            browser.set_voices(voices);
            return None;
        }
        ClientMessage::SpeechEnded { utterance_id } => {
            browser.resolve(utterance_id, SpeechOutcome::Completed);
            return None;
        }
        ClientMessage::SpeechError {
            utterance_id,
            error,
        } => {
            browser.resolve(utterance_id, SpeechOutcome::from_error_code(&error));
            return None;
        }
        ClientMessage::SetDraft { text } => SessionEvent::SetDraft(text),
        ClientMessage::AttachImage { data_url } => SessionEvent::AttachImage(data_url),
        ClientMessage::RemoveImage => SessionEvent::RemoveImage,
        ClientMessage::Submit => SessionEvent::Submit,
        ClientMessage::Interrupt => SessionEvent::Interrupt,
        ClientMessage::Resume => SessionEvent::Resume,
        ClientMessage::ToggleListening => SessionEvent::ToggleListening,
        ClientMessage::Transcript { text } => SessionEvent::Transcript(text),
        ClientMessage::ListeningEnded => SessionEvent::ListeningEnded,
        ClientMessage::ListeningError { error } => SessionEvent::ListeningFailed(error),
    };
    Some(event)
}

async fn write_outbound(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, msg).await {
            debug!(error = %e, "Stopped writing to client");
            break;
        }
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
