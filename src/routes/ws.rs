//! WebSocket upgrade + message loop. Every connected client receives the
//! shared broadcast event stream; client messages are parsed as JSON and
//! dispatched, with per-connection replies (pong, snapshots, errors) funneled
//! through the same writer task that owns the sink half.

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
  info!(target: "chemroll_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: AppState) {
  let conn = Uuid::new_v4();
  info!(target: "chemroll_backend", %conn, "WebSocket connected");

  let (mut sink, mut stream) = socket.split();
  let (direct_tx, mut direct_rx) = mpsc::channel::<ServerWsMessage>(16);
  let mut events = state.subscribe();

  // One writer owns the sink; broadcast events and direct replies merge here.
  let mut send_task = tokio::spawn(async move {
    loop {
      let msg = tokio::select! {
        event = events.recv() => match event {
          Ok(msg) => msg,
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!(target: "chemroll_backend", %conn, skipped, "WS client lagged behind the event stream");
            continue;
          }
          Err(broadcast::error::RecvError::Closed) => break,
        },
        reply = direct_rx.recv() => match reply {
          Some(msg) => msg,
          None => break,
        },
      };
      let out = match serde_json::to_string(&msg) {
        Ok(out) => out,
        Err(e) => {
          error!(target: "chemroll_backend", %conn, error = %e, "WS serialization error");
          continue;
        }
      };
      if sink.send(Message::Text(out)).await.is_err() {
        break;
      }
    }
  });

  let recv_state = state.clone();
  let mut recv_task = tokio::spawn(async move {
    while let Some(Ok(msg)) = stream.next().await {
      match msg {
        Message::Text(txt) => {
          let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(incoming) => {
              debug!(target: "chemroll_backend", %conn, "WS received: {:?}", &incoming);
              handle_client_ws(incoming, &recv_state).await
            }
            Err(e) => Some(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }),
          };
          if let Some(reply) = reply {
            if direct_tx.send(reply).await.is_err() {
              break;
            }
          }
        }
        Message::Close(_) => break,
        _ => {}
      }
    }
  });

  tokio::select! {
    _ = &mut send_task => recv_task.abort(),
    _ = &mut recv_task => send_task.abort(),
  }
  info!(target: "chemroll_backend", %conn, "WebSocket disconnected");
}

/// Dispatch one client message. `None` means any visible effect arrives via
/// the broadcast stream instead of a direct reply; guard-rejected game
/// actions are silently ignored apart from a debug log.
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> Option<ServerWsMessage> {
  match msg {
    ClientWsMessage::Ping => Some(ServerWsMessage::Pong),

    ClientWsMessage::GetState => {
      Some(ServerWsMessage::GameState { state: state.game_snapshot().await })
    }

    ClientWsMessage::SelectStudent { student_id } => {
      match state.select_student(student_id).await {
        Ok(()) => None,
        Err(e) => Some(ServerWsMessage::Error { message: e.to_string() }),
      }
    }

    ClientWsMessage::SetDiceCount { num_dice } => {
      state.set_dice_count(num_dice).await;
      None
    }

    ClientWsMessage::Roll => {
      let out = logic::do_roll(state).await;
      if !out.started {
        debug!(target: "game", "WS roll ignored by turn guards");
      }
      None
    }

    ClientWsMessage::SubmitAnswer { answer } => {
      let out = logic::do_submit_answer(state, &answer).await;
      if !out.accepted {
        debug!(target: "game", "WS answer ignored by turn guards");
      }
      None
    }
  }
}
