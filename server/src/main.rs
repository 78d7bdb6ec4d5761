use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use parenmaren_protocol::*;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

mod game;

use game::{GameError, LeaveOutcome, NewPlayer, Registry, StartRules, ThreadRngDice};

// ==== knobs ====
const HOST_MUST_START: bool = true; // only the host can press "Start game"
const MIN_PLAYERS_TO_START: usize = 2; // lobby size required before starting

pub(crate) type Tx = mpsc::UnboundedSender<ServerToClient>;

#[derive(Clone)]
struct AppState {
    inner: Arc<Mutex<Registry>>,
}

/// Which room and player this connection is bound to. Transport session
/// state, deliberately kept out of the engine.
#[derive(Default)]
struct Session {
    room: Option<String>,
    player: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rules = StartRules {
        host_only: HOST_MUST_START,
        min_players: MIN_PLAYERS_TO_START,
    };
    let state = AppState {
        inner: Arc::new(Mutex::new(Registry::new(rules, Box::new(ThreadRngDice)))),
    };
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(state.clone());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9001);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!("server listening on ws://{addr}/ws");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx_out, mut rx_out) = mpsc::unbounded_channel::<ServerToClient>();

    tokio::spawn(async move {
        while let Some(msg) = rx_out.recv().await {
            let text = serde_json::to_string(&msg).unwrap();
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let conn_id = Uuid::new_v4();
    let _ = tx_out.send(ServerToClient::Hello { your_id: conn_id });

    let mut session = Session::default();

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(t) => {
                if let Ok(cmd) = serde_json::from_str::<ClientToServer>(&t) {
                    route_cmd(cmd, &state, &mut session, conn_id, &tx_out);
                } else {
                    let _ = tx_out.send(ServerToClient::Error {
                        message: "bad json".into(),
                    });
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Reached on Close and on abrupt stream end alike. The player keeps
    // their turn slot and score; only `connected` flips.
    if let (Some(room), Some(player)) = (&session.room, &session.player) {
        let updated = state.inner.lock().handle_disconnect(room, player).is_some();
        if updated {
            eprintln!("[DISCONNECT] room={} player={}", room, player);
            broadcast_room(&state, room);
        }
    }
}

fn route_cmd(
    cmd: ClientToServer,
    state: &AppState,
    session: &mut Session,
    conn_id: Uuid,
    tx_out: &Tx,
) {
    eprintln!("[WS] from {} → {:?}", &conn_id.to_string()[..8], cmd);

    match cmd {
        ClientToServer::Join {
            room,
            player_id,
            name,
            create_if_missing,
        } => {
            if room.is_empty() || player_id.is_empty() {
                let _ = tx_out.send(ServerToClient::Error {
                    message: "room and player_id are required".into(),
                });
                return;
            }
            let result = state.inner.lock().join_or_create(
                &room,
                NewPlayer {
                    id: player_id.clone(),
                    name,
                    tx: tx_out.clone(),
                },
                create_if_missing,
            );
            match result {
                Ok(snapshot) => {
                    session.room = Some(room.clone());
                    session.player = Some(player_id);
                    let _ = tx_out.send(ServerToClient::Joined { snapshot });
                    log_room("JOIN", state, &room);
                    broadcast_room(state, &room);
                }
                Err(e) => send_err(tx_out, e),
            }
        }
        ClientToServer::StartGame => {
            let Some((room, player)) = session_ctx(session, tx_out) else {
                return;
            };
            let result = state.inner.lock().start_game(&room, &player);
            match result {
                Ok(snapshot) => {
                    eprintln!(
                        "[START] room={} by={} players={}",
                        room,
                        player,
                        snapshot.players.len()
                    );
                    broadcast_room(state, &room);
                }
                Err(e) => send_err(tx_out, e),
            }
        }
        ClientToServer::RollDice { faces } => {
            let Some((room, player)) = session_ctx(session, tx_out) else {
                return;
            };
            let faces = faces.unwrap_or(DEFAULT_FACES);
            let result = state.inner.lock().roll_dice(&room, &player, faces);
            match result {
                Ok(outcome) => {
                    eprintln!(
                        "[ROLL] room={} player={} rolled={} dice={:?}",
                        room, player, outcome.last, outcome.snapshot.dice
                    );
                    let _ = tx_out.send(ServerToClient::Rolled {
                        last: outcome.last,
                        dice: outcome.snapshot.dice.clone(),
                        can_paren_maren: outcome.snapshot.can_paren_maren,
                    });
                    broadcast_room(state, &room);
                }
                Err(e) => send_err(tx_out, e),
            }
        }
        ClientToServer::RollParenMaren { faces } => {
            let Some((room, player)) = session_ctx(session, tx_out) else {
                return;
            };
            let faces = faces.unwrap_or(DEFAULT_FACES);
            let result = state.inner.lock().roll_paren_maren(&room, &player, faces);
            match result {
                Ok(outcome) => {
                    eprintln!(
                        "[PAREN_MAREN] room={} player={} multiplier={}",
                        room, player, outcome.multiplier
                    );
                    let _ = tx_out.send(ServerToClient::ParenMaren {
                        multiplier: outcome.multiplier,
                        paren_maren_pressed: true,
                    });
                    broadcast_room(state, &room);
                }
                Err(e) => send_err(tx_out, e),
            }
        }
        ClientToServer::EndTurn => {
            let Some((room, player)) = session_ctx(session, tx_out) else {
                return;
            };
            let result = state.inner.lock().end_turn(&room, &player);
            match result {
                Ok(outcome) => {
                    eprintln!(
                        "[TURN] room={} player={} gained={} score={} phase={}",
                        room, player, outcome.gained, outcome.score, outcome.snapshot.phase
                    );
                    let _ = tx_out.send(ServerToClient::TurnEnded {
                        gained: outcome.gained,
                        score: outcome.score,
                    });
                    broadcast_room(state, &room);
                }
                Err(e) => send_err(tx_out, e),
            }
        }
        ClientToServer::Leave => {
            let Some((room, player)) = session_ctx(session, tx_out) else {
                return;
            };
            let result = state.inner.lock().leave_room(&room, &player);
            match result {
                Ok(LeaveOutcome::Updated(_)) => {
                    eprintln!("[LEAVE] room={} player={}", room, player);
                    let _ = tx_out.send(ServerToClient::Info {
                        message: format!("left room {room}"),
                    });
                    broadcast_room(state, &room);
                }
                Ok(LeaveOutcome::Deleted) => {
                    eprintln!("[LEAVE] room={} deleted (last player left)", room);
                    let _ = tx_out.send(ServerToClient::RoomDeleted);
                }
                Err(e) => send_err(tx_out, e),
            }
            session.room = None;
            session.player = None;
        }
    }
}

fn session_ctx(session: &Session, tx_out: &Tx) -> Option<(String, String)> {
    match (&session.room, &session.player) {
        (Some(r), Some(p)) => Some((r.clone(), p.clone())),
        _ => {
            let _ = tx_out.send(ServerToClient::Error {
                message: "join a room first".into(),
            });
            None
        }
    }
}

fn send_err(tx_out: &Tx, err: GameError) {
    eprintln!("[server validation] {err}");
    let _ = tx_out.send(ServerToClient::Error {
        message: err.to_string(),
    });
}

/* ---------------- snapshot broadcast ---------------- */

fn with_room<F: FnOnce(&game::Room)>(state: &AppState, room: &str, f: F) {
    let registry = state.inner.lock();
    if let Some(r) = registry.room(room) {
        f(r);
    }
}

fn broadcast_room(state: &AppState, room: &str) {
    with_room(state, room, |r| {
        let snapshot = r.snapshot();
        eprintln!(
            "[BROADCAST] room={} phase={} turn_index={} dice={:?} players={}",
            r.id,
            r.phase,
            r.turn_index,
            r.dice,
            r.players.len()
        );
        for p in r.players.values() {
            if p.tx
                .send(ServerToClient::RoomUpdated {
                    snapshot: snapshot.clone(),
                })
                .is_err()
            {
                eprintln!("[BROADCAST] failed to send to player={}", p.id);
            }
        }
    });
}

fn log_room(prefix: &str, state: &AppState, room: &str) {
    with_room(state, room, |r| {
        let names: Vec<String> = r
            .turn_order
            .iter()
            .filter_map(|id| r.players.get(id))
            .map(|p| format!("{}({})", p.name, p.id))
            .collect();
        eprintln!("[{prefix}] room={} players={}", r.id, names.join(", "));
    });
}
