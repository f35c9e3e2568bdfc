use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State, TypedHeader,
    },
    headers::{authorization::Bearer, Authorization},
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::engine::delivery::Outlet;
use crate::engine::Engine;
use crate::errors::CustomError;
use crate::models::board::Coord;
use crate::models::message::{Inbound, OutboundEnvelope};
use crate::{check_access, AppState};

// The identity a socket announced itself as.
struct Session {
    user: String,
    connection: u64,
}

//handler upgrading a request to the real-time channel. The bearer token decides
//which user the socket may announce itself as.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    let user_name = check_access(&state, &bearer).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_name)))
}

async fn handle_socket(socket: WebSocket, state: AppState, authorized: String) {
    info!("User {} connected via WebSocket", authorized);
    let (mut sink, mut stream) = socket.split();
    let (outlet, mut outbox) = mpsc::unbounded_channel::<OutboundEnvelope>();

    // Everything for this socket goes through the channel, so the hub and the
    // reader never touch the sink directly.
    let writer = tokio::spawn(async move {
        while let Some(envelope) = outbox.recv().await {
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(err) => {
                    error!("Could not encode {}: {:?}", envelope.body.kind(), err);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut session: Option<Session> = None;
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_text(&state.engine, &outlet, &authorized, &mut session, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("WebSocket error: {:?}", err);
                break;
            }
        }
    }

    if let Some(session) = session {
        state.engine.hub().disconnect(&session.user, session.connection);
    }
    // Once the hub has let go of its clone, the writer flushes what is queued and stops.
    drop(outlet);
    let _ = writer.await;
    info!("User {} disconnected", authorized);
}

fn reject(outlet: &Outlet, user: &str, err: CustomError) {
    let _ = outlet.send(OutboundEnvelope { user_id: user.to_string(), body: err.into() });
}

async fn handle_text(engine: &Engine, outlet: &Outlet, authorized: &str, session: &mut Option<Session>, text: &str) {
    debug!("Received: {}", text);
    let bound = session.as_ref().map(|s| s.user.clone()).unwrap_or_default();

    let (user, inbound) = match Inbound::parse(text) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("Unparseable message: {}", text);
            reject(outlet, &bound, err);
            return;
        }
    };

    if inbound == Inbound::ConnectAnnounce {
        if user != authorized {
            warn!("Socket of {} announced itself as {}", authorized, user);
            return reject(outlet, &user, CustomError::NotAuthorized);
        }
        match session {
            Some(s) if s.user == user => return,
            Some(_) => return reject(outlet, &user, CustomError::NotAuthorized),
            None => {}
        }
        match engine.hub().connect(&user, outlet.clone()).await {
            Ok(connection) => *session = Some(Session { user, connection }),
            Err(err) => {
                error!("Could not replay pending messages for {}: {:?}", user, err);
                reject(outlet, &user, CustomError::InvalidInput);
            }
        }
        return;
    }

    if bound != user {
        warn!("Message for {} on a socket bound to {:?}", user, bound);
        return reject(outlet, &user, CustomError::NotAuthorized);
    }

    if let Err(err) = handle_inbound(engine, &user, inbound).await {
        info!("Request of {} rejected: {}", user, err);
        if let Err(err) = engine.hub().notify(&user, err.into()).await {
            error!("Could not report error to {}: {:?}", user, err);
        }
    }
}

/// Routes one decoded message from `user` into the engine.
pub async fn handle_inbound(engine: &Engine, user: &str, inbound: Inbound) -> Result<(), CustomError> {
    match inbound {
        Inbound::ConnectAnnounce => Ok(()),
        Inbound::SubmitFleet(fleet) => engine.submit_fleet(user, fleet.game_id, fleet.ships).await,
        Inbound::SubmitFleetAutogenerateRequest(game) => engine.autogenerate_fleet(user, game.game_id).await,
        Inbound::SubmitShot(shot) => engine.submit_shot(user, shot.game_id, Coord::new(shot.x, shot.y)).await,
        Inbound::SubmitShotAuto(game) => engine.submit_auto_shot(user, game.game_id).await,
        Inbound::StateRequest(request) => {
            if let Some(view) = engine.current_view(user, request.game_id).await? {
                engine.hub().reply(user, view).await;
            }
            Ok(())
        }
    }
}
