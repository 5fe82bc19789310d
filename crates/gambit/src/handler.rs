//! Per-connection handler: authentication, then event forwarding.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `authenticate` → verify the token
//!   2. Send `authenticated` → attach the peer to the session actor
//!   3. Loop: receive frames → decode → forward to the actor
//!
//! Outbound events travel the other way through the peer's outbox and a
//! writer task, so a slow receive never holds up a broadcast.

use std::sync::Arc;

use gambit_protocol::{ClientEvent, Codec, Identity, ProtocolError, ServerEvent, codes};
use gambit_session::{AuthVerifier, authenticate};
use gambit_transport::{Connection, ConnectionId, TransportError, WebSocketConnection};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::GambitError;
use crate::actor::{Command, CommandSender};
use crate::server::Shared;

/// Tells the actor the connection is gone when the handler exits.
///
/// This runs even if the handler panics or returns early with an error.
struct SessionGuard {
    conn: ConnectionId,
    commands: CommandSender,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Disconnect { conn: self.conn });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    shared: Arc<Shared<A, C>>,
) -> Result<(), GambitError>
where
    A: AuthVerifier,
    C: Codec,
{
    let conn_id = conn.id();
    debug!(%conn_id, "handling new connection");

    let identity = match perform_auth(&conn, &shared).await {
        Ok(identity) => identity,
        Err(e) => {
            let _ = conn.close().await;
            return Err(e);
        }
    };
    info!(%conn_id, identity = %identity, "peer authenticated");

    let conn = Arc::new(conn);
    let (outbox, mut events) = mpsc::unbounded_channel::<ServerEvent>();
    shared
        .commands
        .send(Command::Attach {
            conn: conn_id,
            identity,
            outbox: outbox.clone(),
        })
        .map_err(|_| GambitError::ActorStopped)?;
    let guard = SessionGuard {
        conn: conn_id,
        commands: shared.commands.clone(),
    };

    // The actor drops its copy of the outbox on disconnect, which ends
    // this task once the handler's copy is gone too.
    let writer = {
        let conn = Arc::clone(&conn);
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let frame = match shared.codec.encode(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!(%conn_id, error = %e, "failed to encode event");
                        continue;
                    }
                };
                if let Err(e) = conn.send(&frame).await {
                    debug!(%conn_id, error = %e, "send failed");
                    break;
                }
            }
            let _ = conn.close().await;
        })
    };

    loop {
        let data = match tokio::time::timeout(shared.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                info!(%conn_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                debug!(%conn_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                info!(%conn_id, "connection idle, closing");
                break;
            }
        };

        let event: ClientEvent = match shared.codec.decode(&data) {
            Ok(event) => event,
            Err(e) => {
                debug!(%conn_id, error = %e, "failed to decode event");
                let _ = outbox.send(ServerEvent::error(
                    codes::BAD_REQUEST,
                    format!("invalid event: {e}"),
                ));
                continue;
            }
        };

        if shared
            .commands
            .send(Command::Event {
                conn: conn_id,
                event,
            })
            .is_err()
        {
            return Err(GambitError::ActorStopped);
        }
    }

    drop(outbox);
    drop(guard);
    let _ = writer.await;
    Ok(())
}

/// Receives the first frame, which must be `authenticate`, and verifies
/// its token. Answers with `authenticated` either way.
async fn perform_auth<A, C>(
    conn: &WebSocketConnection,
    shared: &Shared<A, C>,
) -> Result<Identity, GambitError>
where
    A: AuthVerifier,
    C: Codec,
{
    let data = match tokio::time::timeout(shared.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(TransportError::ConnectionClosed("before authenticating".into()).into());
        }
        Ok(Err(e)) => return Err(GambitError::Transport(e)),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("authentication timed out".into()).into());
        }
    };

    let token = match shared.codec.decode::<ClientEvent>(&data) {
        Ok(ClientEvent::Authenticate { token }) => token,
        Ok(other) => {
            let reply = ServerEvent::error(codes::BAD_REQUEST, "first event must be authenticate");
            send(conn, &shared.codec, &reply).await?;
            return Err(ProtocolError::InvalidMessage(format!(
                "expected authenticate, got {}",
                other.name()
            ))
            .into());
        }
        Err(e) => {
            let reply = ServerEvent::error(codes::BAD_REQUEST, format!("invalid event: {e}"));
            send(conn, &shared.codec, &reply).await?;
            return Err(e.into());
        }
    };

    match authenticate(&shared.auth, &token).await {
        Ok(authenticated) => {
            let reply = ServerEvent::Authenticated {
                success: true,
                error: None,
                identity: Some(authenticated.identity.clone()),
            };
            send(conn, &shared.codec, &reply).await?;
            Ok(authenticated.identity)
        }
        Err(e) => {
            let reply = ServerEvent::Authenticated {
                success: false,
                error: Some(e.to_string()),
                identity: None,
            };
            send(conn, &shared.codec, &reply).await?;
            Err(e.into())
        }
    }
}

async fn send(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    event: &ServerEvent,
) -> Result<(), GambitError> {
    let frame = codec.encode(event)?;
    conn.send(&frame).await?;
    Ok(())
}
