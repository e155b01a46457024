use std::{convert::Infallible, future::pending, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::room::RoomRepository,
    dto::sse::ServerEvent,
    error::ServiceError,
    services::{
        client_state_machine::{ClientStateMachine, Navigator, Screen},
        sse_events,
        turn_coordinator::{self, CountdownEvent, CountdownHandle},
    },
    state::{
        SharedState,
        room::{GameStatus, Room},
        session::SessionState,
    },
};

/// Navigator of a streaming client: remembers where the client was sent and
/// queues the redirects that still have to go out on the wire.
#[derive(Default)]
struct StreamNavigator {
    current: Option<Screen>,
    pending: Vec<Screen>,
}

impl StreamNavigator {
    fn take_pending(&mut self) -> Vec<Screen> {
        std::mem::take(&mut self.pending)
    }
}

impl Navigator for StreamNavigator {
    fn current(&self) -> Option<&Screen> {
        self.current.as_ref()
    }

    fn navigate(&mut self, screen: Screen) {
        self.pending.push(screen.clone());
        self.current = Some(screen);
    }
}

/// Open the event stream of room `code` for the client holding `session`.
///
/// Each connection runs its own redirect controller and its own countdown;
/// hand-off announcements are shared through the room hub.
pub async fn room_stream(
    state: SharedState,
    code: String,
    session: SessionState,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    let mut hub_receiver = state.room_hub(&code).subscribe();
    let mut machine = ClientStateMachine::new(
        session,
        StreamNavigator::default(),
        state.config().mount_fallback,
    );
    let (mut subscription, room) = machine.mount(state.rooms()).await?;

    let rooms = state.rooms().clone();
    let scale_factor = state.config().danger_scale_factor;
    let stream_id = Uuid::new_v4().simple().to_string();
    info!(room = %code, stream = %stream_id, "room SSE stream mounted");

    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(16);

    tokio::spawn(async move {
        let mut countdown = sync_countdown(None, &rooms, room.as_ref(), scale_factor);
        let mut outgoing = snapshot_events(room.as_ref(), machine.navigator_mut().take_pending());

        'stream: loop {
            for payload in outgoing.drain(..) {
                if tx.send(Ok(to_event(payload))).await.is_err() {
                    break 'stream;
                }
            }

            tokio::select! {
                _ = tx.closed() => break,
                snapshot = subscription.next() => {
                    let Some(snapshot) = snapshot else { break };
                    // Undecodable snapshots were already logged.
                    let Ok(room) = machine.observe_snapshot(snapshot) else { continue };
                    countdown = sync_countdown(countdown, &rooms, room.as_ref(), scale_factor);
                    outgoing = snapshot_events(room.as_ref(), machine.navigator_mut().take_pending());
                }
                Some(event) = next_countdown(&mut countdown) => {
                    outgoing.extend(sse_events::countdown_event(event));
                }
                received = hub_receiver.recv() => {
                    match received {
                        Ok(payload) => outgoing.push(payload),
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(room = %code, skipped, "room stream lagging; dropping hand-off events");
                        }
                    }
                }
            }
        }

        info!(room = %code, stream = %stream_id, "room SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

/// Room snapshot followed by the redirects it caused.
fn snapshot_events(room: Option<&Room>, redirects: Vec<Screen>) -> Vec<ServerEvent> {
    sse_events::room_event(room)
        .into_iter()
        .chain(redirects.iter().filter_map(sse_events::redirect_event))
        .collect()
}

/// Keep, replace or stop the countdown so it tracks the running round's clock.
fn sync_countdown(
    current: Option<CountdownHandle>,
    rooms: &RoomRepository,
    room: Option<&Room>,
    scale_factor: f32,
) -> Option<CountdownHandle> {
    let running = room.filter(|room| room.game_status() == Some(GameStatus::Running));
    let ends_at = running.and_then(|room| room.game.as_ref()).and_then(|game| game.ends_at);
    match (current, running, ends_at) {
        (Some(handle), _, Some(ends_at)) if handle.ends_at_ms() == ends_at => Some(handle),
        (_, Some(room), Some(_)) => match turn_coordinator::start_countdown(rooms.clone(), room, scale_factor) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(room = %room.code, error = %err, "cannot start countdown");
                None
            }
        },
        _ => None,
    }
}

async fn next_countdown(countdown: &mut Option<CountdownHandle>) -> Option<CountdownEvent> {
    match countdown {
        Some(handle) => handle.next().await,
        None => pending().await,
    }
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}
