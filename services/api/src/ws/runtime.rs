//! The per-session cooperative runtime loop.
//!
//! One `tokio::select!` loop owns the entire session: the state machine, the
//! pending timeout task, the in-flight classification, and the snapshot
//! refresh. Every handler runs to completion inside the loop's task, so the
//! session state needs no locking, and teardown happens in exactly one place.
//!
//! Classification back-pressure is explicit: the server asks for one frame,
//! classifies it to completion, folds the result into the session, and only
//! then asks for the next one. A new tick can never start before the
//! previous prediction settles.

use crate::{
    state::AppState,
    ws::protocol::{ClientMessage, ServerMessage},
};
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use posecoach_core::{
    Command,
    classifier::{Classification, top_prediction},
    session::{SessionEvent, TrainerSession},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::{sync::mpsc, task::JoinHandle, time};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How often countdown and cue-progress displays are refreshed.
const SNAPSHOT_REFRESH: Duration = Duration::from_millis(200);

/// Events delivered back into the session loop by spawned tasks.
#[derive(Debug)]
enum RuntimeEvent {
    /// The in-flight classification settled.
    Classified(Result<Classification>),
    /// A timeout armed by the session expired.
    TimerFired { generation: u64 },
}

/// Milliseconds since the connection was established; the session's clock.
fn now_ms(started_at: &Instant) -> f64 {
    started_at.elapsed().as_secs_f64() * 1000.0
}

/// The main event loop for an active trainer connection.
pub async fn run_session(
    state: Arc<AppState>,
    socket: WebSocket,
    session_id: Uuid,
) -> Result<()> {
    let (mut socket_tx, mut socket_rx) = socket.split();
    let (events_tx, mut events_rx) = mpsc::channel::<RuntimeEvent>(32);

    let started_at = Instant::now();
    let mut session = TrainerSession::new(state.routine.clone());
    let mut timer_task: Option<JoinHandle<()>> = None;
    let mut classify_task: Option<JoinHandle<()>> = None;

    let mut refresh = time::interval(SNAPSHOT_REFRESH);
    refresh.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            // Results from our own spawned tasks come first so a settled
            // prediction or an expired timer is folded in before new input.
            Some(event) = events_rx.recv() => {
                match event {
                    RuntimeEvent::Classified(result) => {
                        match result {
                            Ok(classification) => {
                                if let Some(top) = top_prediction(&classification) {
                                    let event = SessionEvent::Frame {
                                        label: top.label.clone(),
                                        confidence: top.confidence,
                                    };
                                    let commands = session.handle(event, now_ms(&started_at));
                                    execute_commands(commands, &mut socket_tx, &mut timer_task, &events_tx).await?;
                                }
                            }
                            Err(e) => warn!(error = ?e, "Classification failed; dropping tick"),
                        }
                        // The tick settled: publish the result and request the
                        // next frame, unless the session stopped meanwhile.
                        if session.is_running() {
                            send_snapshot(&mut socket_tx, &session, &started_at).await?;
                            send_msg(&mut socket_tx, ServerMessage::FrameRequest).await?;
                        }
                    }
                    RuntimeEvent::TimerFired { generation } => {
                        let commands = session.handle(
                            SessionEvent::TimeoutFired { generation },
                            now_ms(&started_at),
                        );
                        execute_commands(commands, &mut socket_tx, &mut timer_task, &events_tx).await?;
                    }
                }
            },
            // Messages from the client WebSocket.
            maybe_msg = socket_rx.next() => {
                match maybe_msg {
                    Some(Ok(ws_msg)) => match ws_msg {
                        Message::Text(text) => {
                            let Ok(msg) = serde_json::from_str::<ClientMessage>(&text) else {
                                warn!("Ignoring malformed client message");
                                continue;
                            };
                            match msg {
                                ClientMessage::Start => {
                                    if session.is_running() {
                                        debug!("Ignoring start while already running");
                                        continue;
                                    }
                                    let commands = session.start(now_ms(&started_at));
                                    execute_commands(commands, &mut socket_tx, &mut timer_task, &events_tx).await?;
                                    send_msg(&mut socket_tx, ServerMessage::Started {
                                        session_id,
                                        routine: state.routine.steps().to_vec(),
                                        speed: session.speed(),
                                    }).await?;
                                    send_snapshot(&mut socket_tx, &session, &started_at).await?;
                                    send_msg(&mut socket_tx, ServerMessage::FrameRequest).await?;
                                }
                                ClientMessage::Stop => {
                                    let commands = session.stop();
                                    execute_commands(commands, &mut socket_tx, &mut timer_task, &events_tx).await?;
                                    if let Some(task) = classify_task.take() {
                                        task.abort();
                                    }
                                    send_msg(&mut socket_tx, ServerMessage::Stopped).await?;
                                    send_snapshot(&mut socket_tx, &session, &started_at).await?;
                                }
                                ClientMessage::SetSpeed { speed } => {
                                    let commands = session.handle(
                                        SessionEvent::SpeedChanged(speed),
                                        now_ms(&started_at),
                                    );
                                    execute_commands(commands, &mut socket_tx, &mut timer_task, &events_tx).await?;
                                }
                                ClientMessage::CueEnded => {
                                    let commands = session.handle(SessionEvent::CueEnded, now_ms(&started_at));
                                    execute_commands(commands, &mut socket_tx, &mut timer_task, &events_tx).await?;
                                }
                                ClientMessage::CueError { message } => {
                                    warn!(message = %message, "Client reported cue playback failure");
                                    let commands = session.handle(SessionEvent::CueFailed, now_ms(&started_at));
                                    execute_commands(commands, &mut socket_tx, &mut timer_task, &events_tx).await?;
                                }
                                ClientMessage::CueProgress { position_secs, duration_secs } => {
                                    session.handle(
                                        SessionEvent::CueProgress { position_secs, duration_secs },
                                        now_ms(&started_at),
                                    );
                                }
                            }
                        }
                        Message::Binary(frame) => {
                            if !session.is_running() {
                                debug!("Dropping frame while stopped");
                            } else if classify_task.as_ref().is_some_and(|task| !task.is_finished()) {
                                // Frames are requested one at a time; anything
                                // extra is dropped to keep ticks sequential.
                                debug!("Dropping frame while a classification is in flight");
                            } else {
                                let classifier = state.classifier.clone();
                                let events = events_tx.clone();
                                classify_task = Some(tokio::spawn(async move {
                                    let result = classifier.classify(&frame).await;
                                    let _ = events.send(RuntimeEvent::Classified(result)).await;
                                }));
                            }
                        }
                        Message::Close(_) => {
                            info!("Client sent close frame. Shutting down session.");
                            break;
                        }
                        Message::Ping(_) | Message::Pong(_) => {}
                    },
                    Some(Err(e)) => {
                        error!("Error receiving from client WebSocket: {:?}", e);
                        break;
                    }
                    None => break,
                }
            },
            // Periodic refresh of countdowns and cue progress.
            _ = refresh.tick() => {
                if session.is_running() {
                    send_snapshot(&mut socket_tx, &session, &started_at).await?;
                }
            },
        }
    }

    // Clean up background tasks on exit; the client releases the camera and
    // audio element when the socket closes.
    if let Some(task) = timer_task.take() {
        task.abort();
    }
    if let Some(task) = classify_task.take() {
        task.abort();
    }
    info!("WebSocket connection closed and trainer session terminated.");
    Ok(())
}

/// Executes the effects a session transition produced.
async fn execute_commands(
    commands: Vec<Command>,
    socket_tx: &mut SplitSink<WebSocket, Message>,
    timer_task: &mut Option<JoinHandle<()>>,
    events_tx: &mpsc::Sender<RuntimeEvent>,
) -> Result<()> {
    for command in commands {
        match command {
            Command::ArmTimeout {
                duration_ms,
                generation,
            } => {
                // The supervisor already invalidated the previous generation;
                // aborting the old task keeps at most one timer alive.
                if let Some(task) = timer_task.take() {
                    task.abort();
                }
                let events = events_tx.clone();
                *timer_task = Some(tokio::spawn(async move {
                    time::sleep(Duration::from_secs_f64(duration_ms / 1000.0)).await;
                    let _ = events.send(RuntimeEvent::TimerFired { generation }).await;
                }));
            }
            Command::DisarmTimeout => {
                if let Some(task) = timer_task.take() {
                    task.abort();
                }
            }
            Command::PlayCue { label, cue, rate } => {
                send_msg(socket_tx, ServerMessage::PlayCue { label, cue, rate }).await?;
            }
            Command::SetCueRate { rate } => {
                send_msg(socket_tx, ServerMessage::SetCueRate { rate }).await?;
            }
            Command::RoutineComplete => {
                send_msg(socket_tx, ServerMessage::Complete).await?;
            }
        }
    }
    Ok(())
}

async fn send_snapshot(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    session: &TrainerSession,
    started_at: &Instant,
) -> Result<()> {
    send_msg(
        socket_tx,
        ServerMessage::Snapshot {
            state: session.snapshot(now_ms(started_at)),
        },
    )
    .await
}

/// A helper function to serialize and send a `ServerMessage` to the client.
async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
