//! In-process host: one tokio task per match.
//!
//! Each task owns its [`MatchHandler`] and is the only caller of its entry
//! points, so the handler runs strictly serially without locks. The shared
//! table only holds labels and channel ends.
//!
//! Outbound envelopes go through a bounded broadcast ring. A presence that
//! falls more than the ring's capacity behind loses the skipped envelopes,
//! then receives the last `GameOver` (if any) and the latest full state
//! before resuming with live traffic.

use crate::directory::{LabelQuery, MatchId, MatchListing, RegistryError, SessionRegistry};
use crate::host::{
    Clock, DispatchError, Dispatcher, JoinRejection, Lifecycle, MatchData, MatchHandler, Presence,
};
use crate::message::{OpCode, PlayerMove};
use crate::mode::GameMode;
use crate::session::{MatchSession, SessionSettings};
use crate::state::{MatchLabel, UserId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

/// Default outbound buffer per match.
pub const EVENT_BUFFER: usize = 64;

/// Messages accepted from one sender between two ticks. Extras are dropped.
pub const MAX_MESSAGES_PER_SENDER_PER_TICK: usize = 8;

/// One outbound payload as seen by presences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Opcode.
    pub op_code: OpCode,
    /// JSON payload.
    pub payload: Vec<u8>,
    /// Target identities, or `None` for everyone.
    pub recipients: Option<Vec<UserId>>,
}

impl Envelope {
    /// Returns true if `user_id` should see this envelope.
    pub fn is_for(&self, user_id: &str) -> bool {
        match &self.recipients {
            Some(recipients) => recipients.iter().any(|id| id == user_id),
            None => true,
        }
    }

    /// Decodes the payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// Latest everyone-addressed envelopes, replayed to lagging presences.
#[derive(Debug, Clone, Default)]
struct Resync {
    game_over: Option<Envelope>,
    state: Option<Envelope>,
}

/// Match data collected between ticks, capped per sender.
#[derive(Debug)]
struct InboundBatch {
    messages: Vec<MatchData>,
    per_sender: HashMap<UserId, usize>,
    cap: usize,
}

impl InboundBatch {
    fn new(cap: usize) -> Self {
        Self {
            messages: Vec::new(),
            per_sender: HashMap::new(),
            cap,
        }
    }

    /// Queues `data` unless its sender already used up this tick's share.
    fn push(&mut self, data: MatchData) -> bool {
        let count = self
            .per_sender
            .entry(data.sender.user_id.clone())
            .or_insert(0);
        if *count >= self.cap {
            debug!(
                user_id = %data.sender.user_id,
                cap = self.cap,
                "Dropping message over per-tick cap"
            );
            return false;
        }
        *count += 1;
        self.messages.push(data);
        true
    }

    /// Hands over the batch and resets the per-sender counts.
    fn take(&mut self) -> Vec<MatchData> {
        self.per_sender.clear();
        std::mem::take(&mut self.messages)
    }
}

#[derive(Debug)]
enum Command {
    Join {
        presence: Presence,
        reply: oneshot::Sender<Result<(), JoinRejection>>,
    },
    Leave(Presence),
    Data(MatchData),
    Signal {
        data: String,
        reply: oneshot::Sender<String>,
    },
    Terminate {
        grace_seconds: u32,
    },
}

#[derive(Debug)]
struct MatchEntry {
    label: MatchLabel,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<Envelope>,
    latest: watch::Receiver<Resync>,
}

type MatchTable = Arc<Mutex<HashMap<MatchId, MatchEntry>>>;

fn lock(table: &MatchTable) -> MutexGuard<'_, HashMap<MatchId, MatchEntry>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

struct LocalDispatcher {
    match_id: MatchId,
    table: MatchTable,
    events: broadcast::Sender<Envelope>,
    latest: watch::Sender<Resync>,
}

impl Dispatcher for LocalDispatcher {
    fn broadcast(
        &self,
        op_code: OpCode,
        payload: &[u8],
        recipients: Option<&[Presence]>,
    ) -> Result<(), DispatchError> {
        let envelope = Envelope {
            op_code,
            payload: payload.to_vec(),
            recipients: recipients.map(|ps| ps.iter().map(|p| p.user_id.clone()).collect()),
        };
        if envelope.recipients.is_none() {
            match op_code {
                OpCode::GameOver => self
                    .latest
                    .send_modify(|latest| latest.game_over = Some(envelope.clone())),
                OpCode::GameState => self
                    .latest
                    .send_modify(|latest| latest.state = Some(envelope.clone())),
                _ => {}
            }
        }
        self.events
            .send(envelope)
            .map(|_| ())
            .map_err(|_| DispatchError::NoRecipients)
    }

    fn update_label(&self, label: &MatchLabel) -> Result<(), DispatchError> {
        let mut table = lock(&self.table);
        let entry = table.get_mut(&self.match_id).ok_or(DispatchError::Closed)?;
        entry.label = label.clone();
        Ok(())
    }
}

async fn run_match<H: MatchHandler>(
    mut handler: H,
    mut commands: mpsc::UnboundedReceiver<Command>,
    dispatcher: LocalDispatcher,
) {
    let period = Duration::from_secs(1) / handler.tick_rate().max(1);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval completes immediately.
    interval.tick().await;

    let mut tick: u64 = 0;
    let mut pending = InboundBatch::new(MAX_MESSAGES_PER_SENDER_PER_TICK);

    loop {
        let lifecycle = tokio::select! {
            _ = interval.tick() => {
                tick += 1;
                let batch = pending.take();
                handler.tick(&dispatcher, tick, &batch)
            }
            command = commands.recv() => match command {
                None => {
                    debug!("Command channel closed");
                    break;
                }
                Some(Command::Join { presence, reply }) => {
                    let admission = handler.join_attempt(&presence);
                    let lifecycle = match &admission {
                        Ok(()) => handler.join(&dispatcher, std::slice::from_ref(&presence)),
                        Err(rejection) => {
                            debug!(user_id = %presence.user_id, %rejection, "Join rejected");
                            Lifecycle::Continue
                        }
                    };
                    // The caller sees the label as of after the join.
                    let _ = reply.send(admission);
                    lifecycle
                }
                Some(Command::Leave(presence)) => {
                    handler.leave(&dispatcher, std::slice::from_ref(&presence))
                }
                Some(Command::Data(data)) => {
                    pending.push(data);
                    Lifecycle::Continue
                }
                Some(Command::Signal { data, reply }) => {
                    let (lifecycle, response) = handler.signal(&dispatcher, tick, &data);
                    let _ = reply.send(response);
                    lifecycle
                }
                Some(Command::Terminate { grace_seconds }) => {
                    handler.terminate(&dispatcher, tick, grace_seconds);
                    Lifecycle::Dispose
                }
            }
        };
        if lifecycle == Lifecycle::Dispose {
            break;
        }
    }

    lock(&dispatcher.table).remove(&dispatcher.match_id);
    info!(tick, "Match disposed");
}

/// [`SessionRegistry`] that runs matches as tokio tasks in this process.
#[derive(Debug, Clone)]
pub struct LocalRegistry {
    table: MatchTable,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    event_buffer: usize,
}

impl LocalRegistry {
    /// Creates an empty registry.
    pub fn new(settings: SessionSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            settings,
            clock,
            event_buffer: EVENT_BUFFER,
        }
    }

    /// Sets the outbound buffer of matches spawned from now on.
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    /// Registers `handler` and starts its task. Must be called inside a
    /// tokio runtime.
    pub fn spawn_match<H: MatchHandler + 'static>(&self, handler: H) -> MatchId {
        let match_id = uuid::Uuid::new_v4().to_string();
        let (commands, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(self.event_buffer);
        let (latest_tx, latest) = watch::channel(Resync::default());
        lock(&self.table).insert(
            match_id.clone(),
            MatchEntry {
                label: handler.label(),
                commands,
                events: events.clone(),
                latest,
            },
        );
        let dispatcher = LocalDispatcher {
            match_id: match_id.clone(),
            table: Arc::clone(&self.table),
            events,
            latest: latest_tx,
        };
        let span = info_span!("match", match_id = %match_id);
        tokio::spawn(run_match(handler, receiver, dispatcher).instrument(span));
        match_id
    }

    /// Number of running matches.
    pub fn match_count(&self) -> usize {
        lock(&self.table).len()
    }

    /// Current label of a running match.
    pub fn label(&self, match_id: &str) -> Option<MatchLabel> {
        lock(&self.table).get(match_id).map(|entry| entry.label.clone())
    }

    fn snapshot(&self, query: &LabelQuery, limit: usize) -> Vec<MatchListing> {
        let table = lock(&self.table);
        let mut listings: Vec<MatchListing> = table
            .iter()
            .filter(|(_, entry)| query.matches(&entry.label))
            .map(|(id, entry)| MatchListing::new(id.clone(), entry.label.clone()))
            .collect();
        listings.sort_by(|a, b| a.match_id.cmp(&b.match_id));
        listings.truncate(limit);
        listings
    }

    fn commands(&self, match_id: &str) -> Result<mpsc::UnboundedSender<Command>, RegistryError> {
        lock(&self.table)
            .get(match_id)
            .map(|entry| entry.commands.clone())
            .ok_or_else(|| RegistryError::NotFound(match_id.to_string()))
    }

    /// Attaches `presence` to a match.
    #[instrument(skip(self), fields(user_id = %presence.user_id))]
    pub async fn join(&self, match_id: &str, presence: Presence) -> Result<PresenceHandle, RegistryError> {
        let (commands, events, latest) = {
            let table = lock(&self.table);
            let entry = table
                .get(match_id)
                .ok_or_else(|| RegistryError::NotFound(match_id.to_string()))?;
            (
                entry.commands.clone(),
                entry.events.subscribe(),
                entry.latest.clone(),
            )
        };
        let (reply, admission) = oneshot::channel();
        commands
            .send(Command::Join {
                presence: presence.clone(),
                reply,
            })
            .map_err(|_| RegistryError::Closed(match_id.to_string()))?;
        match admission.await {
            Ok(Ok(())) => {
                info!("Presence attached");
                Ok(PresenceHandle {
                    presence,
                    match_id: match_id.to_string(),
                    commands,
                    events,
                    latest,
                    backlog: VecDeque::new(),
                    game_over_seen: false,
                    left: false,
                })
            }
            Ok(Err(rejection)) => Err(RegistryError::JoinRejected(rejection)),
            Err(_) => Err(RegistryError::Closed(match_id.to_string())),
        }
    }

    /// Sends an out-of-band signal and waits for the reply.
    pub async fn signal(&self, match_id: &str, data: &str) -> Result<String, RegistryError> {
        let (reply, response) = oneshot::channel();
        self.commands(match_id)?
            .send(Command::Signal {
                data: data.to_string(),
                reply,
            })
            .map_err(|_| RegistryError::Closed(match_id.to_string()))?;
        response
            .await
            .map_err(|_| RegistryError::Closed(match_id.to_string()))
    }

    /// Asks one match to terminate.
    pub fn terminate(&self, match_id: &str, grace_seconds: u32) -> Result<(), RegistryError> {
        self.commands(match_id)?
            .send(Command::Terminate { grace_seconds })
            .map_err(|_| RegistryError::Closed(match_id.to_string()))
    }

    /// Terminates every running match.
    #[instrument(skip(self))]
    pub fn shutdown(&self, grace_seconds: u32) {
        let table = lock(&self.table);
        info!(matches = table.len(), "Shutting down matches");
        for (match_id, entry) in table.iter() {
            if entry.commands.send(Command::Terminate { grace_seconds }).is_err() {
                warn!(%match_id, "Match already stopped");
            }
        }
    }
}

#[async_trait]
impl SessionRegistry for LocalRegistry {
    async fn list(&self, query: &LabelQuery, limit: usize) -> Result<Vec<MatchListing>, RegistryError> {
        Ok(self.snapshot(query, limit))
    }

    async fn create(&self, game_mode: GameMode) -> Result<MatchId, RegistryError> {
        let session = MatchSession::new(game_mode, self.settings, Arc::clone(&self.clock));
        Ok(self.spawn_match(session))
    }
}

/// A presence attached to a running match.
///
/// Dropping the handle detaches the presence, as [`PresenceHandle::leave`]
/// does.
#[derive(Debug)]
pub struct PresenceHandle {
    presence: Presence,
    match_id: MatchId,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Receiver<Envelope>,
    latest: watch::Receiver<Resync>,
    backlog: VecDeque<Envelope>,
    game_over_seen: bool,
    left: bool,
}

impl PresenceHandle {
    /// The attached presence.
    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// The match this handle is attached to.
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Queues raw match data for the next tick.
    pub fn send(&self, op_code: i64, data: Vec<u8>) -> Result<(), RegistryError> {
        let data = MatchData::new(self.presence.clone(), op_code, data);
        self.commands
            .send(Command::Data(data))
            .map_err(|_| RegistryError::Closed(self.match_id.clone()))
    }

    /// Queues a move for the next tick.
    pub fn send_move(&self, row: i64, col: i64) -> Result<(), RegistryError> {
        let payload = serde_json::to_vec(&PlayerMove { row, col })
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;
        self.send(OpCode::PlayerMove.code(), payload)
    }

    /// Next envelope addressed to this presence, or `None` once the match is
    /// gone.
    ///
    /// `GameOver` is yielded at most once.
    pub async fn next_event(&mut self) -> Option<Envelope> {
        loop {
            let envelope = match self.backlog.pop_front() {
                Some(envelope) => envelope,
                None => {
                    let received = self.events.recv().await;
                    match received {
                        Ok(envelope) => envelope,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(
                                user_id = %self.presence.user_id,
                                skipped,
                                "Presence lagging, resyncing"
                            );
                            self.resync();
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            };
            if !envelope.is_for(&self.presence.user_id) {
                continue;
            }
            if envelope.op_code == OpCode::GameOver {
                if self.game_over_seen {
                    continue;
                }
                self.game_over_seen = true;
            }
            return Some(envelope);
        }
    }

    // Skips to live traffic and queues the latest outcome and state.
    fn resync(&mut self) {
        self.events = self.events.resubscribe();
        let latest = self.latest.borrow().clone();
        self.backlog.extend(latest.game_over);
        self.backlog.extend(latest.state);
    }

    fn send_leave(&mut self) -> Result<(), RegistryError> {
        if self.left {
            return Ok(());
        }
        self.left = true;
        self.commands
            .send(Command::Leave(self.presence.clone()))
            .map_err(|_| RegistryError::Closed(self.match_id.clone()))
    }

    /// Detaches from the match.
    pub fn leave(mut self) -> Result<(), RegistryError> {
        self.send_leave()
    }
}

impl Drop for PresenceHandle {
    fn drop(&mut self) {
        if self.send_leave().is_err() {
            debug!(
                user_id = %self.presence.user_id,
                match_id = %self.match_id,
                "Match gone before leave"
            );
        }
    }
}
