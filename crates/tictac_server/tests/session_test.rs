//! Match session state machine tests, driven with a recording dispatcher and
//! a manual clock.

use std::cell::RefCell;
use std::sync::Arc;
use tictac_server::{
    DispatchError, Dispatcher, EndReason, GameMode, GameOver, JoinRejection, Lifecycle,
    ManualClock, Mark, MatchData, MatchHandler, MatchLabel, MatchSession, MatchState, MatchStatus,
    OpCode, Presence, SessionSettings,
};

const START: i64 = 1_700_000_000;

#[derive(Debug, Clone)]
struct Sent {
    op_code: OpCode,
    payload: Vec<u8>,
    recipients: Option<Vec<String>>,
}

#[derive(Default)]
struct RecordingDispatcher {
    sent: RefCell<Vec<Sent>>,
    labels: RefCell<Vec<MatchLabel>>,
}

impl Dispatcher for RecordingDispatcher {
    fn broadcast(
        &self,
        op_code: OpCode,
        payload: &[u8],
        recipients: Option<&[Presence]>,
    ) -> Result<(), DispatchError> {
        self.sent.borrow_mut().push(Sent {
            op_code,
            payload: payload.to_vec(),
            recipients: recipients.map(|ps| ps.iter().map(|p| p.user_id.clone()).collect()),
        });
        Ok(())
    }

    fn update_label(&self, label: &MatchLabel) -> Result<(), DispatchError> {
        self.labels.borrow_mut().push(label.clone());
        Ok(())
    }
}

impl RecordingDispatcher {
    fn ops(&self) -> Vec<OpCode> {
        self.sent.borrow().iter().map(|s| s.op_code).collect()
    }

    fn last_game_over(&self) -> Option<GameOver> {
        self.sent
            .borrow()
            .iter()
            .rev()
            .find(|s| s.op_code == OpCode::GameOver)
            .map(|s| serde_json::from_slice(&s.payload).unwrap())
    }

    fn last_label(&self) -> MatchLabel {
        self.labels.borrow().last().cloned().unwrap()
    }

    fn clear(&self) {
        self.sent.borrow_mut().clear();
        self.labels.borrow_mut().clear();
    }
}

fn alice() -> Presence {
    Presence::new("user-alice".to_string(), "alice".to_string())
}

fn bob() -> Presence {
    Presence::new("user-bob".to_string(), "bob".to_string())
}

fn mv(sender: &Presence, row: i64, col: i64) -> MatchData {
    let data = serde_json::to_vec(&serde_json::json!({"row": row, "col": col})).unwrap();
    MatchData::new(sender.clone(), OpCode::PlayerMove.code(), data)
}

fn new_session(mode: GameMode) -> (MatchSession, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START));
    let session = MatchSession::new(mode, SessionSettings::default(), clock.clone());
    (session, clock)
}

fn active_session(dispatcher: &RecordingDispatcher) -> (MatchSession, Arc<ManualClock>) {
    let (mut session, clock) = new_session(GameMode::Standard);
    session.join(dispatcher, &[alice()]);
    session.join(dispatcher, &[bob()]);
    dispatcher.clear();
    (session, clock)
}

fn turn(state: &MatchState) -> Option<&str> {
    state.current_turn().map(String::as_str)
}

#[test]
fn test_init_is_waiting() {
    let (session, _) = new_session(GameMode::Blitz);
    let state = session.state();
    assert_eq!(state.status(), MatchStatus::Waiting);
    assert_eq!(state.turn_time_limit(), 15);
    assert_eq!(state.turn_start_time(), START);
    assert!(state.players().is_empty());
    assert_eq!(session.tick_rate(), 1);
}

#[test]
fn test_join_activates_on_second_player() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, _) = new_session(GameMode::Standard);

    assert_eq!(session.join(&dispatcher, &[alice()]), Lifecycle::Continue);
    assert_eq!(session.state().status(), MatchStatus::Waiting);
    assert_eq!(
        dispatcher.last_label(),
        MatchLabel::new(MatchStatus::Waiting, 1, GameMode::Standard)
    );
    {
        let sent = dispatcher.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].op_code, OpCode::GameState);
        assert_eq!(sent[0].recipients, Some(vec!["user-alice".to_string()]));
    }

    session.join(&dispatcher, &[bob()]);
    let state = session.state();
    assert_eq!(state.status(), MatchStatus::Active);
    assert_eq!(turn(state), Some("user-alice"));
    assert_eq!(state.player("user-alice").unwrap().symbol, Mark::X);
    assert_eq!(state.player("user-bob").unwrap().symbol, Mark::O);
    assert_eq!(
        dispatcher.last_label(),
        MatchLabel::new(MatchStatus::Active, 2, GameMode::Standard)
    );
    let last = dispatcher.sent.borrow().last().cloned().unwrap();
    assert_eq!(last.op_code, OpCode::GameState);
    assert_eq!(last.recipients, None);
}

#[test]
fn test_join_attempt_admission() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, _) = new_session(GameMode::Standard);
    assert_eq!(session.join_attempt(&alice()), Ok(()));
    session.join(&dispatcher, &[alice()]);
    assert_eq!(session.join_attempt(&alice()), Err(JoinRejection::AlreadyJoined));
    session.join(&dispatcher, &[bob()]);

    let carol = Presence::new("user-carol".to_string(), "carol".to_string());
    assert_eq!(session.join_attempt(&carol), Err(JoinRejection::MatchFull));
    assert_eq!(session.state().players().len(), 2);
}

#[test]
fn test_in_progress_rejection_after_leave() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, _) = active_session(&dispatcher);
    session.leave(&dispatcher, &[bob()]);
    let carol = Presence::new("user-carol".to_string(), "carol".to_string());
    assert_eq!(session.join_attempt(&carol), Err(JoinRejection::InProgress));
}

#[test]
fn test_row_win_for_x() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, _) = active_session(&dispatcher);
    let (a, b) = (alice(), bob());

    session.tick(
        &dispatcher,
        1,
        &[mv(&a, 0, 0), mv(&b, 1, 0), mv(&a, 0, 1), mv(&b, 1, 1), mv(&a, 0, 2)],
    );

    let state = session.state();
    assert_eq!(state.status(), MatchStatus::Finished);
    assert_eq!(state.winner().map(String::as_str), Some("user-alice"));
    assert_eq!(state.move_count(), 5);

    let over = dispatcher.last_game_over().unwrap();
    assert_eq!(over.reason, EndReason::Victory);
    assert_eq!(over.winner.unwrap().user_id, "user-alice");
    assert_eq!(over.loser.unwrap().user_id, "user-bob");

    let ops = dispatcher.ops();
    let tail = &ops[ops.len() - 2..];
    assert_eq!(tail, &[OpCode::GameOver, OpCode::GameState]);
    assert_eq!(dispatcher.last_label().status, MatchStatus::Finished);
}

#[test]
fn test_full_board_draw() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, _) = active_session(&dispatcher);
    let (a, b) = (alice(), bob());

    // X O X / X O O / O X X
    let moves = [
        mv(&a, 0, 0),
        mv(&b, 0, 1),
        mv(&a, 0, 2),
        mv(&b, 1, 1),
        mv(&a, 1, 0),
        mv(&b, 1, 2),
        mv(&a, 2, 1),
        mv(&b, 2, 0),
        mv(&a, 2, 2),
    ];
    session.tick(&dispatcher, 1, &moves);

    let state = session.state();
    assert_eq!(state.status(), MatchStatus::Finished);
    assert_eq!(state.winner(), None);
    assert_eq!(state.move_count(), 9);

    let over = dispatcher.last_game_over().unwrap();
    assert_eq!(over.reason, EndReason::Draw);
    assert!(over.winner.is_none());
}

#[test]
fn test_turn_alternates_after_each_move() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, clock) = active_session(&dispatcher);
    let (a, b) = (alice(), bob());

    clock.advance(3);
    session.tick(&dispatcher, 1, &[mv(&a, 1, 1)]);
    assert_eq!(turn(session.state()), Some("user-bob"));
    assert_eq!(session.state().turn_start_time(), START + 3);

    session.tick(&dispatcher, 2, &[mv(&b, 0, 0)]);
    assert_eq!(turn(session.state()), Some("user-alice"));
    assert_eq!(dispatcher.ops(), vec![OpCode::GameState, OpCode::GameState]);
}

#[test]
fn test_invalid_moves_are_dropped_and_idempotent() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, _) = active_session(&dispatcher);
    let (a, b) = (alice(), bob());

    session.tick(&dispatcher, 1, &[mv(&a, 1, 1)]);
    let before = session.state().clone();
    dispatcher.clear();

    let stale = mv(&a, 0, 0);
    let occupied = mv(&b, 1, 1);
    let out_of_range = mv(&b, 3, -1);
    let garbage = MatchData::new(b.clone(), OpCode::PlayerMove.code(), b"not json".to_vec());
    let wrong_op = MatchData::new(b.clone(), 42, b"{}".to_vec());
    let stranger = mv(
        &Presence::new("user-eve".to_string(), "eve".to_string()),
        2,
        2,
    );

    for _ in 0..2 {
        session.tick(
            &dispatcher,
            2,
            &[
                stale.clone(),
                occupied.clone(),
                out_of_range.clone(),
                garbage.clone(),
                wrong_op.clone(),
                stranger.clone(),
            ],
        );
        assert_eq!(session.state(), &before);
    }
    assert!(dispatcher.ops().is_empty());
}

#[test]
fn test_timeout_fires_at_limit_not_before() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, clock) = active_session(&dispatcher);

    clock.advance(29);
    session.tick(&dispatcher, 29, &[]);
    assert_eq!(session.state().status(), MatchStatus::Active);

    clock.advance(1);
    session.tick(&dispatcher, 30, &[mv(&alice(), 0, 0)]);
    let state = session.state();
    assert_eq!(state.status(), MatchStatus::Finished);
    assert_eq!(state.winner().map(String::as_str), Some("user-bob"));
    assert_eq!(state.move_count(), 0);

    let over = dispatcher.last_game_over().unwrap();
    assert_eq!(over.reason, EndReason::Timeout);
    assert_eq!(over.loser.unwrap().user_id, "user-alice");
}

#[test]
fn test_blitz_timeout_uses_short_clock() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, clock) = new_session(GameMode::Blitz);
    session.join(&dispatcher, &[alice(), bob()]);
    assert_eq!(session.state().status(), MatchStatus::Active);

    clock.advance(15);
    session.tick(&dispatcher, 1, &[]);
    assert_eq!(session.state().status(), MatchStatus::Finished);
}

#[test]
fn test_leave_during_active_game_awards_remaining_player() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, _) = active_session(&dispatcher);

    let lifecycle = session.leave(&dispatcher, &[alice()]);
    assert_eq!(lifecycle, Lifecycle::Dispose);

    let state = session.state();
    assert_eq!(state.status(), MatchStatus::Finished);
    assert_eq!(state.winner().map(String::as_str), Some("user-bob"));

    let over = dispatcher.last_game_over().unwrap();
    assert_eq!(over.reason, EndReason::PlayerLeft);
    assert_eq!(over.winner.unwrap().user_id, "user-bob");
    assert_eq!(over.loser.unwrap().user_id, "user-alice");
    assert_eq!(dispatcher.last_label().status, MatchStatus::Finished);
}

#[test]
fn test_leave_while_waiting_keeps_match_open() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, _) = new_session(GameMode::Standard);
    session.join(&dispatcher, &[alice()]);

    assert_eq!(session.leave(&dispatcher, &[alice()]), Lifecycle::Continue);
    assert_eq!(session.state().status(), MatchStatus::Waiting);
    assert_eq!(
        dispatcher.last_label(),
        MatchLabel::new(MatchStatus::Waiting, 0, GameMode::Standard)
    );

    session.join(&dispatcher, &[bob()]);
    assert_eq!(session.state().player("user-bob").unwrap().symbol, Mark::X);
}

#[test]
fn test_finished_match_lingers_then_disposes() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, clock) = active_session(&dispatcher);

    clock.advance(30);
    assert_eq!(session.tick(&dispatcher, 10, &[]), Lifecycle::Continue);
    assert_eq!(session.state().linger_until(), Some(15));

    for tick in 11..15 {
        assert_eq!(session.tick(&dispatcher, tick, &[]), Lifecycle::Continue);
    }
    assert_eq!(session.tick(&dispatcher, 15, &[]), Lifecycle::Dispose);
}

#[test]
fn test_terminate_and_signal_keep_state() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, _) = active_session(&dispatcher);
    let before = session.state().clone();

    assert_eq!(session.terminate(&dispatcher, 4, 10), Lifecycle::Continue);
    let (lifecycle, reply) = session.signal(&dispatcher, 4, "ping");
    assert_eq!(lifecycle, Lifecycle::Continue);
    assert!(reply.is_empty());
    assert_eq!(session.state(), &before);
}

#[test]
fn test_extra_presences_in_one_batch_are_ignored() {
    let dispatcher = RecordingDispatcher::default();
    let (mut session, _) = new_session(GameMode::Standard);
    let carol = Presence::new("user-carol".to_string(), "carol".to_string());
    session.join(&dispatcher, &[alice(), bob(), carol]);
    assert_eq!(session.state().players().len(), 2);
    assert!(session.state().player("user-carol").is_none());
}
