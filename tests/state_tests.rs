use std::time::Duration;

use cohost::decision::types::{Action, Decision};
use cohost::kernel::event::{Event, EventId};
use cohost::kernel::state::{
    Activity, CompletionOutcome, CompletionResult, Emotion, SharedState, StateHandle,
};
use tokio::time::{advance, Instant};

fn speak(text: &str) -> Action {
    Action::from_decision(Decision::speak(text), EventId(0))
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_clears_pending_and_listens() {
    let mut state = SharedState::new(20);
    let a1 = speak("long story");
    assert_eq!(state.begin_speaking(&a1, Instant::now()), Ok(()));
    assert_eq!(state.activity(), Activity::Speaking);
    assert_eq!(state.pending_action_id(), Some(a1.id));

    advance(Duration::from_millis(300)).await;
    let cancelled = state.interrupt(Instant::now());

    // VERIFY: SPEAKING -> LISTENING, A1 handed back for cancellation
    assert_eq!(cancelled, Some(a1.id));
    assert_eq!(state.activity(), Activity::Listening);
    assert_eq!(state.pending_action_id(), None);
    assert_eq!(state.interruptions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_is_noop_unless_speaking() {
    let mut state = SharedState::new(20);
    let version = state.version();
    assert_eq!(state.interrupt(Instant::now()), None);
    assert_eq!(state.activity(), Activity::Idle);
    assert_eq!(state.version(), version);
}

#[tokio::test(start_paused = true)]
async fn test_stale_completion_never_changes_state() {
    let mut state = SharedState::new(20);
    let a1 = speak("first");
    state.begin_speaking(&a1, Instant::now()).unwrap();
    state.interrupt(Instant::now());

    let a2 = speak("second");
    state.begin_speaking(&a2, Instant::now()).unwrap();

    let now = Instant::now();
    let before = state.snapshot(now);
    let result = state.complete_action(a1.id, CompletionOutcome::Finished, now);

    assert_eq!(result, CompletionResult::Stale);
    assert_eq!(state.snapshot(now), before);
    assert_eq!(state.pending_action_id(), Some(a2.id));
    assert_eq!(state.stale_completions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_completion_returns_to_idle() {
    let mut state = SharedState::new(20);
    let a1 = speak("hello chat");
    state.begin_speaking(&a1, Instant::now()).unwrap();

    advance(Duration::from_secs(1)).await;
    let result = state.complete_action(a1.id, CompletionOutcome::Finished, Instant::now());

    assert_eq!(
        result,
        CompletionResult::Applied {
            activity: Activity::Idle
        }
    );
    assert_eq!(state.pending_action_id(), None);
    assert_eq!(state.completed_actions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_chat_moves_idle_to_thinking_only_without_higher_work() {
    let mut state = SharedState::new(20);
    state.merge_event(&Event::chat_message("a", "b"), true, Instant::now());
    assert_eq!(state.activity(), Activity::Idle);

    state.merge_event(&Event::chat_message("a", "b"), false, Instant::now());
    assert_eq!(state.activity(), Activity::Thinking);

    state.merge_event(&Event::tick(), false, Instant::now());
    assert_eq!(state.activity(), Activity::Thinking);
}

#[tokio::test(start_paused = true)]
async fn test_speech_merge_preempts_thinking() {
    let mut state = SharedState::new(20);
    state.merge_event(&Event::screen_change("loading"), false, Instant::now());
    assert_eq!(state.activity(), Activity::Thinking);

    state.merge_event(&Event::streamer_speech("hey"), false, Instant::now());
    assert_eq!(state.activity(), Activity::Listening);
    assert!(state.last_speaker_activity_at().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_settle_listening_window() {
    let window = Duration::from_secs(3);
    let mut state = SharedState::new(20);
    state.merge_event(&Event::streamer_speech("hey"), false, Instant::now());

    advance(Duration::from_secs(1)).await;
    state.settle(Instant::now(), window);
    assert_eq!(state.activity(), Activity::Listening);

    advance(Duration::from_secs(2)).await;
    state.settle(Instant::now(), window);
    assert_eq!(state.activity(), Activity::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_settle_never_leaves_speaking() {
    let mut state = SharedState::new(20);
    state.begin_speaking(&speak("hi"), Instant::now()).unwrap();
    advance(Duration::from_secs(60)).await;
    state.settle(Instant::now(), Duration::ZERO);
    assert_eq!(state.activity(), Activity::Speaking);
}

#[tokio::test(start_paused = true)]
async fn test_abort_action_guarded_by_id() {
    let mut state = SharedState::new(20);
    let a1 = speak("one");
    let a2 = speak("two");
    state.begin_speaking(&a1, Instant::now()).unwrap();

    assert!(!state.abort_action(a2.id));
    assert_eq!(state.activity(), Activity::Speaking);
    assert!(state.abort_action(a1.id));
    assert_eq!(state.activity(), Activity::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_second_speech_declined_while_first_in_flight() {
    let mut state = SharedState::new(20);
    let a1 = speak("one");
    let a2 = speak("two");
    state.begin_speaking(&a1, Instant::now()).unwrap();
    let version = state.version();

    assert_eq!(state.begin_speaking(&a2, Instant::now()), Err(a1.id));
    assert_eq!(state.pending_action_id(), Some(a1.id));
    assert_eq!(state.version(), version);
}

#[tokio::test(start_paused = true)]
async fn test_completion_after_speech_merge_is_stale() {
    let mut state = SharedState::new(20);
    let a1 = speak("hello chat");
    state.begin_speaking(&a1, Instant::now()).unwrap();

    // Streamer talked over us without an explicit interrupt.
    state.merge_event(&Event::streamer_speech("wait"), false, Instant::now());
    assert_eq!(state.activity(), Activity::Listening);

    let result = state.complete_action(a1.id, CompletionOutcome::Finished, Instant::now());
    assert_eq!(result, CompletionResult::Stale);
    assert_eq!(state.activity(), Activity::Listening);
    assert_eq!(state.interruptions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandon_decision_leaves_speech_alone() {
    let mut state = SharedState::new(20);
    state.begin_speaking(&speak("hi"), Instant::now()).unwrap();
    state.abandon_decision();
    assert_eq!(state.activity(), Activity::Speaking);

    let mut thinking = SharedState::new(20);
    thinking.merge_event(&Event::chat_message("a", "b"), false, Instant::now());
    thinking.abandon_decision();
    assert_eq!(thinking.activity(), Activity::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_context_is_bounded() {
    let mut state = SharedState::new(3);
    for i in 0..10 {
        state.merge_event(&Event::chat_message("a", &i.to_string()), true, Instant::now());
    }
    for _ in 0..8 {
        state.record_action(&speak("x"));
    }

    let snapshot = state.snapshot(Instant::now());
    assert_eq!(snapshot.recent_events.len(), 3);
    assert_eq!(snapshot.recent_events[2].text.as_deref(), Some("9"));
    assert_eq!(snapshot.recent_actions.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_handle_complete_wakes_settled_waiter() {
    let a1 = speak("hi");
    let mut state = SharedState::default();
    state.begin_speaking(&a1, Instant::now()).unwrap();
    let handle = StateHandle::new(state);

    let waiter = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.wait_until_settled().await })
    };
    advance(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished());

    let result = handle.complete(a1.id, CompletionOutcome::Finished);
    assert!(matches!(result, CompletionResult::Applied { .. }));
    waiter.await.unwrap();
    assert_eq!(handle.activity(), Activity::Idle);
}

#[test]
fn test_emotion_labels() {
    assert_eq!("Excited".parse::<Emotion>(), Ok(Emotion::Excited));
    assert_eq!(" angry ".parse::<Emotion>(), Ok(Emotion::Angry));
    assert!("joy".parse::<Emotion>().is_err());
    assert_eq!(Emotion::Thinking.to_string(), "thinking");
    assert_eq!(Emotion::default(), Emotion::Neutral);
}
