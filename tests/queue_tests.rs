use std::sync::Arc;
use std::time::Duration;

use cohost::error::QueueError;
use cohost::kernel::cancel::InterruptionPolicy;
use cohost::kernel::event::{Event, EventKind, Priority};
use cohost::kernel::queue::EventQueue;
use serde_json::json;

fn kinds(queue: &EventQueue) -> Vec<EventKind> {
    std::iter::from_fn(|| queue.try_pop()).map(|e| e.kind()).collect()
}

#[tokio::test]
async fn test_scenario_a_priority_beats_arrival() {
    let queue = EventQueue::new(10);

    queue.push(Event::tick()).unwrap();
    queue.push(Event::chat_mention("viewer", "hey cohost")).unwrap();
    queue.push(Event::streamer_speech("what do you think?")).unwrap();

    // VERIFY: CRITICAL, then HIGH, then LOW
    assert_eq!(
        kinds(&queue),
        vec![EventKind::StreamerSpeech, EventKind::ChatMention, EventKind::Tick]
    );
}

#[tokio::test]
async fn test_fifo_within_band() {
    let queue = EventQueue::new(10);
    let first = Event::chat_message("a", "one");
    let second = Event::chat_message("b", "two");
    let third = Event::screen_change("boss appears");
    let ids = [first.id(), second.id(), third.id()];

    queue.push(first).unwrap();
    queue.push(second).unwrap();
    queue.push(third).unwrap();

    let popped: Vec<_> = std::iter::from_fn(|| queue.try_pop()).map(|e| e.id()).collect();
    assert_eq!(popped, ids);
}

#[tokio::test]
async fn test_out_of_order_push_is_reordered_by_creation() {
    let queue = EventQueue::new(10);
    let older = Event::chat_message("a", "older");
    let newer = Event::chat_message("b", "newer");
    let (older_id, newer_id) = (older.id(), newer.id());

    queue.push(newer).unwrap();
    queue.push(older).unwrap();

    assert_eq!(queue.try_pop().map(|e| e.id()), Some(older_id));
    assert_eq!(queue.try_pop().map(|e| e.id()), Some(newer_id));
}

#[tokio::test]
async fn test_scenario_d_overflow_evicts_low() {
    let queue = EventQueue::new(3);
    let ticks: Vec<_> = (0..3).map(|_| Event::tick()).collect();
    let oldest = ticks[0].id();
    for tick in ticks {
        queue.push(tick).unwrap();
    }

    queue.push(Event::chat_message("viewer", "hello")).unwrap();

    // VERIFY: still at capacity, the oldest LOW is gone, MEDIUM admitted
    assert_eq!(queue.len(), 3);
    let stats = queue.stats();
    assert_eq!(stats.evicted[Priority::Low.band()], 1);

    let first = queue.try_pop().unwrap();
    assert_eq!(first.kind(), EventKind::ChatMessage);
    let rest: Vec<_> = std::iter::from_fn(|| queue.try_pop()).map(|e| e.id()).collect();
    assert_eq!(rest.len(), 2);
    assert!(!rest.contains(&oldest));
}

#[tokio::test]
async fn test_overflow_refuses_incoming_of_equal_priority() {
    let queue = EventQueue::new(2);
    queue.push(Event::chat_message("a", "1")).unwrap();
    queue.push(Event::chat_message("b", "2")).unwrap();

    let err = queue.push(Event::chat_message("c", "3")).unwrap_err();
    assert_eq!(
        err,
        QueueError::Overflow {
            kind: EventKind::ChatMessage,
            priority: Priority::Medium,
            capacity: 2
        }
    );
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.stats().refused[Priority::Medium.band()], 1);
}

#[tokio::test]
async fn test_overflow_never_keeps_lower_over_higher() {
    let queue = EventQueue::new(2);
    queue.push(Event::chat_mention("a", "1")).unwrap();
    queue.push(Event::tick()).unwrap();

    // LOW incoming against a full queue with a LOW minimum: refused.
    assert!(queue.push(Event::tick()).is_err());
    // HIGH incoming evicts the LOW, not the HIGH.
    queue.push(Event::chat_mention("b", "2")).unwrap();

    assert_eq!(kinds(&queue), vec![EventKind::ChatMention, EventKind::ChatMention]);
}

#[tokio::test]
async fn test_critical_never_evicted() {
    let queue = EventQueue::new(2);
    queue.push(Event::streamer_speech("one")).unwrap();
    queue.push(Event::streamer_speech("two")).unwrap();

    assert!(matches!(
        queue.push(Event::streamer_speech("three")),
        Err(QueueError::Overflow { .. })
    ));
    assert!(queue.push(Event::chat_mention("viewer", "hi")).is_err());

    let stats = queue.stats();
    assert_eq!(stats.evicted, [0; 4]);
    assert_eq!(stats.refused[Priority::Critical.band()], 1);
    assert_eq!(stats.refused[Priority::High.band()], 1);
    assert_eq!(stats.dropped_total(), 2);
}

#[tokio::test]
async fn test_shutdown_admitted_into_queue_full_of_critical() {
    let queue = EventQueue::new(2);
    queue.push(Event::streamer_speech("one")).unwrap();
    queue.push(Event::streamer_speech("two")).unwrap();

    queue.push(Event::shutdown("signal")).unwrap();

    // VERIFY: oldest speech made room, capacity held
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.stats().evicted[Priority::Critical.band()], 1);
    let popped: Vec<_> = std::iter::from_fn(|| queue.try_pop()).collect();
    assert_eq!(popped[0].text(), Some("two"));
    assert_eq!(popped[1].kind(), EventKind::Shutdown);
}

#[tokio::test]
async fn test_shutdown_evicts_lowest_band_first() {
    let queue = EventQueue::new(2);
    queue.push(Event::streamer_speech("one")).unwrap();
    queue.push(Event::tick()).unwrap();

    queue.push(Event::shutdown("signal")).unwrap();

    assert_eq!(kinds(&queue), vec![EventKind::StreamerSpeech, EventKind::Shutdown]);
    assert_eq!(queue.stats().evicted[Priority::Low.band()], 1);
}

#[tokio::test]
async fn test_repeated_shutdown_into_full_queue_is_not_an_error() {
    let queue = EventQueue::new(1);
    queue.push(Event::shutdown("quit")).unwrap();

    assert!(queue.push(Event::shutdown("signal")).is_ok());
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.stats().refused[Priority::Critical.band()], 1);
}

#[tokio::test]
async fn test_capacity_never_exceeded_under_flood() {
    let queue = EventQueue::new(5);
    for i in 0..200 {
        let event = match i % 4 {
            0 => Event::tick(),
            1 => Event::chat_message("flood", "spam"),
            2 => Event::chat_mention("flood", "spam"),
            _ => Event::screen_change("flicker"),
        };
        let _ = queue.push(event);
        assert!(queue.len() <= 5);
    }

    let stats = queue.stats();
    assert_eq!(stats.pushed - stats.evicted.iter().sum::<u64>(), 5);
    // HIGH outranks everything else in the flood, so only mentions survive.
    assert!(kinds(&queue).iter().all(|k| *k == EventKind::ChatMention));
}

#[tokio::test]
async fn test_pop_suspends_until_push() {
    let queue = Arc::new(EventQueue::new(4));

    let popper = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.pop().await.map(|e| e.kind()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!popper.is_finished());

    queue.push(Event::screen_change("menu")).unwrap();
    let kind = tokio::time::timeout(Duration::from_secs(1), popper)
        .await
        .expect("pop should resume")
        .unwrap();
    assert_eq!(kind, Some(EventKind::ScreenChange));
}

#[tokio::test]
async fn test_close_releases_pop_and_refuses_push() {
    let queue = Arc::new(EventQueue::new(4));
    let popper = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.pop().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(queue.close(), 0);
    let popped = tokio::time::timeout(Duration::from_secs(1), popper)
        .await
        .expect("close should wake pop")
        .unwrap();
    assert!(popped.is_none());

    assert_eq!(
        queue.push(Event::tick()),
        Err(QueueError::Closed {
            kind: EventKind::Tick
        })
    );
    assert!(queue.is_closed());
    assert_eq!(queue.stats().rejected_closed, 1);
}

#[tokio::test]
async fn test_close_discards_buffered_events() {
    let queue = EventQueue::new(4);
    queue.push(Event::tick()).unwrap();
    queue.push(Event::chat_mention("a", "b")).unwrap();

    assert_eq!(queue.close(), 2);
    assert!(queue.pop().await.is_none());
    assert_eq!(queue.stats().discarded_on_close, 2);
    assert_eq!(queue.close(), 0);
}

#[tokio::test]
async fn test_purge_before_keeps_urgent_and_later_events() {
    let queue = EventQueue::new(10);
    queue.push(Event::tick()).unwrap();
    queue.push(Event::chat_message("a", "old chat")).unwrap();
    queue.push(Event::chat_mention("b", "old mention")).unwrap();
    let speech = Event::streamer_speech("hold on");
    let later = Event::chat_message("c", "new chat");
    queue.push(later).unwrap();

    let purged = queue.purge_before(&speech, InterruptionPolicy::is_stale_after_speech);

    assert_eq!(purged, 2);
    assert_eq!(kinds(&queue), vec![EventKind::ChatMention, EventKind::ChatMessage]);
    assert_eq!(queue.stats().purged, 2);
}

#[tokio::test]
async fn test_has_pending_above() {
    let queue = EventQueue::new(10);
    queue.push(Event::tick()).unwrap();
    assert!(!queue.has_pending_above(Priority::Medium));

    queue.push(Event::chat_mention("a", "b")).unwrap();
    assert!(queue.has_pending_above(Priority::Medium));
    assert!(!queue.has_pending_above(Priority::High));
}

#[tokio::test]
async fn test_producer_priority_override() {
    let queue = EventQueue::new(10);
    queue.push(Event::tick()).unwrap();
    queue
        .push(Event::with_priority(
            EventKind::ScreenChange,
            Priority::High,
            "vision",
            json!({ "text": "boss defeated" }),
        ))
        .unwrap();

    let first = queue.try_pop().unwrap();
    assert_eq!(first.kind(), EventKind::ScreenChange);
    assert_eq!(first.priority(), Priority::High);
}

#[tokio::test]
async fn test_speech_arrivals_counted() {
    let queue = EventQueue::new(10);
    let seen = queue.speech_arrivals();
    queue.push(Event::chat_message("a", "b")).unwrap();
    assert_eq!(queue.speech_arrivals(), seen);

    queue.push(Event::streamer_speech("hi")).unwrap();
    tokio::time::timeout(Duration::from_secs(1), queue.speech_since(seen))
        .await
        .expect("speech arrival should resolve");
}
