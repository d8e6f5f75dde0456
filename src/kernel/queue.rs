//! Priority-ordered, bounded event buffer shared by every producer and the
//! orchestrator loop.
//!
//! One `VecDeque` per priority band, each kept in arrival order, so
//! "highest band first, FIFO inside a band" is the whole selection rule.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::event::{Event, EventKind, Priority};
use crate::error::QueueError;

/// Counters are cumulative for the queue's lifetime. Per-band arrays are
/// indexed by `Priority::band()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub len: usize,
    pub capacity: usize,
    pub pushed: u64,
    pub popped: u64,
    /// Buffered events evicted to admit a more urgent one.
    pub evicted: [u64; 4],
    /// Incoming events refused because the queue was full.
    pub refused: [u64; 4],
    pub rejected_closed: u64,
    /// Removed by the interruption protocol.
    pub purged: u64,
    pub discarded_on_close: u64,
    pub closed: bool,
}

impl QueueStats {
    pub fn dropped_total(&self) -> u64 {
        self.evicted.iter().sum::<u64>()
            + self.refused.iter().sum::<u64>()
            + self.rejected_closed
            + self.purged
            + self.discarded_on_close
    }
}

#[derive(Debug, Default)]
struct Bands {
    bands: [VecDeque<Event>; 4],
    len: usize,
    closed: bool,
    stats: QueueStats,
}

impl Bands {
    fn pop_highest(&mut self) -> Option<Event> {
        let event = self.bands.iter_mut().find_map(|band| band.pop_front())?;
        self.len -= 1;
        self.stats.popped += 1;
        Some(event)
    }

    /// Lowest band that currently holds anything.
    fn lowest_occupied(&self) -> Option<Priority> {
        Priority::DESCENDING
            .iter()
            .rev()
            .copied()
            .find(|p| !self.bands[p.band()].is_empty())
    }

    /// SHUTDOWN is always admitted: evict the oldest non-shutdown event of
    /// the lowest band holding one, CRITICAL included. False when only
    /// shutdowns are buffered.
    fn evict_for_shutdown(&mut self) -> bool {
        for priority in Priority::DESCENDING.iter().rev() {
            let band = &mut self.bands[priority.band()];
            if let Some(pos) = band.iter().position(|e| e.kind() != EventKind::Shutdown) {
                band.remove(pos);
                self.len -= 1;
                self.stats.evicted[priority.band()] += 1;
                return true;
            }
        }
        false
    }

    fn insert(&mut self, event: Event) {
        let band = &mut self.bands[event.priority().band()];
        // Producers almost always push in order, so this is a push_back.
        let pos = band
            .iter()
            .rposition(|queued| queued.precedes(&event))
            .map_or(0, |i| i + 1);
        band.insert(pos, event);
        self.len += 1;
        self.stats.pushed += 1;
    }
}

#[derive(Debug)]
pub struct EventQueue {
    capacity: usize,
    inner: Mutex<Bands>,
    available: Notify,
    speech: Notify,
    speech_arrivals: AtomicU64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        info!("Event queue initialized with capacity {}", capacity);
        Self {
            capacity,
            inner: Mutex::new(Bands::default()),
            available: Notify::new(),
            speech: Notify::new(),
            speech_arrivals: AtomicU64::new(0),
        }
    }

    // Every critical section leaves `Bands` consistent, so a poisoned lock
    // still guards valid data.
    fn lock(&self) -> MutexGuard<'_, Bands> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit an event, evicting the oldest event of the lowest band when full.
    ///
    /// The incoming event is refused when it does not strictly outrank that
    /// band. CRITICAL events are never evicted, except to make room for
    /// SHUTDOWN, which is always admitted.
    pub fn push(&self, event: Event) -> Result<(), QueueError> {
        let kind = event.kind();
        let priority = event.priority();

        {
            let mut inner = self.lock();
            if inner.closed {
                inner.stats.rejected_closed += 1;
                warn!("Queue closed, refused {:?} from {}", kind, event.source());
                return Err(QueueError::Closed { kind });
            }

            if inner.len >= self.capacity && kind == EventKind::Shutdown {
                if !inner.evict_for_shutdown() {
                    // Only shutdowns are buffered; one is enough.
                    inner.stats.refused[priority.band()] += 1;
                    info!("Queue full of shutdown requests, not queuing another");
                    return Ok(());
                }
                warn!(
                    "Queue full ({}): evicted the oldest event to admit shutdown",
                    self.capacity
                );
            } else if inner.len >= self.capacity {
                let lowest = inner.lowest_occupied();
                match lowest {
                    Some(lowest) if lowest != Priority::Critical && priority > lowest => {
                        if let Some(victim) = inner.bands[lowest.band()].pop_front() {
                            inner.len -= 1;
                            inner.stats.evicted[lowest.band()] += 1;
                            warn!(
                                "Queue full ({}): evicted {:?} ({:?}) for incoming {:?} ({:?}), {} evicted so far",
                                self.capacity,
                                victim.kind(),
                                lowest,
                                kind,
                                priority,
                                inner.stats.evicted.iter().sum::<u64>()
                            );
                        }
                    }
                    _ => {
                        inner.stats.refused[priority.band()] += 1;
                        warn!(
                            "Queue full ({}): dropped incoming {:?} ({:?}), {} refused so far",
                            self.capacity,
                            kind,
                            priority,
                            inner.stats.refused.iter().sum::<u64>()
                        );
                        return Err(QueueError::Overflow {
                            kind,
                            priority,
                            capacity: self.capacity,
                        });
                    }
                }
            }

            debug!("Event queued: {:?} ({:?}) from {}", kind, priority, event.source());
            inner.insert(event);
        }

        if kind == EventKind::StreamerSpeech {
            self.speech_arrivals.fetch_add(1, Ordering::SeqCst);
            self.speech.notify_waiters();
        }
        self.available.notify_one();
        Ok(())
    }

    /// Highest-priority, earliest event. Suspends while empty; returns `None`
    /// once the queue has been closed.
    pub async fn pop(&self) -> Option<Event> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if inner.closed {
                    return None;
                }
                if let Some(event) = inner.pop_highest() {
                    return Some(event);
                }
            }

            notified.await;
        }
    }

    pub fn try_pop(&self) -> Option<Event> {
        let mut inner = self.lock();
        if inner.closed {
            return None;
        }
        inner.pop_highest()
    }

    /// Refuse further pushes, discard what is buffered and release every
    /// suspended `pop()`. Returns the number of discarded events.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut inner = self.lock();
            if inner.closed {
                return 0;
            }
            inner.closed = true;
            let discarded = inner.len;
            for band in inner.bands.iter_mut() {
                band.clear();
            }
            inner.len = 0;
            inner.stats.discarded_on_close += discarded as u64;
            discarded
        };

        if discarded > 0 {
            warn!("Queue closed with {} buffered events discarded", discarded);
        } else {
            info!("Queue closed");
        }
        self.available.notify_waiters();
        discarded
    }

    /// Remove sheddable (MEDIUM/LOW) events that arrived strictly before
    /// `cutoff` and match `stale`. CRITICAL/HIGH bands are untouched.
    pub fn purge_before<F>(&self, cutoff: &Event, stale: F) -> usize
    where
        F: Fn(&Event) -> bool,
    {
        let mut inner = self.lock();
        let mut removed = 0;
        for priority in Priority::DESCENDING.into_iter().filter(|p| p.is_sheddable()) {
            let band = &mut inner.bands[priority.band()];
            let before = band.len();
            band.retain(|queued| !(queued.precedes(cutoff) && stale(queued)));
            removed += before - band.len();
        }
        inner.len -= removed;
        inner.stats.purged += removed as u64;
        removed
    }

    /// Whether anything strictly more urgent than `priority` is buffered.
    pub fn has_pending_above(&self, priority: Priority) -> bool {
        let inner = self.lock();
        Priority::DESCENDING
            .iter()
            .take_while(|p| **p > priority)
            .any(|p| !inner.bands[p.band()].is_empty())
    }

    /// Number of STREAMER_SPEECH events ever admitted.
    pub fn speech_arrivals(&self) -> u64 {
        self.speech_arrivals.load(Ordering::SeqCst)
    }

    /// Resolves once a STREAMER_SPEECH event is admitted after `seen`
    /// arrivals had been observed.
    pub async fn speech_since(&self, seen: u64) {
        loop {
            let notified = self.speech.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.speech_arrivals() != seen {
                return;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.lock();
        QueueStats {
            len: inner.len,
            capacity: self.capacity,
            closed: inner.closed,
            ..inner.stats.clone()
        }
    }
}
