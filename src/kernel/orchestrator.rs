//! The control loop. One task owns this struct and serializes every state
//! mutation except the completion path.
//!
//! Per iteration: pop, (interrupt), merge, decide, dispatch, settle.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, timeout_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cancel::InterruptionPolicy;
use super::event::{Event, EventKind};
use super::lifecycle::{Phase, PhaseGraph, PhaseRequest};
use super::queue::{EventQueue, QueueStats};
use super::scheduler::{Scheduler, SideEffect};
use super::state::{Emotion, SharedState, StateHandle};
use super::telemetry::event::{DecisionOutcome, DropReason, TelemetryEvent};
use super::telemetry::metrics::TelemetrySnapshot;
use super::telemetry::recorder::TelemetryRecorder;
use crate::config::CohostConfig;
use crate::decision::gateway::{DecisionGateway, DecisionService};
use crate::decision::rate_limit::RateLimiter;
use crate::decision::types::{Action, ActionId};
use crate::error::{DecisionFailure, QueueError};
use crate::outputs::{Completion, CompletionHandle, OutputCollaborator};

/// What one iteration did with the event it popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Decided and dispatched (a fallback NO_OP counts).
    Dispatched,
    /// Merged into the context, no decision wanted.
    Skipped,
    /// Discarded: stale, rate pressure, or a failed decision.
    Dropped,
    /// Decision abandoned because the streamer started talking.
    Superseded,
    /// SHUTDOWN observed.
    Shutdown,
    /// Queue closed from outside.
    Closed,
}

/// Returned by [`Orchestrator::run`] once STOPPED.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub phase: Phase,
    pub queue: QueueStats,
    pub telemetry: TelemetrySnapshot,
    pub interruptions: u64,
    pub completed_actions: u64,
    pub stale_completions: u64,
    /// In-flight speech cut off when the grace period ran out.
    pub cancelled_on_shutdown: bool,
}

impl SessionReport {
    /// Queue drops plus events discarded at pop (stale, rate pressure).
    pub fn dropped_total(&self) -> u64 {
        self.queue.dropped_total()
            + self.telemetry.event_stats.dropped_stale
            + self.telemetry.event_stats.dropped_rate_pressure
    }
}

#[derive(Debug, Clone, Copy)]
struct LoopTimings {
    tick_interval: Duration,
    grace: Duration,
    max_event_age: Duration,
    listening_window: Duration,
    idle_commentary: Duration,
}

pub struct Orchestrator {
    queue: Arc<EventQueue>,
    state: StateHandle,
    gateway: DecisionGateway,
    speech: Arc<dyn OutputCollaborator>,
    avatar: Arc<dyn OutputCollaborator>,
    timings: LoopTimings,
    phase: Phase,
    telemetry: TelemetryRecorder,
    /// Last SPEAK handed to the voice, for best-effort cancellation.
    in_flight: Option<(ActionId, CompletionHandle)>,
    /// When a TICK last asked for idle commentary.
    last_commentary: Option<Instant>,
    greeting: Option<String>,
    farewell: Option<String>,
}

impl Orchestrator {
    pub fn new(
        config: &CohostConfig,
        service: Arc<dyn DecisionService>,
        speech: Arc<dyn OutputCollaborator>,
        avatar: Arc<dyn OutputCollaborator>,
    ) -> Self {
        let gateway = DecisionGateway::new(
            service,
            RateLimiter::per_minute(config.decisions_per_minute),
            config.decision_max_wait(),
            config.decision_timeout(),
        );
        Self::with_gateway(config, gateway, speech, avatar)
    }

    /// For callers that need a custom limiter window.
    pub fn with_gateway(
        config: &CohostConfig,
        gateway: DecisionGateway,
        speech: Arc<dyn OutputCollaborator>,
        avatar: Arc<dyn OutputCollaborator>,
    ) -> Self {
        Self {
            queue: Arc::new(EventQueue::new(config.max_queue_size)),
            state: StateHandle::new(SharedState::new(config.context_events)),
            gateway,
            speech,
            avatar,
            timings: LoopTimings {
                tick_interval: config.tick_interval(),
                grace: config.interruption_grace(),
                max_event_age: config.max_event_age(),
                listening_window: config.listening_window(),
                idle_commentary: config.idle_commentary(),
            },
            phase: Phase::Starting,
            telemetry: TelemetryRecorder::new(),
            in_flight: None,
            last_commentary: None,
            greeting: config.greeting().map(str::to_string),
            farewell: config.farewell().map(str::to_string),
        }
    }

    /// Producers push here.
    pub fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }

    pub fn state(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    fn transition(&mut self, request: PhaseRequest) {
        match PhaseGraph::transition(self.phase, request) {
            Some(next) => {
                info!("Orchestrator {:?} -> {:?}", self.phase, next);
                self.telemetry.record(TelemetryEvent::PhaseTransition {
                    from: self.phase,
                    to: next,
                });
                self.phase = next;
            }
            None => debug!("Ignored {:?} while {:?}", request, self.phase),
        }
    }

    /// Runs until SHUTDOWN (or a closed queue), then drains.
    pub async fn run(mut self) -> SessionReport {
        if let Some(greeting) = self.greeting.take() {
            info!("Greeting the stream");
            self.dispatch(Action::scripted(&greeting, Some(Emotion::Happy)));
        }
        self.transition(PhaseRequest::Started);

        let ticks = CancellationToken::new();
        let ticker = spawn_ticks(self.queue(), self.timings.tick_interval, ticks.clone());

        loop {
            match self.step().await {
                StepOutcome::Shutdown | StepOutcome::Closed => break,
                _ => {}
            }
        }

        ticks.cancel();
        if let Err(e) = ticker.await {
            error!("Tick source ended abnormally: {}", e);
        }
        self.drain().await
    }

    /// One iteration: pop the next event and process it.
    pub async fn step(&mut self) -> StepOutcome {
        match self.queue.pop().await {
            Some(event) => self.process(event).await,
            None => StepOutcome::Closed,
        }
    }

    /// Process a popped event. Never fails: every error ends the iteration.
    pub async fn process(&mut self, event: Event) -> StepOutcome {
        let now = Instant::now();

        if event.kind() == EventKind::Shutdown {
            info!("Shutdown requested by {}", event.source());
            return StepOutcome::Shutdown;
        }

        let age = event.age(now);
        if event.priority().is_sheddable() && age > self.timings.max_event_age {
            info!("Dropping stale {:?} ({:.1}s old)", event.kind(), age.as_secs_f64());
            self.record_drop(&event, DropReason::Stale);
            return StepOutcome::Dropped;
        }
        self.telemetry.record(TelemetryEvent::EventProcessed {
            kind: event.kind(),
            priority: event.priority(),
            queue_wait_ms: age.as_millis() as u64,
        });

        if InterruptionPolicy::should_interrupt(&event, self.state.activity()) {
            self.interrupt(&event, now);
        }

        let activity = self.state.activity();
        let higher_pending = self.queue.has_pending_above(event.priority());
        self.state
            .update(|state| state.merge_event(&event, higher_pending, now));

        let wants_decision = Scheduler::should_decide(&event, activity)
            && (event.kind() != EventKind::Tick || self.take_commentary_slot(now));
        let outcome = if wants_decision {
            self.decide_and_dispatch(&event).await
        } else {
            debug!("No decision for {:?} while {:?}", event.kind(), activity);
            self.telemetry
                .record(TelemetryEvent::EventSkipped { kind: event.kind() });
            StepOutcome::Skipped
        };

        let window = self.timings.listening_window;
        self.state.update(|state| state.settle(Instant::now(), window));
        outcome
    }

    /// Idle ticks ask for commentary at most once per cooldown.
    fn take_commentary_slot(&mut self, now: Instant) -> bool {
        let last_ai = self.state.read(|state| state.last_ai_activity_at());
        let last_output = last_ai.max(self.last_commentary);
        if !Scheduler::commentary_due(last_output, now, self.timings.idle_commentary) {
            return false;
        }
        self.last_commentary = Some(now);
        true
    }

    /// Streamer speech over our speech: clear state first so the late
    /// completion is stale, then ask the voice to stop, then purge.
    fn interrupt(&mut self, speech: &Event, started: Instant) {
        let interrupted = self.state.update(|state| state.interrupt(started));
        let cancel_requested = interrupted.map_or(false, |id| self.cancel_speech(id));
        let purged = self
            .queue
            .purge_before(speech, InterruptionPolicy::is_stale_after_speech);

        let latency = started.elapsed();
        info!(
            "Interrupted by streamer speech: cancelled {:?}, purged {} stale events ({}us)",
            interrupted,
            purged,
            latency.as_micros()
        );
        self.telemetry.record(TelemetryEvent::Interruption {
            purged_events: purged,
            cancel_requested,
            cancel_latency_us: latency.as_micros() as u64,
        });
    }

    /// Best-effort stop of `id` at the voice. Returns whether a cancel was
    /// actually requested.
    fn cancel_speech(&mut self, id: ActionId) -> bool {
        match self.in_flight.take() {
            Some((in_flight, handle)) if in_flight == id => {
                if let Err(e) = self.speech.cancel(handle) {
                    // Playback may have just ended on its own.
                    debug!("Cancel of {} at {}: {}", id, self.speech.name(), e);
                }
                true
            }
            _ => {
                debug!("No in-flight handle for {}", id);
                false
            }
        }
    }

    async fn decide_and_dispatch(&mut self, event: &Event) -> StepOutcome {
        let seen = self.queue.speech_arrivals();
        let snapshot = self.state.snapshot();
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = self.queue.speech_since(seen) => None,
            result = self.gateway.decide(snapshot, event) => Some(result),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let (outcome, action) = match result {
            None => {
                info!("Decision for {:?} superseded by streamer speech", event.kind());
                (DecisionOutcome::Superseded, None)
            }
            Some(Ok(action)) => (DecisionOutcome::Decided, Some(action)),
            Some(Err(DecisionFailure::Unavailable { wait })) => {
                if event.priority().is_sheddable() {
                    info!(
                        "Dropping {:?} under rate pressure (next slot in {:.1}s)",
                        event.kind(),
                        wait.as_secs_f64()
                    );
                    self.record_drop(event, DropReason::RatePressure);
                    (DecisionOutcome::Unavailable, None)
                } else {
                    warn!("No decision slot for {:?}, answering with NO_OP", event.kind());
                    (DecisionOutcome::Fallback, Some(Action::fallback(event.id())))
                }
            }
            Some(Err(failure @ DecisionFailure::Error(_))) => {
                warn!("Abandoning {:?}: {}", event.kind(), failure);
                (DecisionOutcome::Error, None)
            }
            Some(Err(failure @ DecisionFailure::Timeout(_))) => {
                warn!("Abandoning {:?}: {}", event.kind(), failure);
                (DecisionOutcome::Timeout, None)
            }
        };

        self.telemetry.record(TelemetryEvent::Decision {
            kind: event.kind(),
            outcome,
            latency_ms,
        });

        match action {
            Some(action) => {
                self.dispatch(action);
                StepOutcome::Dispatched
            }
            None => {
                self.state.update(SharedState::abandon_decision);
                if outcome == DecisionOutcome::Superseded {
                    StepOutcome::Superseded
                } else {
                    StepOutcome::Dropped
                }
            }
        }
    }

    fn dispatch(&mut self, action: Action) {
        for effect in Scheduler::schedule(&action) {
            match effect {
                SideEffect::Speak(action) => self.speak(action),
                SideEffect::Emote(action) => self.emote(action),
                SideEffect::Log(line) => info!("[{}] {}", action.id, line),
            }
        }
        self.telemetry.record(TelemetryEvent::ActionDispatched {
            kind: action.kind,
            fallback: action.fallback,
        });
        self.state.update(|state| state.record_action(&action));
    }

    /// Only streamer speech cuts us off. A SPEAK decided while another is
    /// in flight is not voiced.
    fn speak(&mut self, action: Action) {
        let begun = self
            .state
            .update(|state| state.begin_speaking(&action, Instant::now()));
        if let Err(current) = begun {
            info!("Speech {} declined, {} still in flight", action.id, current);
            self.telemetry.record(TelemetryEvent::SpeechDeclined);
            return;
        }

        let completion = Completion::new(action.id, self.state.clone());
        match self.speech.perform(&action, completion) {
            Ok(handle) => {
                debug!("Speech {} in flight at {}", action.id, self.speech.name());
                self.in_flight = Some((action.id, handle));
            }
            Err(e) => {
                warn!("{} refused speech {}: {}", self.speech.name(), action.id, e);
                self.state.update(|state| state.abort_action(action.id));
                self.telemetry
                    .record(TelemetryEvent::DispatchFailed { kind: action.kind });
            }
        }
    }

    fn emote(&mut self, action: Action) {
        let Some(emotion) = action.emotion else {
            return;
        };
        self.state
            .update(|state| state.set_emotion(emotion, Instant::now()));

        if let Err(e) = self.avatar.perform(&action, Completion::detached(action.id)) {
            warn!("{} refused emotion {}: {}", self.avatar.name(), emotion, e);
            self.telemetry
                .record(TelemetryEvent::DispatchFailed { kind: action.kind });
        }
    }

    fn record_drop(&mut self, event: &Event, reason: DropReason) {
        self.telemetry.record(TelemetryEvent::EventDropped {
            kind: event.kind(),
            priority: event.priority(),
            reason,
        });
    }

    /// DRAINING: refuse admission, give in-flight speech and the farewell the
    /// grace period, then cut off whatever is left and stop.
    async fn drain(mut self) -> SessionReport {
        self.transition(PhaseRequest::ShutdownObserved);
        self.queue.close();

        let deadline = Instant::now() + self.timings.grace;
        let mut settled = timeout_at(deadline, self.state.wait_until_settled())
            .await
            .is_ok();
        match self.farewell.take() {
            Some(farewell) if settled && !self.timings.grace.is_zero() => {
                info!("Saying goodbye");
                self.dispatch(Action::scripted(&farewell, None));
                settled = timeout_at(deadline, self.state.wait_until_settled())
                    .await
                    .is_ok();
            }
            Some(_) => debug!("No time left for a farewell"),
            None => {}
        }
        let leftover = self.state.update(SharedState::force_idle);
        let cancelled_on_shutdown = match leftover {
            Some(id) if !settled => {
                warn!("Grace period over, cancelling {}", id);
                self.cancel_speech(id)
            }
            _ => false,
        };
        self.telemetry.record(TelemetryEvent::ShutdownCancelled {
            in_flight: cancelled_on_shutdown,
        });

        self.transition(PhaseRequest::Drained);

        let (interruptions, completed_actions, stale_completions) = self.state.read(|state| {
            (
                state.interruptions(),
                state.completed_actions(),
                state.stale_completions(),
            )
        });
        let report = SessionReport {
            phase: self.phase,
            queue: self.queue.stats(),
            telemetry: self.telemetry.snapshot(),
            interruptions,
            completed_actions,
            stale_completions,
            cancelled_on_shutdown,
        };
        info!(
            "Session over: {} events popped, {} dropped, {} interruptions",
            report.queue.popped,
            report.dropped_total(),
            report.interruptions
        );
        report
    }
}

/// Pushes a TICK every `period` until stopped or the queue closes.
fn spawn_ticks(queue: Arc<EventQueue>, period: Duration, stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cadence = interval(period);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        cadence.tick().await;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = cadence.tick() => match queue.push(Event::tick()) {
                    Ok(()) => {}
                    Err(QueueError::Closed { .. }) => break,
                    Err(e) => debug!("Tick not queued: {}", e),
                },
            }
        }
        debug!("Tick source stopped");
    })
}
