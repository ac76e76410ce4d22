//! The two execution contexts and the state they share.
//!
//! ```text
//!  ┌──────────────┐  resolve (I/O, unlocked)   ┌──────────────┐
//!  │   Scanner    │──────────────────────────► │ SweepReader  │
//!  │ (sweep loop) │                            └──────────────┘
//!  └──────┬───────┘
//!         │ classify / validate (locked)
//!         ▼
//!  ┌──────────────┐     push      ┌──────────────┐  send   ┌───────────┐
//!  │ BoardContext │─────────────► │ Notification │───────► │ Transport │
//!  │  (1 mutex)   │               │    Queue     │ sender  └───────────┘
//!  └──────▲───────┘               └──────────────┘
//!         │ apply_ack (locked)
//!  ┌──────┴───────┐
//!  │CommandHandler│◄──── peer text
//!  └──────────────┘
//! ```
//!
//! The mutex is never held across an await, so an ack arriving mid-sweep
//! waits at most for one square's classification.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::board::Position;
use crate::classify::classify;
use crate::events::{Outbound, SemanticEvent};
use crate::lifecycle::{LifecycleEvent, Phase};
use crate::logging::{agg_increment, log, obj, tick_aggregator, v_str, Domain, Level, ProfileScope};
use crate::notify::{run_sender, NotificationQueue, Transport};
use crate::peripherals::Peripherals;
use crate::protocol::{parse_command, AckCommand, FeedbackCommand, PeerCommand, ProtocolError};
use crate::reconcile::{apply_ack, Applied, ReconcileError};
use crate::reliability::retry::RetryConfig;
use crate::roster::Roster;
use crate::sensor::health::SensorHealth;
use crate::sensor::{resolve, SweepReader};
use crate::setup::{setup_complete, validate};
use crate::state::{BoardState, Config};
use crate::verify::invariants::assert_board_invariants;

/// Handle to the shared board. Cheap to clone; all clones see one state.
#[derive(Clone)]
pub struct BoardContext {
    state: Arc<Mutex<BoardState>>,
    queue: Arc<NotificationQueue>,
    peripherals: Arc<dyn Peripherals>,
    roster: Arc<Roster>,
}

impl BoardContext {
    pub fn new(roster: Roster, queue: Arc<NotificationQueue>, peripherals: Arc<dyn Peripherals>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BoardState::new())),
            queue,
            peripherals,
            roster: Arc::new(roster),
        }
    }

    /// Enter the critical section. A poisoned lock is recovered: every
    /// mutation keeps the map consistent step by step.
    pub fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> BoardState {
        self.lock().clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Readable status for the peer: `waiting` until one connects.
    pub fn status(&self) -> &'static str {
        self.phase().status()
    }

    pub fn queue(&self) -> &Arc<NotificationQueue> {
        &self.queue
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Hand events to the LEDs and the outbound queue. Called with the lock
    /// held so records stay ordered with respect to resets.
    fn emit(&self, events: &[SemanticEvent]) {
        for e in events {
            self.peripherals.render(e);
            self.queue.publish(&Outbound::Event(*e));
        }
    }
}

fn check_invariants(state: &BoardState, context: &str) {
    if cfg!(debug_assertions) {
        if let Err(v) = assert_board_invariants(state) {
            log(
                Level::Error,
                Domain::System,
                "invariant_violation",
                obj(&[("context", v_str(context)), ("msg", v_str(&v.msg))]),
            );
        }
    }
}

// =============================================================================
// Sweep context
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub phase: Option<Phase>,
    pub events: Vec<SemanticEvent>,
    pub indeterminate: Vec<Position>,
    /// A reset or phase change landed mid-sweep; remaining squares were skipped.
    pub aborted: bool,
    pub setup_completed: bool,
}

pub struct Scanner<R: SweepReader> {
    ctx: BoardContext,
    reader: R,
    retry: RetryConfig,
    health: SensorHealth,
}

impl<R: SweepReader> Scanner<R> {
    pub fn new(ctx: BoardContext, reader: R, cfg: &Config) -> Self {
        Self {
            ctx,
            reader,
            retry: RetryConfig::sensor(cfg.sensor_retries, cfg.sensor_settle_us),
            health: SensorHealth::new(cfg.sensor_degrade_after),
        }
    }

    pub fn health(&self) -> &SensorHealth {
        &self.health
    }

    /// One pass over all 64 squares in row-major order.
    ///
    /// Idle outside `AwaitingSetup` and `Playing`.
    pub async fn sweep(&mut self) -> SweepReport {
        let mut report = SweepReport::default();
        let (generation, phase) = {
            let s = self.ctx.lock();
            (s.generation, s.phase)
        };
        if !matches!(phase, Phase::AwaitingSetup | Phase::Playing) {
            return report;
        }
        report.phase = Some(phase);
        let _profile = ProfileScope::with_context("sweep", &[("phase", v_str(phase.as_str()))]);

        for pos in Position::all() {
            let Some(reading) = resolve(&mut self.reader, pos, &self.retry).await else {
                self.health.record_indeterminate(pos);
                report.indeterminate.push(pos);
                continue;
            };
            self.health.record_read(pos);

            let mut s = self.ctx.lock();
            if s.generation != generation || s.phase != phase {
                report.aborted = true;
                break;
            }
            let events = match phase {
                Phase::AwaitingSetup => validate(&mut s, &self.ctx.roster, pos, reading),
                _ => classify(&mut s, pos, reading),
            };
            self.ctx.emit(&events);
            report.events.extend(events);
        }

        if !report.aborted && phase == Phase::AwaitingSetup {
            let mut s = self.ctx.lock();
            if s.generation == generation
                && s.phase == Phase::AwaitingSetup
                && setup_complete(&s)
                && s.transition(LifecycleEvent::SetupComplete).is_ok()
            {
                report.setup_completed = true;
                self.ctx.queue.publish(&Outbound::ReadyToStart);
                self.ctx.peripherals.phase_changed(Phase::Ready);
                log(
                    Level::Info,
                    Domain::Setup,
                    "setup_complete",
                    obj(&[("msg", v_str("all 32 pieces placed, notified peer"))]),
                );
            }
        }

        {
            let s = self.ctx.lock();
            check_invariants(&s, "sweep");
        }
        agg_increment("sweep");
        tick_aggregator();
        if report.aborted {
            log(
                Level::Info,
                Domain::Sensor,
                "sweep_aborted",
                obj(&[("events", json!(report.events.len()))]),
            );
        }
        report
    }
}

/// Sweep every `period` until `shutdown` flips to true. Returns sweeps run.
pub async fn run_scan_loop<R: SweepReader>(
    mut scanner: Scanner<R>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sweeps = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if scanner.sweep().await.phase.is_some() {
                    sweeps += 1;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    log(
        Level::Info,
        Domain::System,
        "scan_loop_stopped",
        obj(&[
            ("sweeps", json!(sweeps)),
            ("degraded", json!(scanner.health().degraded().len())),
        ]),
    );
    sweeps
}

// =============================================================================
// Command context
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied(Applied),
    Feedback,
}

/// Runs on whatever context delivers peer writes.
#[derive(Clone)]
pub struct CommandHandler {
    ctx: BoardContext,
}

impl CommandHandler {
    pub fn new(ctx: BoardContext) -> Self {
        Self { ctx }
    }

    pub fn connect(&self) -> Phase {
        let mut s = self.ctx.lock();
        let _ = s.transition(LifecycleEvent::PeerConnected);
        self.ctx.peripherals.phase_changed(s.phase);
        s.phase
    }

    /// Full reset back to `Disconnected`; unsent records are dropped.
    pub fn disconnect(&self) -> Phase {
        let mut s = self.ctx.lock();
        let _ = s.transition(LifecycleEvent::PeerDisconnected);
        let dropped = self.ctx.queue.discard_pending();
        self.ctx.peripherals.phase_changed(s.phase);
        log(
            Level::Info,
            Domain::Lifecycle,
            "peer_disconnected",
            obj(&[("discarded", json!(dropped))]),
        );
        s.phase
    }

    pub fn handle_text(&self, text: &str) -> Result<CommandOutcome, CommandError> {
        let command = parse_command(text).map_err(|e| {
            log(
                Level::Warn,
                Domain::Reconcile,
                "bad_command",
                obj(&[("raw", v_str(text.trim())), ("error", v_str(&e.to_string()))]),
            );
            e
        })?;
        match command {
            PeerCommand::Ack(ack) => Ok(CommandOutcome::Applied(self.handle_ack(ack)?)),
            PeerCommand::Feedback(fb) => {
                self.handle_feedback(&fb);
                Ok(CommandOutcome::Feedback)
            }
        }
    }

    pub fn handle_ack(&self, command: AckCommand) -> Result<Applied, ReconcileError> {
        let mut s = self.ctx.lock();
        let prev = s.phase;
        let result = apply_ack(&mut s, command);
        if let Ok(Applied::Ended) = result {
            self.ctx.queue.publish(&Outbound::Connected);
        }
        if s.phase != prev {
            self.ctx.peripherals.phase_changed(s.phase);
        }
        check_invariants(&s, "ack");
        result
    }

    fn handle_feedback(&self, command: &FeedbackCommand) {
        let squares: &[Position] = match command {
            FeedbackCommand::LightOn(list) | FeedbackCommand::ClearPiece(list) => list,
            FeedbackCommand::InCheck(p) => std::slice::from_ref(p),
            FeedbackCommand::MoveRequest { .. } | FeedbackCommand::LightOff => &[],
        };
        let occupied: Vec<Position> = {
            let s = self.ctx.lock();
            squares
                .iter()
                .copied()
                .filter(|p| s.map.contains_position(p))
                .collect()
        };
        self.ctx.peripherals.feedback(command, &occupied);
    }
}

// =============================================================================
// Wiring
// =============================================================================

pub struct BoardEngine {
    ctx: BoardContext,
    cfg: Config,
}

impl BoardEngine {
    pub fn new(cfg: Config, roster: Roster, peripherals: Arc<dyn Peripherals>) -> Self {
        let queue = Arc::new(NotificationQueue::new(cfg.queue_capacity));
        Self {
            ctx: BoardContext::new(roster, queue, peripherals),
            cfg,
        }
    }

    pub fn context(&self) -> &BoardContext {
        &self.ctx
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn handler(&self) -> CommandHandler {
        CommandHandler::new(self.ctx.clone())
    }

    pub fn scanner<R: SweepReader>(&self, reader: R) -> Scanner<R> {
        Scanner::new(self.ctx.clone(), reader, &self.cfg)
    }

    pub fn spawn_sender<T>(&self, transport: Arc<T>) -> JoinHandle<u64>
    where
        T: Transport + ?Sized + 'static,
    {
        let retry = RetryConfig::transport(self.cfg.send_retries, self.cfg.send_backoff_ms);
        tokio::spawn(run_sender(self.ctx.queue.clone(), transport, retry))
    }
}
