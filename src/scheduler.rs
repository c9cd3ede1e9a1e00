//! Periodic background sync loop with aggressive-burst escalation.
//!
//! One cooperative worker drives the whole subsystem: a fixed-interval tick
//! samples telemetry and location and posts a report; a failed post backs
//! off briefly and yields to the next tick; an app-removal signal
//! short-circuits into a multi-post aggressive burst. Ticks never overlap,
//! and at most one burst runs per removal signal.
//!
//! State and counters are mirrored into a global [`SyncStatus`] (single
//! writer: the sync loop; readers: host polls), so the host can observe the
//! loop without reaching into it.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::api::ApiClient;
use crate::location::LocationProvider;
use crate::telemetry::DeviceTelemetryProvider;
use crate::types::{ApiResult, Session, SyncType};

// ============================================================================
// States and Configuration
// ============================================================================

/// Scheduler states, mirrored into [`SyncStatus`] for host polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncState {
    Idle = 0,
    Sampling = 1,
    Posting = 2,
    Backoff = 3,
    AggressiveBurst = 4,
}

impl SyncState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SyncState::Sampling,
            2 => SyncState::Posting,
            3 => SyncState::Backoff,
            4 => SyncState::AggressiveBurst,
            _ => SyncState::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Sampling => "sampling",
            SyncState::Posting => "posting",
            SyncState::Backoff => "backoff",
            SyncState::AggressiveBurst => "aggressiveBurst",
        }
    }
}

/// Tunables for the sync loop.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fixed tick interval.
    pub sync_interval: Duration,
    /// Time bound for the per-tick location fix.
    pub tick_fix_limit: Duration,
    /// Time bound for the single pre-burst location fix.
    pub burst_fix_limit: Duration,
    /// Posts per aggressive burst.
    pub burst_count: u32,
    /// Pause between non-final burst posts.
    pub burst_pause: Duration,
    /// Base delay for the post-failure backoff.
    pub backoff_base: Duration,
    /// Backoff doubles per consecutive failure up to this exponent.
    pub backoff_max_exponent: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(60),
            tick_fix_limit: Duration::from_secs(10),
            burst_fix_limit: Duration::from_secs(5),
            burst_count: 3,
            burst_pause: Duration::from_millis(500),
            backoff_base: Duration::from_millis(500),
            backoff_max_exponent: 3,
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// Global sync status - single writer (sync loop), multiple readers (host polls)
pub struct SyncStatus {
    state: AtomicU8,
    ticks_completed: AtomicU32,
    posts_succeeded: AtomicU32,
    posts_failed: AtomicU32,
    bursts_fired: AtomicU32,
    last_post_ok: AtomicBool,
}

impl SyncStatus {
    const fn new() -> Self {
        Self {
            state: AtomicU8::new(SyncState::Idle as u8),
            ticks_completed: AtomicU32::new(0),
            posts_succeeded: AtomicU32::new(0),
            posts_failed: AtomicU32::new(0),
            bursts_fired: AtomicU32::new(0),
            last_post_ok: AtomicBool::new(false),
        }
    }

    fn set_state(&self, state: SyncState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    fn record_post(&self, ok: bool) {
        if ok {
            self.posts_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.posts_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.last_post_ok.store(ok, Ordering::Relaxed);
    }

    fn tick_done(&self) {
        self.ticks_completed.fetch_add(1, Ordering::Relaxed);
    }

    fn burst_fired(&self) {
        self.bursts_fired.fetch_add(1, Ordering::Relaxed);
    }
}

static SYNC_STATUS: SyncStatus = SyncStatus::new();

/// Point-in-time copy of the global status.
#[derive(Debug, Clone, Copy)]
pub struct SyncStatusSnapshot {
    pub state: SyncState,
    pub ticks_completed: u32,
    pub posts_succeeded: u32,
    pub posts_failed: u32,
    pub bursts_fired: u32,
    pub last_post_ok: bool,
}

/// Read the current sync status.
pub fn sync_status_snapshot() -> SyncStatusSnapshot {
    SyncStatusSnapshot {
        state: SyncState::from_u8(SYNC_STATUS.state.load(Ordering::Relaxed)),
        ticks_completed: SYNC_STATUS.ticks_completed.load(Ordering::Relaxed),
        posts_succeeded: SYNC_STATUS.posts_succeeded.load(Ordering::Relaxed),
        posts_failed: SYNC_STATUS.posts_failed.load(Ordering::Relaxed),
        bursts_fired: SYNC_STATUS.bursts_fired.load(Ordering::Relaxed),
        last_post_ok: SYNC_STATUS.last_post_ok.load(Ordering::Relaxed),
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Signals consumed by the running loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// The host app was removed from recent tasks; escalate now.
    TaskRemoved,
    /// Stop the loop (logout or host teardown).
    Shutdown,
}

/// The periodic sync worker. Owns a validated session snapshot for its whole
/// life; credential changes go through re-arming, not mutation.
pub struct SyncScheduler {
    api: Arc<ApiClient>,
    location: LocationProvider,
    telemetry: DeviceTelemetryProvider,
    session: Session,
    config: SyncConfig,
    consecutive_failures: u32,
}

impl SyncScheduler {
    pub fn new(
        api: Arc<ApiClient>,
        location: LocationProvider,
        telemetry: DeviceTelemetryProvider,
        session: Session,
        config: SyncConfig,
    ) -> Self {
        Self {
            api,
            location,
            telemetry,
            session,
            config,
            consecutive_failures: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// One full tick: sample, post, and on failure back off once before
    /// yielding to the next tick. A missing fix degrades the post to a
    /// heartbeat; the tick still completes.
    pub async fn run_tick(&mut self) -> ApiResult {
        SYNC_STATUS.set_state(SyncState::Sampling);
        let telemetry = self.telemetry.snapshot();
        let fix = self.location.acquire_fix(self.config.tick_fix_limit).await;

        SYNC_STATUS.set_state(SyncState::Posting);
        let result = match &fix {
            Some(sample) => {
                self.api
                    .update_location(&self.session, sample, telemetry, SyncType::Normal)
                    .await
            }
            None => {
                self.api
                    .heartbeat(&self.session, telemetry, SyncType::Normal)
                    .await
            }
        };
        SYNC_STATUS.record_post(result.success);

        if result.success {
            self.consecutive_failures = 0;
            SYNC_STATUS.set_state(SyncState::Idle);
        } else {
            self.consecutive_failures += 1;
            let delay = self.backoff_delay();
            warn!(
                "[Sync] post failed ({}), backing off {:?} (streak {})",
                result.message, delay, self.consecutive_failures
            );
            SYNC_STATUS.set_state(SyncState::Backoff);
            tokio::time::sleep(delay).await;
            SYNC_STATUS.set_state(SyncState::Idle);
        }

        SYNC_STATUS.tick_done();
        result
    }

    /// App-removal escalation: one bounded fix attempt, then `burst_count`
    /// sequential aggressive posts, each with a fresh telemetry snapshot.
    /// Never aborts early; every per-call result is returned in order. The
    /// process may die at any point in here, which silently truncates the
    /// burst - an accepted limitation.
    pub async fn run_burst(&mut self) -> Vec<ApiResult> {
        SYNC_STATUS.set_state(SyncState::AggressiveBurst);
        SYNC_STATUS.burst_fired();
        info!(
            "[Burst] app-removal signal, starting {}-post burst",
            self.config.burst_count
        );

        let fix = self.location.acquire_fix(self.config.burst_fix_limit).await;
        if fix.is_none() {
            info!(
                "[Burst] no fix within {:?}, posting heartbeats",
                self.config.burst_fix_limit
            );
        }

        let mut results = Vec::with_capacity(self.config.burst_count as usize);
        for attempt in 0..self.config.burst_count {
            let telemetry = self.telemetry.snapshot();
            let result = match &fix {
                Some(sample) => {
                    self.api
                        .update_location(&self.session, sample, telemetry, SyncType::Aggressive)
                        .await
                }
                None => {
                    self.api
                        .heartbeat(&self.session, telemetry, SyncType::Aggressive)
                        .await
                }
            };
            info!(
                "[Burst] post {}/{}: {}",
                attempt + 1,
                self.config.burst_count,
                if result.success { "ok" } else { result.message.as_str() }
            );
            SYNC_STATUS.record_post(result.success);
            results.push(result);

            if attempt + 1 < self.config.burst_count {
                tokio::time::sleep(self.config.burst_pause).await;
            }
        }

        SYNC_STATUS.set_state(SyncState::Idle);
        results
    }

    fn backoff_delay(&self) -> Duration {
        backoff_delay(&self.config, self.consecutive_failures)
    }

    /// Unbounded cooperative loop: fixed-interval ticks plus burst and
    /// shutdown signals. A signal arriving mid-tick is consumed after the
    /// tick completes; the in-flight tick is never cancelled. Missed ticks
    /// coalesce rather than pile up.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SyncCommand>) {
        let mut ticker = tokio::time::interval(self.config.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "[Sync] loop armed for deployment {} (interval {:?})",
            self.session.deployment_code, self.config.sync_interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick().await;
                }
                command = commands.recv() => match command {
                    Some(SyncCommand::TaskRemoved) => {
                        self.run_burst().await;
                    }
                    Some(SyncCommand::Shutdown) | None => {
                        info!("[Sync] loop stopped");
                        break;
                    }
                }
            }
        }

        SYNC_STATUS.set_state(SyncState::Idle);
    }
}

/// Capped exponential: 500ms, 1s, 2s, 4s, then flat.
fn backoff_delay(config: &SyncConfig, consecutive_failures: u32) -> Duration {
    let exponent = consecutive_failures
        .saturating_sub(1)
        .min(config.backoff_max_exponent);
    config.backoff_base * 2u32.saturating_pow(exponent)
}

// ============================================================================
// Background Launcher
// ============================================================================

/// Handle to a running background sync loop.
pub struct SyncHandle {
    commands: mpsc::Sender<SyncCommand>,
}

impl SyncHandle {
    /// Forward the platform "task removed" signal. Fire-and-forget; at most
    /// one burst runs per delivered signal.
    pub fn notify_task_removed(&self) {
        if self.commands.try_send(SyncCommand::TaskRemoved).is_err() {
            warn!("[Sync] task-removed signal dropped (loop saturated or gone)");
        }
    }

    /// Ask the loop to stop after its current cycle.
    pub fn stop(&self) {
        let _ = self.commands.try_send(SyncCommand::Shutdown);
    }

    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Launch the sync loop on its own thread and runtime. Fire-and-forget: the
/// launcher returns immediately, and every failure inside the worker is
/// caught and logged there, never surfaced to the call site.
pub fn start_background_sync(scheduler: SyncScheduler) -> SyncHandle {
    let (commands_tx, commands_rx) = mpsc::channel(8);
    let deployment = scheduler.session.deployment_code.clone();

    let spawned = std::thread::Builder::new()
        .name("beacon-sync".to_string())
        .spawn(move || {
            // Single-threaded runtime: the loop is one cooperative worker.
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    warn!("[Sync] failed to create runtime: {e}");
                    return;
                }
            };
            rt.block_on(scheduler.run(commands_rx));
        });

    match spawned {
        Ok(_) => info!("[Sync] background loop spawned for deployment {deployment}"),
        Err(e) => warn!("[Sync] failed to spawn sync thread: {e}"),
    }

    SyncHandle {
        commands: commands_tx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_curve_caps() {
        let config = SyncConfig::default();

        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(&config, 2), Duration::from_secs(1));
        assert_eq!(backoff_delay(&config, 3), Duration::from_secs(2));
        assert_eq!(backoff_delay(&config, 4), Duration::from_secs(4));
        assert_eq!(backoff_delay(&config, 10), Duration::from_secs(4));
    }

    #[test]
    fn test_state_round_trip() {
        for state in [
            SyncState::Idle,
            SyncState::Sampling,
            SyncState::Posting,
            SyncState::Backoff,
            SyncState::AggressiveBurst,
        ] {
            assert_eq!(SyncState::from_u8(state as u8), state);
        }
        assert_eq!(SyncState::from_u8(250), SyncState::Idle);
    }

    #[test]
    fn test_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.burst_count, 3);
        assert_eq!(config.burst_pause, Duration::from_millis(500));
        assert_eq!(config.burst_fix_limit, Duration::from_secs(5));
    }
}
