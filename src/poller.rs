//! New-order notifications without a push channel.
//!
//! The poller re-lists the newest orders on a fixed interval, picks the
//! newest `PENDING` one and compares its id with the last one it saw. A
//! different id raises the audible alert and the caller's callback. The
//! first check after (re)starting only records the baseline.
//!
//! Key constraints:
//! - **Role gated**: runs only while enabled *and* the user's role is on
//!   the notification allow-list
//! - **At most one check in flight per run**: a tick that lands while a
//!   check is still running is skipped
//! - **Deterministic teardown**: disabling, losing the role or dropping the
//!   poller cancels the timer task and discards any in-flight result

use std::io::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::config::{DEFAULT_NOTIFICATION_ROLES, DEFAULT_POLLING_INTERVAL};
use crate::error::ApiError;
use crate::orders::{recent_orders, Order, OrderId};
use crate::session::Role;

/// Orders fetched per check; the newest pending order is always on page 0.
pub const POLL_PAGE_SIZE: u32 = 10;

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Where the poller reads orders from. Implementations return the first
/// page sorted newest-first by creation time.
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn latest_orders(&self) -> Result<Vec<Order>, ApiError>;
}

#[async_trait]
impl OrderSource for ApiClient {
    async fn latest_orders(&self) -> Result<Vec<Order>, ApiError> {
        recent_orders(self, POLL_PAGE_SIZE).await
    }
}

/// Side effect raised for each new order.
pub trait OrderAlert: Send + Sync {
    fn play(&self, order: &Order);
}

/// Rings the terminal bell.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl OrderAlert for TerminalBell {
    fn play(&self, order: &Order) {
        let mut out = std::io::stdout();
        if let Err(e) = out.write_all(b"\x07").and_then(|_| out.flush()) {
            debug!(error = %e, "bell write failed");
        }
        info!(order_id = order.id, label = %order.display_label(), "new order alert");
    }
}

/// No sound; for tests and headless consumers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAlert;

impl OrderAlert for SilentAlert {
    fn play(&self, _order: &Order) {}
}

pub type NewOrderCallback = Arc<dyn Fn(&Order) + Send + Sync>;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerPhase {
    Idle,
    /// A request is in flight.
    Checking,
    /// Between ticks.
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerState {
    pub last_seen_order_id: Option<OrderId>,
    pub is_polling: bool,
}

/// What a single check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// First pending order seen since polling started; baseline recorded.
    Seeded(OrderId),
    /// A different newest pending order; alert and callback fired.
    NewOrder(OrderId),
    Unchanged(OrderId),
    NoPending,
    /// Another check was already in flight.
    Skipped,
    /// Polling is off, or was turned off while the request was in flight.
    Inactive,
    Failed(String),
}

struct PollerInner {
    last_seen_order_id: Option<OrderId>,
    phase: PollerPhase,
    enabled: bool,
    user_role: Option<Role>,
    run: Option<PollRun>,
}

struct PollRun {
    ctx: RunContext,
    handle: JoinHandle<()>,
}

struct Shared {
    source: Arc<dyn OrderSource>,
    alert: Arc<dyn OrderAlert>,
    on_new_order: NewOrderCallback,
    interval: Duration,
    allowed_roles: Vec<Role>,
    inner: Mutex<PollerInner>,
}

/// Handles owned by one run, shared by its timer task and `check_now`.
#[derive(Clone)]
struct RunContext {
    token: CancellationToken,
    /// Set while a check of this run is in flight.
    checking: Arc<AtomicBool>,
}

impl RunContext {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            checking: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PollerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears the in-flight flag however the check ends, including when the
/// check future is dropped on cancellation.
struct CheckGuard<'a>(&'a AtomicBool);

impl Drop for CheckGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

pub struct OrderPollerBuilder {
    source: Arc<dyn OrderSource>,
    alert: Arc<dyn OrderAlert>,
    interval: Duration,
    allowed_roles: Vec<Role>,
}

impl OrderPollerBuilder {
    pub fn alert(mut self, alert: Arc<dyn OrderAlert>) -> Self {
        self.alert = alert;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        // A zero period would panic inside tokio's interval.
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn allowed_roles(mut self, roles: Vec<Role>) -> Self {
        self.allowed_roles = roles;
        self
    }

    pub fn build<F>(self, on_new_order: F) -> OrderPoller
    where
        F: Fn(&Order) + Send + Sync + 'static,
    {
        OrderPoller {
            shared: Arc::new(Shared {
                source: self.source,
                alert: self.alert,
                on_new_order: Arc::new(on_new_order),
                interval: self.interval,
                allowed_roles: self.allowed_roles,
                inner: Mutex::new(PollerInner {
                    last_seen_order_id: None,
                    phase: PollerPhase::Idle,
                    enabled: false,
                    user_role: None,
                    run: None,
                }),
            }),
        }
    }
}

/// Starts idle; call [`OrderPoller::configure`] (or the two setters) to
/// enable it. Must be driven from within a tokio runtime.
pub struct OrderPoller {
    shared: Arc<Shared>,
}

impl OrderPoller {
    pub fn builder(source: Arc<dyn OrderSource>) -> OrderPollerBuilder {
        OrderPollerBuilder {
            source,
            alert: Arc::new(TerminalBell),
            interval: DEFAULT_POLLING_INTERVAL,
            allowed_roles: DEFAULT_NOTIFICATION_ROLES.to_vec(),
        }
    }

    /// Apply `enabled` and the user's role, starting or stopping the timer
    /// as needed. A role switch between two allowed roles keeps the current
    /// run (and its baseline).
    pub fn configure(&self, enabled: bool, user_role: Option<Role>) {
        let mut inner = self.shared.lock();
        inner.enabled = enabled;
        inner.user_role = user_role;

        let should_poll = enabled
            && inner
                .user_role
                .as_ref()
                .is_some_and(|r| self.shared.allowed_roles.contains(r));

        match (should_poll, inner.run.is_some()) {
            (true, false) => {
                inner.last_seen_order_id = None;
                inner.phase = PollerPhase::Waiting;
                let ctx = RunContext::new();
                let handle = tokio::spawn(poll_loop(Arc::clone(&self.shared), ctx.clone()));
                inner.run = Some(PollRun { ctx, handle });
                info!(
                    interval_ms = self.shared.interval.as_millis() as u64,
                    role = ?inner.user_role,
                    "order polling started"
                );
            }
            (false, true) => {
                stop_run(&mut inner);
                info!(enabled, role = ?inner.user_role, "order polling stopped");
            }
            _ => {}
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        let role = self.shared.lock().user_role.clone();
        self.configure(enabled, role);
    }

    pub fn set_user_role(&self, user_role: Option<Role>) {
        let enabled = self.shared.lock().enabled;
        self.configure(enabled, user_role);
    }

    /// Stop polling; the poller can be configured again afterwards.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        inner.enabled = false;
        stop_run(&mut inner);
    }

    /// Run a check right away, outside the timer. Ignored while idle.
    pub async fn check_now(&self) -> CheckOutcome {
        let ctx = match self.shared.lock().run.as_ref() {
            Some(run) => run.ctx.clone(),
            None => return CheckOutcome::Inactive,
        };
        check(&self.shared, &ctx).await
    }

    pub fn is_polling(&self) -> bool {
        self.shared.lock().run.is_some()
    }

    pub fn phase(&self) -> PollerPhase {
        self.shared.lock().phase
    }

    pub fn last_seen_order_id(&self) -> Option<OrderId> {
        self.shared.lock().last_seen_order_id
    }

    pub fn state(&self) -> PollerState {
        let inner = self.shared.lock();
        PollerState {
            last_seen_order_id: inner.last_seen_order_id,
            is_polling: inner.run.is_some(),
        }
    }
}

impl Drop for OrderPoller {
    fn drop(&mut self) {
        stop_run(&mut self.shared.lock());
    }
}

fn stop_run(inner: &mut PollerInner) {
    if let Some(run) = inner.run.take() {
        run.ctx.token.cancel();
        // The loop exits on the token; aborting also drops a check that is
        // parked inside the source.
        run.handle.abort();
    }
    inner.phase = PollerPhase::Idle;
}

async fn poll_loop(shared: Arc<Shared>, ctx: RunContext) {
    // The first tick completes immediately: check on entry, then every period.
    let mut ticker = tokio::time::interval(shared.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ctx.token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = ctx.token.cancelled() => break,
            outcome = check(&shared, &ctx) => {
                debug!(?outcome, "order poll tick");
            }
        }
    }
    debug!("order poll loop exited");
}

/// One poll: fetch, find the newest pending order, diff against the
/// baseline.
async fn check(shared: &Shared, ctx: &RunContext) -> CheckOutcome {
    if ctx.token.is_cancelled() {
        return CheckOutcome::Inactive;
    }
    if ctx
        .checking
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        debug!("order check already in flight, skipping");
        return CheckOutcome::Skipped;
    }
    let _guard = CheckGuard(&ctx.checking);
    set_phase(shared, &ctx.token, PollerPhase::Checking);

    let result = shared.source.latest_orders().await;

    // Runs are cancelled under `inner`, so checking the token and swapping
    // the baseline under one lock keeps a finished run out of the next one.
    let (newest, previous) = {
        let mut inner = shared.lock();
        if ctx.token.is_cancelled() {
            return CheckOutcome::Inactive;
        }
        inner.phase = PollerPhase::Waiting;

        let orders = match result {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "order poll failed");
                return CheckOutcome::Failed(e.to_string());
            }
        };
        let Some(newest) = orders.into_iter().find(Order::is_pending) else {
            return CheckOutcome::NoPending;
        };
        let previous = inner.last_seen_order_id.replace(newest.id);
        (newest, previous)
    };

    match previous {
        None => {
            debug!(order_id = newest.id, "order poll baseline recorded");
            CheckOutcome::Seeded(newest.id)
        }
        Some(prev) if prev == newest.id => CheckOutcome::Unchanged(newest.id),
        Some(prev) => {
            info!(
                order_id = newest.id,
                previous_order_id = prev,
                "new pending order detected"
            );
            shared.alert.play(&newest);
            (shared.on_new_order)(&newest);
            CheckOutcome::NewOrder(newest.id)
        }
    }
}

fn set_phase(shared: &Shared, token: &CancellationToken, phase: PollerPhase) {
    let mut inner = shared.lock();
    if !token.is_cancelled() && inner.run.is_some() {
        inner.phase = phase;
    }
}
