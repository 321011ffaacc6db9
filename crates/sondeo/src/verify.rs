//! Assertion engine: polls a query until an expectation holds.
//!
//! Each poll re-evaluates the query against the live tree, resolves the
//! result with the assertion's policy and checks the expectation on every
//! resolved element. The run is a small state machine:
//!
//! ```text
//!            poll: holds
//! Pending ─────────────────► Satisfied
//!    │  ▲
//!    │  │ poll: does not hold, deadline not reached (sleep)
//!    └──┘
//!    │
//!    └─────────────────────► TimedOut
//!      poll: does not hold, deadline reached
//! ```
//!
//! At least one poll always runs, even with a zero timeout. Resolution
//! errors (an empty or ambiguous set under `First`/`ExactlyOne`) end the run
//! immediately.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::element::ElementHandle;
use crate::query::{Predicate, Query};
use crate::resolve::{resolve, Cardinality, Purpose};
use crate::result::{AssertionTimeout, ObservedElement, SondeoResult};
use crate::service::AccessibilityService;

/// Default verification timeout (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default initial poll interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Default ceiling for the poll interval (500ms)
pub const DEFAULT_MAX_POLL_INTERVAL_MS: u64 = 500;

/// Default growth factor of the poll interval
pub const DEFAULT_BACKOFF: f64 = 1.5;

/// Shortest sleep between polls; a zero interval in the config is raised to it
pub const MIN_POLL_INTERVAL_MS: u64 = 1;

// =============================================================================
// CONFIG
// =============================================================================

/// Time budget and polling schedule of an assertion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Total time budget in milliseconds
    pub timeout_ms: u64,
    /// First sleep between polls in milliseconds
    pub poll_interval_ms: u64,
    /// Upper bound for the sleep between polls in milliseconds
    pub max_poll_interval_ms: u64,
    /// Factor applied to the sleep after every unsuccessful poll
    pub backoff: f64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_interval_ms: DEFAULT_MAX_POLL_INTERVAL_MS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl VerifyConfig {
    /// Default schedule with a different time budget
    #[must_use]
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            ..Self::default()
        }
    }

    /// Schedule used while waiting for an application to appear
    #[must_use]
    pub fn app_wait() -> Self {
        Self {
            timeout_ms: 5000,
            poll_interval_ms: 600,
            max_poll_interval_ms: 600,
            backoff: 1.0,
        }
    }

    /// Set the time budget
    #[must_use]
    pub const fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Set the first poll interval
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the poll interval ceiling
    #[must_use]
    pub const fn with_max_poll_interval_ms(mut self, ms: u64) -> Self {
        self.max_poll_interval_ms = ms;
        self
    }

    /// Set the backoff factor (values below 1.0 are treated as 1.0)
    #[must_use]
    pub fn with_backoff(mut self, backoff: f64) -> Self {
        self.backoff = backoff;
        self
    }

    /// Time budget
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// First poll interval
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// POLLER
// =============================================================================

/// Deadline and sleep schedule shared by every polling loop
#[derive(Debug)]
pub struct Poller {
    start: Instant,
    deadline: Instant,
    interval: Duration,
    max_interval: Duration,
    backoff: f64,
    attempts: usize,
}

impl Poller {
    /// Start the clock
    #[must_use]
    pub fn new(config: &VerifyConfig) -> Self {
        let start = Instant::now();
        let interval = config
            .poll_interval()
            .max(Duration::from_millis(MIN_POLL_INTERVAL_MS));
        Self {
            start,
            deadline: start + config.timeout(),
            interval,
            max_interval: Duration::from_millis(config.max_poll_interval_ms).max(interval),
            backoff: config.backoff.max(1.0),
            attempts: 0,
        }
    }

    /// Count a poll
    pub fn attempt(&mut self) -> usize {
        self.attempts += 1;
        self.attempts
    }

    /// Polls counted so far
    #[must_use]
    pub const fn attempts(&self) -> usize {
        self.attempts
    }

    /// Time since the poller started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Sleep the next interval (never past the deadline).
    ///
    /// Returns `false` without sleeping once the deadline has passed.
    pub fn wait(&mut self) -> bool {
        let Some(next) = self.next_sleep() else {
            return false;
        };
        std::thread::sleep(next);
        true
    }

    fn next_sleep(&mut self) -> Option<Duration> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        let sleep = self.interval.min(remaining);
        self.interval = self.interval.mul_f64(self.backoff).min(self.max_interval);
        Some(sleep)
    }
}

// =============================================================================
// EXPECTATION
// =============================================================================

/// Condition checked on each resolved element
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// The element itself matches.
    ///
    /// The element is judged on its own, with no ancestors, so `child_of`
    /// and `descendant_of` never hold here. Put structural constraints in
    /// the query instead.
    Matches(Predicate),
    /// The element or one of its descendants matches
    Shows(Predicate),
}

impl Expectation {
    /// Whether the element satisfies the expectation
    #[must_use]
    pub fn holds(&self, element: &ElementHandle) -> bool {
        match self {
            Self::Matches(p) => p.matches(element, &[]),
            Self::Shows(p) => {
                let mut found = false;
                element.walk(|el, ancestors| {
                    found = found || p.matches(el, ancestors);
                });
                found
            }
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matches(p) => write!(f, "matches {p}"),
            Self::Shows(p) => write!(f, "shows {p}"),
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Where an assertion run stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssertionState {
    /// Not yet decided
    Pending,
    /// The expectation held on some poll
    Satisfied,
    /// The deadline passed without the expectation holding
    TimedOut,
}

impl AssertionState {
    /// Whether the run is over
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Evidence of a satisfied assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Policy applied on every poll
    pub policy: Cardinality,
    /// Polls performed
    pub attempts: usize,
    /// Time spent polling
    pub elapsed: Duration,
    /// Elements of the satisfying poll with their verdicts
    pub observed: Vec<ObservedElement>,
}

/// One assertion run against a live tree
pub struct Assertion<'a> {
    service: &'a dyn AccessibilityService,
    query: &'a Query,
    policy: Cardinality,
    expectation: &'a Expectation,
    poller: Poller,
    state: AssertionState,
    last_observed: Vec<ObservedElement>,
}

impl fmt::Debug for Assertion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assertion")
            .field("query", &self.query.to_string())
            .field("policy", &self.policy)
            .field("expectation", &self.expectation.to_string())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<'a> Assertion<'a> {
    /// Prepare a run; the clock starts now
    #[must_use]
    pub fn new(
        service: &'a dyn AccessibilityService,
        query: &'a Query,
        policy: Cardinality,
        expectation: &'a Expectation,
        config: &VerifyConfig,
    ) -> Self {
        Self {
            service,
            query,
            policy,
            expectation,
            poller: Poller::new(config),
            state: AssertionState::Pending,
            last_observed: Vec::new(),
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> AssertionState {
        self.state
    }

    /// Elements seen by the latest poll with their verdicts
    #[must_use]
    pub fn last_observed(&self) -> &[ObservedElement] {
        &self.last_observed
    }

    /// Run one poll. A terminal run is not polled again.
    ///
    /// # Errors
    ///
    /// Returns query and resolution errors as soon as they occur.
    pub fn poll(&mut self) -> SondeoResult<AssertionState> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        let attempt = self.poller.attempt();
        let set = self.query.evaluate(self.service)?;
        let resolved = resolve(&set, self.policy, Purpose::Assertion)?;

        self.last_observed = resolved
            .handles()
            .iter()
            .map(|el| ObservedElement {
                element: el.summary(),
                satisfied: self.expectation.holds(el),
            })
            .collect();
        let verdicts = self.last_observed.iter().map(|o| o.satisfied);
        let holds = match self.policy {
            Cardinality::All => verdicts.fold(true, |acc, v| acc && v),
            Cardinality::Any | Cardinality::First | Cardinality::ExactlyOne => {
                verdicts.fold(false, |acc, v| acc || v)
            }
        };
        tracing::trace!(
            attempt,
            observed = self.last_observed.len(),
            holds,
            "assertion poll"
        );
        if holds {
            self.state = AssertionState::Satisfied;
        }
        Ok(self.state)
    }

    /// Poll until the expectation holds or the deadline passes.
    ///
    /// # Errors
    ///
    /// Returns [`SondeoError::AssertionTimeout`](crate::SondeoError::AssertionTimeout)
    /// with the last observation when the deadline passes, and query or
    /// resolution errors immediately.
    pub fn run(mut self) -> SondeoResult<VerifyReport> {
        loop {
            if self.poll()? == AssertionState::Satisfied {
                let report = VerifyReport {
                    policy: self.policy,
                    attempts: self.poller.attempts(),
                    elapsed: self.poller.elapsed(),
                    observed: self.last_observed,
                };
                tracing::info!(
                    query = %self.query,
                    expectation = %self.expectation,
                    attempts = report.attempts,
                    "assertion satisfied"
                );
                return Ok(report);
            }
            if !self.poller.wait() {
                self.state = AssertionState::TimedOut;
                let err = AssertionTimeout {
                    description: format!("{} {}", self.query, self.expectation),
                    policy: self.policy,
                    attempts: self.poller.attempts(),
                    elapsed: self.poller.elapsed(),
                    last_observed: self.last_observed,
                };
                tracing::warn!(%err, "assertion timed out");
                return Err(err.into());
            }
        }
    }
}

/// Poll `query` until `expectation` holds under `policy`.
///
/// # Errors
///
/// See [`Assertion::run`].
pub fn verify(
    service: &dyn AccessibilityService,
    query: &Query,
    policy: Cardinality,
    expectation: &Expectation,
    config: &VerifyConfig,
) -> SondeoResult<VerifyReport> {
    Assertion::new(service, query, policy, expectation, config).run()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::desktop::{InMemoryDesktop, NodeSpec};
    use crate::element::{NodeId, Role};
    use crate::query::{by, objects_in};
    use std::sync::Arc;
    use std::thread;

    fn counter() -> (Arc<InMemoryDesktop>, NodeId, NodeId) {
        let d = Arc::new(InMemoryDesktop::new());
        let app = d.add_application("counter");
        let panel = d.add_node(&app, NodeSpec::new(Role::Panel)).unwrap();
        let label = d
            .add_node(&panel, NodeSpec::new(Role::Label).text("0"))
            .unwrap();
        (d, app, label)
    }

    fn fast(timeout_ms: u64) -> VerifyConfig {
        VerifyConfig::new(timeout_ms)
            .with_poll_interval_ms(5)
            .with_max_poll_interval_ms(20)
    }

    mod config_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let c = VerifyConfig::default();
            assert_eq!(c.timeout_ms, 5000);
            assert_eq!(c.poll_interval(), Duration::from_millis(50));
            assert_eq!(VerifyConfig::app_wait().poll_interval_ms, 600);
        }

        #[test]
        fn test_partial_yaml_keeps_defaults() {
            let c: VerifyConfig = serde_yaml_ng::from_str("timeout_ms: 250").unwrap();
            assert_eq!(c.timeout_ms, 250);
            assert_eq!(c.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }
    }

    mod poller_tests {
        use super::*;

        #[test]
        fn test_interval_grows_to_ceiling() {
            let config = VerifyConfig::new(60_000)
                .with_poll_interval_ms(10)
                .with_max_poll_interval_ms(40)
                .with_backoff(2.0);
            let mut poller = Poller::new(&config);
            let sleeps: Vec<u128> = (0..4)
                .map(|_| poller.next_sleep().unwrap().as_millis())
                .collect();
            assert_eq!(sleeps, vec![10, 20, 40, 40]);
        }

        #[test]
        fn test_never_sleeps_past_deadline() {
            let config = VerifyConfig::new(30).with_poll_interval_ms(1000);
            let mut poller = Poller::new(&config);
            assert!(poller.next_sleep().unwrap() <= Duration::from_millis(30));
        }

        #[test]
        fn test_zero_interval_is_raised_to_minimum() {
            let config = VerifyConfig::new(60_000)
                .with_poll_interval_ms(0)
                .with_max_poll_interval_ms(0);
            let mut poller = Poller::new(&config);
            for _ in 0..3 {
                assert_eq!(
                    poller.next_sleep().unwrap(),
                    Duration::from_millis(MIN_POLL_INTERVAL_MS)
                );
            }
        }

        #[test]
        fn test_zero_timeout_never_waits() {
            let mut poller = Poller::new(&VerifyConfig::new(0));
            assert!(!poller.wait());
        }
    }

    mod expectation_tests {
        use super::*;

        #[test]
        fn test_shows_looks_at_descendants() {
            let (d, app, _) = counter();
            let panel = objects_in(app, by::role(Role::Panel)).evaluate(&*d).unwrap();
            let shows = Expectation::Shows(by::text("0"));
            let matches = Expectation::Matches(by::text("0"));
            assert!(shows.holds(&panel[0]));
            assert!(!matches.holds(&panel[0]));
            assert_eq!(shows.to_string(), "shows text=\"0\"");
        }

        #[test]
        fn test_matches_judges_the_element_alone() {
            let (d, app, _) = counter();
            let query = objects_in(
                app,
                by::role(Role::Label) & by::child_of(by::role(Role::Panel)),
            );
            let labels = query.evaluate(&*d).unwrap();
            assert_eq!(labels.len(), 1);
            let structural = Expectation::Matches(by::child_of(by::role(Role::Panel)));
            assert!(!structural.holds(&labels[0]));
            assert!(Expectation::Matches(by::scope_root()).holds(&labels[0]));
        }
    }

    mod engine_tests {
        use super::*;

        #[test]
        fn test_satisfied_after_delayed_change() {
            let (d, app, label) = counter();
            let writer = Arc::clone(&d);
            let handle = thread::spawn(move || {
                thread::sleep(Duration::from_millis(60));
                writer.set_text(&label, "4").unwrap();
            });
            let query = objects_in(app, by::role(Role::Label));
            let report = verify(
                &*d,
                &query,
                Cardinality::Any,
                &Expectation::Matches(by::text("4")),
                &fast(2000),
            )
            .unwrap();
            handle.join().unwrap();
            assert!(report.attempts > 1);
            assert!(report.observed[0].satisfied);
        }

        #[test]
        fn test_times_out_with_last_observation() {
            let (d, app, label) = counter();
            let writer = Arc::clone(&d);
            let handle = thread::spawn(move || {
                thread::sleep(Duration::from_millis(300));
                writer.set_text(&label, "4").unwrap();
            });
            let query = objects_in(app, by::role(Role::Label));
            let err = verify(
                &*d,
                &query,
                Cardinality::Any,
                &Expectation::Matches(by::text("4")),
                &fast(50),
            )
            .unwrap_err();
            handle.join().unwrap();
            let timeout = err.as_timeout().unwrap();
            assert!(timeout.attempts >= 1);
            assert_eq!(timeout.last_observed.len(), 1);
            assert_eq!(timeout.last_observed[0].element.text, "0");
            assert!(!timeout.last_observed[0].satisfied);
            assert!(timeout.elapsed >= Duration::from_millis(50));
        }

        #[test]
        fn test_zero_poll_interval_does_not_spin() {
            let (d, app, _) = counter();
            let query = objects_in(app, by::role(Role::Label));
            let config = VerifyConfig::new(100).with_poll_interval_ms(0);
            let err = verify(
                &*d,
                &query,
                Cardinality::Any,
                &Expectation::Matches(by::text("1")),
                &config,
            )
            .unwrap_err();
            // one poll per millisecond at most, plus the first and last
            let attempts = err.as_timeout().unwrap().attempts;
            assert!(attempts >= 2);
            assert!(attempts <= 102, "{attempts} polls in 100ms");
        }

        #[test]
        fn test_zero_timeout_polls_once() {
            let (d, app, _) = counter();
            let query = objects_in(app, by::role(Role::Label));
            let ok = verify(
                &*d,
                &query,
                Cardinality::ExactlyOne,
                &Expectation::Matches(by::text("0")),
                &VerifyConfig::new(0),
            )
            .unwrap();
            assert_eq!(ok.attempts, 1);

            let err = verify(
                &*d,
                &query,
                Cardinality::ExactlyOne,
                &Expectation::Matches(by::text("1")),
                &VerifyConfig::new(0),
            )
            .unwrap_err();
            assert_eq!(err.as_timeout().unwrap().attempts, 1);
        }

        #[test]
        fn test_resolution_error_not_retried() {
            let (d, app, _) = counter();
            let query = objects_in(app, by::role(Role::PushButton));
            let start = Instant::now();
            let err = verify(
                &*d,
                &query,
                Cardinality::First,
                &Expectation::Matches(by::any()),
                &VerifyConfig::new(5000),
            )
            .unwrap_err();
            assert!(err.as_resolution().unwrap().is_empty());
            assert!(start.elapsed() < Duration::from_millis(1000));
        }

        #[test]
        fn test_empty_all_is_vacuous_and_empty_any_fails() {
            let (d, app, _) = counter();
            let query = objects_in(app, by::role(Role::PushButton));
            let expectation = Expectation::Matches(by::any());
            assert!(verify(&*d, &query, Cardinality::All, &expectation, &fast(0)).is_ok());
            assert!(verify(&*d, &query, Cardinality::Any, &expectation, &fast(0))
                .unwrap_err()
                .as_timeout()
                .is_some());
        }

        #[test]
        fn test_all_needs_every_element() {
            let (d, app, _) = counter();
            let panel = d.find(Role::Panel, "").unwrap();
            d.add_node(&panel, NodeSpec::new(Role::Label).text("1"))
                .unwrap();
            let query = objects_in(app, by::role(Role::Label));
            let digit = Expectation::Matches(by::text_matching(r"\d").unwrap());
            let zero = Expectation::Matches(by::text("0"));
            assert!(verify(&*d, &query, Cardinality::All, &digit, &fast(0)).is_ok());
            let err = verify(&*d, &query, Cardinality::All, &zero, &fast(0)).unwrap_err();
            let observed = &err.as_timeout().unwrap().last_observed;
            assert_eq!(
                observed.iter().map(|o| o.satisfied).collect::<Vec<_>>(),
                vec![true, false]
            );
        }

        #[test]
        fn test_terminal_state_is_not_polled_again() {
            let (d, app, _) = counter();
            let query = objects_in(app, by::role(Role::Label));
            let expectation = Expectation::Matches(by::text("0"));
            let mut run = Assertion::new(
                &*d,
                &query,
                Cardinality::First,
                &expectation,
                &VerifyConfig::default(),
            );
            assert_eq!(run.poll().unwrap(), AssertionState::Satisfied);
            d.remove_node(&d.find(Role::Label, "").unwrap()).unwrap();
            assert_eq!(run.poll().unwrap(), AssertionState::Satisfied);
            assert_eq!(run.last_observed().len(), 1);
        }
    }
}
