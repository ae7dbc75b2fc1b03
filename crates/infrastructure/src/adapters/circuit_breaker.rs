//! Circuit breaker for upstream DAV hosts
//!
//! Stops dispatching to a host after consecutive failures and lets a single
//! probe through once the cooldown has elapsed.
//!
//! # States
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Host is failing, requests fail fast without touching the network
//! - **Half-Open**: Cooldown elapsed, exactly one probe request is admitted
//!
//! # Example
//!
//! ```rust,ignore
//! use infrastructure::adapters::CircuitBreaker;
//!
//! let cb = CircuitBreaker::new("dav.example.com");
//! let result = cb.call(|| async {
//!     client.get(url).send().await
//! }).await;
//! ```

use std::{
    fmt,
    time::{Duration, Instant},
};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// Configuration for a circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time to wait before transitioning from Open to Half-Open
    pub half_open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            half_open_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a custom configuration
    #[must_use]
    pub const fn custom(failure_threshold: u32, half_open_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            half_open_timeout,
        }
    }
}

/// State of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Host is failing, requests fail fast
    Open,
    /// Cooldown elapsed, one probe is allowed
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Error returned when the circuit rejects a call
#[derive(Debug, Clone)]
pub struct CircuitOpenError {
    /// Host the breaker guards
    pub host: String,
}

impl std::error::Error for CircuitOpenError {}

impl fmt::Display for CircuitOpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Circuit breaker open for host '{}': service is temporarily unavailable",
            self.host
        )
    }
}

struct CircuitBreakerState {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl CircuitBreakerState {
    const fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// Circuit breaker shared by every request to one host
///
/// All counters live behind a single lock, so concurrent callers observe and
/// update them atomically.
pub struct CircuitBreaker {
    host: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitBreakerState>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("host", &self.host)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Whether a call was admitted as the half-open probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// Releases the probe slot if the probe future is dropped before finishing
struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.state.write().probe_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    /// Creates a breaker with default configuration
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_config(host, CircuitBreakerConfig::default())
    }

    /// Creates a breaker with custom configuration
    #[must_use]
    pub fn with_config(host: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            host: host.into(),
            config,
            state: RwLock::new(CircuitBreakerState::closed()),
        }
    }

    /// Host this breaker guards
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Current state, moving Open to HalfOpen once the cooldown has elapsed
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.write();
        self.refresh(&mut state);
        state.state
    }

    /// Returns true if the circuit is closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Returns true if the circuit is open
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    fn refresh(&self, state: &mut CircuitBreakerState) {
        if state.state != CircuitState::Open {
            return;
        }
        if let Some(opened_at) = state.opened_at {
            let elapsed = opened_at.elapsed();
            if elapsed >= self.config.half_open_timeout {
                debug!(
                    host = %self.host,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Circuit transitioning from Open to HalfOpen"
                );
                state.state = CircuitState::HalfOpen;
                state.probe_in_flight = false;
            }
        }
    }

    /// Decide whether a call may go out
    fn admit(&self) -> Option<Admission> {
        let mut state = self.state.write();
        self.refresh(&mut state);
        match state.state {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open => None,
            CircuitState::HalfOpen if state.probe_in_flight => None,
            CircuitState::HalfOpen => {
                state.probe_in_flight = true;
                Some(Admission::Probe)
            },
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut state = self.state.write();
        state.failure_count = 0;
        if admission == Admission::Probe {
            info!(host = %self.host, "Probe succeeded, circuit transitioning from HalfOpen to Closed");
            *state = CircuitBreakerState::closed();
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut state = self.state.write();
        match (admission, state.state) {
            (Admission::Probe, _) => {
                warn!(host = %self.host, "Probe failed, circuit transitioning from HalfOpen to Open");
                Self::trip(&mut state);
            },
            (Admission::Normal, CircuitState::Closed) => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    warn!(
                        host = %self.host,
                        failures = state.failure_count,
                        "Circuit transitioning from Closed to Open"
                    );
                    Self::trip(&mut state);
                }
            },
            // A call admitted while closed that finishes after the circuit
            // already tripped does not extend the cooldown.
            (Admission::Normal, CircuitState::Open | CircuitState::HalfOpen) => {},
        }
    }

    fn trip(state: &mut CircuitBreakerState) {
        state.state = CircuitState::Open;
        state.opened_at = Some(Instant::now());
        state.failure_count = 0;
        state.probe_in_flight = false;
    }

    /// Calls an async operation through the circuit breaker
    ///
    /// If the circuit rejects the call, returns `CircuitOpenError` without
    /// running `f`. Otherwise runs the operation and records its outcome.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: fmt::Debug,
    {
        let Some(admission) = self.admit() else {
            warn!(host = %self.host, "Circuit breaker preventing call to host");
            return Err(CircuitBreakerError::CircuitOpen(CircuitOpenError {
                host: self.host.clone(),
            }));
        };

        debug!(host = %self.host, probe = admission == Admission::Probe, "Calling host through circuit breaker");

        let mut slot = ProbeSlot {
            breaker: self,
            armed: admission == Admission::Probe,
        };
        let outcome = f().await;
        slot.armed = false;

        match outcome {
            Ok(result) => {
                self.on_success(admission);
                Ok(result)
            },
            Err(e) => {
                debug!(host = %self.host, error = ?e, "Call counted as failure");
                self.on_failure(admission);
                Err(CircuitBreakerError::ServiceError(e))
            },
        }
    }
}

/// Error type for circuit breaker operations
#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    /// The circuit rejected the call
    CircuitOpen(CircuitOpenError),
    /// The underlying call failed
    ServiceError(E),
}

impl<E: fmt::Display> fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen(e) => write!(f, "{e}"),
            Self::ServiceError(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CircuitBreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CircuitOpen(e) => Some(e),
            Self::ServiceError(e) => Some(e),
        }
    }
}

impl<E> CircuitBreakerError<E> {
    /// Returns true if this is a circuit open error
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen(_))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    fn fast(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::with_config(
            "dav.test",
            CircuitBreakerConfig::custom(threshold, Duration::from_millis(50)),
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CircuitBreakerError<&'static str>> {
        cb.call(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), CircuitBreakerError<&'static str>> {
        cb.call(|| async { Ok::<_, &'static str>(()) }).await
    }

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::new("dav.example.com");
        assert_eq!(cb.host(), "dav.example.com");
        assert!(cb.is_closed());
    }

    #[test]
    fn state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }

    #[test]
    fn open_error_names_host() {
        let err = CircuitOpenError {
            host: "dav.example.com".to_string(),
        };
        assert!(err.to_string().contains("dav.example.com"));
    }

    #[test]
    fn config_default() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.half_open_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn opens_after_threshold_and_skips_the_call() {
        let cb = fast(3);
        for _ in 0..3 {
            assert!(!fail(&cb).await.unwrap_err().is_circuit_open());
        }
        assert!(cb.is_open());

        let calls = AtomicU32::new(0);
        let result = cb
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;
        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures() {
        let cb = fast(3);
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        succeed(&cb).await.unwrap();
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        assert!(cb.is_closed());
    }

    #[tokio::test]
    async fn successful_probe_closes() {
        let cb = fast(1);
        fail(&cb).await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb).await.unwrap();
        assert!(cb.is_closed());
    }

    #[tokio::test]
    async fn failed_probe_reopens() {
        let cb = fast(1);
        fail(&cb).await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(80)).await;
        fail(&cb).await.unwrap_err();
        assert!(cb.is_open());
    }

    #[tokio::test]
    async fn half_open_admits_exactly_one_probe() {
        let cb = Arc::new(fast(1));
        fail(&cb).await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let probe = {
            let cb = Arc::clone(&cb);
            tokio::spawn(async move {
                cb.call(|| async {
                    let _ = release_rx.await;
                    Ok::<_, &str>(())
                })
                .await
            })
        };
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(succeed(&cb).await.unwrap_err().is_circuit_open());

        release_tx.send(()).unwrap();
        probe.await.unwrap().unwrap();
        assert!(cb.is_closed());
        succeed(&cb).await.unwrap();
    }

    #[tokio::test]
    async fn dropped_probe_frees_the_slot() {
        let cb = fast(1);
        fail(&cb).await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let pending = cb.call(|| std::future::pending::<Result<(), &str>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());

        succeed(&cb).await.unwrap();
        assert!(cb.is_closed());
    }
}
