use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::error::{ProviderError, ProviderResult};

const MAX_BACKOFF_EXPONENT: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before the retry following `attempt` (1-based): base, 2x, 4x...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = (attempt.max(1) - 1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay * 2_u32.pow(exponent)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && err.is_retryable() => {
                    let delay = self.backoff(attempt);
                    warn!(
                        op = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,
    /// Successes in half-open needed to close again.
    pub success_threshold: u32,
    /// How long an open circuit rejects before letting a trial through.
    pub open_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

/// Endpoint families that trip independently, so a failing profile
/// endpoint never blocks message sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointCategory {
    Instance,
    Message,
    Webhook,
    Chat,
    Profile,
    Default,
}

impl EndpointCategory {
    pub const ALL: [EndpointCategory; 6] = [
        EndpointCategory::Instance,
        EndpointCategory::Message,
        EndpointCategory::Webhook,
        EndpointCategory::Chat,
        EndpointCategory::Profile,
        EndpointCategory::Default,
    ];

    pub fn for_path(path: &str) -> Self {
        if path.contains("/instance") || path.contains("/connect") || path.contains("/disconnect")
        {
            EndpointCategory::Instance
        } else if path.contains("/message") || path.contains("/send") {
            EndpointCategory::Message
        } else if path.contains("/webhook") || path.contains("/globalwebhook") {
            EndpointCategory::Webhook
        } else if path.contains("/chat") {
            EndpointCategory::Chat
        } else if path.contains("/profile") {
            EndpointCategory::Profile
        } else {
            EndpointCategory::Default
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EndpointCategory::Instance => "instance",
            EndpointCategory::Message => "message",
            EndpointCategory::Webhook => "webhook",
            EndpointCategory::Chat => "chat",
            EndpointCategory::Profile => "profile",
            EndpointCategory::Default => "default",
        }
    }

    /// Message sends trip sooner, profile lookups cool down longer.
    pub fn default_settings(self) -> BreakerSettings {
        match self {
            EndpointCategory::Message => BreakerSettings {
                failure_threshold: 3,
                open_timeout: Duration::from_secs(15),
                ..BreakerSettings::default()
            },
            EndpointCategory::Profile => BreakerSettings {
                open_timeout: Duration::from_secs(60),
                ..BreakerSettings::default()
            },
            _ => BreakerSettings::default(),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    reopen_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    category: EndpointCategory,
    settings: BreakerSettings,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(category: EndpointCategory, settings: BreakerSettings) -> Self {
        Self {
            category,
            settings,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                reopen_at: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Admits a request, or rejects it while the circuit is open. The first
    /// call after the open timeout moves the circuit to half-open.
    pub fn acquire(&self) -> ProviderResult<()> {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }
        let now = Instant::now();
        match inner.reopen_at {
            Some(at) if now < at => Err(ProviderError::CircuitOpen {
                category: self.category.as_str(),
                retry_after_ms: (at - now).as_millis() as u64,
            }),
            _ => {
                info!(category = self.category.as_str(), "circuit half-open");
                inner.state = CircuitState::HalfOpen;
                inner.successes = 0;
                Ok(())
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.settings.success_threshold {
                    info!(category = self.category.as_str(), "circuit closed");
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.reopen_at = None;
                }
            }
            CircuitState::Closed => inner.failures = 0,
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures += 1;
        let trip = inner.state == CircuitState::HalfOpen
            || inner.failures >= self.settings.failure_threshold;
        if trip && inner.state != CircuitState::Open {
            warn!(
                category = self.category.as_str(),
                failures = inner.failures,
                open_ms = self.settings.open_timeout.as_millis() as u64,
                "circuit opened"
            );
            inner.state = CircuitState::Open;
            inner.successes = 0;
            inner.reopen_at = Some(Instant::now() + self.settings.open_timeout);
        }
    }

    /// Runs `fut` through the breaker. Only transient failures count against
    /// the circuit; a rejected credential says nothing about backend health.
    pub async fn call<T, Fut>(&self, fut: Fut) -> ProviderResult<T>
    where
        Fut: Future<Output = ProviderResult<T>>,
    {
        self.acquire()?;
        let result = fut.await;
        match &result {
            Ok(_) => self.record_success(),
            Err(err) if err.is_retryable() => self.record_failure(),
            Err(_) => {}
        }
        result
    }
}

/// One breaker per endpoint category. Clones share state.
#[derive(Debug, Clone)]
pub struct CircuitBreakers {
    breakers: Arc<[CircuitBreaker; 6]>,
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self::build(EndpointCategory::default_settings)
    }
}

impl CircuitBreakers {
    /// Same thresholds for every category.
    pub fn uniform(settings: BreakerSettings) -> Self {
        Self::build(|_| settings)
    }

    fn build(settings: impl Fn(EndpointCategory) -> BreakerSettings) -> Self {
        let breakers = EndpointCategory::ALL.map(|c| CircuitBreaker::new(c, settings(c)));
        Self {
            breakers: Arc::new(breakers),
        }
    }

    pub fn get(&self, category: EndpointCategory) -> &CircuitBreaker {
        &self.breakers[category.index()]
    }

    pub fn for_path(&self, path: &str) -> &CircuitBreaker {
        self.get(EndpointCategory::for_path(path))
    }
}
