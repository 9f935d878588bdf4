use std::time::Duration;

/// Retry and timeout policy for remote invocations.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
  /// Whole-invocation attempts (fresh correlation and graph each time).
  pub max_attempts: u32,
  /// Channel establishment attempts per invocation attempt.
  pub max_connect_attempts: u32,
  /// Connection backoff is `backoff_base * 2^attempt`.
  pub backoff_base: Duration,
  /// Default budget for one invocation attempt to produce a result.
  pub timeout: Duration,
  /// Budget for the dispatcher to answer a registration.
  pub registration_timeout: Duration,
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      max_connect_attempts: 5,
      backoff_base: Duration::from_secs(1),
      timeout: Duration::from_secs(600),
      registration_timeout: Duration::from_secs(30),
    }
  }
}

impl RemoteConfig {
  /// Delay before connection attempt `attempt + 1`.
  pub fn backoff(&self, attempt: u32) -> Duration {
    self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
  }
}
