//! Staleness rules for cached snapshots.

use chrono::{DateTime, Duration, Utc};

/// Default staleness window
pub const DEFAULT_STALE_AFTER_SECS: u64 = 5 * 60;

/// A snapshot with no timestamp is always stale; otherwise it is stale once
/// strictly older than `max_age`.
pub fn is_stale(last_fetch: Option<DateTime<Utc>>, now: DateTime<Utc>, max_age: Duration) -> bool {
  match last_fetch {
    Some(fetched_at) => now - fetched_at > max_age,
    None => true,
  }
}

/// Indicates where displayed data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still within the staleness window
  CacheFresh,
  /// Data from cache, past the window; a refresh is running or has failed
  CacheStale,
}

/// Configurable staleness window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
  max_age: Duration,
}

impl Default for FreshnessPolicy {
  fn default() -> Self {
    Self::from_secs(DEFAULT_STALE_AFTER_SECS)
  }
}

impl FreshnessPolicy {
  pub fn new(max_age: Duration) -> Self {
    Self { max_age }
  }

  pub fn from_secs(secs: u64) -> Self {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
    Self::new(Duration::seconds(secs))
  }

  pub fn max_age(&self) -> Duration {
    self.max_age
  }

  pub fn is_stale(&self, last_fetch: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    is_stale(last_fetch, now, self.max_age)
  }

  pub fn classify(&self, last_fetch: Option<DateTime<Utc>>, now: DateTime<Utc>) -> CacheSource {
    if self.is_stale(last_fetch, now) {
      CacheSource::CacheStale
    } else {
      CacheSource::CacheFresh
    }
  }
}

/// Render an age like "42s", "5m", "3h", "2d".
pub fn describe_age(last_fetch: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let secs = (now - last_fetch).num_seconds().max(0);
  match secs {
    0..=59 => format!("{}s", secs),
    60..=3599 => format!("{}m", secs / 60),
    3600..=86399 => format!("{}h", secs / 3600),
    _ => format!("{}d", secs / 86400),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn five_minutes() -> Duration {
    Duration::minutes(5)
  }

  #[test]
  fn test_missing_timestamp_is_stale() {
    assert!(is_stale(None, Utc::now(), five_minutes()));
  }

  #[test]
  fn test_staleness_boundary() {
    let now = Utc::now();
    assert!(is_stale(
      Some(now - Duration::seconds(301)),
      now,
      five_minutes()
    ));
    assert!(!is_stale(
      Some(now - Duration::seconds(299)),
      now,
      five_minutes()
    ));
    assert!(!is_stale(
      Some(now - Duration::seconds(300)),
      now,
      five_minutes()
    ));
  }

  #[test]
  fn test_future_timestamp_is_fresh() {
    let now = Utc::now();
    assert!(!is_stale(
      Some(now + Duration::seconds(30)),
      now,
      five_minutes()
    ));
  }

  #[test]
  fn test_policy_is_configurable() {
    let now = Utc::now();
    let policy = FreshnessPolicy::from_secs(60);
    assert_eq!(
      policy.classify(Some(now - Duration::seconds(61)), now),
      CacheSource::CacheStale
    );
    assert_eq!(
      FreshnessPolicy::default().classify(Some(now - Duration::seconds(61)), now),
      CacheSource::CacheFresh
    );
  }

  #[test]
  fn test_describe_age() {
    let now = Utc::now();
    assert_eq!(describe_age(now - Duration::seconds(42), now), "42s");
    assert_eq!(describe_age(now - Duration::minutes(5), now), "5m");
    assert_eq!(describe_age(now - Duration::hours(3), now), "3h");
    assert_eq!(describe_age(now - Duration::days(2), now), "2d");
  }
}
