/*!
Recency specifies how up-to-date a node's property bag should be when read.

Staleness is explicit: reading from cache never talks to the bridge, and
anything that does talk to the bridge says so at the call site.
*/

use std::time::Duration;

/// How fresh a value should be when retrieved.
///
/// # Examples
///
/// ```ignore
/// // Cached bag, might be stale
/// let info = node.properties(Recency::Any)?;
///
/// // Always ask the bridge
/// let info = node.properties(Recency::Current)?;
///
/// // Ask the bridge if the cached bag is older than 250ms
/// let info = node.properties(Recency::max_age_ms(250))?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recency {
  /// Use the cached value. No bridge calls. Might be arbitrarily stale.
  #[default]
  Any,

  /// Always fetch from the bridge.
  Current,

  /// Value must be at most this old. Fetch from the bridge if older.
  MaxAge(Duration),
}

impl Recency {
  /// Max age in milliseconds.
  ///
  /// ```
  /// use jabio::Recency;
  /// use std::time::Duration;
  ///
  /// let recency = Recency::max_age_ms(100);
  /// assert!(recency.is_satisfied_by(Duration::from_millis(50)));
  /// assert!(!recency.is_satisfied_by(Duration::from_millis(150)));
  /// ```
  #[inline]
  pub const fn max_age_ms(ms: u32) -> Self {
    Self::MaxAge(Duration::from_millis(ms as u64))
  }

  /// Check if a value with the given age satisfies this recency requirement.
  #[inline]
  pub fn is_satisfied_by(&self, age: Duration) -> bool {
    match self {
      Recency::Any => true,
      Recency::Current => false,
      Recency::MaxAge(max) => age <= *max,
    }
  }
}
