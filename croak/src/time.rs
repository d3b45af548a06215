use embedded_time::duration::Milliseconds;
use embedded_time::Instant;

/// A duration, in milliseconds
pub type Millis = Milliseconds<u64>;

/// Supertrait of [`embedded_time::Clock`] pinning the
/// type of "ticks" to u64
pub trait Clock: embedded_time::Clock<T = u64> + core::fmt::Debug {}
impl<C: embedded_time::Clock<T = u64> + core::fmt::Debug> Clock for C {}

/// Milliseconds elapsed between `start` and `now`,
/// or 0 if `now` is before `start`.
pub fn millis_since<C: Clock>(start: Instant<C>, now: Instant<C>) -> u64 {
  now.checked_duration_since(&start)
     .and_then(|d| Millis::try_from(d).ok())
     .map(|Milliseconds(ms)| ms)
     .unwrap_or(0)
}

/// Milliseconds from `now` until `then`,
/// or 0 if `then` has already passed.
pub fn millis_until<C: Clock>(now: Instant<C>, then: Instant<C>) -> u64 {
  millis_since(now, then)
}

/// Milliseconds since the clock's epoch
pub fn millis_since_epoch<C: Clock>(t: Instant<C>) -> u64 {
  Millis::try_from(t.duration_since_epoch()).map(|Milliseconds(ms)| ms)
                                            .unwrap_or(0)
}

/// The sooner of two optional durations
pub(crate) fn sooner(a: Option<Millis>, b: Option<Millis>) -> Option<Millis> {
  match (a, b) {
    | (Some(Milliseconds(a)), Some(Milliseconds(b))) => Some(Milliseconds(a.min(b))),
    | (a, None) => a,
    | (None, b) => b,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test::ClockMock;

  #[test]
  fn until_and_since() {
    let a = ClockMock::instant(1_000);
    let b = ClockMock::instant(4_500);

    assert_eq!(millis_until(a, b), 3_500);
    assert_eq!(millis_until(b, a), 0);
    assert_eq!(millis_since(a, b), 3_500);
    assert_eq!(millis_since_epoch(b), 4_500);
  }

  #[test]
  fn sooner_prefers_some() {
    assert_eq!(sooner(None, Some(Milliseconds(3))), Some(Milliseconds(3)));
    assert_eq!(sooner(Some(Milliseconds(9)), Some(Milliseconds(3))),
               Some(Milliseconds(3)));
    assert_eq!(sooner(None, None), None);
  }
}
