use core::ops::RangeInclusive;

use embedded_time::duration::Milliseconds;
use embedded_time::Instant;
use rand::Rng;

use crate::time::{millis_since, Clock};

/// A non-blocking timer that allows a fixed-delay or exponential-backoff retry,
/// that lives alongside some operation to retry.
///
/// It does not _contain_ the work to be done (e.g. `Box<fn()>`); callers
/// keep the retryable thing next to the timer and ask it what to do.
///
/// ```
/// use embedded_time::duration::Milliseconds;
/// use embedded_time::Instant;
/// use croak::retry::{Attempts, RetryTimer, Strategy, YouShould};
/// use rand::SeedableRng;
///
/// # #[derive(Debug)]
/// # struct Clock;
/// # impl embedded_time::Clock for Clock {
/// #   type T = u64;
/// #   const SCALING_FACTOR: embedded_time::rate::Fraction = embedded_time::rate::Fraction::new(1, 1000);
/// #   fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> { Ok(Instant::new(0)) }
/// # }
/// let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0);
/// let strategy = Strategy::Delay { min: Milliseconds(100),
///                                  max: Milliseconds(100) };
/// let mut retry = RetryTimer::<Clock>::new(Instant::new(0), strategy, Attempts(2), &mut rng);
///
/// assert_eq!(retry.what_should_i_do(Instant::new(50)), Err(nb::Error::WouldBlock));
/// assert_eq!(retry.what_should_i_do(Instant::new(100)), Ok(YouShould::Retry));
/// assert_eq!(retry.what_should_i_do(Instant::new(200)), Ok(YouShould::Cry));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryTimer<C: Clock> {
  start: Instant<C>,
  init: Milliseconds<u64>,
  strategy: Strategy,
  attempts: Attempts,
  max_attempts: Attempts,
}

/// A number of attempts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempts(pub u16);

/// Result of [`RetryTimer.what_should_i_do`].
///
/// This tells you if a retry should be attempted or not.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum YouShould {
  /// Attempts have been exhausted and the work that is
  /// being retried should be considered poisoned.
  Cry,
  /// A retry should be performed
  Retry,
}

impl<C: Clock> RetryTimer<C> {
  /// Create a new retrier
  ///
  /// The first attempt is assumed to have happened at `start`.
  /// When `strategy` has jitter, the initial delay is picked
  /// from its range using `rng`.
  pub fn new(start: Instant<C>,
             strategy: Strategy,
             max_attempts: Attempts,
             rng: &mut impl Rng)
             -> Self {
    Self { start,
           strategy,
           init: if strategy.has_jitter() {
             Milliseconds(rng.gen_range(strategy.range()))
           } else {
             Milliseconds(*strategy.range().start())
           },
           max_attempts,
           attempts: Attempts(1) }
  }

  /// When the thing we keep trying fails, invoke this to
  /// tell the retrytimer "it failed again! what do I do??"
  ///
  /// Returns `nb::Error::WouldBlock` when we have not yet
  /// waited the appropriate amount of time to retry.
  ///
  /// Once the last attempt has had its full timeout to
  /// succeed, yields [`YouShould::Cry`].
  pub fn what_should_i_do(&mut self,
                          now: Instant<C>)
                          -> nb::Result<YouShould, core::convert::Infallible> {
    if !self.is_ready(Milliseconds(millis_since(self.start, now)), self.attempts.0) {
      Err(nb::Error::WouldBlock)
    } else if self.attempts >= self.max_attempts {
      Ok(YouShould::Cry)
    } else {
      self.attempts.0 += 1;
      Ok(YouShould::Retry)
    }
  }

  /// Check if the strategy says an appropriate time has passed
  pub fn is_ready(&self, Milliseconds(time_passed): Milliseconds<u64>, attempts: u16) -> bool {
    attempts == 0 || time_passed >= self.strategy.total_delay(self.init, attempts)
  }

  /// The instant at which [`RetryTimer::what_should_i_do`] will stop blocking
  pub fn next_deadline(&self) -> Instant<C> {
    self.start + Milliseconds(self.strategy.total_delay(self.init, self.attempts.0))
  }

  /// Number of attempts made so far
  pub fn attempts(&self) -> Attempts {
    self.attempts
  }
}

/// Strategy to employ when retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Generate a random delay between `min` and `max`,
  /// and wait until this delay has passed between attempts.
  ///
  /// After each failed attempt, double the delay before retrying again.
  Exponential {
    /// Minimum (inclusive) delay for second attempt
    init_min: Milliseconds<u64>,
    /// Maximum (inclusive) delay for second attempt
    init_max: Milliseconds<u64>,
  },
  /// Generate a random delay between `min` and `max`,
  /// and wait until this delay has passed between attempts.
  Delay {
    /// Minimum (inclusive) delay for attempts
    min: Milliseconds<u64>,
    /// Maximum (inclusive) delay for attempts
    max: Milliseconds<u64>,
  },
}

impl Strategy {
  /// Are min & max delays the same? if so, we should probably skip the random number generation.
  pub fn has_jitter(&self) -> bool {
    let rng = self.range();
    rng.start() != rng.end()
  }

  /// Get the min & max durations as an inclusive range
  pub fn range(&self) -> RangeInclusive<u64> {
    match self {
      | &Self::Delay { min: Milliseconds(min),
                       max: Milliseconds(max), } => (min..=max),

      | &Self::Exponential { init_min: Milliseconds(min),
                             init_max: Milliseconds(max), } => (min..=max),
    }
  }

  /// Get the amount of time this strategy will take if all attempts fail
  pub fn max_time(&self, max_attempts: Attempts) -> Milliseconds<u64> {
    let Milliseconds(init) = match self {
      | Self::Exponential { init_max, .. } => *init_max,
      | Self::Delay { max, .. } => *max,
    };

    Milliseconds(self.total_delay(Milliseconds(init), max_attempts.0))
  }

  /// Given the initial delay and number of attempts that have been performed,
  /// yields the time (since the first attempt) at which the next attempt should happen.
  fn total_delay(&self, Milliseconds(init): Milliseconds<u64>, attempts: u16) -> u64 {
    match self {
      | Self::Delay { .. } => init.saturating_mul(u64::from(attempts)),
      | Self::Exponential { .. } => Self::total_delay_exp(init, attempts),
    }
  }

  const fn total_delay_exp(init: u64, attempts: u16) -> u64 {
    // | attempts | next attempt at  |
    // | 1        | init             |
    // | 2        | init * 3         |
    // | 3        | init * 7         |
    // | ...      | ...              |
    // | n        | init * (2^n - 1) |
    init.saturating_mul(2u64.saturating_pow(attempts as u32) - 1)
  }
}
