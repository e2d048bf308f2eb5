//! Seams between the core and its collaborators: randomness, messaging and time

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::{AttemptOutcome, NotificationRequest};

/// Source of uniformly distributed random integers
pub trait RandomSource {
    /// Next uniformly distributed 32-bit value.
    fn next_u32(&mut self) -> u32;

    /// Uniform integer in `0..bound`.
    ///
    /// Uses rejection sampling: raw draws at or above the largest multiple of
    /// `bound` that fits in 2^32 are discarded, so every residue is equally
    /// likely.
    fn below(&mut self, bound: NonZeroU32) -> u32 {
        let bound = u64::from(bound.get());
        let range = 1_u64 << 32;
        let limit = range - range % bound;

        loop {
            let value = u64::from(self.next_u32());
            if value < limit {
                // value % bound < bound <= u32::MAX
                return (value % bound) as u32;
            }
        }
    }
}

/// Sends one private message and classifies what happened
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Perform exactly one delivery attempt.
    ///
    /// Implementations must resolve every attempt, turning timeouts and
    /// transport errors into [`AttemptOutcome::RetryableFailure`].
    async fn send(&self, request: &NotificationRequest<'_>) -> AttemptOutcome;
}

/// Cooperative waiting, injectable so tests don't spend real time
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<u32>);

    impl RandomSource for Scripted {
        fn next_u32(&mut self) -> u32 {
            self.0.pop_front().expect("script exhausted")
        }
    }

    #[test]
    fn below_rejects_values_in_the_biased_tail() {
        // 2^32 % 3 == 1, so u32::MAX is the single rejected value for bound 3
        let mut source = Scripted(VecDeque::from([u32::MAX, 5]));
        let bound = NonZeroU32::new(3).unwrap();

        assert_eq!(source.below(bound), 2);
        assert!(source.0.is_empty());
    }

    #[test]
    fn below_accepts_everything_for_powers_of_two() {
        let mut source = Scripted(VecDeque::from([u32::MAX]));
        let bound = NonZeroU32::new(8).unwrap();

        assert_eq!(source.below(bound), 7);
    }

    #[test]
    fn below_one_is_always_zero() {
        let mut source = Scripted(VecDeque::from([123_456]));
        assert_eq!(source.below(NonZeroU32::MIN), 0);
    }
}
