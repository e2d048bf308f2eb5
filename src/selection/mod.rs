//! Unbiased winner selection without replacement

use std::collections::HashSet;
use std::num::NonZeroU32;

use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, info};

use crate::error::SelectionError;
use crate::models::{Candidate, Winner};
use crate::traits::RandomSource;

/// Random source backed by the operating system CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn next_u32(&mut self) -> u32 {
        OsRng.next_u32()
    }
}

/// Draws `count` distinct winners from `pool`.
///
/// Every `count`-subset of the pool is equally likely. The pool itself is
/// never touched; the draw works on a private copy. Winners come back in
/// reveal order.
///
/// # Errors
///
/// * [`SelectionError::EmptyPool`] when `pool` is empty
/// * [`SelectionError::InvalidSelectionCount`] when `count` is outside `1..=pool.len()`
/// * [`SelectionError::DuplicateCandidate`] when two candidates share an id
pub fn pick_winners<R>(
    pool: &[Candidate],
    count: usize,
    rng: &mut R,
) -> Result<Vec<Winner>, SelectionError>
where
    R: RandomSource + ?Sized,
{
    if pool.is_empty() {
        return Err(SelectionError::EmptyPool);
    }

    if count == 0 || count > pool.len() || u32::try_from(pool.len()).is_err() {
        return Err(SelectionError::InvalidSelectionCount {
            requested: count,
            available: pool.len(),
        });
    }

    let mut seen = HashSet::with_capacity(pool.len());
    if let Some(duplicate) = pool.iter().find(|c| !seen.insert(c.id)) {
        return Err(SelectionError::DuplicateCandidate(duplicate.id));
    }

    info!("Drawing {} winner(s) from {} candidates", count, pool.len());

    let mut remaining = pool.to_vec();
    let mut winners = Vec::with_capacity(count);

    while winners.len() < count {
        // remaining.len() is in 1..=u32::MAX here: checked above and only shrinks
        let Some(bound) = u32::try_from(remaining.len()).ok().and_then(NonZeroU32::new) else {
            break;
        };
        let index = rng.below(bound) as usize;
        let chosen = remaining.swap_remove(index);
        debug!(username = %chosen.username, id = chosen.id, "Winner drawn");
        winners.push(Winner::from(chosen));
    }

    Ok(winners)
}
