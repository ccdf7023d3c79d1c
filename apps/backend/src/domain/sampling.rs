use std::collections::BTreeSet;

use super::rng::GameRng;

/// Draw from `pool`, skipping entries already in `used`.
///
/// Once every entry has been used the set is cleared and the draw is made
/// from the full pool again. The drawn value is recorded in `used`.
/// Returns `None` only for an empty pool.
pub fn sample_without_repeat(
    pool: &[&str],
    used: &mut BTreeSet<String>,
    rng: &GameRng,
) -> Option<String> {
    let mut fresh: Vec<&str> = pool
        .iter()
        .copied()
        .filter(|candidate| !used.contains(*candidate))
        .collect();

    if fresh.is_empty() {
        used.clear();
        fresh = pool.to_vec();
    }

    let picked = rng.pick(&fresh)?.to_string();
    used.insert(picked.clone());
    Some(picked)
}
