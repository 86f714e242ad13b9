//! Pure helpers for board assignment and round resolution.
//!
//! Everything here is a function of its inputs plus an injected RNG, so
//! the dealing and resolution rules are testable without a room around
//! them.

use std::collections::HashMap;

use glyphmatch_protocol::{PersistentId, Symbol};
use rand::seq::SliceRandom;
use rand::Rng;

/// Draws `count` symbols from a theme pool.
///
/// A pool shorter than `count` is extended by repeating its tokens
/// before shuffling (a small pool degrades to duplicates rather than
/// failing the room); an empty pool returns `None`, which callers treat
/// as a fatal setup condition.
pub(crate) fn draw_symbols(
    pool: &[Symbol],
    count: usize,
    rng: &mut impl Rng,
) -> Option<Vec<Symbol>> {
    if pool.is_empty() {
        return None;
    }

    let mut working = pool.to_vec();
    if working.len() < count {
        tracing::warn!(
            pool = pool.len(),
            needed = count,
            "symbol pool short of the board requirement, repeating tokens"
        );
        let mut cycle = pool.iter().cycle();
        while working.len() < count {
            // `cycle` over a non-empty pool never ends.
            working.push(cycle.next().expect("pool is non-empty").clone());
        }
    }

    working.shuffle(rng);
    working.truncate(count);
    Some(working)
}

/// A private permutation of the shared board for one player's card
/// layout.
pub(crate) fn shuffled_layout(
    board: &[Symbol],
    rng: &mut impl Rng,
) -> Vec<Symbol> {
    let mut layout = board.to_vec();
    layout.shuffle(rng);
    layout
}

/// Returns the symbol all players picked, if the picks are unanimous.
pub(crate) fn unanimous_pick(
    picks: &HashMap<PersistentId, Symbol>,
) -> Option<Symbol> {
    let mut values = picks.values();
    let first = values.next()?;
    values.all(|symbol| symbol == first).then(|| first.clone())
}
