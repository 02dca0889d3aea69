//! Projection of raw simulation tallies into ranked results.
//!
//! A completed job's tally maps option ids to win counts over `runs`
//! trials. Projection derives the per-option allocation chance and
//! orders the results for display.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::CoreError;
use crate::ranking::RankingOption;
use crate::types::OptionId;

/// Raw per-option win counts returned by a completed job.
pub type SimulationTally = HashMap<OptionId, u64>;

/// One projected result: an option and its estimated allocation chance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedResult {
    pub id: OptionId,
    pub name: String,
    /// Estimated probability in `[0, 1]`, `wins / runs`.
    pub chance: f64,
}

/// Derive ranked results from a tally.
///
/// Results are sorted descending by chance; ties break by ascending id
/// so the output is deterministic regardless of tally iteration order.
/// A tally id with no catalog entry means the server and client
/// disagree about the option space and is rejected.
pub fn project_results(
    tally: &SimulationTally,
    runs: u32,
    catalog: &[RankingOption],
) -> Result<Vec<DetailedResult>, CoreError> {
    if runs == 0 {
        return Err(CoreError::Validation("runs must be positive".into()));
    }

    let mut results = Vec::with_capacity(tally.len());
    for (&id, &wins) in tally {
        let option = catalog
            .iter()
            .find(|opt| opt.id == id)
            .ok_or(CoreError::UnknownOption(id))?;
        results.push(DetailedResult {
            id,
            name: option.name.clone(),
            chance: wins as f64 / runs as f64,
        });
    }

    results.sort_by(|a, b| {
        b.chance
            .partial_cmp(&a.chance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    Ok(results)
}
