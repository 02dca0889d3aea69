//! Preference rankings over the option catalog.
//!
//! A [`Ranking`] is always a full permutation of the catalog: exactly
//! one entry per option, no duplicates, no omissions. Mutation happens
//! only through [`Ranking::reorder`], a pure positional move, so the
//! permutation invariant is preserved by construction.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::store::RankingStore;
use crate::types::OptionId;

/// One entry in the option catalog, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingOption {
    pub id: OptionId,
    pub name: String,
    pub places: u32,
    pub applicants: u32,
    pub ratio: f64,
}

/// An ordered permutation of the full option catalog.
#[derive(Debug, Clone)]
pub struct Ranking {
    options: Vec<RankingOption>,
}

/// Check that `candidate` is exactly a permutation of `1..=catalog_size`.
///
/// Both checks are deliberate: the set-cardinality check catches
/// duplicates, and the sorted-sequence check catches out-of-range or
/// non-contiguous values that happen not to collide.
pub fn validate_permutation(candidate: &[OptionId], catalog_size: usize) -> bool {
    if candidate.len() != catalog_size {
        return false;
    }

    let unique: std::collections::HashSet<OptionId> = candidate.iter().copied().collect();
    if unique.len() != catalog_size {
        return false;
    }

    let mut sorted = candidate.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .enumerate()
        .all(|(index, &id)| id == index as OptionId + 1)
}

impl Ranking {
    /// Build a ranking in the catalog's natural (server-provided) order.
    pub fn from_catalog(catalog: Vec<RankingOption>) -> Self {
        Self { options: catalog }
    }

    /// Build a ranking from the catalog, preferring a previously
    /// persisted order when the store holds one that still validates
    /// against this catalog. Invalid or unreadable persisted data is
    /// discarded silently.
    pub fn load(catalog: Vec<RankingOption>, store: &dyn RankingStore) -> Self {
        let persisted = match store.load() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted ranking");
                None
            }
        };

        if let Some(ids) = persisted {
            if validate_permutation(&ids, catalog.len()) {
                let ordered = ids
                    .iter()
                    .filter_map(|id| catalog.iter().find(|opt| opt.id == *id).cloned())
                    .collect::<Vec<_>>();
                if ordered.len() == catalog.len() {
                    return Self { options: ordered };
                }
                tracing::debug!("Persisted ranking references ids missing from the catalog");
            } else {
                tracing::debug!("Persisted ranking is not a permutation of the catalog");
            }
        }

        Self::from_catalog(catalog)
    }

    /// Move the option at `from` to position `to`, shifting the
    /// intervening options. Persists the new order through `store`
    /// best-effort: a store failure is logged and never fails the
    /// reorder.
    pub fn reorder(
        &mut self,
        from: usize,
        to: usize,
        store: &dyn RankingStore,
    ) -> Result<(), CoreError> {
        let len = self.options.len();
        if from >= len || to >= len {
            return Err(CoreError::Validation(format!(
                "Reorder indices out of bounds: from {from}, to {to}, length {len}"
            )));
        }

        let moved = self.options.remove(from);
        self.options.insert(to, moved);

        if let Err(e) = store.save(&self.ids()) {
            tracing::warn!(error = %e, "Failed to persist reordered ranking");
        }
        Ok(())
    }

    /// The option ids in their current preference order.
    pub fn ids(&self) -> Vec<OptionId> {
        self.options.iter().map(|opt| opt.id).collect()
    }

    pub fn options(&self) -> &[RankingOption] {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRankingStore;

    fn option(id: OptionId) -> RankingOption {
        RankingOption {
            id,
            name: format!("Option {id}"),
            places: 10,
            applicants: 20,
            ratio: 2.0,
        }
    }

    fn catalog(size: OptionId) -> Vec<RankingOption> {
        (1..=size).map(option).collect()
    }

    #[test]
    fn validate_accepts_every_permutation_of_small_catalog() {
        let permutations = [
            vec![1, 2, 3],
            vec![1, 3, 2],
            vec![2, 1, 3],
            vec![2, 3, 1],
            vec![3, 1, 2],
            vec![3, 2, 1],
        ];
        for candidate in &permutations {
            assert!(validate_permutation(candidate, 3), "{candidate:?}");
        }
    }

    #[test]
    fn validate_rejects_duplicates() {
        assert!(!validate_permutation(&[1, 2, 2], 3));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        // Cardinality matches but 4 is outside 1..=3.
        assert!(!validate_permutation(&[1, 2, 4], 3));
        assert!(!validate_permutation(&[0, 1, 2], 3));
    }

    #[test]
    fn validate_rejects_wrong_length() {
        assert!(!validate_permutation(&[1, 2], 3));
        assert!(!validate_permutation(&[1, 2, 3, 4], 3));
        assert!(!validate_permutation(&[], 1));
    }

    #[test]
    fn load_uses_catalog_order_without_persisted_ranking() {
        let store = MemoryRankingStore::new();
        let ranking = Ranking::load(catalog(3), &store);
        assert_eq!(ranking.ids(), vec![1, 2, 3]);
    }

    #[test]
    fn load_prefers_valid_persisted_order() {
        let store = MemoryRankingStore::new();
        store.save(&[3, 1, 2]).unwrap();
        let ranking = Ranking::load(catalog(3), &store);
        assert_eq!(ranking.ids(), vec![3, 1, 2]);
    }

    #[test]
    fn load_discards_persisted_order_that_no_longer_matches() {
        let store = MemoryRankingStore::new();
        store.save(&[3, 1, 2]).unwrap();
        // Catalog has grown to four options since the save.
        let ranking = Ranking::load(catalog(4), &store);
        assert_eq!(ranking.ids(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn reorder_moves_element_and_preserves_permutation() {
        let store = MemoryRankingStore::new();
        let mut ranking = Ranking::from_catalog(catalog(4));

        ranking.reorder(0, 2, &store).unwrap();
        assert_eq!(ranking.ids(), vec![2, 3, 1, 4]);
        assert!(validate_permutation(&ranking.ids(), 4));

        // Moving back through the same indices is not generally the
        // inverse move.
        ranking.reorder(2, 0, &store).unwrap();
        assert_eq!(ranking.ids(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn reorder_preserves_invariant_for_all_index_pairs() {
        let store = MemoryRankingStore::new();
        for from in 0..4 {
            for to in 0..4 {
                let mut ranking = Ranking::from_catalog(catalog(4));
                ranking.reorder(from, to, &store).unwrap();
                assert!(
                    validate_permutation(&ranking.ids(), 4),
                    "from {from} to {to} broke the permutation"
                );
            }
        }
    }

    #[test]
    fn reorder_rejects_out_of_bounds_indices() {
        let store = MemoryRankingStore::new();
        let mut ranking = Ranking::from_catalog(catalog(3));
        assert!(ranking.reorder(3, 0, &store).is_err());
        assert!(ranking.reorder(0, 3, &store).is_err());
    }

    #[test]
    fn reorder_persists_the_new_order() {
        let store = MemoryRankingStore::new();
        let mut ranking = Ranking::from_catalog(catalog(3));
        ranking.reorder(2, 0, &store).unwrap();
        assert_eq!(store.load().unwrap(), Some(vec![3, 1, 2]));
    }
}
