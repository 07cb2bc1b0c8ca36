//! Fold assignment for out-of-fold target statistics.

use rand::distributions::{Distribution, WeightedIndex};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::EncodingError;

/// Assigns each training row to one of K folds.
///
/// Draws come from a seeded discrete distribution, one draw per row in row
/// order, so the assignment depends only on `(seed, row order, K)` and is
/// identical whether rows are materialized up front or streamed in.
///
/// An explicit assignment vector (externally defined CV splits) bypasses the
/// random stream entirely.
#[derive(Debug, Clone)]
pub struct FoldAssigner {
    num_folds: usize,
    rng: Xoshiro256PlusPlus,
    dist: WeightedIndex<f64>,
    fold_ids: Vec<u16>,
    explicit: bool,
    next_row: usize,
}

impl FoldAssigner {
    /// Create a seeded assigner.
    ///
    /// `fold_probs` gives the per-fold assignment probabilities (length K);
    /// uniform when `None`.
    ///
    /// # Errors
    ///
    /// [`EncodingError::ConfigConflict`] when the probability vector cannot
    /// form a discrete distribution (e.g. all zero).
    pub fn new(
        seed: u64,
        num_folds: usize,
        fold_probs: Option<&[f64]>,
    ) -> Result<Self, EncodingError> {
        debug_assert!(num_folds >= 1);
        let probs: Vec<f64> = match fold_probs {
            Some(p) => p.to_vec(),
            None => vec![1.0; num_folds],
        };
        let dist = WeightedIndex::new(&probs).map_err(|e| {
            EncodingError::conflict(format!("invalid fold probability vector: {e}"))
        })?;
        Ok(Self {
            num_folds,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            dist,
            fold_ids: Vec::new(),
            explicit: false,
            next_row: 0,
        })
    }

    /// Create an assigner from an explicit per-row fold vector.
    ///
    /// # Errors
    ///
    /// [`EncodingError::ConfigConflict`] when an entry is out of range.
    pub fn from_assignments(num_folds: usize, fold_ids: Vec<u16>) -> Result<Self, EncodingError> {
        if let Some(&bad) = fold_ids.iter().find(|&&f| f as usize >= num_folds) {
            return Err(EncodingError::conflict(format!(
                "fold assignment {bad} is out of range for num_folds = {num_folds}"
            )));
        }
        let mut assigner = Self::new(0, num_folds, None)?;
        assigner.fold_ids = fold_ids;
        assigner.explicit = true;
        Ok(assigner)
    }

    /// Number of folds K.
    #[inline]
    pub fn num_folds(&self) -> usize {
        self.num_folds
    }

    /// Number of rows assigned so far.
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.fold_ids.len()
    }

    /// Pre-draw assignments for `num_rows` rows (materialized inputs), making
    /// later [`fold_of`](Self::fold_of) lookups O(1).
    ///
    /// # Errors
    ///
    /// [`EncodingError::ConfigConflict`] when an explicit assignment vector
    /// is shorter than the data.
    pub fn materialize(&mut self, num_rows: usize) -> Result<(), EncodingError> {
        if self.explicit {
            if self.fold_ids.len() < num_rows {
                return Err(EncodingError::conflict(format!(
                    "explicit fold assignments cover {} rows, data has {num_rows}",
                    self.fold_ids.len()
                )));
            }
            return Ok(());
        }
        self.fold_ids.reserve(num_rows.saturating_sub(self.fold_ids.len()));
        while self.fold_ids.len() < num_rows {
            let fold = self.dist.sample(&mut self.rng) as u16;
            self.fold_ids.push(fold);
        }
        Ok(())
    }

    /// Assign the next streamed row and return its fold.
    ///
    /// # Panics
    ///
    /// Panics when an explicit assignment vector is exhausted.
    pub fn assign_next(&mut self) -> usize {
        let row = self.next_row;
        self.next_row += 1;
        if !self.explicit && self.fold_ids.len() <= row {
            let fold = self.dist.sample(&mut self.rng) as u16;
            self.fold_ids.push(fold);
        }
        assert!(row < self.fold_ids.len(), "explicit fold assignments exhausted");
        self.fold_ids[row] as usize
    }

    /// Fold of an already-assigned row.
    ///
    /// # Panics
    ///
    /// Panics when `row_idx` was never assigned.
    #[inline]
    pub fn fold_of(&self, row_idx: usize) -> usize {
        self.fold_ids[row_idx] as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_deterministic() {
        let mut a = FoldAssigner::new(42, 4, None).unwrap();
        let mut b = FoldAssigner::new(42, 4, None).unwrap();
        a.materialize(100).unwrap();
        for row in 0..100 {
            assert_eq!(b.assign_next(), a.fold_of(row));
        }
    }

    #[test]
    fn different_seeds_differ() {
        let mut a = FoldAssigner::new(1, 8, None).unwrap();
        let mut b = FoldAssigner::new(2, 8, None).unwrap();
        a.materialize(64).unwrap();
        b.materialize(64).unwrap();
        let same = (0..64).all(|r| a.fold_of(r) == b.fold_of(r));
        assert!(!same);
    }

    #[test]
    fn folds_stay_in_range() {
        let mut a = FoldAssigner::new(7, 3, None).unwrap();
        a.materialize(1000).unwrap();
        assert!((0..1000).all(|r| a.fold_of(r) < 3));
    }

    #[test]
    fn single_fold_assigns_zero() {
        let mut a = FoldAssigner::new(0, 1, None).unwrap();
        a.materialize(10).unwrap();
        assert!((0..10).all(|r| a.fold_of(r) == 0));
    }

    #[test]
    fn skewed_probabilities_respected() {
        let mut a = FoldAssigner::new(3, 2, Some(&[0.0, 1.0])).unwrap();
        a.materialize(50).unwrap();
        assert!((0..50).all(|r| a.fold_of(r) == 1));
    }

    #[test]
    fn zero_probability_vector_rejected() {
        assert!(FoldAssigner::new(0, 2, Some(&[0.0, 0.0])).is_err());
    }

    #[test]
    fn explicit_assignments() {
        let mut a = FoldAssigner::from_assignments(2, vec![0, 1, 0, 1]).unwrap();
        a.materialize(4).unwrap();
        assert_eq!(
            (0..4).map(|r| a.fold_of(r)).collect::<Vec<_>>(),
            vec![0, 1, 0, 1]
        );
        assert!(a.materialize(5).is_err());
    }

    #[test]
    fn explicit_assignments_validate_range() {
        assert!(FoldAssigner::from_assignments(2, vec![0, 2]).is_err());
    }
}
