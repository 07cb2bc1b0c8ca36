//! Per-(feature, fold, category) accumulators.
//!
//! Accumulation happens in [`StatShard`]s, one per ingest chunk, with no
//! locking. [`StatStore::merge_shards`] folds them, in chunk order, into the
//! single authoritative map; [`StatStore::aggregate_all_folds`] then builds
//! the all-folds sentinel at fold index K.
//!
//! Shards and the store hold raw in-fold sums. The training view is the
//! out-of-fold complement (`sentinel - in_fold`), computed at lookup time so
//! that distributed reduction and persistence operate on plain sums.

use std::collections::HashMap;

/// Count and label sum for one `(feature, fold, category)` cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryStats {
    pub count: u64,
    pub label_sum: f64,
}

/// Aggregates handed to an encoder for one category value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodingStats {
    /// Label sum in the viewed fold set.
    pub label_sum: f64,
    /// Row count in the viewed fold set.
    pub count: f64,
    /// Row count over all folds.
    pub all_fold_count: f64,
}

impl EncodingStats {
    pub(crate) const ZERO: EncodingStats = EncodingStats {
        label_sum: 0.0,
        count: 0.0,
        all_fold_count: 0.0,
    };
}

type FoldMaps = Vec<HashMap<i32, CategoryStats>>;

/// One ingest chunk's worth of accumulators.
///
/// Shards are written by exactly one worker and never read until merge.
#[derive(Debug)]
pub struct StatShard {
    num_folds: usize,
    cells: HashMap<usize, FoldMaps>,
    fold_label_sum: Vec<f64>,
    fold_num_rows: Vec<u64>,
}

impl StatShard {
    pub fn new(num_folds: usize) -> Self {
        Self {
            num_folds,
            cells: HashMap::new(),
            fold_label_sum: vec![0.0; num_folds],
            fold_num_rows: vec![0; num_folds],
        }
    }

    /// Add one observation of `category` for `fid` in `fold_id`.
    #[inline]
    pub fn accumulate(&mut self, fid: usize, fold_id: usize, category: i32, label: f64) {
        let folds = self
            .cells
            .entry(fid)
            .or_insert_with(|| vec![HashMap::new(); self.num_folds]);
        let cell = folds[fold_id].entry(category).or_default();
        cell.count += 1;
        cell.label_sum += label;
    }

    /// Record one row's label for fold bookkeeping.
    #[inline]
    pub fn add_row(&mut self, fold_id: usize, label: f64) {
        self.fold_label_sum[fold_id] += label;
        self.fold_num_rows[fold_id] += 1;
    }
}

/// The authoritative `(feature, fold, category) -> (count, label_sum)` map.
///
/// Fold index K holds the all-folds sentinel once
/// [`aggregate_all_folds`](Self::aggregate_all_folds) has run.
#[derive(Debug, Clone, Default)]
pub struct StatStore {
    num_folds: usize,
    cells: HashMap<usize, FoldMaps>,
    fold_label_sum: Vec<f64>,
    fold_num_rows: Vec<u64>,
}

impl StatStore {
    pub fn new(num_folds: usize) -> Self {
        Self {
            num_folds,
            cells: HashMap::new(),
            fold_label_sum: vec![0.0; num_folds],
            fold_num_rows: vec![0; num_folds],
        }
    }

    #[inline]
    pub fn num_folds(&self) -> usize {
        self.num_folds
    }

    fn feature_maps_mut(&mut self, fid: usize) -> &mut FoldMaps {
        let num_folds = self.num_folds;
        self.cells
            .entry(fid)
            .or_insert_with(|| vec![HashMap::new(); num_folds + 1])
    }

    /// Fold the per-chunk shards into this store.
    ///
    /// Shards are consumed in order, so every cell's floating-point sum has
    /// one well-defined association order regardless of thread count.
    pub fn merge_shards(&mut self, shards: impl IntoIterator<Item = StatShard>) {
        for shard in shards {
            debug_assert_eq!(shard.num_folds, self.num_folds);
            for (fid, folds) in shard.cells {
                let target = self.feature_maps_mut(fid);
                for (fold_id, map) in folds.into_iter().enumerate() {
                    for (category, cell) in map {
                        let into = target[fold_id].entry(category).or_default();
                        into.count += cell.count;
                        into.label_sum += cell.label_sum;
                    }
                }
            }
            for fold_id in 0..self.num_folds {
                self.fold_label_sum[fold_id] += shard.fold_label_sum[fold_id];
                self.fold_num_rows[fold_id] += shard.fold_num_rows[fold_id];
            }
        }
    }

    /// Build the fold-K sentinel as the sum over folds `f < K`, in fold
    /// order. Runs after merge (and after the distributed reduction).
    pub fn aggregate_all_folds(&mut self) {
        let num_folds = self.num_folds;
        for folds in self.cells.values_mut() {
            let mut sentinel: HashMap<i32, CategoryStats> = HashMap::new();
            for fold_map in folds.iter().take(num_folds) {
                for (&category, cell) in fold_map {
                    let into = sentinel.entry(category).or_default();
                    into.count += cell.count;
                    into.label_sum += cell.label_sum;
                }
            }
            folds[num_folds] = sentinel;
        }
    }

    /// Training-view aggregates: out-of-fold complement for `fold_id`, plus
    /// the all-folds count.
    pub fn lookup_train(&self, fid: usize, fold_id: usize, category: i32) -> EncodingStats {
        let Some(folds) = self.cells.get(&fid) else {
            return EncodingStats::ZERO;
        };
        let all = folds[self.num_folds]
            .get(&category)
            .copied()
            .unwrap_or_default();
        let in_fold = folds[fold_id].get(&category).copied().unwrap_or_default();
        EncodingStats {
            label_sum: all.label_sum - in_fold.label_sum,
            count: (all.count - in_fold.count) as f64,
            all_fold_count: all.count as f64,
        }
    }

    /// Inference-view aggregates: the all-folds sentinel.
    pub fn lookup_infer(&self, fid: usize, category: i32) -> EncodingStats {
        let Some(folds) = self.cells.get(&fid) else {
            return EncodingStats::ZERO;
        };
        let all = folds[self.num_folds]
            .get(&category)
            .copied()
            .unwrap_or_default();
        EncodingStats {
            label_sum: all.label_sum,
            count: all.count as f64,
            all_fold_count: all.count as f64,
        }
    }

    /// In-fold cells of one `(feature, fold)`, sorted by category.
    pub fn fold_entries(&self, fid: usize, fold_id: usize) -> Vec<(i32, CategoryStats)> {
        let mut entries: Vec<(i32, CategoryStats)> = self
            .cells
            .get(&fid)
            .map(|folds| folds[fold_id].iter().map(|(&c, &s)| (c, s)).collect())
            .unwrap_or_default();
        entries.sort_unstable_by_key(|&(category, _)| category);
        entries
    }

    /// Replace the in-fold cells of one `(feature, fold)`. Zero-count cells
    /// are dropped: an absent category means missing, not zero.
    pub(crate) fn replace_fold(
        &mut self,
        fid: usize,
        fold_id: usize,
        entries: impl IntoIterator<Item = (i32, CategoryStats)>,
    ) {
        let map = &mut self.feature_maps_mut(fid)[fold_id];
        map.clear();
        map.extend(entries.into_iter().filter(|(_, cell)| cell.count > 0));
    }

    /// Insert one in-fold cell (deserialization path).
    pub(crate) fn insert_cell(
        &mut self,
        fid: usize,
        fold_id: usize,
        category: i32,
        cell: CategoryStats,
    ) {
        if cell.count > 0 {
            self.feature_maps_mut(fid)[fold_id].insert(category, cell);
        }
    }

    /// Per-fold label sums (in-fold).
    pub fn fold_label_sums(&self) -> &[f64] {
        &self.fold_label_sum
    }

    /// Per-fold row counts (in-fold).
    pub fn fold_num_rows(&self) -> &[u64] {
        &self.fold_num_rows
    }

    pub(crate) fn set_fold_totals(&mut self, label_sums: Vec<f64>, num_rows: Vec<u64>) {
        debug_assert_eq!(label_sums.len(), self.num_folds);
        debug_assert_eq!(num_rows.len(), self.num_folds);
        self.fold_label_sum = label_sums;
        self.fold_num_rows = num_rows;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_from(rows: &[(usize, usize, i32, f64)], num_folds: usize) -> StatStore {
        let mut shard = StatShard::new(num_folds);
        for &(fid, fold, category, label) in rows {
            shard.accumulate(fid, fold, category, label);
            shard.add_row(fold, label);
        }
        let mut store = StatStore::new(num_folds);
        store.merge_shards([shard]);
        store.aggregate_all_folds();
        store
    }

    #[test]
    fn sentinel_is_sum_over_folds() {
        let store = store_from(
            &[(0, 0, 7, 1.0), (0, 1, 7, 0.0), (0, 1, 7, 1.0), (0, 0, 3, 0.0)],
            2,
        );
        let all = store.lookup_infer(0, 7);
        assert_eq!(all.count, 3.0);
        assert_eq!(all.label_sum, 2.0);
        assert_eq!(all.all_fold_count, 3.0);
    }

    #[test]
    fn train_view_is_out_of_fold() {
        let store = store_from(
            &[(0, 0, 7, 1.0), (0, 0, 7, 1.0), (0, 1, 7, 0.0)],
            2,
        );
        // Fold 0 sees only fold 1's contribution.
        let train = store.lookup_train(0, 0, 7);
        assert_eq!(train.count, 1.0);
        assert_eq!(train.label_sum, 0.0);
        assert_eq!(train.all_fold_count, 3.0);
        // And vice versa.
        let train = store.lookup_train(0, 1, 7);
        assert_eq!(train.count, 2.0);
        assert_eq!(train.label_sum, 2.0);
    }

    #[test]
    fn missing_category_is_zero() {
        let store = store_from(&[(0, 0, 7, 1.0)], 1);
        assert_eq!(store.lookup_infer(0, 99), EncodingStats::ZERO);
        assert_eq!(store.lookup_infer(5, 7), EncodingStats::ZERO);
        let train = store.lookup_train(0, 0, 99);
        assert_eq!(train.count, 0.0);
        assert_eq!(train.all_fold_count, 0.0);
    }

    #[test]
    fn merge_accumulates_across_shards() {
        let mut a = StatShard::new(1);
        let mut b = StatShard::new(1);
        a.accumulate(2, 0, 5, 1.0);
        a.add_row(0, 1.0);
        b.accumulate(2, 0, 5, 0.5);
        b.add_row(0, 0.5);

        let mut store = StatStore::new(1);
        store.merge_shards([a, b]);
        store.aggregate_all_folds();

        let all = store.lookup_infer(2, 5);
        assert_eq!(all.count, 2.0);
        assert_eq!(all.label_sum, 1.5);
        assert_eq!(store.fold_label_sums(), &[1.5]);
        assert_eq!(store.fold_num_rows(), &[2]);
    }

    #[test]
    fn fold_entries_sorted() {
        let store = store_from(&[(0, 0, 9, 1.0), (0, 0, -3, 0.0), (0, 0, 2, 1.0)], 1);
        let cats: Vec<i32> = store.fold_entries(0, 0).iter().map(|&(c, _)| c).collect();
        assert_eq!(cats, vec![-3, 2, 9]);
    }

    #[test]
    fn replace_fold_drops_zero_counts() {
        let mut store = StatStore::new(1);
        store.replace_fold(
            0,
            0,
            vec![
                (1, CategoryStats { count: 2, label_sum: 1.0 }),
                (2, CategoryStats { count: 0, label_sum: 0.0 }),
            ],
        );
        store.aggregate_all_folds();
        assert_eq!(store.lookup_infer(0, 1).count, 2.0);
        assert_eq!(store.lookup_infer(0, 2), EncodingStats::ZERO);
    }
}
