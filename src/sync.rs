//! Cross-machine reduction of encoding statistics.
//!
//! The transport is abstracted behind [`Collective`]. Reductions must be
//! deterministic, so hash-map layouts are never shipped: category keys are
//! gathered, unioned, and sorted first, then counts and label sums are
//! densified over that shared order and sum-reduced.

use crate::error::EncodingError;
use crate::stats::{CategoryStats, StatStore};

/// Collective-operation contract of the cluster transport.
///
/// All machines call every operation the same number of times in the same
/// order (SPMD). The gather operation exists to agree on the category-key
/// universe before densifying; sum-reduction alone cannot establish it when
/// machines hold disjoint key sets.
pub trait Collective: Send + Sync {
    /// Number of participating machines.
    fn num_machines(&self) -> usize;

    /// Element-wise sum across machines; every machine receives the result.
    fn all_reduce_sum_f64(&self, buf: &mut [f64]) -> Result<(), EncodingError>;

    /// Element-wise sum across machines; every machine receives the result.
    fn all_reduce_sum_u64(&self, buf: &mut [u64]) -> Result<(), EncodingError>;

    /// Concatenation of every machine's buffer, in unspecified order.
    fn all_gather_i32(&self, local: &[i32]) -> Result<Vec<i32>, EncodingError>;
}

/// Single-machine transport: reductions are identities.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCollective;

impl Collective for LocalCollective {
    fn num_machines(&self) -> usize {
        1
    }

    fn all_reduce_sum_f64(&self, _buf: &mut [f64]) -> Result<(), EncodingError> {
        Ok(())
    }

    fn all_reduce_sum_u64(&self, _buf: &mut [u64]) -> Result<(), EncodingError> {
        Ok(())
    }

    fn all_gather_i32(&self, local: &[i32]) -> Result<Vec<i32>, EncodingError> {
        Ok(local.to_vec())
    }
}

/// Reduce the per-(feature, fold) category maps across machines.
///
/// `categorical` must be identical on every machine (it comes from the shared
/// config), which fixes the iteration order of the collectives.
pub(crate) fn sync_encoding_stat(
    store: &mut StatStore,
    categorical: &[usize],
    collective: &dyn Collective,
) -> Result<(), EncodingError> {
    if collective.num_machines() <= 1 {
        return Ok(());
    }
    for &fid in categorical {
        for fold_id in 0..store.num_folds() {
            let local = store.fold_entries(fid, fold_id);
            let keys: Vec<i32> = local.iter().map(|&(category, _)| category).collect();
            let mut union = collective.all_gather_i32(&keys)?;
            union.sort_unstable();
            union.dedup();
            if union.is_empty() {
                continue;
            }

            let mut counts = vec![0u64; union.len()];
            let mut label_sums = vec![0.0f64; union.len()];
            for (category, cell) in local {
                let idx = union
                    .binary_search(&category)
                    .expect("gathered key universe misses a local key");
                counts[idx] = cell.count;
                label_sums[idx] = cell.label_sum;
            }
            collective.all_reduce_sum_u64(&mut counts)?;
            collective.all_reduce_sum_f64(&mut label_sums)?;

            store.replace_fold(
                fid,
                fold_id,
                union
                    .iter()
                    .zip(counts.iter().zip(label_sums.iter()))
                    .map(|(&category, (&count, &label_sum))| {
                        (category, CategoryStats { count, label_sum })
                    }),
            );
        }
    }
    Ok(())
}

/// Reduce the per-fold label sums and row counts across machines.
pub(crate) fn sync_encoding_prior(
    store: &mut StatStore,
    collective: &dyn Collective,
) -> Result<(), EncodingError> {
    if collective.num_machines() <= 1 {
        return Ok(());
    }
    let mut label_sums = store.fold_label_sums().to_vec();
    let mut num_rows = store.fold_num_rows().to_vec();
    collective.all_reduce_sum_f64(&mut label_sums)?;
    collective.all_reduce_sum_u64(&mut num_rows)?;
    store.set_fold_totals(label_sums, num_rows);
    Ok(())
}
