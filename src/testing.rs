//! Test fixtures: a tiny svmlight-style parser, sparse test columns, and an
//! in-memory collective for simulated multi-machine fits.
//!
//! Shipped in the library so integration tests and downstream crates can
//! exercise the streamed, CSC, and distributed paths without real
//! collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::EncodingError;
use crate::input::{ColumnIterator, RowParser};
use crate::sync::Collective;

// =============================================================================
// Svmlight-style row parser
// =============================================================================

/// Parses `"<label> <fid>:<value> <fid>:<value> ..."` lines.
#[derive(Debug, Clone)]
pub struct SvmRowParser {
    num_features: usize,
}

impl SvmRowParser {
    /// `num_features` may be 0 for schema-free input; the provider resolves
    /// the feature universe from the rows it sees.
    pub fn new(num_features: usize) -> Self {
        Self { num_features }
    }
}

impl RowParser for SvmRowParser {
    fn parse_one_line(
        &self,
        line: &str,
        out_pairs: &mut Vec<(usize, f64)>,
        out_label: &mut f64,
        _row_idx: usize,
    ) -> Result<(), EncodingError> {
        out_pairs.clear();
        let mut tokens = line.split_whitespace();
        let label = tokens
            .next()
            .ok_or_else(|| EncodingError::Fatal(format!("empty row: {line:?}")))?;
        *out_label = label
            .parse()
            .map_err(|_| EncodingError::Fatal(format!("bad label in row: {line:?}")))?;
        for token in tokens {
            let parsed = token.split_once(':').and_then(|(fid, value)| {
                Some((fid.parse().ok()?, value.parse().ok()?))
            });
            let (fid, value) = parsed
                .ok_or_else(|| EncodingError::Fatal(format!("bad pair {token:?} in row")))?;
            out_pairs.push((fid, value));
        }
        Ok(())
    }

    fn num_features(&self) -> usize {
        self.num_features
    }
}

// =============================================================================
// Sparse test column
// =============================================================================

/// A CSC column backed by sorted `(row, value)` entries.
#[derive(Debug, Clone)]
pub struct SparseColumn {
    entries: Vec<(usize, f64)>,
    pos: usize,
}

impl SparseColumn {
    pub fn new(mut entries: Vec<(usize, f64)>) -> Self {
        entries.sort_unstable_by_key(|&(row, _)| row);
        Self { entries, pos: 0 }
    }

    /// A dense column: one entry per row.
    pub fn dense(values: &[f64]) -> Self {
        Self::new(values.iter().copied().enumerate().collect())
    }
}

impl ColumnIterator for SparseColumn {
    fn get(&mut self, row_idx: usize) -> f64 {
        match self.entries.binary_search_by_key(&row_idx, |&(row, _)| row) {
            Ok(pos) => self.entries[pos].1,
            Err(_) => 0.0,
        }
    }

    fn next_non_zero(&mut self) -> Option<(usize, f64)> {
        let entry = self.entries.get(self.pos).copied();
        if entry.is_some() {
            self.pos += 1;
        }
        entry
    }

    fn reset(&mut self) {
        self.pos = 0;
    }
}

// =============================================================================
// In-memory collective
// =============================================================================

#[derive(Debug, Clone)]
enum OpResult {
    F64(Vec<f64>),
    U64(Vec<u64>),
    I32(Vec<i32>),
}

enum OpContribution<'a> {
    F64(&'a [f64]),
    U64(&'a [u64]),
    I32(&'a [i32]),
}

#[derive(Debug, Default)]
struct ClusterInner {
    arrived: usize,
    pending_f64: Option<Vec<f64>>,
    pending_u64: Option<Vec<u64>>,
    pending_i32: Option<Vec<i32>>,
    results: Vec<OpResult>,
}

#[derive(Debug)]
struct ClusterState {
    num_machines: usize,
    inner: Mutex<ClusterInner>,
    cv: Condvar,
}

/// Factory for the per-machine handles of an in-memory cluster.
pub struct MemoryCluster;

impl MemoryCluster {
    /// Create one [`MachineCollective`] handle per machine. Each handle is
    /// used by one thread; collective calls rendezvous across all handles.
    pub fn new(num_machines: usize) -> Vec<MachineCollective> {
        let state = Arc::new(ClusterState {
            num_machines,
            inner: Mutex::new(ClusterInner::default()),
            cv: Condvar::new(),
        });
        (0..num_machines)
            .map(|_| MachineCollective {
                state: Arc::clone(&state),
                next_op: AtomicUsize::new(0),
            })
            .collect()
    }
}

/// One machine's view of an in-memory cluster.
///
/// All machines must issue the same operations in the same order (SPMD); a
/// divergent sequence fails with [`EncodingError::Fatal`].
pub struct MachineCollective {
    state: Arc<ClusterState>,
    next_op: AtomicUsize,
}

impl MachineCollective {
    /// Contribute to the current operation, wait for the other machines, and
    /// return the completed result.
    fn rendezvous(&self, contribution: OpContribution<'_>) -> Result<OpResult, EncodingError> {
        fn fatal(message: &str) -> EncodingError {
            EncodingError::Fatal(message.to_string())
        }

        let op_idx = self.next_op.fetch_add(1, Ordering::Relaxed);
        let mut inner = self
            .state
            .inner
            .lock()
            .map_err(|_| fatal("cluster lock poisoned"))?;

        match contribution {
            OpContribution::F64(values) => {
                if inner.pending_u64.is_some() || inner.pending_i32.is_some() {
                    return Err(fatal("collective op mismatch"));
                }
                let acc = inner
                    .pending_f64
                    .get_or_insert_with(|| vec![0.0; values.len()]);
                if acc.len() != values.len() {
                    return Err(fatal("mismatched reduce lengths"));
                }
                for (a, b) in acc.iter_mut().zip(values.iter()) {
                    *a += *b;
                }
            }
            OpContribution::U64(values) => {
                if inner.pending_f64.is_some() || inner.pending_i32.is_some() {
                    return Err(fatal("collective op mismatch"));
                }
                let acc = inner.pending_u64.get_or_insert_with(|| vec![0; values.len()]);
                if acc.len() != values.len() {
                    return Err(fatal("mismatched reduce lengths"));
                }
                for (a, b) in acc.iter_mut().zip(values.iter()) {
                    *a += *b;
                }
            }
            OpContribution::I32(values) => {
                if inner.pending_f64.is_some() || inner.pending_u64.is_some() {
                    return Err(fatal("collective op mismatch"));
                }
                inner
                    .pending_i32
                    .get_or_insert_with(Vec::new)
                    .extend_from_slice(values);
            }
        }

        inner.arrived += 1;
        if inner.arrived == self.state.num_machines {
            let result = if let Some(values) = inner.pending_f64.take() {
                OpResult::F64(values)
            } else if let Some(values) = inner.pending_u64.take() {
                OpResult::U64(values)
            } else if let Some(values) = inner.pending_i32.take() {
                OpResult::I32(values)
            } else {
                return Err(fatal("rendezvous with no pending op"));
            };
            inner.results.push(result);
            inner.arrived = 0;
            self.state.cv.notify_all();
        }
        while inner.results.len() <= op_idx {
            inner = self
                .state
                .cv
                .wait(inner)
                .map_err(|_| fatal("cluster lock poisoned"))?;
        }
        Ok(inner.results[op_idx].clone())
    }
}

impl Collective for MachineCollective {
    fn num_machines(&self) -> usize {
        self.state.num_machines
    }

    fn all_reduce_sum_f64(&self, buf: &mut [f64]) -> Result<(), EncodingError> {
        match self.rendezvous(OpContribution::F64(buf))? {
            OpResult::F64(values) => {
                buf.copy_from_slice(&values);
                Ok(())
            }
            _ => Err(EncodingError::Fatal("collective op mismatch".to_string())),
        }
    }

    fn all_reduce_sum_u64(&self, buf: &mut [u64]) -> Result<(), EncodingError> {
        match self.rendezvous(OpContribution::U64(buf))? {
            OpResult::U64(values) => {
                buf.copy_from_slice(&values);
                Ok(())
            }
            _ => Err(EncodingError::Fatal("collective op mismatch".to_string())),
        }
    }

    fn all_gather_i32(&self, local: &[i32]) -> Result<Vec<i32>, EncodingError> {
        match self.rendezvous(OpContribution::I32(local))? {
            OpResult::I32(values) => Ok(values),
            _ => Err(EncodingError::Fatal("collective op mismatch".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svm_parser_reads_pairs_and_label() {
        let parser = SvmRowParser::new(3);
        let mut pairs = Vec::new();
        let mut label = 0.0;
        parser
            .parse_one_line("1 0:2 2:5.5", &mut pairs, &mut label, 0)
            .unwrap();
        assert_eq!(label, 1.0);
        assert_eq!(pairs, vec![(0, 2.0), (2, 5.5)]);
        assert_eq!(parser.num_features(), 3);
    }

    #[test]
    fn svm_parser_rejects_garbage() {
        let parser = SvmRowParser::new(1);
        let mut pairs = Vec::new();
        let mut label = 0.0;
        assert!(parser.parse_one_line("", &mut pairs, &mut label, 0).is_err());
        assert!(parser
            .parse_one_line("1 nonsense", &mut pairs, &mut label, 0)
            .is_err());
    }

    #[test]
    fn sparse_column_iteration() {
        let mut col = SparseColumn::new(vec![(5, 2.0), (2, 1.0)]);
        assert_eq!(col.next_non_zero(), Some((2, 1.0)));
        assert_eq!(col.next_non_zero(), Some((5, 2.0)));
        assert_eq!(col.next_non_zero(), None);
        col.reset();
        assert_eq!(col.next_non_zero(), Some((2, 1.0)));
        assert_eq!(col.get(5), 2.0);
        assert_eq!(col.get(3), 0.0);
    }

    #[test]
    fn memory_cluster_sums_across_machines() {
        let handles = MemoryCluster::new(3);
        let sums: Vec<Vec<f64>> = std::thread::scope(|scope| {
            handles
                .into_iter()
                .enumerate()
                .map(|(rank, collective)| {
                    scope.spawn(move || {
                        let mut buf = vec![rank as f64, 1.0];
                        collective.all_reduce_sum_f64(&mut buf).unwrap();
                        buf
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|j| j.join().unwrap())
                .collect()
        });
        for sum in sums {
            assert_eq!(sum, vec![3.0, 3.0]);
        }
    }

    #[test]
    fn memory_cluster_gathers_all_keys() {
        let handles = MemoryCluster::new(2);
        let gathered: Vec<Vec<i32>> = std::thread::scope(|scope| {
            handles
                .into_iter()
                .enumerate()
                .map(|(rank, collective)| {
                    scope.spawn(move || {
                        let local = if rank == 0 { vec![1, 2] } else { vec![2, 3] };
                        let mut keys = collective.all_gather_i32(&local).unwrap();
                        keys.sort_unstable();
                        keys
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|j| j.join().unwrap())
                .collect()
        });
        for keys in gathered {
            assert_eq!(keys, vec![1, 2, 2, 3]);
        }
    }
}
