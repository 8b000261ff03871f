use std::cmp;
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use crate::hl::chunks::{windows_touched, ChunkLayout};
use crate::hl::pattern::Pattern;
use crate::hl::selection::{AxisWindow, RawSelection};
use crate::internal_prelude::*;
use crate::util::{saturating_product, NdIndex};

/// Cost of asking the storage engine to union `unions` regular hyperslabs into
/// one selection before a single call.
///
/// Implementations must be monotone in `unions`; engines typically grow
/// super-linearly, which is what makes splitting a request worthwhile.
pub trait UnionCost: Debug + Send + Sync {
    fn cost(&self, unions: u64) -> f64;
}

/// `k * unions ^ p`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowerLaw {
    pub k: f64,
    pub p: f64,
}

impl PowerLaw {
    pub fn new(k: f64, p: f64) -> Self {
        Self { k, p }
    }
}

impl Default for PowerLaw {
    fn default() -> Self {
        Self { k: 0.01, p: 2.0 }
    }
}

impl UnionCost for PowerLaw {
    fn cost(&self, unions: u64) -> f64 {
        self.k * (unions as f64).powf(self.p)
    }
}

/// Calibration of the estimator, in arbitrary but consistent units.
#[derive(Clone, Debug)]
pub struct CostModel {
    pub call_overhead: f64,
    pub chunk_read_cost: f64,
    pub union_cost: Arc<dyn UnionCost>,
}

impl Default for CostModel {
    fn default() -> Self {
        Self { call_overhead: 1.0, chunk_read_cost: 1.0, union_cost: Arc::new(PowerLaw::default()) }
    }
}

impl CostModel {
    fn call(&self, unions: u64) -> f64 {
        self.call_overhead + self.union_cost.cost(unions)
    }
}

/// How a selection is split into storage calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// One call for the whole selection.
    Combined,
    /// One call per touched chunk.
    PerChunk,
    /// One call per window of `granularity` indices along `axis`.
    Grouped { axis: usize, granularity: Ix },
}

impl Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Combined => f.write_str("combined"),
            Self::PerChunk => f.write_str("per-chunk"),
            Self::Grouped { axis, granularity } => {
                write!(f, "grouped(axis={}, granularity={})", axis, granularity)
            }
        }
    }
}

/// Estimated work of running a selection with one strategy.
#[derive(Clone, Debug, PartialEq)]
pub struct Estimate {
    pub strategy: Strategy,
    /// Storage calls issued.
    pub calls: u64,
    /// Hyperslab unions summed over all calls.
    pub unions: u64,
    /// Chunk materializations summed over all calls.
    pub chunk_reads: u64,
    pub cost: f64,
}

/// Scores the strategies for one selection against one chunk layout.
#[derive(Debug)]
pub struct Estimator<'a> {
    sel: &'a RawSelection,
    layout: &'a ChunkLayout,
    model: &'a CostModel,
    pattern: Pattern,
    chunk_windows: Vec<Vec<AxisWindow>>,
}

impl<'a> Estimator<'a> {
    pub fn new(sel: &'a RawSelection, layout: &'a ChunkLayout, model: &'a CostModel) -> Self {
        let pattern = Pattern::detect(sel);
        let chunk_windows = layout.axis_windows(sel);
        Self { sel, layout, model, pattern, chunk_windows }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Per-axis chunk windows of the selection.
    pub fn chunk_windows(&self) -> &[Vec<AxisWindow>] {
        &self.chunk_windows
    }

    pub fn chunks_touched(&self) -> u64 {
        if self.sel.is_none() {
            return 0;
        }
        saturating_product(self.chunk_windows.iter().map(Vec::len)) as u64
    }

    fn unions_per_axis(&self) -> Vec<u64> {
        self.sel.iter().map(|a| a.pieces().len() as u64).collect()
    }

    pub fn combined(&self) -> Estimate {
        let unions = self.pattern.union_count();
        let chunk_reads = self.chunks_touched();
        Estimate {
            strategy: Strategy::Combined,
            calls: 1,
            unions,
            chunk_reads,
            cost: self.model.call(unions) + self.model.chunk_read_cost * chunk_reads as f64,
        }
    }

    pub fn per_chunk(&self) -> Estimate {
        // Chunks sharing the same per-axis union counts cost the same, so sum over
        // a histogram of counts rather than over every chunk.
        let hists: Vec<Vec<(u64, u64)>> = self
            .chunk_windows
            .iter()
            .map(|windows| {
                let mut hist = BTreeMap::new();
                for w in windows {
                    *hist.entry(w.pieces.len() as u64).or_insert(0u64) += 1;
                }
                hist.into_iter().collect()
            })
            .collect();
        let lens: Vec<usize> = hists.iter().map(Vec::len).collect();
        let (mut cost, mut unions) = (0.0, 0u64);
        for ix in NdIndex::new(&lens) {
            let (mut r, mut mult) = (1u64, 1u64);
            for (&k, hist) in ix.iter().zip(&hists) {
                r = r.saturating_mul(hist[k].0);
                mult = mult.saturating_mul(hist[k].1);
            }
            cost += mult as f64 * self.model.call(r);
            unions = unions.saturating_add(r.saturating_mul(mult));
        }
        let calls = self.chunks_touched();
        cost += self.model.chunk_read_cost * calls as f64;
        Estimate { strategy: Strategy::PerChunk, calls, unions, chunk_reads: calls, cost }
    }

    pub fn grouped(&self, axis: usize, granularity: Ix) -> Estimate {
        let strategy = Strategy::Grouped { axis, granularity };
        if self.sel.is_none() {
            return Estimate { strategy, calls: 0, unions: 0, chunk_reads: 0, cost: 0.0 };
        }
        let per_axis = self.unions_per_axis();
        let other_unions = per_axis
            .iter()
            .enumerate()
            .filter(|&(b, _)| b != axis)
            .fold(1u64, |acc, (_, &n)| acc.saturating_mul(n));
        let other_chunks = self
            .chunk_windows
            .iter()
            .enumerate()
            .filter(|&(b, _)| b != axis)
            .fold(1u64, |acc, (_, w)| acc.saturating_mul(w.len() as u64));
        let chunk_width = self.layout.chunk()[axis];

        let (mut calls, mut unions, mut chunk_reads, mut cost) = (0u64, 0u64, 0u64, 0.0);
        for group in self.sel[axis].windows(granularity) {
            let r = (group.pieces.len() as u64).saturating_mul(other_unions);
            let chunks = (windows_touched(&group.pieces, chunk_width) as u64).saturating_mul(other_chunks);
            calls += 1;
            unions = unions.saturating_add(r);
            chunk_reads = chunk_reads.saturating_add(chunks);
            cost += self.model.call(r);
        }
        cost += self.model.chunk_read_cost * chunk_reads as f64;
        Estimate { strategy, calls, unions, chunk_reads, cost }
    }

    /// The axis grouped calls partition: the one with the most runs, or failing
    /// that the one crossing the most chunks.
    pub fn group_axis(&self) -> Option<usize> {
        if self.sel.ndim() == 0 {
            return None;
        }
        self.pattern.busiest_axis().or_else(|| {
            let mut best = 0;
            for (i, w) in self.chunk_windows.iter().enumerate() {
                if w.len() > self.chunk_windows[best].len() {
                    best = i;
                }
            }
            Some(best)
        })
    }

    /// Candidate window widths along `axis`: powers of two below the extent and
    /// the chunk width.
    pub fn granularities(&self, axis: usize) -> Vec<Ix> {
        let extent = self.layout.shape()[axis];
        let mut out = Vec::new();
        let mut g: Ix = 1;
        while g < extent {
            out.push(g);
            g = match g.checked_mul(2) {
                Some(g) => g,
                None => break,
            };
        }
        out.push(cmp::max(self.layout.chunk()[axis], 1));
        out.sort_unstable();
        out.dedup();
        out
    }

    /// The cheapest grouped estimate (widest granularity on ties). `hint`
    /// replaces the candidate search with a single width.
    pub fn best_grouped(&self, hint: Option<Ix>) -> Option<Estimate> {
        let axis = self.group_axis()?;
        let candidates = match hint {
            Some(g) => vec![g],
            None => self.granularities(axis),
        };
        let mut best: Option<Estimate> = None;
        for g in candidates {
            let est = self.grouped(axis, g);
            // candidates ascend, so a tie moves to the wider window
            if best.as_ref().map_or(true, |b| est.cost <= b.cost) {
                best = Some(est);
            }
        }
        best
    }

    /// The minimum-cost strategy. Ties prefer combined, then per-chunk, then grouped.
    pub fn choose(&self, hint: Option<Ix>) -> Estimate {
        let mut best = self.combined();
        let per_chunk = self.per_chunk();
        if per_chunk.cost < best.cost {
            best = per_chunk;
        }
        // grouping only pays off for irregular selections
        if self.pattern.busiest_axis().is_some() {
            if let Some(grouped) = self.best_grouped(hint) {
                if grouped.cost < best.cost {
                    best = grouped;
                }
            }
        }
        best
    }
}
