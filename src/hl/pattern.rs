use std::fmt::{self, Display};

use crate::hl::selection::{AxisSelection, Hyperslab, RawSelection, RawSlice, Run};
use crate::internal_prelude::*;

/// Shape of the selection along a single axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AxisPattern {
    /// Expressible as one regular slice (start, stride, block, count).
    Regular(RawSlice),
    /// A union of arithmetic runs that no single slice describes.
    Irregular(Vec<Run>),
}

impl AxisPattern {
    pub fn detect(axis: &AxisSelection) -> Self {
        match axis.pieces() {
            [piece] => Self::Regular(*piece),
            _ => Self::Irregular(axis.runs()),
        }
    }

    /// Number of regular pieces a storage call needs to describe this axis.
    pub fn unions(&self) -> usize {
        match *self {
            Self::Regular(_) => 1,
            Self::Irregular(ref runs) => runs.len(),
        }
    }

    pub fn is_regular(&self) -> bool {
        matches!(self, Self::Regular(_))
    }
}

impl Display for AxisPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Regular(ref slice) => write!(f, "regular {}", slice),
            Self::Irregular(ref runs) => write!(f, "irregular ({} runs)", runs.len()),
        }
    }
}

/// Per-axis classification of a canonical selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    axes: Vec<AxisPattern>,
}

impl Pattern {
    pub fn detect(sel: &RawSelection) -> Self {
        Self { axes: sel.iter().map(AxisPattern::detect).collect() }
    }

    pub fn axes(&self) -> &[AxisPattern] {
        &self.axes
    }

    /// Whether the whole selection is a single regular hyperslab.
    pub fn is_regular(&self) -> bool {
        self.axes.iter().all(AxisPattern::is_regular)
    }

    /// The equivalent hyperslab, if the selection is regular on every axis.
    pub fn to_hyperslab(&self) -> Option<Hyperslab> {
        self.axes
            .iter()
            .map(|a| match *a {
                AxisPattern::Regular(slice) => Some(slice),
                AxisPattern::Irregular(_) => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Hyperslab::from)
    }

    /// Number of regular hyperslabs in the union describing the selection
    /// (the product of per-axis union counts), saturating at `u64::MAX`.
    pub fn union_count(&self) -> u64 {
        self.axes.iter().fold(1u64, |acc, a| acc.saturating_mul(a.unions() as u64))
    }

    /// The axis with the most runs (the first one on ties), if any axis is irregular.
    pub fn busiest_axis(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (i, a) in self.axes.iter().enumerate() {
            let n = a.unions();
            if n > 1 && best.map_or(true, |(_, m)| n > m) {
                best = Some((i, n));
            }
        }
        best.map(|(i, _)| i)
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("[")?;
        for (i, a) in self.axes.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", a)?;
        }
        f.write_str("]")
    }
}
