use std::cmp;
use std::fmt::{self, Display};
use std::ops::{Deref, Range, RangeFull};

use crate::internal_prelude::*;

/// One dimension of a regular hyperslab: `count` blocks of `block` contiguous
/// elements, the blocks spaced `stride` apart, beginning at `start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawSlice {
    pub start: Ix,
    pub stride: Ix,
    pub block: Ix,
    pub count: Ix,
}

impl RawSlice {
    pub fn new(start: Ix, stride: Ix, block: Ix, count: Ix) -> Self {
        Self { start, stride, block, count }
    }

    /// A single contiguous block of `len` elements.
    pub fn contiguous(start: Ix, len: Ix) -> Self {
        Self { start, stride: 1, block: len, count: 1 }
    }

    /// Number of selected elements.
    pub fn len(&self) -> Ix {
        self.block * self.count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The last selected index (the slice must be non-empty).
    pub fn last(&self) -> Ix {
        self.start + (self.count - 1) * self.stride + self.block - 1
    }

    pub fn is_contiguous(&self) -> bool {
        self.count == 1 || self.stride == self.block
    }

    /// Folds adjacent blocks into one, so contiguous slices have a single shape.
    pub fn canonical(self) -> Self {
        if self.is_contiguous() {
            Self::contiguous(self.start, self.len())
        } else {
            self
        }
    }

    pub fn indices(self) -> impl Iterator<Item = Ix> {
        (0..self.count).flat_map(move |j| {
            let s = self.start + j * self.stride;
            s..s + self.block
        })
    }

    pub(crate) fn validate(&self, axis: usize, extent: Ix) -> Result<()> {
        ensure!(
            self.count >= 1 && self.block >= 1 && self.stride >= 1,
            Error::InvalidSelection(format!(
                "zero stride, block or count for axis {}: {}",
                axis, self
            ))
        );
        ensure!(
            self.count == 1 || self.block <= self.stride,
            Error::InvalidSelection(format!(
                "block {} > stride {} for axis {}",
                self.block, self.stride, axis
            ))
        );
        let last = (self.count - 1)
            .checked_mul(self.stride)
            .and_then(|n| n.checked_add(self.start))
            .and_then(|n| n.checked_add(self.block - 1));
        match last {
            Some(last) if last < extent => Ok(()),
            _ => fail!(Error::OutOfRange(format!(
                "slice {} out of bounds for axis {} with size {}",
                self, axis, extent
            ))),
        }
    }

    /// Number of selected elements strictly below index `x`.
    pub fn count_below(&self, x: Ix) -> Ix {
        if x <= self.start || self.count == 0 {
            return 0;
        }
        let off = x - self.start;
        let full =
            if off < self.block { 0 } else { cmp::min(self.count, (off - self.block) / self.stride + 1) };
        let partial = if full < self.count {
            let s = self.start + full * self.stride;
            if x > s {
                cmp::min(self.block, x - s)
            } else {
                0
            }
        } else {
            0
        };
        full * self.block + partial
    }

    /// Restricts the slice to indices in `lo..hi`; the result is at most three
    /// slices (partial head block, whole blocks, partial tail block).
    pub fn clip(&self, lo: Ix, hi: Ix) -> Vec<Self> {
        let mut out = Vec::new();
        if hi <= lo || self.is_empty() || hi <= self.start || lo > self.last() {
            return out;
        }
        let j0 = if lo < self.start + self.block {
            0
        } else {
            (lo - self.start - self.block) / self.stride + 1
        };
        let j1 = cmp::min(self.count - 1, (hi - 1 - self.start) / self.stride);
        if j0 > j1 {
            return out;
        }
        let span = |j: Ix| {
            let s = self.start + j * self.stride;
            (cmp::max(s, lo), cmp::min(s + self.block, hi))
        };
        if j0 == j1 {
            let (a, b) = span(j0);
            out.push(Self::contiguous(a, b - a));
            return out;
        }
        let (h0, h1) = span(j0);
        let (t0, t1) = span(j1);
        let head_partial = h1 - h0 < self.block;
        let tail_partial = t1 - t0 < self.block;
        let first = if head_partial { j0 + 1 } else { j0 };
        let end = if tail_partial { j1 } else { j1 + 1 };
        if head_partial {
            out.push(Self::contiguous(h0, h1 - h0));
        }
        if end > first {
            out.push(
                Self::new(self.start + first * self.stride, self.stride, self.block, end - first)
                    .canonical(),
            );
        }
        if tail_partial {
            out.push(Self::contiguous(t0, t1 - t0));
        }
        out
    }
}

impl Display for RawSlice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.start != 0 {
            write!(f, "{}", self.start)?;
        }
        write!(f, "+{}", self.count)?;
        if self.stride != 1 {
            write!(f, ";{}", self.stride)?;
        }
        if self.block != 1 {
            write!(f, "(Bx{})", self.block)?;
        }
        Ok(())
    }
}

/// A maximal arithmetic progression within the sorted indices of one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Run {
    pub start: Ix,
    pub step: Ix,
    pub len: Ix,
}

impl Run {
    pub fn new(start: Ix, step: Ix, len: Ix) -> Self {
        Self { start, step, len }
    }

    pub fn last(&self) -> Ix {
        self.start + (self.len - 1) * self.step
    }

    pub fn indices(self) -> impl Iterator<Item = Ix> {
        (0..self.len).map(move |i| self.start + i * self.step)
    }

    pub fn to_slice(self) -> RawSlice {
        if self.step == 1 || self.len == 1 {
            RawSlice::contiguous(self.start, self.len)
        } else {
            RawSlice::new(self.start, self.step, 1, self.len)
        }
    }
}

/// Splits ascending, duplicate-free indices into the fewest arithmetic runs.
///
/// Each run is extended for as long as the step stays uniform.
///
/// # Panics
///
/// Panics in debug builds if `sorted` is not strictly ascending.
pub fn canonical_runs(sorted: &[Ix]) -> Vec<Run> {
    debug_assert!(
        sorted.windows(2).all(|w| w[0] < w[1]),
        "indices must be strictly ascending: {:?}",
        sorted
    );
    let n = sorted.len();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < n {
        let start = sorted[i];
        if i + 1 == n {
            runs.push(Run::new(start, 1, 1));
            break;
        }
        let step = sorted[i + 1] - start;
        let mut j = i + 1;
        while j + 1 < n && sorted[j + 1] - sorted[j] == step {
            j += 1;
        }
        runs.push(Run::new(start, step, j - i + 1));
        i = j + 1;
    }
    runs
}

/// A regular hyperslab: one `RawSlice` per dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hyperslab {
    dims: Vec<RawSlice>,
}

impl Hyperslab {
    pub fn new<T: Into<Self>>(hyper: T) -> Self {
        hyper.into()
    }

    /// Builds a hyperslab from the per-dimension parameter vectors.
    pub fn from_params(start: &[Ix], stride: &[Ix], block: &[Ix], count: &[Ix]) -> Result<Self> {
        let ndim = start.len();
        ensure!(
            stride.len() == ndim && block.len() == ndim && count.len() == ndim,
            Error::InvalidSelection(format!(
                "hyperslab parameter lengths differ: {}/{}/{}/{}",
                ndim,
                stride.len(),
                block.len(),
                count.len()
            ))
        );
        Ok((0..ndim)
            .map(|i| RawSlice::new(start[i], stride[i], block[i], count[i]))
            .collect::<Vec<_>>()
            .into())
    }
}

impl Deref for Hyperslab {
    type Target = [RawSlice];

    fn deref(&self) -> &Self::Target {
        &self.dims
    }
}

impl From<Vec<RawSlice>> for Hyperslab {
    fn from(dims: Vec<RawSlice>) -> Self {
        Self { dims }
    }
}

impl From<RawSlice> for Hyperslab {
    fn from(slice: RawSlice) -> Self {
        vec![slice].into()
    }
}

impl Display for Hyperslab {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(")?;
        for (i, slice) in self.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", slice)?;
        }
        if self.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

/// A requested region of a dataset, as supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// The entire extent.
    All,
    /// Per-dimension index lists; the selected set is their cartesian product.
    Indices(Vec<Vec<Ix>>),
    /// A regular hyperslab.
    Hyperslab(Hyperslab),
}

impl Default for Selection {
    fn default() -> Self {
        Self::All
    }
}

impl Selection {
    pub fn new<T: Into<Self>>(selection: T) -> Self {
        selection.into()
    }

    pub fn from_indices<T: Into<Vec<Ix>>>(dims: Vec<T>) -> Self {
        Self::Indices(dims.into_iter().map(Into::into).collect())
    }

    pub fn from_hyperslab(start: &[Ix], stride: &[Ix], block: &[Ix], count: &[Ix]) -> Result<Self> {
        Hyperslab::from_params(start, stride, block, count).map(Self::Hyperslab)
    }

    pub fn in_ndim(&self) -> Option<usize> {
        match *self {
            Self::All => None,
            Self::Indices(ref dims) => Some(dims.len()),
            Self::Hyperslab(ref hyper) => Some(hyper.len()),
        }
    }

    /// Validates the selection against the dataset `shape` and canonicalizes it.
    pub fn into_raw<S: AsRef<[Ix]>>(self, shape: S) -> Result<RawSelection> {
        let shape = shape.as_ref();
        let ndim = shape.len();
        if let Some(sel_ndim) = self.in_ndim() {
            ensure!(
                sel_ndim == ndim,
                Error::InvalidSelection(format!(
                    "selection ndim ({}) != shape ndim ({})",
                    sel_ndim, ndim
                ))
            );
        }
        let axes = match self {
            Self::All => shape.iter().map(|&extent| AxisSelection::full(extent)).collect(),
            Self::Indices(dims) => dims
                .into_iter()
                .zip(shape)
                .enumerate()
                .map(|(axis, (indices, &extent))| AxisSelection::from_indices(axis, indices, extent))
                .collect::<Result<Vec<_>>>()?,
            Self::Hyperslab(hyper) => hyper
                .iter()
                .zip(shape)
                .enumerate()
                .map(|(axis, (slice, &extent))| AxisSelection::from_slice(axis, *slice, extent))
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(RawSelection { shape: shape.to_vec(), axes })
    }
}

impl Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::All => write!(f, "ALL"),
            Self::Indices(ref dims) => {
                let lens: Vec<_> = dims.iter().map(Vec::len).collect();
                write!(f, "indices{:?}", lens)
            }
            Self::Hyperslab(ref hyper) => write!(f, "{}", hyper),
        }
    }
}

impl From<&Self> for Selection {
    fn from(sel: &Self) -> Self {
        sel.clone()
    }
}

impl From<RangeFull> for Selection {
    fn from(_: RangeFull) -> Self {
        Self::All
    }
}

impl From<Hyperslab> for Selection {
    fn from(hyper: Hyperslab) -> Self {
        Self::Hyperslab(hyper)
    }
}

impl From<RawSlice> for Selection {
    fn from(slice: RawSlice) -> Self {
        Hyperslab::from(slice).into()
    }
}

impl From<Vec<RawSlice>> for Selection {
    fn from(dims: Vec<RawSlice>) -> Self {
        Hyperslab::from(dims).into()
    }
}

impl From<Range<Ix>> for Selection {
    fn from(range: Range<Ix>) -> Self {
        if range.end > range.start {
            RawSlice::contiguous(range.start, range.end - range.start).into()
        } else {
            Self::Indices(vec![vec![]])
        }
    }
}

impl From<Vec<Vec<Ix>>> for Selection {
    fn from(dims: Vec<Vec<Ix>>) -> Self {
        Self::Indices(dims)
    }
}

impl From<Vec<Ix>> for Selection {
    fn from(indices: Vec<Ix>) -> Self {
        Self::Indices(vec![indices])
    }
}

impl From<&[Ix]> for Selection {
    fn from(indices: &[Ix]) -> Self {
        indices.to_vec().into()
    }
}

/// The canonical form of one axis of a selection.
///
/// `pieces` are ascending and disjoint. `order`, when present, maps the ordinal of
/// each element in ascending order to its position in the caller's output layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AxisSelection {
    pieces: Vec<RawSlice>,
    len: Ix,
    order: Option<Vec<usize>>,
}

impl AxisSelection {
    fn full(extent: Ix) -> Self {
        let pieces = if extent == 0 { vec![] } else { vec![RawSlice::contiguous(0, extent)] };
        Self { pieces, len: extent, order: None }
    }

    fn from_slice(axis: usize, slice: RawSlice, extent: Ix) -> Result<Self> {
        slice.validate(axis, extent)?;
        Ok(Self { pieces: vec![slice.canonical()], len: slice.len(), order: None })
    }

    fn from_indices(axis: usize, indices: Vec<Ix>, extent: Ix) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= extent) {
            fail!(Error::OutOfRange(format!(
                "index {} out of bounds for axis {} with size {}",
                bad, axis, extent
            )));
        }
        let len = indices.len();
        let ascending = indices.windows(2).all(|w| w[0] < w[1]);
        let (sorted, order) = if ascending {
            (indices, None)
        } else {
            let mut perm: Vec<usize> = (0..len).collect();
            perm.sort_by_key(|&k| indices[k]);
            let sorted: Vec<Ix> = perm.iter().map(|&k| indices[k]).collect();
            if let Some(w) = sorted.windows(2).find(|w| w[0] == w[1]) {
                fail!(Error::InvalidSelection(format!(
                    "duplicate index {} for axis {}",
                    w[0], axis
                )));
            }
            (sorted, Some(perm))
        };
        let pieces = canonical_runs(&sorted).into_iter().map(Run::to_slice).collect();
        Ok(Self { pieces, len, order })
    }

    pub fn pieces(&self) -> &[RawSlice] {
        &self.pieces
    }

    pub fn len(&self) -> Ix {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn order(&self) -> Option<&[usize]> {
        self.order.as_deref()
    }

    /// Output-buffer position of the element with ascending ordinal `k`.
    #[inline]
    pub fn out_pos(&self, k: usize) -> usize {
        self.order.as_ref().map_or(k, |order| order[k])
    }

    /// Selected indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = Ix> + '_ {
        self.pieces.iter().flat_map(|p| p.indices())
    }

    pub fn first(&self) -> Option<Ix> {
        self.pieces.first().map(|p| p.start)
    }

    pub fn last(&self) -> Option<Ix> {
        self.pieces.last().map(RawSlice::last)
    }

    /// Number of selected elements strictly below index `x`.
    pub fn count_below(&self, x: Ix) -> Ix {
        self.pieces.iter().map(|p| p.count_below(x)).sum()
    }

    /// Restricts the axis to indices in `lo..hi`, returning the clipped pieces and
    /// the (contiguous) range of ascending ordinals they cover.
    pub fn clip(&self, lo: Ix, hi: Ix) -> (Vec<RawSlice>, Range<usize>) {
        let pieces = self.pieces.iter().flat_map(|p| p.clip(lo, hi)).collect();
        (pieces, self.count_below(lo)..self.count_below(hi))
    }

    /// The minimal arithmetic-run decomposition of this axis.
    pub fn runs(&self) -> Vec<Run> {
        if self.pieces.iter().all(|p| p.count == 1 || p.block == 1) {
            // pieces of index lists are already greedy runs
            self.pieces
                .iter()
                .map(|p| {
                    if p.count == 1 {
                        Run::new(p.start, 1, p.block)
                    } else {
                        Run::new(p.start, p.stride, p.count)
                    }
                })
                .collect()
        } else {
            let sorted: Vec<Ix> = self.indices().collect();
            canonical_runs(&sorted)
        }
    }

    /// Splits the axis along aligned windows `[w * width, (w + 1) * width)`,
    /// returning only the windows that contain selected elements, ascending.
    pub fn windows(&self, width: Ix) -> Vec<AxisWindow> {
        let width = cmp::max(width, 1);
        let mut out: Vec<AxisWindow> = Vec::new();
        let mut ordinal = 0;
        let mut push = |index: Ix, sub: RawSlice, out: &mut Vec<AxisWindow>| {
            let n = sub.len();
            match out.last_mut() {
                Some(win) if win.index == index => {
                    win.pieces.push(sub);
                    win.ordinals.end += n;
                }
                _ => out.push(AxisWindow { index, pieces: vec![sub], ordinals: ordinal..ordinal + n }),
            }
            ordinal += n;
        };
        for piece in &self.pieces {
            let (w0, w1) = (piece.start / width, piece.last() / width);
            if piece.count <= w1 - w0 + 1 {
                // sparse blocks: visit each block and the windows it spans
                for j in 0..piece.count {
                    let s = piece.start + j * piece.stride;
                    let e = s + piece.block;
                    for w in s / width..=(e - 1) / width {
                        let lo = cmp::max(s, w * width);
                        let hi = cmp::min(e, w.saturating_add(1).saturating_mul(width));
                        push(w, RawSlice::contiguous(lo, hi - lo), &mut out);
                    }
                }
            } else {
                for w in w0..=w1 {
                    let hi = w.saturating_add(1).saturating_mul(width);
                    for sub in piece.clip(w * width, hi) {
                        push(w, sub, &mut out);
                    }
                }
            }
        }
        out
    }
}

/// The part of an axis selection that falls within one aligned window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AxisWindow {
    /// Window number along the axis (`index * width` is its first coordinate).
    pub index: Ix,
    /// Clipped pieces, ascending and disjoint.
    pub pieces: Vec<RawSlice>,
    /// Ascending ordinals of the covered elements within the whole axis.
    pub ordinals: Range<usize>,
}

impl AxisWindow {
    pub fn len(&self) -> usize {
        self.ordinals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordinals.start == self.ordinals.end
    }
}

/// A validated, canonical selection bound to a dataset shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawSelection {
    shape: Vec<Ix>,
    axes: Vec<AxisSelection>,
}

impl Deref for RawSelection {
    type Target = [AxisSelection];

    fn deref(&self) -> &Self::Target {
        &self.axes
    }
}

impl RawSelection {
    /// Extent of the dataset this selection was validated against.
    pub fn shape(&self) -> &[Ix] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    /// Shape of the output buffer (caller order along every axis).
    pub fn out_shape(&self) -> Vec<Ix> {
        self.axes.iter().map(AxisSelection::len).collect()
    }

    /// Total number of selected elements.
    pub fn size(&self) -> usize {
        self.axes.iter().map(AxisSelection::len).product()
    }

    pub fn is_none(&self) -> bool {
        self.axes.iter().any(AxisSelection::is_empty)
    }

    pub fn is_all(&self) -> bool {
        self.axes.iter().zip(&self.shape).all(|(a, &extent)| a.len() == extent)
    }

    /// Whether the output layout differs from ascending storage order on any axis.
    pub fn is_permuted(&self) -> bool {
        self.axes.iter().any(|a| a.order().is_some())
    }
}

/// Returns the minimal run decomposition of `axis` of a canonical selection.
pub fn to_canonical_runs(selection: &RawSelection, axis: usize) -> Result<Vec<Run>> {
    ensure!(
        axis < selection.ndim(),
        Error::InvalidSelection(format!(
            "axis {} out of bounds for selection of ndim {}",
            axis,
            selection.ndim()
        ))
    );
    Ok(selection[axis].runs())
}
