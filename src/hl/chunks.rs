use std::cmp;
use std::fmt::{self, Display};
use std::ops::{Deref, Range};

use crate::hl::selection::{AxisWindow, RawSelection, RawSlice};
use crate::internal_prelude::*;
use crate::util::{saturating_product, NdIndex};

/// Grid coordinates of a chunk (chunk index along every axis).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord(Vec<Ix>);

impl ChunkCoord {
    pub fn new<D: Dimension>(coord: D) -> Self {
        Self(coord.dims())
    }
}

impl Deref for ChunkCoord {
    type Target = [Ix];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Ix>> for ChunkCoord {
    fn from(coord: Vec<Ix>) -> Self {
        Self(coord)
    }
}

impl Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("(")?;
        for (i, c) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", c)?;
        }
        f.write_str(")")
    }
}

/// The chunk grid of a dataset.
///
/// An unchunked (contiguous) dataset is laid out as a single chunk spanning
/// the whole extent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkLayout {
    shape: Vec<Ix>,
    chunk: Vec<Ix>,
    chunked: bool,
}

impl ChunkLayout {
    pub fn new<S: Dimension, C: Dimension>(shape: S, chunk: C) -> Result<Self> {
        let (shape, chunk) = (shape.dims(), chunk.dims());
        ensure!(
            shape.len() == chunk.len(),
            Error::InvalidParams(format!(
                "chunk ndim ({}) != dataset ndim ({})",
                chunk.len(),
                shape.len()
            ))
        );
        ensure!(
            chunk.iter().all(|&c| c > 0),
            Error::InvalidParams(format!("chunk dimensions must be positive: {:?}", chunk))
        );
        Ok(Self { shape, chunk, chunked: true })
    }

    pub fn contiguous<S: Dimension>(shape: S) -> Self {
        let shape = shape.dims();
        let chunk = shape.iter().map(|&n| cmp::max(n, 1)).collect();
        Self { shape, chunk, chunked: false }
    }

    pub fn shape(&self) -> &[Ix] {
        &self.shape
    }

    /// Chunk dimensions (the whole extent for contiguous layouts).
    pub fn chunk(&self) -> &[Ix] {
        &self.chunk
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// Elements in one full chunk; storage allocates edge chunks at full size.
    pub fn chunk_size(&self) -> usize {
        saturating_product(self.chunk.iter().cloned())
    }

    /// Number of chunks along every axis.
    pub fn grid_shape(&self) -> Vec<Ix> {
        self.shape.iter().zip(&self.chunk).map(|(&n, &c)| (n + c - 1) / c).collect()
    }

    /// The chunk containing the element at `index`.
    pub fn coord_of(&self, index: &[Ix]) -> ChunkCoord {
        index.iter().zip(&self.chunk).map(|(&i, &c)| i / c).collect::<Vec<_>>().into()
    }

    /// Dataset index range covered by chunk `c` along `axis`, clipped to the extent.
    pub fn chunk_span(&self, axis: usize, c: Ix) -> Range<Ix> {
        let width = self.chunk[axis];
        let lo = c * width;
        lo..cmp::min(lo.saturating_add(width), self.shape[axis])
    }

    /// Per-axis windows of a selection aligned on the chunk grid.
    pub fn axis_windows(&self, sel: &RawSelection) -> Vec<Vec<AxisWindow>> {
        sel.iter().zip(&self.chunk).map(|(axis, &width)| axis.windows(width)).collect()
    }

    /// Number of chunks containing at least one selected element.
    pub fn chunks_touched(&self, sel: &RawSelection) -> usize {
        if sel.is_none() {
            return 0;
        }
        saturating_product(self.axis_windows(sel).iter().map(Vec::len))
    }

    /// Chunks containing at least one selected element, in row-major grid order.
    pub fn touched(&self, sel: &RawSelection) -> Vec<ChunkCoord> {
        let windows = self.axis_windows(sel);
        let lens: Vec<usize> = windows.iter().map(Vec::len).collect();
        NdIndex::new(&lens)
            .map(|ix| {
                ix.iter().zip(&windows).map(|(&k, w)| w[k].index).collect::<Vec<_>>().into()
            })
            .collect()
    }
}

/// Number of distinct aligned windows of `width` indices that contain at least one
/// element of `pieces` (ascending, disjoint).
pub fn windows_touched(pieces: &[RawSlice], width: Ix) -> usize {
    let width = cmp::max(width, 1);
    let mut total = 0;
    let mut last: Option<Ix> = None;
    let mut add = |a: Ix, b: Ix| {
        let a = match last {
            Some(l) if l >= a => l + 1,
            _ => a,
        };
        if b >= a {
            total += b - a + 1;
        }
        last = Some(last.map_or(b, |l| cmp::max(l, b)));
    };
    for p in pieces.iter().filter(|p| !p.is_empty()) {
        if p.count == 1 || p.stride - p.block < width {
            // gaps are narrower than a window, so every window in the span is hit
            add(p.start / width, p.last() / width);
        } else {
            for j in 0..p.count {
                let s = p.start + j * p.stride;
                add(s / width, (s + p.block - 1) / width);
            }
        }
    }
    total
}
