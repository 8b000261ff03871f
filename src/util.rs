use crate::dim::Ix;

/// Row-major (C-order) element strides for the given shape.
pub fn row_major_strides(shape: &[Ix]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Product of extents, saturating instead of overflowing.
pub fn saturating_product<I: IntoIterator<Item = usize>>(dims: I) -> usize {
    dims.into_iter().fold(1usize, |acc, n| acc.saturating_mul(n))
}

/// Odometer over all multi-indices below `lens`, last axis fastest.
///
/// Yields nothing if any length is zero, and a single empty index for rank 0.
#[derive(Clone, Debug)]
pub struct NdIndex {
    lens: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl NdIndex {
    pub fn new(lens: &[usize]) -> Self {
        let next = if lens.iter().any(|&n| n == 0) { None } else { Some(vec![0; lens.len()]) };
        Self { lens: lens.to_vec(), next }
    }
}

impl Iterator for NdIndex {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let cur = self.next.take()?;
        let mut succ = cur.clone();
        for axis in (0..self.lens.len()).rev() {
            succ[axis] += 1;
            if succ[axis] < self.lens[axis] {
                self.next = Some(succ);
                break;
            }
            succ[axis] = 0;
        }
        Some(cur)
    }
}
