use std::iter;

use rand::distributions::Uniform;
use rand::prelude::{Rng, SliceRandom};

use slabplan::{Ix, RawSlice, Selection};

pub fn gen_shape<R: Rng + ?Sized>(rng: &mut R, ndim: usize, max: Ix) -> Vec<Ix> {
    iter::repeat(()).map(|_| rng.gen_range(1..=max)).take(ndim).collect()
}

/// A chunk shape for `shape`; occasionally as large as the whole extent.
pub fn gen_chunk<R: Rng + ?Sized>(rng: &mut R, shape: &[Ix]) -> Vec<Ix> {
    shape.iter().map(|&n| if rng.gen_bool(0.1) { n } else { rng.gen_range(1..=n) }).collect()
}

pub fn gen_bytes<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<u8> {
    rng.sample_iter(Uniform::new_inclusive(0, 255)).take(n).collect()
}

/// Distinct indices below `extent`, sorted or shuffled.
pub fn gen_indices<R: Rng + ?Sized>(rng: &mut R, extent: Ix) -> Vec<Ix> {
    let density = rng.gen_range(0.05..1.0);
    let mut out: Vec<Ix> = (0..extent).filter(|_| rng.gen_bool(density)).collect();
    if out.is_empty() {
        out.push(rng.gen_range(0..extent));
    }
    if rng.gen_bool(0.3) {
        out.shuffle(rng);
    }
    out
}

/// A valid slice inside `0..extent`.
pub fn gen_slice<R: Rng + ?Sized>(rng: &mut R, extent: Ix) -> RawSlice {
    let start = rng.gen_range(0..extent);
    let room = extent - start;
    let block = rng.gen_range(1..=room);
    let stride = rng.gen_range(block..=room.max(block) + 2);
    let count = 1 + (room - block) / stride;
    let count = rng.gen_range(1..=count);
    RawSlice::new(start, stride, block, count)
}

pub fn gen_selection<R: Rng + ?Sized>(rng: &mut R, shape: &[Ix]) -> Selection {
    match rng.gen_range(0..10) {
        0 => Selection::All,
        1..=5 => Selection::from_indices(shape.iter().map(|&n| gen_indices(rng, n)).collect()),
        _ => shape.iter().map(|&n| gen_slice(rng, n)).collect::<Vec<_>>().into(),
    }
}

/// Per-axis dataset indices of `sel` in output order.
pub fn axis_indices(sel: &Selection, shape: &[Ix]) -> Vec<Vec<Ix>> {
    match *sel {
        Selection::All => shape.iter().map(|&n| (0..n).collect()).collect(),
        Selection::Indices(ref dims) => dims.clone(),
        Selection::Hyperslab(ref hyper) => hyper.iter().map(|s| s.indices().collect()).collect(),
    }
}

/// Gathers the elements of `sel` from a row-major dataset image.
pub fn reference_read(data: &[u8], shape: &[Ix], sel: &Selection, elem_size: usize) -> Vec<u8> {
    let axes = axis_indices(sel, shape);
    let mut out = Vec::new();
    for_each_index(&axes, |ix| {
        let flat = flat_index(ix, shape);
        out.extend_from_slice(&data[flat * elem_size..(flat + 1) * elem_size]);
    });
    out
}

/// Scatters `values` (output order) into a row-major dataset image.
pub fn reference_write(image: &mut [u8], shape: &[Ix], sel: &Selection, values: &[u8], elem_size: usize) {
    let axes = axis_indices(sel, shape);
    let mut k = 0;
    for_each_index(&axes, |ix| {
        let flat = flat_index(ix, shape);
        image[flat * elem_size..(flat + 1) * elem_size].copy_from_slice(&values[k * elem_size..(k + 1) * elem_size]);
        k += 1;
    });
}

fn flat_index(ix: &[Ix], shape: &[Ix]) -> usize {
    ix.iter().zip(shape).fold(0, |acc, (&i, &n)| acc * n + i)
}

fn for_each_index<F: FnMut(&[Ix])>(axes: &[Vec<Ix>], mut f: F) {
    if axes.iter().any(Vec::is_empty) {
        return;
    }
    let mut pos = vec![0; axes.len()];
    loop {
        let ix: Vec<Ix> = pos.iter().zip(axes).map(|(&k, a)| a[k]).collect();
        f(&ix);
        let mut d = axes.len();
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            pos[d] += 1;
            if pos[d] < axes[d].len() {
                break;
            }
            pos[d] = 0;
        }
    }
}
