use std::fmt::{self, Display};
use std::ops::{Deref, Range};

use crate::hl::chunks::{ChunkCoord, ChunkLayout};
use crate::hl::config::{PlanConfig, StrategyKind};
use crate::hl::cost::{Estimate, Estimator, Strategy};
use crate::hl::selection::{AxisWindow, Hyperslab, RawSelection, RawSlice};
use crate::internal_prelude::*;
use crate::util::{saturating_product, NdIndex};

/// The storage-side selection of one plan step: per-axis ascending, disjoint
/// slices whose cartesian product is the set of elements touched.
///
/// Engines transfer the elements of a region in row-major order of that product.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    axes: Vec<Vec<RawSlice>>,
}

impl Region {
    pub fn new(axes: Vec<Vec<RawSlice>>) -> Self {
        Self { axes }
    }

    /// The region of a whole dataset extent.
    pub fn all<D: Dimension>(shape: D) -> Self {
        let axes = shape
            .dims()
            .into_iter()
            .map(|n| if n == 0 { vec![] } else { vec![RawSlice::contiguous(0, n)] })
            .collect();
        Self { axes }
    }

    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    /// Number of selected elements along every axis.
    pub fn shape(&self) -> Vec<Ix> {
        self.axes.iter().map(|a| a.iter().map(RawSlice::len).sum()).collect()
    }

    pub fn size(&self) -> usize {
        saturating_product(self.shape())
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Regular hyperslabs the engine has to union to describe the region.
    pub fn unions(&self) -> u64 {
        self.axes.iter().fold(1u64, |acc, a| acc.saturating_mul(a.len() as u64))
    }

    /// The equivalent hyperslab, if every axis is a single slice.
    pub fn to_hyperslab(&self) -> Option<Hyperslab> {
        self.axes
            .iter()
            .map(|a| match a[..] {
                [slice] => Some(slice),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Hyperslab::from)
    }

    /// Selected indices along `axis`, ascending.
    pub fn indices(&self, axis: usize) -> Vec<Ix> {
        self.axes[axis].iter().flat_map(|p| p.indices()).collect()
    }

    /// Checks the region against a dataset extent.
    pub fn validate(&self, shape: &[Ix]) -> Result<()> {
        ensure!(
            self.ndim() == shape.len(),
            Error::InvalidSelection(format!(
                "region ndim ({}) != dataset ndim ({})",
                self.ndim(),
                shape.len()
            ))
        );
        for (axis, (pieces, &extent)) in self.axes.iter().zip(shape).enumerate() {
            let mut next = 0;
            for p in pieces {
                p.validate(axis, extent)?;
                ensure!(
                    p.start >= next,
                    Error::InvalidSelection(format!("overlapping or unsorted slices on axis {}", axis))
                );
                next = p.last() + 1;
            }
        }
        Ok(())
    }
}

impl Deref for Region {
    type Target = [Vec<RawSlice>];

    fn deref(&self) -> &Self::Target {
        &self.axes
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("(")?;
        for (i, axis) in self.axes.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            match axis[..] {
                [slice] => write!(f, "{}", slice)?,
                _ => write!(f, "{} slices", axis.len())?,
            }
        }
        f.write_str(")")
    }
}

/// Where the elements of a step live in the caller's buffer: per axis, the
/// range of ascending selection ordinals covered by the step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferMap {
    axes: Vec<Range<usize>>,
}

impl BufferMap {
    pub fn new(axes: Vec<Range<usize>>) -> Self {
        Self { axes }
    }

    /// Maps the whole selection.
    pub fn identity(sel: &RawSelection) -> Self {
        Self { axes: sel.iter().map(|a| 0..a.len()).collect() }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(|r| r.len()).collect()
    }

    pub fn size(&self) -> usize {
        saturating_product(self.shape())
    }

    /// Byte offset of every element of the step in the caller's buffer, in the
    /// order the engine transfers them.
    pub fn offsets(&self, sel: &RawSelection, elem_size: usize) -> Vec<usize> {
        let strides = crate::util::row_major_strides(&sel.out_shape());
        let lens = self.shape();
        let mut out = Vec::with_capacity(self.size());
        for ix in NdIndex::new(&lens) {
            let mut offset = 0;
            for (a, &k) in ix.iter().enumerate() {
                offset += sel[a].out_pos(self.axes[a].start + k) * strides[a];
            }
            out.push(offset * elem_size);
        }
        out
    }
}

impl Deref for BufferMap {
    type Target = [Range<usize>];

    fn deref(&self) -> &Self::Target {
        &self.axes
    }
}

/// One storage call of a plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanStep {
    pub region: Region,
    pub map: BufferMap,
    /// The chunk this step is confined to, for per-chunk steps.
    pub chunk: Option<ChunkCoord>,
}

/// An ordered list of storage calls covering a selection exactly once.
#[derive(Clone, Debug)]
pub struct Plan {
    estimate: Estimate,
    steps: Vec<PlanStep>,
}

impl Plan {
    pub fn strategy(&self) -> Strategy {
        self.estimate.strategy
    }

    pub fn estimate(&self) -> &Estimate {
        &self.estimate
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Chooses a strategy for `sel` over `layout` and emits its steps.
pub fn plan(sel: &RawSelection, layout: &ChunkLayout, config: &PlanConfig) -> Result<Plan> {
    ensure!(
        sel.shape() == layout.shape(),
        Error::InvalidSelection(format!(
            "selection shape {:?} != dataset shape {:?}",
            sel.shape(),
            layout.shape()
        ))
    );
    ensure!(
        layout.ndim() > 0,
        Error::InvalidSelection("scalar datasets cannot be planned".into())
    );

    let model = config.cost_model();
    let est = Estimator::new(sel, layout, model);
    if sel.is_none() {
        let estimate = Estimate { strategy: Strategy::Combined, calls: 0, unions: 0, chunk_reads: 0, cost: 0.0 };
        return Ok(Plan { estimate, steps: vec![] });
    }

    let hint = config.granularity();
    let single_chunk = est.chunks_touched() == 1;
    let estimate = match config.strategy() {
        // a single chunk is never worth splitting
        _ if single_chunk => est.combined(),
        None => est.choose(hint),
        Some(StrategyKind::Combined) => est.combined(),
        Some(StrategyKind::PerChunk) => est.per_chunk(),
        Some(StrategyKind::Grouped) => est.best_grouped(hint).unwrap_or_else(|| est.combined()),
    };

    let steps = match estimate.strategy {
        Strategy::Combined => {
            let chunk = if single_chunk { Some(layout.coord_of(&first_index(sel))) } else { None };
            vec![PlanStep { region: whole_region(sel), map: BufferMap::identity(sel), chunk }]
        }
        Strategy::PerChunk => per_chunk_steps(est.chunk_windows()),
        Strategy::Grouped { axis, granularity } => grouped_steps(sel, axis, granularity),
    };

    let covered: usize = steps.iter().map(|s| s.map.size()).sum();
    ensure!(
        covered == sel.size(),
        Error::InvalidSelection(format!(
            "plan covers {} elements, selection has {}",
            covered,
            sel.size()
        ))
    );
    tracing::debug!(
        strategy = %estimate.strategy,
        steps = steps.len(),
        unions = estimate.unions,
        chunk_reads = estimate.chunk_reads,
        cost = estimate.cost,
        "planned selection"
    );
    Ok(Plan { estimate, steps })
}

fn first_index(sel: &RawSelection) -> Vec<Ix> {
    sel.iter().map(|a| a.first().unwrap_or(0)).collect()
}

fn whole_region(sel: &RawSelection) -> Region {
    Region::new(sel.iter().map(|a| a.pieces().to_vec()).collect())
}

fn per_chunk_steps(windows: &[Vec<AxisWindow>]) -> Vec<PlanStep> {
    let lens: Vec<usize> = windows.iter().map(Vec::len).collect();
    NdIndex::new(&lens)
        .map(|ix| {
            let wins: Vec<&AxisWindow> = ix.iter().zip(windows).map(|(&k, w)| &w[k]).collect();
            PlanStep {
                region: Region::new(wins.iter().map(|w| w.pieces.clone()).collect()),
                map: BufferMap::new(wins.iter().map(|w| w.ordinals.clone()).collect()),
                chunk: Some(wins.iter().map(|w| w.index).collect::<Vec<_>>().into()),
            }
        })
        .collect()
}

fn grouped_steps(sel: &RawSelection, axis: usize, granularity: Ix) -> Vec<PlanStep> {
    sel[axis]
        .windows(granularity)
        .into_iter()
        .map(|group| {
            let mut region = whole_region(sel);
            let mut map = BufferMap::identity(sel);
            region.axes[axis] = group.pieces;
            map.axes[axis] = group.ordinals;
            PlanStep { region, map, chunk: None }
        })
        .collect()
}

#[cfg(test)]
pub mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;
    use rand::prelude::{Rng, SeedableRng, SmallRng};

    use super::*;
    use crate::hl::selection::Selection;

    /// Expands every step into (dataset index, buffer offset) pairs.
    fn expand(plan: &Plan, sel: &RawSelection) -> Vec<(Vec<Ix>, usize)> {
        let mut out = vec![];
        for step in plan.steps() {
            let axes: Vec<Vec<Ix>> = (0..step.region.ndim()).map(|a| step.region.indices(a)).collect();
            let lens: Vec<usize> = axes.iter().map(Vec::len).collect();
            let offsets = step.map.offsets(sel, 1);
            assert_eq!(offsets.len(), step.region.size());
            for (ix, off) in NdIndex::new(&lens).zip(offsets) {
                out.push((ix.iter().zip(&axes).map(|(&k, a)| a[k]).collect(), off));
            }
        }
        out
    }

    /// Checks that a plan covers the selection exactly once with the expected layout.
    fn check_plan(plan: &Plan, sel: &RawSelection) {
        let pairs = expand(plan, sel);
        assert_eq!(pairs.len(), sel.size());
        let offsets: HashSet<usize> = pairs.iter().map(|p| p.1).collect();
        assert_eq!(offsets.len(), sel.size(), "overlapping steps");
        // the element at each buffer offset must be the selected one
        let per_axis: Vec<Vec<Ix>> = sel.iter().map(|a| a.indices().collect()).collect();
        let strides = crate::util::row_major_strides(&sel.out_shape());
        for (index, off) in pairs {
            let mut expected = 0;
            for (a, &i) in index.iter().enumerate() {
                let k = per_axis[a].binary_search(&i).unwrap();
                expected += sel[a].out_pos(k) * strides[a];
            }
            assert_eq!(off, expected);
        }
    }

    fn forced(kind: StrategyKind) -> PlanConfig {
        PlanConfig::build().strategy(kind).finish().unwrap()
    }

    #[test]
    pub fn test_regular_hyperslab_single_step() -> Result<()> {
        let layout = ChunkLayout::new((100, 20000), (10, 1000))?;
        let sel = Selection::new(vec![RawSlice::contiguous(0, 100), RawSlice::new(0, 2, 1, 10000)])
            .into_raw(layout.shape())?;
        let plan = plan(&sel, &layout, &PlanConfig::default())?;
        assert_eq!(plan.strategy(), Strategy::Combined);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps()[0].region.to_hyperslab().unwrap().len(), 2);
        assert_eq!(plan.steps()[0].chunk, None);
        check_plan(&plan, &sel);
        Ok(())
    }

    #[test]
    pub fn test_single_chunk_single_step() -> Result<()> {
        let layout = ChunkLayout::new((100, 100), (10, 10))?;
        let sel = Selection::from_indices(vec![vec![13usize, 11, 17], vec![29, 20, 22, 25]]).into_raw(layout.shape())?;
        for kind in &[StrategyKind::Combined, StrategyKind::PerChunk, StrategyKind::Grouped] {
            let plan = plan(&sel, &layout, &forced(*kind))?;
            assert_eq!(plan.len(), 1);
            assert_eq!(plan.steps()[0].chunk, Some(ChunkCoord::new((1, 2))));
            check_plan(&plan, &sel);
        }

        let layout = ChunkLayout::contiguous((30, 40));
        let sel = Selection::new(..).into_raw(layout.shape())?;
        let plan = plan(&sel, &layout, &PlanConfig::default())?;
        assert_eq!(plan.strategy(), Strategy::Combined);
        assert_eq!(plan.len(), 1);
        Ok(())
    }

    #[test]
    pub fn test_empty_selection() -> Result<()> {
        let layout = ChunkLayout::new((10, 10), (3, 3))?;
        let sel = Selection::from_indices(vec![vec![], vec![1usize, 2]]).into_raw(layout.shape())?;
        let plan = plan(&sel, &layout, &PlanConfig::default())?;
        assert!(plan.is_empty());
        assert_eq!(plan.estimate().calls, 0);
        Ok(())
    }

    #[test]
    pub fn test_per_chunk_steps_row_major() -> Result<()> {
        let layout = ChunkLayout::new((8, 8), (4, 4))?;
        let sel = Selection::from_indices(vec![vec![6usize, 1], vec![2, 5, 7]]).into_raw(layout.shape())?;
        let plan = plan(&sel, &layout, &forced(StrategyKind::PerChunk))?;
        let chunks: Vec<_> = plan.steps().iter().map(|s| s.chunk.clone().unwrap()).collect();
        assert_eq!(
            chunks,
            vec![
                ChunkCoord::new((0, 0)),
                ChunkCoord::new((0, 1)),
                ChunkCoord::new((1, 0)),
                ChunkCoord::new((1, 1)),
            ]
        );
        assert_eq!(plan.steps()[1].region.indices(1), vec![5, 7]);
        assert_eq!(&plan.steps()[1].map[..], &[0..1, 1..3]);
        check_plan(&plan, &sel);
        Ok(())
    }

    #[test]
    pub fn test_grouped_steps() -> Result<()> {
        let layout = ChunkLayout::new((3, 64), (3, 16))?;
        let sel = Selection::from_indices(vec![vec![0usize, 2], vec![1, 2, 3, 9, 30, 31, 40, 63]]).into_raw(layout.shape())?;
        let config = PlanConfig::build().strategy(StrategyKind::Grouped).granularity(32).finish()?;
        let plan = plan(&sel, &layout, &config)?;
        assert_eq!(plan.strategy(), Strategy::Grouped { axis: 1, granularity: 32 });
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps()[0].region.indices(1), vec![1, 2, 3, 9, 30, 31]);
        assert_eq!(plan.steps()[1].region.indices(1), vec![40, 63]);
        assert_eq!(plan.steps()[1].region.indices(0), vec![0, 2]);
        check_plan(&plan, &sel);
        Ok(())
    }

    #[test]
    pub fn test_random_plans_cover_selection() -> Result<()> {
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..60 {
            let shape: Vec<Ix> = vec![rng.gen_range(1..20), rng.gen_range(1..40)];
            let chunk: Vec<Ix> = vec![rng.gen_range(1..8), rng.gen_range(1..12)];
            let layout = ChunkLayout::new(&shape, &chunk)?;
            let axes: Vec<Vec<Ix>> = shape
                .iter()
                .map(|&n| {
                    let mut xs: Vec<Ix> = (0..n).filter(|_| rng.gen_bool(0.5)).collect();
                    // exercise caller-order permutations too
                    if rng.gen_bool(0.3) {
                        xs.reverse();
                    }
                    xs
                })
                .collect();
            let sel = Selection::from_indices(axes).into_raw(&shape)?;
            for config in vec![
                PlanConfig::default(),
                forced(StrategyKind::Combined),
                forced(StrategyKind::PerChunk),
                forced(StrategyKind::Grouped),
                PlanConfig::build().strategy(StrategyKind::Grouped).granularity(rng.gen_range(1..9)).finish()?,
            ] {
                let plan = plan(&sel, &layout, &config)?;
                check_plan(&plan, &sel);
                if layout.chunks_touched(&sel) == 1 {
                    assert_eq!(plan.len(), 1);
                }
            }
        }
        Ok(())
    }

    #[test]
    pub fn test_plan_errors() -> Result<()> {
        let layout = ChunkLayout::new((10, 10), (3, 3))?;
        let sel = Selection::new(..).into_raw(&[10, 11])?;
        assert_err!(plan(&sel, &layout, &PlanConfig::default()), "selection shape [10, 11] != dataset shape [10, 10]");
        let layout = ChunkLayout::contiguous(());
        let sel = Selection::new(..).into_raw(Vec::<Ix>::new())?;
        assert_err!(plan(&sel, &layout, &PlanConfig::default()), "scalar datasets");
        Ok(())
    }

    #[test]
    pub fn test_region() {
        let region = Region::new(vec![vec![RawSlice::contiguous(2, 3)], vec![RawSlice::contiguous(0, 1), RawSlice::new(4, 2, 1, 3)]]);
        assert_eq!(region.shape(), vec![3, 4]);
        assert_eq!(region.size(), 12);
        assert_eq!(region.unions(), 2);
        assert!(region.to_hyperslab().is_none());
        assert_eq!(region.to_string(), "(2+1(Bx3), 2 slices)");
        assert!(region.validate(&[5, 9]).is_ok());
        assert_err!(region.validate(&[5, 8]), "out of range");
        assert_err!(region.validate(&[5]), "region ndim (2) != dataset ndim (1)");
        let bad = Region::new(vec![vec![RawSlice::contiguous(3, 2), RawSlice::contiguous(4, 1)]]);
        assert_err!(bad.validate(&[10]), "overlapping or unsorted");
        assert_eq!(Region::all((2, 3)).size(), 6);
    }
}
