//! Scatter/gather execution of plans against a storage engine.

use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use cfg_if::cfg_if;
use parking_lot::Mutex;

use crate::hl::config::PlanConfig;
use crate::hl::plan::{Plan, PlanStep};
use crate::hl::selection::RawSelection;
use crate::hl::store::{DatasetId, Storage};
use crate::internal_prelude::*;

/// A caller buffer shared between workers that write disjoint byte ranges.
#[derive(Clone, Copy)]
struct SharedBuf {
    ptr: *mut u8,
    len: usize,
}

unsafe impl Send for SharedBuf {}
unsafe impl Sync for SharedBuf {}

impl SharedBuf {
    fn new(buf: &mut [u8]) -> Self {
        Self { ptr: buf.as_mut_ptr(), len: buf.len() }
    }

    /// Callers running concurrently must write disjoint ranges.
    unsafe fn write(&self, offset: usize, src: &[u8]) -> Result<()> {
        ensure!(
            offset.checked_add(src.len()).map_or(false, |end| end <= self.len),
            format!("scatter of {} bytes at {} overruns a {}-byte buffer", src.len(), offset, self.len)
        );
        ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.add(offset), src.len());
        Ok(())
    }
}

/// Coalesces element offsets into `(element index, byte offset, element count)`
/// runs of adjacent elements.
fn runs(offsets: &[usize], elem_size: usize) -> Vec<(usize, usize, usize)> {
    let mut out: Vec<(usize, usize, usize)> = Vec::new();
    for (i, &off) in offsets.iter().enumerate() {
        match out.last_mut() {
            Some(run) if run.1 + run.2 * elem_size == off => run.2 += 1,
            _ => out.push((i, off, 1)),
        }
    }
    out
}

/// Runs the steps of a plan for one dataset and one selection.
pub struct Executor<'a> {
    store: &'a dyn Storage,
    id: DatasetId,
    sel: &'a RawSelection,
    elem_size: usize,
    config: &'a PlanConfig,
}

impl<'a> Executor<'a> {
    pub fn new(
        store: &'a dyn Storage, id: DatasetId, sel: &'a RawSelection, elem_size: usize,
        config: &'a PlanConfig,
    ) -> Self {
        Self { store, id, sel, elem_size, config }
    }

    fn check_buffer(&self, len: usize) -> Result<()> {
        let expected = self.sel.size() * self.elem_size;
        ensure!(
            len == expected,
            Error::InvalidSelection(format!(
                "buffer holds {} bytes, selection of shape {:?} needs {}",
                len,
                self.sel.out_shape(),
                expected
            ))
        );
        Ok(())
    }

    /// Reads every step and scatters it into `out` (caller layout, row-major).
    pub fn read(&self, plan: &Plan, out: &mut [u8]) -> Result<()> {
        self.check_buffer(out.len())?;
        let buf = SharedBuf::new(out);
        let esize = self.elem_size;
        self.run(plan, |step| {
            let bytes = engine_call!(self.store, self.store.read_region(self.id, &step.region))?;
            let offsets = step.map.offsets(self.sel, esize);
            ensure!(
                bytes.len() == offsets.len() * esize,
                Error::io(format!("engine returned {} bytes, expected {}", bytes.len(), offsets.len() * esize))
            );
            for (i, off, n) in runs(&offsets, esize) {
                // steps cover disjoint parts of the selection
                unsafe { buf.write(off, &bytes[i * esize..(i + n) * esize])? };
            }
            Ok(())
        })
    }

    /// Gathers every step from `data` (caller layout, row-major) and writes it.
    pub fn write(&self, plan: &Plan, data: &[u8]) -> Result<()> {
        self.check_buffer(data.len())?;
        let esize = self.elem_size;
        self.run(plan, |step| {
            let offsets = step.map.offsets(self.sel, esize);
            let mut bytes = Vec::with_capacity(offsets.len() * esize);
            for (_, off, n) in runs(&offsets, esize) {
                bytes.extend_from_slice(&data[off..off + n * esize]);
            }
            engine_call!(self.store, self.store.write_region(self.id, &step.region, &bytes))
        })
    }

    fn run<F>(&self, plan: &Plan, op: F) -> Result<()>
    where
        F: Fn(&PlanStep) -> Result<()> + Send + Sync,
    {
        let abort = AtomicBool::new(false);
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let fail = |err: Error| {
            abort.store(true, Ordering::SeqCst);
            let mut slot = first_error.lock();
            if slot.is_none() {
                tracing::warn!(error = %err, "aborting plan");
                *slot = Some(err);
            }
        };
        let run_step = |(index, step): (usize, &PlanStep)| {
            if abort.load(Ordering::SeqCst) {
                return;
            }
            if self.config.is_cancelled() {
                fail(Error::Cancelled);
                return;
            }
            tracing::trace!(step = index, region = %step.region, "executing plan step");
            if let Err(err) = op(step) {
                fail(err.at_step(index, step.chunk.clone()));
            }
        };

        tracing::debug!(
            dataset = %self.id,
            strategy = %plan.strategy(),
            steps = plan.len(),
            parallel = self.config.parallel(),
            "executing plan"
        );
        cfg_if! {
            if #[cfg(feature = "parallel")] {
                if self.config.parallel() && plan.len() > 1 {
                    use rayon::prelude::*;

                    let par = || plan.steps().par_iter().enumerate().for_each(&run_step);
                    match self.config.threads() {
                        Some(n) => rayon::ThreadPoolBuilder::new()
                            .num_threads(n)
                            .build()
                            .map_err(|e| format!("cannot build thread pool: {}", e))?
                            .install(par),
                        None => par(),
                    }
                } else {
                    plan.steps().iter().enumerate().for_each(&run_step);
                }
            } else {
                plan.steps().iter().enumerate().for_each(&run_step);
            }
        }

        match first_error.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
