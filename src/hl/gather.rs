//! Split/gather writes.
//!
//! Every job is written into its own temporary store by an independent worker;
//! the results are then merged into the destination one at a time, in job order.

use std::collections::HashSet;

use cfg_if::cfg_if;
use ndarray::ArrayView;

use crate::hl::config::PlanConfig;
use crate::hl::datatype::{as_bytes, Datatype, Element};
use crate::hl::file::File;
use crate::hl::selection::Selection;
use crate::hl::store::{DatasetDesc, Storage};
use crate::internal_prelude::*;

/// One dataset to be written by `split_gather`.
#[derive(Clone, Debug)]
pub struct WriteJob {
    name: String,
    desc: DatasetDesc,
    data: Vec<u8>,
}

impl WriteJob {
    /// A job writing `data` (row-major) into a new dataset of the given shape.
    pub fn new<T: Element, D: Dimension>(name: &str, shape: D, data: &[T]) -> Self {
        Self::raw(name, DatasetDesc::new(shape, T::datatype()), as_bytes(data).to_vec())
    }

    pub fn from_array<'b, A, T, D>(name: &str, arr: A) -> Self
    where
        A: Into<ArrayView<'b, T, D>>,
        T: Element,
        D: ndarray::Dimension,
    {
        let view = arr.into();
        let shape = view.shape().to_vec();
        match view.as_slice() {
            Some(data) => Self::new(name, shape, data),
            None => Self::new(name, shape, &view.iter().copied().collect::<Vec<T>>()),
        }
    }

    pub fn raw(name: &str, desc: DatasetDesc, data: Vec<u8>) -> Self {
        Self { name: name.into(), desc, data }
    }

    pub fn chunk<D: Dimension>(mut self, chunk: D) -> Self {
        self.desc.chunk = Some(chunk.dims());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &DatasetDesc {
        &self.desc
    }

    pub fn dtype(&self) -> Datatype {
        self.desc.dtype
    }

    fn validate(&self) -> Result<()> {
        self.desc.validate()?;
        let expected = self.desc.size() * self.desc.dtype.size();
        ensure!(
            self.data.len() == expected,
            Error::InvalidParams(format!(
                "job {} holds {} bytes, shape {:?} of {} needs {}",
                self.name,
                self.data.len(),
                self.desc.shape,
                self.desc.dtype,
                expected
            ))
        );
        Ok(())
    }

    fn write_into(&self, file: &File, config: &PlanConfig) -> Result<()> {
        let mut builder = file.new_dataset_as(self.desc.dtype).shape(&self.desc.shape);
        if let Some(ref chunk) = self.desc.chunk {
            builder = builder.chunk(chunk);
        }
        let ds = builder.create(&self.name)?;
        ds.as_writer().config(config.clone()).write_selection(Selection::All, &self.data)
    }
}

fn split_all<F>(jobs: &[WriteJob], config: &PlanConfig, split: F) -> Result<Vec<File>>
where
    F: Fn(&WriteJob) -> Result<File> + Send + Sync,
{
    cfg_if! {
        if #[cfg(feature = "parallel")] {
            if config.parallel() && jobs.len() > 1 {
                use rayon::prelude::*;

                let par = || jobs.par_iter().map(&split).collect::<Result<Vec<_>>>();
                return match config.threads() {
                    Some(n) => rayon::ThreadPoolBuilder::new()
                        .num_threads(n)
                        .build()
                        .map_err(|e| format!("cannot build thread pool: {}", e))?
                        .install(par),
                    None => par(),
                };
            }
        }
    }
    jobs.iter().map(split).collect()
}

/// Writes every job into a fresh store from `make_store`, then copies the
/// results into `dest` sequentially in job order.
///
/// All names are checked against each other and against `dest` before anything
/// is written. A failed merge leaves the jobs merged so far in `dest`.
pub fn split_gather<F, S>(jobs: &[WriteJob], dest: &File, make_store: F, config: &PlanConfig) -> Result<()>
where
    F: Fn() -> S + Send + Sync,
    S: Storage + 'static,
{
    let existing: HashSet<String> = dest.member_names()?.into_iter().collect();
    let mut seen = HashSet::new();
    for job in jobs {
        job.validate()?;
        ensure!(
            !existing.contains(&job.name) && seen.insert(job.name.as_str()),
            Error::NameConflict(job.name.clone())
        );
    }

    let split = |job: &WriteJob| -> Result<File> {
        ensure!(!config.is_cancelled(), Error::Cancelled);
        let file = File::new(make_store());
        job.write_into(&file, config)?;
        tracing::trace!(job = %job.name, "split write done");
        Ok(file)
    };

    tracing::debug!(jobs = jobs.len(), parallel = config.parallel(), "split/gather write");
    let temps = split_all(jobs, config, split)?;

    for (job, temp) in jobs.iter().zip(&temps) {
        ensure!(!config.is_cancelled(), Error::Cancelled);
        dest.copy_from(temp, &job.name, &job.name).map_err(|err| {
            tracing::warn!(job = %job.name, error = %err, "merge failed");
            err
        })?;
    }
    Ok(())
}
