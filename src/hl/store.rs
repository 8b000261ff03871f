//! The storage-engine interface the planner executes against.

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};

use crate::hl::chunks::{ChunkCoord, ChunkLayout};
use crate::hl::datatype::Datatype;
use crate::hl::plan::Region;
use crate::internal_prelude::*;

/// Engine-assigned handle of an open dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId(pub u64);

impl Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable description of a dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetDesc {
    pub shape: Vec<Ix>,
    /// Chunk dimensions, or `None` for contiguous storage.
    pub chunk: Option<Vec<Ix>>,
    pub dtype: Datatype,
}

impl DatasetDesc {
    pub fn new<D: Dimension>(shape: D, dtype: Datatype) -> Self {
        Self { shape: shape.dims(), chunk: None, dtype }
    }

    pub fn with_chunk<D: Dimension>(mut self, chunk: D) -> Self {
        self.chunk = Some(chunk.dims());
        self
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn layout(&self) -> Result<ChunkLayout> {
        match self.chunk {
            Some(ref chunk) => ChunkLayout::new(&self.shape, chunk),
            None => Ok(ChunkLayout::contiguous(&self.shape)),
        }
    }

    /// Rejects descriptors no engine should accept.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.ndim() > 0, Error::InvalidParams("scalar datasets are not supported".into()));
        ensure!(self.dtype.size() > 0, Error::InvalidParams("zero-sized element type".into()));
        if let Some(ref chunk) = self.chunk {
            ensure!(
                chunk.len() == self.ndim(),
                Error::InvalidParams(format!(
                    "chunk ndim ({}) != dataset ndim ({})",
                    chunk.len(),
                    self.ndim()
                ))
            );
            ensure!(
                chunk.iter().all(|&c| c > 0),
                Error::InvalidParams(format!("chunk dimensions must be positive: {:?}", chunk))
            );
        }
        Ok(())
    }
}

/// A self-contained copy of a stored object: its descriptor and the raw bytes
/// of every allocated chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectImage {
    pub desc: DatasetDesc,
    pub chunks: BTreeMap<ChunkCoord, Vec<u8>>,
}

/// A chunked-array storage engine.
///
/// Region transfers move the elements of the region's cartesian product in
/// row-major order. Engines that cannot take concurrent calls must report
/// `is_threadsafe() == false`, and every call is then serialized.
pub trait Storage: Debug + Send + Sync {
    fn open_dataset(&self, name: &str) -> Result<DatasetId>;

    fn create_dataset(&self, name: &str, desc: &DatasetDesc) -> Result<DatasetId>;

    fn describe(&self, id: DatasetId) -> Result<DatasetDesc>;

    fn read_region(&self, id: DatasetId, region: &Region) -> Result<Vec<u8>>;

    fn write_region(&self, id: DatasetId, region: &Region, data: &[u8]) -> Result<()>;

    fn export_object(&self, name: &str) -> Result<ObjectImage>;

    fn import_object(&self, name: &str, image: ObjectImage) -> Result<()>;

    fn close(&self, id: DatasetId) -> Result<()>;

    /// Names of the stored objects, sorted.
    fn member_names(&self) -> Result<Vec<String>>;

    fn is_threadsafe(&self) -> bool {
        true
    }
}

/// Copies a whole object between stores, failing with `NameConflict` if the
/// destination name is taken.
pub fn copy_object(src: &dyn Storage, src_name: &str, dest: &dyn Storage, dest_name: &str) -> Result<()> {
    let exists = engine_call!(dest, dest.member_names())?.iter().any(|n| n == dest_name);
    ensure!(!exists, Error::NameConflict(dest_name.into()));
    let image = engine_call!(src, src.export_object(src_name))?;
    tracing::debug!(src = src_name, dest = dest_name, chunks = image.chunks.len(), "copying object");
    engine_call!(dest, dest.import_object(dest_name, image))
}
