use std::convert::TryInto;
use std::fmt::{self, Debug};
use std::sync::Arc;

use ndarray::{Array, ArrayView, ArrayView1};

use crate::hl::chunks::ChunkLayout;
use crate::hl::container::{Reader, Writer};
use crate::hl::datatype::{Datatype, Element};
use crate::hl::file::File;
use crate::hl::plan::Plan;
use crate::hl::selection::Selection;
use crate::hl::store::{DatasetDesc, DatasetId, Storage};
use crate::internal_prelude::*;

/// An open engine handle, closed when the last reference is dropped.
struct Handle {
    store: Arc<dyn Storage>,
    id: DatasetId,
}

impl Drop for Handle {
    fn drop(&mut self) {
        let (store, id) = (&self.store, self.id);
        if let Err(err) = engine_call!(store, store.close(id)) {
            tracing::warn!(dataset = %id, error = %err, "failed to close dataset");
        }
    }
}

/// Represents a dataset object of a storage engine.
#[derive(Clone)]
pub struct Dataset {
    handle: Arc<Handle>,
    name: String,
    desc: DatasetDesc,
    layout: ChunkLayout,
}

impl Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<slabplan dataset \"{}\": shape {:?}, type {}>", self.name, self.desc.shape, self.desc.dtype)
    }
}

impl Dataset {
    pub(crate) fn open(store: Arc<dyn Storage>, name: &str) -> Result<Self> {
        let id = engine_call!(store, store.open_dataset(name))?;
        Self::from_id(store, id, name)
    }

    /// Wraps a freshly opened handle; it is closed again if describing it fails.
    pub(crate) fn from_id(store: Arc<dyn Storage>, id: DatasetId, name: &str) -> Result<Self> {
        let handle = Arc::new(Handle { store, id });
        let desc = engine_call!(handle.store, handle.store.describe(id))?;
        let layout = desc.layout()?;
        Ok(Self { handle, name: name.into(), desc, layout })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> DatasetId {
        self.handle.id
    }

    pub(crate) fn store(&self) -> &dyn Storage {
        &*self.handle.store
    }

    pub fn desc(&self) -> &DatasetDesc {
        &self.desc
    }

    pub fn shape(&self) -> &[Ix] {
        &self.desc.shape
    }

    pub fn ndim(&self) -> usize {
        self.desc.ndim()
    }

    pub fn size(&self) -> usize {
        self.desc.size()
    }

    pub fn dtype(&self) -> Datatype {
        self.desc.dtype
    }

    /// Chunk dimensions, or `None` if the dataset is stored contiguously.
    pub fn chunk(&self) -> Option<&[Ix]> {
        self.desc.chunk.as_deref()
    }

    pub fn is_chunked(&self) -> bool {
        self.desc.chunk.is_some()
    }

    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    pub fn as_reader(&self) -> Reader {
        Reader::new(self)
    }

    pub fn as_writer(&self) -> Writer {
        Writer::new(self)
    }

    /// The plan a default-configured read or write of `selection` would run.
    pub fn plan<S>(&self, selection: S) -> Result<Plan>
    where
        S: TryInto<Selection>,
        Error: From<S::Error>,
    {
        self.as_reader().plan(selection)
    }

    /// Reads `selection` as raw bytes laid out in `out_shape` (row-major, caller
    /// order along every axis).
    pub fn read_selection<S, D>(&self, selection: S, out_shape: D) -> Result<Vec<u8>>
    where
        S: TryInto<Selection>,
        Error: From<S::Error>,
        D: Dimension,
    {
        self.as_reader().read_selection(selection, out_shape)
    }

    /// Writes raw bytes laid out like the output of `read_selection`.
    pub fn write_selection<S>(&self, selection: S, data: &[u8]) -> Result<()>
    where
        S: TryInto<Selection>,
        Error: From<S::Error>,
    {
        self.as_writer().write_selection(selection, data)
    }

    pub fn read_slice<T, S, D>(&self, selection: S) -> Result<Array<T, D>>
    where
        T: Element,
        S: TryInto<Selection>,
        Error: From<S::Error>,
        D: ndarray::Dimension,
    {
        self.as_reader().read_slice(selection)
    }

    pub fn read<T: Element, D: ndarray::Dimension>(&self) -> Result<Array<T, D>> {
        self.as_reader().read()
    }

    pub fn read_raw<T: Element>(&self) -> Result<Vec<T>> {
        self.as_reader().read_raw()
    }

    pub fn write_slice<'b, A, T, S, D>(&self, arr: A, selection: S) -> Result<()>
    where
        A: Into<ArrayView<'b, T, D>>,
        T: Element,
        S: TryInto<Selection>,
        Error: From<S::Error>,
        D: ndarray::Dimension,
    {
        self.as_writer().write_slice(arr, selection)
    }

    pub fn write<'b, A, T, D>(&self, arr: A) -> Result<()>
    where
        A: Into<ArrayView<'b, T, D>>,
        T: Element,
        D: ndarray::Dimension,
    {
        self.as_writer().write(arr)
    }

    pub fn write_raw<'b, A, T>(&self, arr: A) -> Result<()>
    where
        A: Into<ArrayView1<'b, T>>,
        T: Element,
    {
        self.as_writer().write_raw(arr)
    }
}

/// A dataset builder.
#[derive(Clone)]
pub struct DatasetBuilder {
    store: Arc<dyn Storage>,
    dtype: Datatype,
    shape: Option<Vec<Ix>>,
    chunk: Option<Vec<Ix>>,
}

impl DatasetBuilder {
    pub fn new(file: &File, dtype: Datatype) -> Self {
        Self { store: file.store().clone(), dtype, shape: None, chunk: None }
    }

    pub fn dtype(mut self, dtype: Datatype) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn shape<D: Dimension>(mut self, shape: D) -> Self {
        self.shape = Some(shape.dims());
        self
    }

    pub fn chunk<D: Dimension>(mut self, chunk: D) -> Self {
        self.chunk = Some(chunk.dims());
        self
    }

    /// Stores the dataset contiguously (the default).
    pub fn no_chunk(mut self) -> Self {
        self.chunk = None;
        self
    }

    pub fn create(&self, name: &str) -> Result<Dataset> {
        let shape = match self.shape {
            Some(ref shape) => shape.clone(),
            None => fail!(Error::InvalidParams("dataset shape not specified".into())),
        };
        let desc = DatasetDesc { shape, chunk: self.chunk.clone(), dtype: self.dtype };
        desc.validate()?;
        let id = engine_call!(self.store, self.store.create_dataset(name, &desc))?;
        tracing::debug!(name, shape = ?desc.shape, chunk = ?desc.chunk, dtype = %desc.dtype, "created dataset");
        Dataset::from_id(self.store.clone(), id, name)
    }
}

#[cfg(test)]
pub mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hl::datatype::{FloatSize, IntSize};
    use crate::hl::mem::MemStore;

    #[test]
    pub fn test_builder() -> Result<()> {
        let file = File::in_memory();
        let ds = file.new_dataset::<i32>().shape((10, 20)).chunk((5, 5)).create("x")?;
        assert_eq!(ds.name(), "x");
        assert_eq!(ds.shape(), &[10, 20]);
        assert_eq!(ds.ndim(), 2);
        assert_eq!(ds.size(), 200);
        assert_eq!(ds.dtype(), Datatype::Integer(IntSize::U4));
        assert_eq!(ds.chunk(), Some(&[5, 5][..]));
        assert!(ds.is_chunked());
        assert_eq!(ds.layout().grid_shape(), vec![2, 4]);
        assert_eq!(format!("{:?}", ds), "<slabplan dataset \"x\": shape [10, 20], type int32>");

        let ds = file.new_dataset_as(Datatype::Opaque(3)).dtype(Datatype::Float(FloatSize::U8)).shape(7).create("y")?;
        assert!(!ds.is_chunked());
        assert_eq!(ds.layout().chunk(), &[7]);
        assert_eq!(ds.dtype().size(), 8);

        assert_err!(file.new_dataset::<u8>().create("z"), "dataset shape not specified");
        assert_err!(file.new_dataset::<u8>().shape(()).create("z"), "scalar datasets are not supported");
        assert_err!(file.new_dataset::<u8>().shape(4).chunk(0).create("z"), "chunk dimensions must be positive");
        assert_err!(file.new_dataset::<u8>().shape(4).create("x"), "object already exists: x");
        assert!(file.new_dataset::<u8>().shape(4).chunk(2).no_chunk().create("w")?.chunk().is_none());
        Ok(())
    }

    #[test]
    pub fn test_handles_are_closed() -> Result<()> {
        let store = Arc::new(MemStore::new());
        let file = File::from_store(store.clone());
        {
            let ds = file.new_dataset::<u8>().shape(4).create("a")?;
            let ds2 = ds.clone();
            let ds3 = file.dataset("a")?;
            assert_eq!(ds2.id(), ds.id());
            assert_ne!(ds3.id(), ds.id());
            assert_eq!(store.open_handles(), 2);
        }
        assert_eq!(store.open_handles(), 0);
        assert_err!(file.dataset("b"), "object not found: b");
        assert_eq!(store.open_handles(), 0);
        Ok(())
    }
}
