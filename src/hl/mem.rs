//! In-memory reference storage engine.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::hl::chunks::{ChunkCoord, ChunkLayout};
use crate::hl::plan::Region;
use crate::hl::store::{DatasetDesc, DatasetId, ObjectImage, Storage};
use crate::internal_prelude::*;
use crate::util::{row_major_strides, NdIndex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Snapshot of engine activity counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Region reads and writes issued.
    pub calls: usize,
    /// Distinct chunks touched, summed over read calls.
    pub chunk_reads: usize,
    /// Distinct chunks touched, summed over write calls.
    pub chunk_writes: usize,
}

#[derive(Default)]
struct Counters {
    calls: AtomicUsize,
    chunk_reads: AtomicUsize,
    chunk_writes: AtomicUsize,
}

struct MemDataset {
    desc: DatasetDesc,
    layout: ChunkLayout,
    chunks: RwLock<HashMap<ChunkCoord, Vec<u8>>>,
}

impl MemDataset {
    fn new(desc: DatasetDesc) -> Result<Self> {
        let layout = desc.layout()?;
        Ok(Self { desc, layout, chunks: RwLock::new(HashMap::new()) })
    }

    fn chunk_bytes(&self) -> usize {
        self.layout.chunk_size() * self.desc.dtype.size()
    }

    /// For every element of `region` in transfer order: its chunk and byte
    /// offset within the chunk.
    fn locate(&self, region: &Region) -> Vec<(ChunkCoord, usize)> {
        let chunk = self.layout.chunk();
        let inner_strides = row_major_strides(chunk);
        let esize = self.desc.dtype.size();
        let axes: Vec<Vec<Ix>> = (0..region.ndim()).map(|a| region.indices(a)).collect();
        let lens: Vec<usize> = axes.iter().map(Vec::len).collect();
        NdIndex::new(&lens)
            .map(|ix| {
                let mut coord = Vec::with_capacity(ix.len());
                let mut offset = 0;
                for (a, &k) in ix.iter().enumerate() {
                    let i = axes[a][k];
                    coord.push(i / chunk[a]);
                    offset += (i % chunk[a]) * inner_strides[a];
                }
                (coord.into(), offset * esize)
            })
            .collect()
    }
}

/// A storage engine that keeps every chunk in memory.
///
/// Chunks are allocated (zero-filled) on first write; reading an unallocated
/// chunk yields zeros.
pub struct MemStore {
    mode: OpenMode,
    threadsafe: bool,
    objects: RwLock<BTreeMap<String, Arc<MemDataset>>>,
    handles: RwLock<HashMap<DatasetId, Arc<MemDataset>>>,
    next_id: AtomicU64,
    counters: Counters,
}

impl Debug for MemStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MemStore")
            .field("mode", &self.mode)
            .field("threadsafe", &self.threadsafe)
            .field("objects", &self.objects.read().keys().collect::<Vec<_>>())
            .field("open_handles", &self.handles.read().len())
            .finish()
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            mode: OpenMode::ReadWrite,
            threadsafe: true,
            objects: RwLock::new(BTreeMap::new()),
            handles: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            counters: Counters::default(),
        }
    }

    /// Reopens the same objects with a different access mode.
    pub fn reopen(&self, mode: OpenMode) -> Self {
        let objects = self.objects.read().clone();
        Self { mode, threadsafe: self.threadsafe, objects: RwLock::new(objects), ..Self::new() }
    }

    /// Marks the engine as unsafe for concurrent calls.
    pub fn not_threadsafe(mut self) -> Self {
        self.threadsafe = false;
        self
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            calls: self.counters.calls.load(Ordering::SeqCst),
            chunk_reads: self.counters.chunk_reads.load(Ordering::SeqCst),
            chunk_writes: self.counters.chunk_writes.load(Ordering::SeqCst),
        }
    }

    pub fn reset_stats(&self) {
        self.counters.calls.store(0, Ordering::SeqCst);
        self.counters.chunk_reads.store(0, Ordering::SeqCst);
        self.counters.chunk_writes.store(0, Ordering::SeqCst);
    }

    /// Number of dataset handles currently open.
    pub fn open_handles(&self) -> usize {
        self.handles.read().len()
    }

    fn ensure_writable(&self, what: &str) -> Result<()> {
        ensure!(self.mode == OpenMode::ReadWrite, Error::ReadOnly(format!("cannot {} in a read-only store", what)));
        Ok(())
    }

    fn dataset(&self, id: DatasetId) -> Result<Arc<MemDataset>> {
        self.handles
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::io(format!("invalid dataset handle {}", id)))
    }

    fn register(&self, ds: Arc<MemDataset>) -> DatasetId {
        let id = DatasetId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.handles.write().insert(id, ds);
        id
    }
}

impl Storage for MemStore {
    fn open_dataset(&self, name: &str) -> Result<DatasetId> {
        let ds = self.objects.read().get(name).cloned().ok_or_else(|| Error::NotFound(name.into()))?;
        Ok(self.register(ds))
    }

    fn create_dataset(&self, name: &str, desc: &DatasetDesc) -> Result<DatasetId> {
        self.ensure_writable("create datasets")?;
        desc.validate()?;
        let ds = Arc::new(MemDataset::new(desc.clone())?);
        {
            let mut objects = self.objects.write();
            ensure!(!objects.contains_key(name), Error::AlreadyExists(name.into()));
            objects.insert(name.into(), ds.clone());
        }
        Ok(self.register(ds))
    }

    fn describe(&self, id: DatasetId) -> Result<DatasetDesc> {
        Ok(self.dataset(id)?.desc.clone())
    }

    fn read_region(&self, id: DatasetId, region: &Region) -> Result<Vec<u8>> {
        let ds = self.dataset(id)?;
        region.validate(&ds.desc.shape).map_err(|e| match e {
            Error::InvalidSelection(msg) => Error::io(msg),
            e => e,
        })?;
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let esize = ds.desc.dtype.size();
        let located = ds.locate(region);
        let mut out = vec![0u8; located.len() * esize];
        let chunks = ds.chunks.read();
        let mut touched = HashSet::new();
        for (i, (coord, offset)) in located.iter().enumerate() {
            if let Some(chunk) = chunks.get(coord) {
                out[i * esize..(i + 1) * esize].copy_from_slice(&chunk[*offset..*offset + esize]);
            }
            touched.insert(coord);
        }
        self.counters.chunk_reads.fetch_add(touched.len(), Ordering::SeqCst);
        Ok(out)
    }

    fn write_region(&self, id: DatasetId, region: &Region, data: &[u8]) -> Result<()> {
        self.ensure_writable("write")?;
        let ds = self.dataset(id)?;
        region.validate(&ds.desc.shape).map_err(|e| match e {
            Error::InvalidSelection(msg) => Error::io(msg),
            e => e,
        })?;
        let esize = ds.desc.dtype.size();
        ensure!(
            data.len() == region.size() * esize,
            Error::io(format!("expected {} bytes for region {}, got {}", region.size() * esize, region, data.len()))
        );
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let located = ds.locate(region);
        let chunk_bytes = ds.chunk_bytes();
        let mut chunks = ds.chunks.write();
        let mut touched = HashSet::new();
        for (i, (coord, offset)) in located.into_iter().enumerate() {
            let chunk = chunks.entry(coord.clone()).or_insert_with(|| vec![0; chunk_bytes]);
            chunk[offset..offset + esize].copy_from_slice(&data[i * esize..(i + 1) * esize]);
            touched.insert(coord);
        }
        self.counters.chunk_writes.fetch_add(touched.len(), Ordering::SeqCst);
        Ok(())
    }

    fn export_object(&self, name: &str) -> Result<ObjectImage> {
        let ds = self.objects.read().get(name).cloned().ok_or_else(|| Error::NotFound(name.into()))?;
        let chunks = ds.chunks.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Ok(ObjectImage { desc: ds.desc.clone(), chunks })
    }

    fn import_object(&self, name: &str, image: ObjectImage) -> Result<()> {
        self.ensure_writable("import objects")?;
        image.desc.validate()?;
        let ds = MemDataset::new(image.desc)?;
        let chunk_bytes = ds.chunk_bytes();
        let grid = ds.layout.grid_shape();
        for (coord, bytes) in &image.chunks {
            ensure!(
                bytes.len() == chunk_bytes && coord.len() == grid.len() && coord.iter().zip(&grid).all(|(c, g)| c < g),
                Error::io(format!("malformed chunk {} in image of {}", coord, name))
            );
        }
        *ds.chunks.write() = image.chunks.into_iter().collect();
        let mut objects = self.objects.write();
        ensure!(!objects.contains_key(name), Error::NameConflict(name.into()));
        objects.insert(name.into(), Arc::new(ds));
        Ok(())
    }

    fn close(&self, id: DatasetId) -> Result<()> {
        match self.handles.write().remove(&id) {
            Some(_) => Ok(()),
            None => fail!(Error::io(format!("invalid dataset handle {}", id))),
        }
    }

    fn member_names(&self) -> Result<Vec<String>> {
        Ok(self.objects.read().keys().cloned().collect())
    }

    fn is_threadsafe(&self) -> bool {
        self.threadsafe
    }
}
