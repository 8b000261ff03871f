use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use slabplan::{
    CancelToken, DatasetDesc, DatasetId, Error, File, Ix, MemStore, ObjectImage, Region, Result,
    Storage,
};

pub fn new_mem_file() -> (Arc<MemStore>, File) {
    let store = Arc::new(MemStore::new());
    (store.clone(), File::from_store(store))
}

/// Implements `Storage` for a wrapper around a `MemStore` held in `self.inner`,
/// running `self.before_call(region)?` ahead of every region call.
macro_rules! impl_wrapped_storage {
    ($ty:ty) => {
        impl Storage for $ty {
            fn open_dataset(&self, name: &str) -> Result<DatasetId> {
                self.inner.open_dataset(name)
            }

            fn create_dataset(&self, name: &str, desc: &DatasetDesc) -> Result<DatasetId> {
                self.inner.create_dataset(name, desc)
            }

            fn describe(&self, id: DatasetId) -> Result<DatasetDesc> {
                self.inner.describe(id)
            }

            fn read_region(&self, id: DatasetId, region: &Region) -> Result<Vec<u8>> {
                self.before_call(region)?;
                let out = self.inner.read_region(id, region);
                self.after_call();
                out
            }

            fn write_region(&self, id: DatasetId, region: &Region, data: &[u8]) -> Result<()> {
                self.before_call(region)?;
                let out = self.inner.write_region(id, region, data);
                self.after_call();
                out
            }

            fn export_object(&self, name: &str) -> Result<ObjectImage> {
                self.inner.export_object(name)
            }

            fn import_object(&self, name: &str, image: ObjectImage) -> Result<()> {
                self.inner.import_object(name, image)
            }

            fn close(&self, id: DatasetId) -> Result<()> {
                self.inner.close(id)
            }

            fn member_names(&self) -> Result<Vec<String>> {
                self.inner.member_names()
            }

            fn is_threadsafe(&self) -> bool {
                self.inner.is_threadsafe()
            }
        }
    };
}

/// A `MemStore` whose region calls fail for regions containing a given index
/// along the first axis.
#[derive(Debug)]
pub struct FaultyStore {
    inner: MemStore,
    poison: Ix,
    faults: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: MemStore, poison: Ix) -> Self {
        Self { inner, poison, faults: AtomicUsize::new(0) }
    }

    pub fn inner(&self) -> &MemStore {
        &self.inner
    }

    /// Number of region calls that failed so far.
    pub fn faults(&self) -> usize {
        self.faults.load(Ordering::SeqCst)
    }

    fn before_call(&self, region: &Region) -> Result<()> {
        if region.indices(0).contains(&self.poison) {
            self.faults.fetch_add(1, Ordering::SeqCst);
            return Err(Error::io(format!("injected fault at row {}", self.poison)));
        }
        Ok(())
    }

    fn after_call(&self) {}
}

impl_wrapped_storage!(FaultyStore);

/// A `MemStore` recording how many region calls run at the same time.
#[derive(Debug)]
pub struct ConcurrencyStore {
    inner: MemStore,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ConcurrencyStore {
    pub fn new(inner: MemStore) -> Self {
        Self { inner, in_flight: AtomicUsize::new(0), max_in_flight: AtomicUsize::new(0) }
    }

    pub fn inner(&self) -> &MemStore {
        &self.inner
    }

    /// Highest number of region calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn before_call(&self, _: &Region) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // keep the call open long enough for overlapping calls to show up
        thread::sleep(Duration::from_millis(2));
        Ok(())
    }

    fn after_call(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl_wrapped_storage!(ConcurrencyStore);

/// A `MemStore` that cancels a token while serving its `nth` region call.
#[derive(Debug)]
pub struct CancellingStore {
    inner: MemStore,
    token: CancelToken,
    nth: usize,
    calls: AtomicUsize,
}

impl CancellingStore {
    pub fn new(inner: MemStore, token: &CancelToken, nth: usize) -> Self {
        Self { inner, token: token.clone(), nth, calls: AtomicUsize::new(0) }
    }

    pub fn inner(&self) -> &MemStore {
        &self.inner
    }

    /// Number of region calls issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn before_call(&self, _: &Region) -> Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.nth {
            self.token.cancel();
        }
        Ok(())
    }

    fn after_call(&self) {}
}

impl_wrapped_storage!(CancellingStore);
