use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::hl::dataset::{Dataset, DatasetBuilder};
use crate::hl::datatype::{Datatype, Element};
use crate::hl::mem::MemStore;
use crate::hl::store::{copy_object, Storage};
use crate::internal_prelude::*;

/// A container of datasets backed by a storage engine.
#[derive(Clone)]
pub struct File {
    store: Arc<dyn Storage>,
}

impl Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.member_names() {
            Ok(names) => write!(f, "<slabplan file: {} members>", names.len()),
            Err(_) => f.write_str("<slabplan file: invalid>"),
        }
    }
}

impl File {
    pub fn new<S: Storage + 'static>(store: S) -> Self {
        Self { store: Arc::new(store) }
    }

    pub fn from_store(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    /// A file backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(MemStore::new())
    }

    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    /// Opens an existing dataset.
    pub fn dataset(&self, name: &str) -> Result<Dataset> {
        Dataset::open(self.store.clone(), name)
    }

    /// Instantiates a new dataset builder for elements of type `T`.
    pub fn new_dataset<T: Element>(&self) -> DatasetBuilder {
        DatasetBuilder::new(self, T::datatype())
    }

    pub fn new_dataset_as(&self, dtype: Datatype) -> DatasetBuilder {
        DatasetBuilder::new(self, dtype)
    }

    /// Names of all stored objects, sorted.
    pub fn member_names(&self) -> Result<Vec<String>> {
        engine_call!(self.store, self.store.member_names())
    }

    /// Copies object `src_name` of `src` into this file as `dest_name`.
    pub fn copy_from(&self, src: &Self, src_name: &str, dest_name: &str) -> Result<()> {
        copy_object(&*src.store, src_name, &*self.store, dest_name)
    }
}
