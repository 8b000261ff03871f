//! Subset reads and writes for chunked multi-dimensional datasets.
//!
//! This crate turns an arbitrary, possibly irregular, multi-dimensional index selection
//! into a short sequence of storage calls. Some of the features include:
//!
//! - Selections as per-axis index lists (in any order) or regular hyperslabs.
//! - A pluggable cost model weighing per-call overhead, hyperslab union cost and chunk
//!   reads, used to choose between one combined call, one call per chunk, or calls
//!   grouped along the busiest axis.
//! - Concurrent scatter/gather execution via `rayon`, serialized engine access for
//!   engines that are not thread-safe, and cooperative cancellation.
//! - Parallel split/gather writes of many datasets merged into one store.
//! - Multi-dimensional array reading/writing interface via `ndarray`.
//!
//! Storage engines implement the `Storage` trait; `MemStore` is an in-memory engine.

#![cfg_attr(feature = "cargo-clippy", warn(clippy::all))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::module_name_repetitions))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::missing_errors_doc))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::missing_safety_doc))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::must_use_candidate))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::wildcard_imports))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::cast_precision_loss))]

mod export {
    pub use crate::{
        dim::{Dimension, Ix},
        error::{Error, Result, StepContext},
        hl::{
            config::{CancelToken, PlanConfig, PlanConfigBuilder, StrategyKind},
            container::{Reader, Writer},
            cost::{CostModel, Estimate, Estimator, PowerLaw, Strategy, UnionCost},
            dataset::{Dataset, DatasetBuilder},
            datatype::{Datatype, Element, FloatSize, IntSize},
            file::File,
            gather::{split_gather, WriteJob},
            mem::{MemStore, OpenMode, StoreStats},
            plan::{plan, BufferMap, Plan, PlanStep, Region},
            selection::{to_canonical_runs, Hyperslab, RawSelection, RawSlice, Run, Selection},
            store::{copy_object, DatasetDesc, DatasetId, ObjectImage, Storage},
        },
    };

    pub mod chunks {
        pub use crate::hl::chunks::{windows_touched, ChunkCoord, ChunkLayout};
    }

    pub mod pattern {
        pub use crate::hl::pattern::{AxisPattern, Pattern};
    }

    pub mod selection {
        pub use crate::hl::selection::{canonical_runs, AxisSelection, AxisWindow};
    }

    pub mod datatype {
        pub use crate::hl::datatype::{as_bytes, from_bytes};
    }
}

pub use crate::export::*;

#[macro_use]
mod macros;

mod dim;
mod error;
#[doc(hidden)]
pub mod sync;
mod util;

mod hl;

mod internal_prelude {
    pub use crate::{
        dim::{Dimension, Ix},
        error::{Error, Result},
    };
}
