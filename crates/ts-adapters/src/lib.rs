//! Adapters transform reader frames after they are read.
//!
//! An [`Adapter`] maps one [`Frame`](smio_common::Frame) to another. Chains of
//! adapters are built from [`AdapterDescriptor`]s, usually taken from a facade
//! configuration, and wrap any [`TimeSeriesReader`](ts_reader::TimeSeriesReader)
//! through [`AdaptedReader`].

pub mod anomaly;
pub mod basic;
pub mod chain;
pub mod combine;
pub mod descriptor;
pub mod mask;

use smio_common::{Frame, SmioResult};

pub use anomaly::{climatology, moving_average, AnomalyClimAdapter};
pub use basic::{BasicAdapter, AUXILIARY_COLUMNS};
pub use chain::{AdaptedReader, AdapterChain, DEFAULT_ADAPTER_NAME};
pub use combine::{ColumnCombineAdapter, CombineFunc, Reducer, RowFn};
pub use descriptor::{
    AdapterDescriptor, AnomalyClimParams, ColumnCombineParams, FuncKwargs, MaskOp, Threshold,
    MAX_CLIM_WINDOW_DAYS, MAX_ORIG_WINDOW_DAYS,
};
pub use mask::SelfMaskAdapter;

/// A frame-to-frame transformation.
///
/// Adapters return a new frame and never modify their input. An empty input
/// frame yields an empty output frame with the adapter's output schema.
pub trait Adapter: Send + Sync {
    /// Descriptor kind, e.g. `"self_mask"`.
    fn kind(&self) -> &'static str;

    fn apply(&self, frame: &Frame) -> SmioResult<Frame>;
}
