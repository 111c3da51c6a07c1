//! Dataset catalog and path resolution.
//!
//! The catalog maps dataset identifiers such as `ESA_CCI_SM/v061/COMBINED`
//! to a [`DatasetBinding`]: which reader serves the dataset, its default
//! variables, fill and scale overrides, and the ordered per-host path
//! groups that [`PathResolver`] walks to find the data on disk.

pub mod catalog;
mod datasets;
pub mod paths;

pub use catalog::{Catalog, DatasetBinding, DatasetId, GridDefinition, ReaderKind};
pub use datasets::CCI_FILL;
pub use paths::{
    HostOs, PathConfig, PathGroup, PathResolver, ResolvedPath, ResolverConfig,
    TESTDATA_PLACEHOLDER, TEST_GROUP,
};
