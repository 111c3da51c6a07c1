//! Drops auxiliary per-row columns that readers may carry along.

use smio_common::{Frame, SmioResult};
use tracing::debug;

use crate::Adapter;

/// Columns removed by [`BasicAdapter`].
pub const AUXILIARY_COLUMNS: &[&str] = &["lon", "lat", "location_id", "gpi", "alt", "row_size"];

/// Default adapter: removes coordinate and bookkeeping columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicAdapter;

impl Adapter for BasicAdapter {
    fn kind(&self) -> &'static str {
        "basic"
    }

    fn apply(&self, frame: &Frame) -> SmioResult<Frame> {
        let mut out = frame.clone();
        let dropped: Vec<&str> = AUXILIARY_COLUMNS
            .iter()
            .copied()
            .filter(|name| out.drop_column(name).is_some())
            .collect();
        if !dropped.is_empty() {
            debug!(columns = ?dropped, "Dropped auxiliary columns");
        }
        Ok(out)
    }
}
