//! The reader contract shared by gridded and in-situ readers.

use serde::{Deserialize, Serialize};
use smio_common::{Frame, Location, SmioError, SmioResult};

use crate::insitu::DepthRange;

/// Named read entry points a reader can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadMethod {
    #[default]
    Read,
    /// Alias of `read` kept for older call sites.
    ReadTs,
    /// Nearest station with a sensor for one variable and depth.
    ReadNearest,
}

impl ReadMethod {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "read_ts" => Some(Self::ReadTs),
            "read_nearest" => Some(Self::ReadNearest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::ReadTs => "read_ts",
            Self::ReadNearest => "read_nearest",
        }
    }
}

impl std::fmt::Display for ReadMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extra arguments of a read call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Variable to read (in-situ readers).
    pub variable: Option<String>,
    /// Sensor depth window (in-situ readers).
    pub depth: Option<DepthRange>,
    /// Keep only observations flagged as good.
    pub only_valid_flag: bool,
}

/// Lifecycle of a reader instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderState {
    /// Constructed, nothing read yet.
    Created,
    /// At least one file has been read.
    Opened,
    /// Cached data dropped; the next read opens files again.
    Released,
}

/// Where a location lives in a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    /// Column label used when several locations are combined (gpi or station).
    pub label: String,
    /// Storage unit holding the location (the cell for gridded data).
    pub group: Option<u32>,
    /// Canonical form of the location.
    pub location: Location,
}

/// A time-series reader.
///
/// Readers are owned by a single consumer; reads take `&mut self` because
/// they may fill an internal cell cache.
pub trait TimeSeriesReader: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Time series at one location.
    fn read(&mut self, location: &Location) -> SmioResult<Frame>;

    /// Dispatch a read by method name.
    fn read_with(
        &mut self,
        method: ReadMethod,
        location: &Location,
        _options: &ReadOptions,
    ) -> SmioResult<Frame> {
        match method {
            ReadMethod::Read | ReadMethod::ReadTs => self.read(location),
            other => Err(unsupported(self.name(), other)),
        }
    }

    /// Methods accepted by [`TimeSeriesReader::read_with`].
    fn supported_methods(&self) -> &'static [ReadMethod] {
        &[ReadMethod::Read, ReadMethod::ReadTs]
    }

    fn supports_method(&self, method: ReadMethod) -> bool {
        self.supported_methods().contains(&method)
    }

    /// Resolve a location without reading data.
    fn locate(&self, location: &Location) -> SmioResult<Located>;
}

/// Error for a method the reader does not implement.
pub fn unsupported(reader: &str, method: ReadMethod) -> SmioError {
    SmioError::configuration(format!(
        "reader '{}' does not support read method '{}'",
        reader, method
    ))
}

impl<R: TimeSeriesReader + ?Sized> TimeSeriesReader for Box<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn read(&mut self, location: &Location) -> SmioResult<Frame> {
        (**self).read(location)
    }

    fn read_with(
        &mut self,
        method: ReadMethod,
        location: &Location,
        options: &ReadOptions,
    ) -> SmioResult<Frame> {
        (**self).read_with(method, location, options)
    }

    fn supported_methods(&self) -> &'static [ReadMethod] {
        (**self).supported_methods()
    }

    fn locate(&self, location: &Location) -> SmioResult<Located> {
        (**self).locate(location)
    }
}
