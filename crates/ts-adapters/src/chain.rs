//! Ordered adapter chains and readers wrapped by them.

use std::collections::BTreeMap;

use smio_common::{Frame, Location, SmioResult};
use tracing::debug;
use ts_reader::{Located, ReadMethod, ReadOptions, TimeSeriesReader};

use crate::basic::BasicAdapter;
use crate::descriptor::AdapterDescriptor;
use crate::Adapter;

/// Name given to the adapter installed when none is configured.
pub const DEFAULT_ADAPTER_NAME: &str = "00-basic";

/// Adapters applied in order to every frame.
///
/// Order matters: masking before computing anomalies gives a different
/// climatology than the reverse.
pub struct AdapterChain {
    adapters: Vec<(String, Box<dyn Adapter>)>,
}

impl AdapterChain {
    /// Chain with no adapters.
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Chain of the default [`BasicAdapter`] only.
    pub fn basic() -> Self {
        Self::empty().with(DEFAULT_ADAPTER_NAME, Box::new(BasicAdapter))
    }

    /// Build from named descriptors, applied in key order.
    ///
    /// An empty map installs the basic adapter.
    pub fn from_descriptors(descriptors: &BTreeMap<String, AdapterDescriptor>) -> SmioResult<Self> {
        if descriptors.is_empty() {
            return Ok(Self::basic());
        }
        let mut chain = Self::empty();
        for (name, descriptor) in descriptors {
            chain = chain.with(name.clone(), descriptor.build()?);
        }
        Ok(chain)
    }

    /// Append an adapter.
    pub fn with(mut self, name: impl Into<String>, adapter: Box<dyn Adapter>) -> Self {
        self.adapters.push((name.into(), adapter));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Run every adapter on the output of the previous one.
    pub fn apply(&self, frame: Frame) -> SmioResult<Frame> {
        let mut frame = frame;
        for (name, adapter) in &self.adapters {
            let rows = frame.len();
            frame = adapter.apply(&frame)?;
            debug!(
                adapter = %name,
                kind = adapter.kind(),
                rows_in = rows,
                rows_out = frame.len(),
                "Applied adapter"
            );
        }
        Ok(frame)
    }
}

impl Default for AdapterChain {
    fn default() -> Self {
        Self::basic()
    }
}

impl std::fmt::Debug for AdapterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.adapters.iter().map(|(n, a)| format!("{}:{}", n, a.kind())))
            .finish()
    }
}

/// A reader whose output passes through an adapter chain.
///
/// Only frame-returning reads are transformed; locating is delegated.
#[derive(Debug)]
pub struct AdaptedReader<R: TimeSeriesReader> {
    reader: R,
    chain: AdapterChain,
}

impl<R: TimeSeriesReader> AdaptedReader<R> {
    pub fn new(reader: R, chain: AdapterChain) -> Self {
        Self { reader, chain }
    }

    pub fn chain(&self) -> &AdapterChain {
        &self.chain
    }

    pub fn inner(&self) -> &R {
        &self.reader
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: TimeSeriesReader> TimeSeriesReader for AdaptedReader<R> {
    fn name(&self) -> &str {
        self.reader.name()
    }

    fn read(&mut self, location: &Location) -> SmioResult<Frame> {
        let frame = self.reader.read(location)?;
        self.chain.apply(frame)
    }

    fn read_with(
        &mut self,
        method: ReadMethod,
        location: &Location,
        options: &ReadOptions,
    ) -> SmioResult<Frame> {
        let frame = self.reader.read_with(method, location, options)?;
        self.chain.apply(frame)
    }

    fn supported_methods(&self) -> &'static [ReadMethod] {
        self.reader.supported_methods()
    }

    fn locate(&self, location: &Location) -> SmioResult<Located> {
        self.reader.locate(location)
    }
}
