//! Opening readers for catalogued datasets.

use std::sync::Arc;

use cell_io::{read_grid_file, NetCdfCellSource};
use dataset_catalog::{
    Catalog, DatasetBinding, DatasetId, GridDefinition, PathResolver, ReaderKind, ResolvedPath,
};
use smio_common::{CellGrid, Frame, Location, PointGrid, SmioResult};
use tracing::info;

use crate::config::ReaderConfig;
use crate::gridded::GriddedReader;
use crate::insitu::InsituReader;
use crate::reader::{Located, ReadMethod, ReadOptions, TimeSeriesReader};

/// A reader of either kind.
#[derive(Debug)]
pub enum DatasetReader {
    Gridded(GriddedReader),
    Insitu(InsituReader),
}

impl DatasetReader {
    pub fn kind(&self) -> ReaderKind {
        match self {
            DatasetReader::Gridded(_) => ReaderKind::Gridded,
            DatasetReader::Insitu(_) => ReaderKind::Insitu,
        }
    }

    pub fn as_gridded(&self) -> Option<&GriddedReader> {
        match self {
            DatasetReader::Gridded(r) => Some(r),
            DatasetReader::Insitu(_) => None,
        }
    }

    pub fn as_gridded_mut(&mut self) -> Option<&mut GriddedReader> {
        match self {
            DatasetReader::Gridded(r) => Some(r),
            DatasetReader::Insitu(_) => None,
        }
    }

    pub fn as_insitu(&self) -> Option<&InsituReader> {
        match self {
            DatasetReader::Insitu(r) => Some(r),
            DatasetReader::Gridded(_) => None,
        }
    }

    pub fn as_insitu_mut(&mut self) -> Option<&mut InsituReader> {
        match self {
            DatasetReader::Insitu(r) => Some(r),
            DatasetReader::Gridded(_) => None,
        }
    }

    fn inner(&self) -> &dyn TimeSeriesReader {
        match self {
            DatasetReader::Gridded(r) => r,
            DatasetReader::Insitu(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn TimeSeriesReader {
        match self {
            DatasetReader::Gridded(r) => r,
            DatasetReader::Insitu(r) => r,
        }
    }
}

impl TimeSeriesReader for DatasetReader {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn read(&mut self, location: &Location) -> SmioResult<Frame> {
        self.inner_mut().read(location)
    }

    fn read_with(
        &mut self,
        method: ReadMethod,
        location: &Location,
        options: &ReadOptions,
    ) -> SmioResult<Frame> {
        self.inner_mut().read_with(method, location, options)
    }

    fn supported_methods(&self) -> &'static [ReadMethod] {
        self.inner().supported_methods()
    }

    fn locate(&self, location: &Location) -> SmioResult<Located> {
        self.inner().locate(location)
    }
}

/// A reader together with what it was opened from.
#[derive(Debug)]
pub struct OpenedDataset {
    pub binding: DatasetBinding,
    pub path: ResolvedPath,
    pub reader: DatasetReader,
}

/// Builds readers from catalog bindings and resolved paths.
pub struct ReaderFactory<'a> {
    catalog: &'a Catalog,
    resolver: PathResolver,
}

impl ReaderFactory<'static> {
    /// Builtin catalog, resolver settings from the environment.
    pub fn from_env() -> Self {
        Self::new(Catalog::builtin(), PathResolver::from_env())
    }
}

impl<'a> ReaderFactory<'a> {
    pub fn new(catalog: &'a Catalog, resolver: PathResolver) -> Self {
        Self { catalog, resolver }
    }

    pub fn catalog(&self) -> &Catalog {
        self.catalog
    }

    /// Open the reader for a catalogued dataset.
    pub fn open(&self, id: &DatasetId, config: &ReaderConfig) -> SmioResult<OpenedDataset> {
        let binding = self.catalog.lookup(id)?;
        self.open_binding(binding, config)
    }

    /// Open a reader for a binding that may not be in the catalog.
    pub fn open_binding(
        &self,
        binding: &DatasetBinding,
        config: &ReaderConfig,
    ) -> SmioResult<OpenedDataset> {
        let resolver = match &config.testdata_dir {
            Some(dir) => PathResolver::new(self.resolver.config().clone().with_testdata_dir(dir)),
            None => self.resolver.clone(),
        };
        let path = resolver.resolve(
            &binding.id,
            &binding.paths,
            config.force_path_group.as_deref(),
        )?;
        let config = config.merged_with(binding);
        let name = binding.id.to_string();

        let reader = match binding.reader {
            ReaderKind::Gridded => {
                let grid: Arc<dyn CellGrid> = match &binding.grid {
                    GridDefinition::File { name } => {
                        Arc::new(read_grid_file(&path.path.join(name), binding.cell_size)?)
                    }
                    GridDefinition::Regular { resolution } => {
                        Arc::new(PointGrid::regular(*resolution, binding.cell_size)?)
                    }
                };
                let template = config
                    .filename
                    .clone()
                    .unwrap_or_else(|| binding.filename.clone());
                let source = NetCdfCellSource::new(&path.path, template);
                DatasetReader::Gridded(
                    GriddedReader::new(Arc::new(source), grid, config)?.with_name(&name),
                )
            }
            ReaderKind::Insitu => {
                DatasetReader::Insitu(InsituReader::open(&path.path, config)?.with_name(&name))
            }
        };

        info!(
            dataset = %binding.id,
            group = %path.group,
            path = %path.path.display(),
            kind = ?binding.reader,
            "Opened dataset reader"
        );
        Ok(OpenedDataset {
            binding: binding.clone(),
            path,
            reader,
        })
    }
}

impl std::fmt::Debug for ReaderFactory<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderFactory")
            .field("datasets", &self.catalog.ids().len())
            .field("resolver", &self.resolver)
            .finish()
    }
}

/// Open a dataset with the builtin catalog and environment resolver.
pub fn open_dataset(id: &DatasetId, config: &ReaderConfig) -> SmioResult<OpenedDataset> {
    ReaderFactory::from_env().open(id, config)
}

