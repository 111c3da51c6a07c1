//! One configured entry point over reader, adapters and post-read transforms.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Datelike;
use dataset_catalog::{Catalog, PathResolver};
use serde::Serialize;
use smio_common::{Frame, Location, SmioError, SmioResult};
use tracing::{debug, info, warn};
use ts_adapters::{AdaptedReader, AdapterChain, CombineFunc};
use ts_reader::{unsupported, DatasetReader, ReadOptions, ReaderFactory, TimeSeriesReader};

use crate::config::FacadeConfig;
use crate::resample::{resample, ResampleRule};

/// Result of one location in [`ReaderFacade::read_multiple`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReadOutcome {
    /// Read and added as column `label`.
    Read { label: String, rows: usize },
    /// Skipped after an error.
    Failed { kind: String, message: String },
}

impl ReadOutcome {
    fn failed(err: &SmioError) -> Self {
        ReadOutcome::Failed {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ReadOutcome::Read { .. })
    }
}

/// Per-location outcomes, in the order the locations were given.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadReport {
    pub outcomes: Vec<(String, ReadOutcome)>,
}

impl ReadReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }

    /// Outcome for a location, by its display form.
    pub fn outcome(&self, location: &Location) -> Option<&ReadOutcome> {
        let key = location.to_string();
        self.outcomes.iter().find(|(l, _)| *l == key).map(|(_, o)| o)
    }
}

/// Frame of several locations plus what happened to each.
#[derive(Debug, Clone)]
pub struct MultiRead {
    /// One column per successfully read location, on the union time index.
    pub frame: Frame,
    pub report: ReadReport,
}

/// A reader wrapped in its adapter chain, followed by sentinel removal,
/// month filtering, resampling and renaming.
#[derive(Debug)]
pub struct ReaderFacade {
    config: FacadeConfig,
    reader: AdaptedReader<DatasetReader>,
    resample: Option<(ResampleRule, CombineFunc)>,
}

impl ReaderFacade {
    /// Open the configured dataset from the builtin catalog, resolving paths
    /// with settings from the environment.
    pub fn new(config: FacadeConfig) -> SmioResult<Self> {
        Self::with_catalog(config, Catalog::builtin(), PathResolver::from_env())
    }

    pub fn with_catalog(
        config: FacadeConfig,
        catalog: &Catalog,
        resolver: PathResolver,
    ) -> SmioResult<Self> {
        config.validate().map_err(SmioError::configuration)?;
        let id = config
            .dataset
            .clone()
            .ok_or_else(|| SmioError::configuration("facade config has no dataset"))?;

        let mut reader_config = config.reader.clone();
        if let Some(group) = &config.force_path_group {
            reader_config.force_path_group = Some(group.clone());
        }
        let opened = ReaderFactory::new(catalog, resolver).open(&id, &reader_config)?;

        if let Some(expected) = config.reader_kind {
            if opened.reader.kind() != expected {
                return Err(SmioError::configuration(format!(
                    "dataset {} is served by a {:?} reader, config expects {:?}",
                    id,
                    opened.reader.kind(),
                    expected
                )));
            }
        }
        Self::from_reader(opened.reader, config)
    }

    /// Wrap an already opened reader.
    pub fn from_reader(reader: DatasetReader, config: FacadeConfig) -> SmioResult<Self> {
        config.validate().map_err(SmioError::configuration)?;
        if !reader.supports_method(config.read_method) {
            return Err(unsupported(reader.name(), config.read_method));
        }

        let chain = AdapterChain::from_descriptors(&config.adapters)?;
        let resample = match &config.resample {
            Some(rs) => Some((rs.rule.parse::<ResampleRule>()?, rs.method.clone())),
            None => None,
        };

        info!(
            reader = reader.name(),
            read_method = %config.read_method,
            adapters = ?chain.names(),
            resample = ?config.resample.as_ref().map(|r| r.rule.as_str()),
            "Built reader facade"
        );
        Ok(Self {
            reader: AdaptedReader::new(reader, chain),
            config,
            resample,
        })
    }

    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    pub fn reader(&self) -> &DatasetReader {
        self.reader.inner()
    }

    pub fn reader_mut(&mut self) -> &mut DatasetReader {
        self.reader.inner_mut()
    }

    pub fn adapter_names(&self) -> Vec<&str> {
        self.reader.chain().names()
    }

    /// Read one location with the configured method and options.
    pub fn read(&mut self, location: &Location) -> SmioResult<Frame> {
        let options = self.config.read_options.clone();
        self.read_with_options(location, &options)
    }

    /// Read one location with per-call options.
    pub fn read_with_options(
        &mut self,
        location: &Location,
        options: &ReadOptions,
    ) -> SmioResult<Frame> {
        let frame = self
            .reader
            .read_with(self.config.read_method, location, options)?;
        let frame = self.post_process(frame)?;
        if frame.is_empty() {
            warn!(location = %location, reader = self.reader.name(), "Empty frame after filtering");
        }
        Ok(frame)
    }

    /// Steps after the adapter chain, in order: sentinel removal, month
    /// filter, resampling, renaming.
    pub fn post_process(&self, frame: Frame) -> SmioResult<Frame> {
        let mut frame = frame;
        if let Some(policy) = &self.config.remove_nans {
            frame = policy.apply(&frame);
        }
        if let Some(months) = &self.config.filter_months {
            frame = filter_months(&frame, months, self.config.drop_filtered_months);
        }
        if let Some((rule, method)) = &self.resample {
            frame = resample(&frame, rule, method)?;
        }
        if !self.config.params_rename.is_empty() {
            frame = frame.rename(&self.config.params_rename)?;
        }
        Ok(frame)
    }

    /// Read `variable` at several locations into one frame, one column per
    /// location labelled by its gpi or station.
    ///
    /// Locations are read grouped by storage cell. A location that fails is
    /// skipped with a warning and recorded in the report.
    pub fn read_multiple(&mut self, locations: &[Location], variable: &str) -> SmioResult<MultiRead> {
        let mut outcomes: Vec<Option<ReadOutcome>> = vec![None; locations.len()];
        let mut groups: BTreeMap<Option<u32>, Vec<(usize, String)>> = BTreeMap::new();

        for (i, location) in locations.iter().enumerate() {
            match self.reader.locate(location) {
                Ok(located) => groups
                    .entry(located.group)
                    .or_default()
                    .push((i, located.label)),
                Err(err) => {
                    warn!(location = %location, error = %err, "Skipping location");
                    outcomes[i] = Some(ReadOutcome::failed(&err));
                }
            }
        }

        let mut frames = Vec::new();
        let mut labels = BTreeSet::new();
        for (group, members) in groups {
            debug!(group = ?group, locations = members.len(), "Reading location group");
            for (i, label) in members {
                let location = &locations[i];
                let result = self
                    .read(location)
                    .and_then(|frame| frame.select(&[variable]))
                    .and_then(|frame| {
                        let rename = BTreeMap::from([(variable.to_string(), label.clone())]);
                        frame.rename(&rename)
                    });
                match result {
                    Ok(frame) => {
                        outcomes[i] = Some(ReadOutcome::Read {
                            label: label.clone(),
                            rows: frame.len(),
                        });
                        // Same location given twice: one column is enough
                        if labels.insert(label) {
                            frames.push(frame);
                        }
                    }
                    Err(err) => {
                        warn!(location = %location, error = %err, "Skipping location");
                        outcomes[i] = Some(ReadOutcome::failed(&err));
                    }
                }
            }
        }

        let frame = Frame::outer_join(frames)?;
        let report = ReadReport {
            outcomes: locations
                .iter()
                .zip(outcomes)
                .filter_map(|(location, outcome)| outcome.map(|o| (location.to_string(), o)))
                .collect(),
        };
        info!(
            locations = locations.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            rows = frame.len(),
            "Read multiple locations"
        );
        Ok(MultiRead { frame, report })
    }
}

/// Keep rows whose month is in `months`. Other rows are blanked, or dropped
/// when `drop` is set.
pub fn filter_months(frame: &Frame, months: &BTreeSet<u32>, drop: bool) -> Frame {
    let keep: Vec<bool> = frame
        .index()
        .iter()
        .map(|t| months.contains(&t.month()))
        .collect();
    if drop {
        return frame.filter_rows(&keep);
    }
    let mut out = frame.clone();
    let names: Vec<String> = out.column_names().iter().map(|n| n.to_string()).collect();
    for name in names {
        if let Some(column) = out.column_mut(&name) {
            for (row, _) in keep.iter().enumerate().filter(|(_, k)| !**k) {
                column.set_absent(row);
            }
        }
    }
    out
}
