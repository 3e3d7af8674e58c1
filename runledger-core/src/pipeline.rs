// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The end-of-run pipeline: merge, then update both history stores.

use crate::{
    config::LedgerConfig,
    errors::{ArchiveError, DisplayErrorChain, PipelineError, WorkbookError},
    history::{ArchiveOutcome, HistoryArchiver, TrendWorkbook, WorkbookOutcome},
    merge::{
        CANONICAL_REPORT_FILE_NAME, MergeOptions, SkippedShard, discover_shard_files,
        merge_shards, read_run_report,
    },
};
use camino::{Utf8Path, Utf8PathBuf};
use runledger_metadata::RunReport;
use tracing::{debug, warn};

/// Processes a finished run directory.
///
/// 1. Merges the run's shard files into the canonical report. If there are no
///    shard files, the existing canonical report is used instead.
/// 2. Archives the report into the JSON history directory.
/// 3. Records the report into the trend workbook.
///
/// A failure in step 1 stops the pipeline. Steps 2 and 3 are independent: a
/// failure in one store is reported in [`PipelineOutcome`] and does not
/// prevent the other from being updated.
#[derive(Clone, Debug)]
pub struct ReportPipeline {
    config: LedgerConfig,
    output_dir: Utf8PathBuf,
    merge_options: MergeOptions,
    workbook_path: Option<Utf8PathBuf>,
}

impl ReportPipeline {
    /// Creates a pipeline for the run directory `output_dir`.
    ///
    /// History is kept in `output_dir/history` and the workbook at
    /// `output_dir/trend.xlsx` unless overridden.
    pub fn new(config: LedgerConfig, output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            config,
            output_dir: output_dir.into(),
            merge_options: MergeOptions::default(),
            workbook_path: None,
        }
    }

    /// Sets the options used when merging shards.
    pub fn with_merge_options(mut self, merge_options: MergeOptions) -> Self {
        self.merge_options = merge_options;
        self
    }

    /// Sets an explicit path for the trend workbook.
    pub fn with_workbook_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.workbook_path = Some(path.into());
        self
    }

    /// Returns the run directory.
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Returns the history archiver this pipeline writes to.
    pub fn archiver(&self) -> HistoryArchiver {
        HistoryArchiver::new(&self.output_dir, self.config.history.max_runs)
    }

    /// Returns the trend workbook this pipeline writes to.
    pub fn workbook(&self) -> TrendWorkbook {
        match &self.workbook_path {
            Some(path) => TrendWorkbook::with_path(path.clone(), self.config.workbook.max_runs),
            None => TrendWorkbook::new(&self.output_dir, self.config.workbook.max_runs),
        }
    }

    /// Runs the pipeline.
    pub fn run(&self) -> Result<PipelineOutcome, PipelineError> {
        let (report, source) = self.produce_report()?;

        let history = if self.config.history.enabled {
            match self.archiver().archive(&report) {
                Ok(outcome) => StoreOutcome::Recorded(outcome),
                Err(error) => {
                    warn!("failed to archive run: {}", DisplayErrorChain::new(&error));
                    StoreOutcome::Failed(error)
                }
            }
        } else {
            debug!("history archiving is disabled");
            StoreOutcome::Disabled
        };

        let workbook = if self.config.workbook.enabled {
            match self.workbook().record(&report) {
                Ok(outcome) => StoreOutcome::Recorded(outcome),
                Err(error) => {
                    warn!(
                        "failed to record run in workbook: {}",
                        DisplayErrorChain::new(&error)
                    );
                    StoreOutcome::Failed(error)
                }
            }
        } else {
            debug!("trend workbook is disabled");
            StoreOutcome::Disabled
        };

        Ok(PipelineOutcome {
            report,
            source,
            history,
            workbook,
        })
    }

    fn produce_report(&self) -> Result<(RunReport, ReportSource), PipelineError> {
        let shard_paths = discover_shard_files(&self.output_dir)?;
        if shard_paths.is_empty() {
            let path = self.output_dir.join(CANONICAL_REPORT_FILE_NAME);
            debug!("no shard files in {}, using {path}", self.output_dir);
            let report = read_run_report(&path)?;
            return Ok((report, ReportSource::Existing { path }));
        }

        let outcome = merge_shards(&self.output_dir, &shard_paths, &self.merge_options)?;
        Ok((
            outcome.report,
            ReportSource::Merged {
                path: outcome.report_path,
                merged_shards: outcome.merged_shards,
                skipped_shards: outcome.skipped_shards,
            },
        ))
    }
}

/// The result of running the pipeline.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// The run's canonical report.
    pub report: RunReport,

    /// Where the report came from.
    pub source: ReportSource,

    /// The result of archiving into the history directory.
    pub history: StoreOutcome<ArchiveOutcome, ArchiveError>,

    /// The result of recording into the trend workbook.
    pub workbook: StoreOutcome<WorkbookOutcome, WorkbookError>,
}

impl PipelineOutcome {
    /// Returns true if every enabled store was updated.
    pub fn is_success(&self) -> bool {
        !self.history.is_failed() && !self.workbook.is_failed()
    }
}

/// Where a pipeline's report came from.
#[derive(Debug)]
pub enum ReportSource {
    /// The report was produced by merging shards.
    Merged {
        /// The canonical report path.
        path: Utf8PathBuf,

        /// File names of the shards that were merged.
        merged_shards: Vec<String>,

        /// Shards that were skipped.
        skipped_shards: Vec<SkippedShard>,
    },

    /// The run directory had no shards, so its existing report was used.
    Existing {
        /// The canonical report path.
        path: Utf8PathBuf,
    },
}

/// The result of updating one history store.
#[derive(Debug)]
pub enum StoreOutcome<T, E> {
    /// The store is disabled in configuration.
    Disabled,

    /// The run was recorded.
    Recorded(T),

    /// Updating the store failed.
    Failed(E),
}

impl<T, E> StoreOutcome<T, E> {
    /// Returns the outcome if the run was recorded.
    pub fn recorded(&self) -> Option<&T> {
        match self {
            Self::Recorded(outcome) => Some(outcome),
            Self::Disabled | Self::Failed(_) => None,
        }
    }

    /// Returns the error if updating the store failed.
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Failed(error) => Some(error),
            Self::Disabled | Self::Recorded(_) => None,
        }
    }

    /// Returns true if updating the store failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
