// ========================================================================================
//
//                            THE VALIDATION RUN ORCHESTRATOR
//
// ========================================================================================
//
// A full run over one dataset:
//
//   1. optionally densify a small probe region as a spot check,
//   2. for every configured contig, slice both stores to that contig and re-reconcile
//      the sample axes, then run every partition's block checks on the pool,
//   3. reconcile the whole-dataset sample axes once more,
//   4. hand the dataset to the structural validator.
//
// Every contig is attempted even after a failure, so one run surfaces every broken
// contig. The run succeeds only if every step succeeds.

use crate::blocks::ReferenceBlockStore;
use crate::config::{ConfigError, ValidationConfig};
use crate::densify::{DensifyError, densify_sharded};
use crate::invariants::{PartitionSummary, RefBlockInvariantViolation, check_partitions};
use crate::progress::create_progress_bar;
use crate::reconcile::{SampleAxisMismatch, SampleAxisSource, reconcile_stores};
use crate::types::{Contig, GenomicInterval, Locus, ReferenceGenome, SampleId};
use crate::variants::VariantStore;
use ahash::AHashSet;
use itertools::Itertools;
use log::{error, info, warn};
use std::time::{Duration, Instant};
use thiserror::Error;

/// The two joined tables of one dataset.
#[derive(Debug, Clone)]
pub struct VariantDataset<R, V> {
    pub reference: R,
    pub variants: V,
}

impl<R, V> VariantDataset<R, V> {
    pub fn new(reference: R, variants: V) -> Self {
        Self {
            reference,
            variants,
        }
    }
}

// ========================================================================================
//                                Structural validation
// ========================================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Structural validation failed: {message}")]
pub struct StructuralValidationFailure {
    pub message: String,
}

impl StructuralValidationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A whole-dataset structural check, treated as a black box by the run.
pub trait StructuralValidator<R, V>: Sync {
    fn validate(&self, dataset: &VariantDataset<R, V>) -> Result<(), StructuralValidationFailure>;
}

impl<R, V, F> StructuralValidator<R, V> for F
where
    F: Fn(&VariantDataset<R, V>) -> Result<(), StructuralValidationFailure> + Sync,
{
    fn validate(&self, dataset: &VariantDataset<R, V>) -> Result<(), StructuralValidationFailure> {
        self(dataset)
    }
}

/// Checks the physical layout of both stores: every row returned for a contig lies on
/// that contig, rows come back in ascending locus order, and every row names a sample
/// on its store's axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutValidator;

impl LayoutValidator {
    fn check_rows(
        table: &str,
        contig: &Contig,
        axis: &AHashSet<&str>,
        rows: impl Iterator<Item = (Locus, SampleId)>,
    ) -> Result<(), StructuralValidationFailure> {
        let mut previous: Option<Locus> = None;
        for (locus, sample) in rows {
            if &locus.contig != contig {
                return Err(StructuralValidationFailure::new(format!(
                    "{table}: row at {locus} was returned for contig {contig}"
                )));
            }
            if previous.as_ref().is_some_and(|prev| *prev > locus) {
                return Err(StructuralValidationFailure::new(format!(
                    "{table}: rows on {contig} are not sorted by locus (at {locus})"
                )));
            }
            if !axis.contains(&*sample) {
                return Err(StructuralValidationFailure::new(format!(
                    "{table}: row at {locus} names sample '{sample}', which is not on the sample axis"
                )));
            }
            previous = Some(locus);
        }
        Ok(())
    }
}

impl<R, V> StructuralValidator<R, V> for LayoutValidator
where
    R: ReferenceBlockStore,
    V: VariantStore,
{
    fn validate(&self, dataset: &VariantDataset<R, V>) -> Result<(), StructuralValidationFailure> {
        let reference_axis: AHashSet<&str> = dataset
            .reference
            .sample_axis()
            .iter()
            .map(|s| &**s)
            .collect();
        let variant_axis: AHashSet<&str> = dataset
            .variants
            .sample_axis()
            .iter()
            .map(|s| &**s)
            .collect();

        for contig in dataset.reference.contigs() {
            let rows = dataset
                .reference
                .rows_for_contig(&contig)
                .map(|block| (block.start, block.sample));
            Self::check_rows("reference data", &contig, &reference_axis, rows)?;
        }
        for contig in dataset.variants.contigs() {
            let rows = dataset
                .variants
                .rows_for_contig(&contig)
                .map(|record| (record.locus, record.sample));
            Self::check_rows("variant data", &contig, &variant_axis, rows)?;
        }
        Ok(())
    }
}

// ========================================================================================
//                                  Per-contig slices
// ========================================================================================

/// A read-only view of a store restricted to a single contig.
#[derive(Debug, Clone)]
pub struct ContigSlice<'a, S: ?Sized> {
    store: &'a S,
    contig: Contig,
}

impl<'a, S: ?Sized> ContigSlice<'a, S> {
    pub fn new(store: &'a S, contig: Contig) -> Self {
        Self { store, contig }
    }

    pub fn contig(&self) -> &Contig {
        &self.contig
    }
}

impl<S: SampleAxisSource + ?Sized> SampleAxisSource for ContigSlice<'_, S> {
    fn sample_axis(&self) -> &[SampleId] {
        self.store.sample_axis()
    }
}

impl<'s, S: ReferenceBlockStore + ?Sized> ReferenceBlockStore for ContigSlice<'s, S> {
    type Rows<'a>
        = std::iter::Flatten<std::option::IntoIter<S::Rows<'a>>>
    where
        Self: 'a;

    fn rows_for_contig<'a>(&'a self, contig: &Contig) -> Self::Rows<'a> {
        (contig == &self.contig)
            .then(|| self.store.rows_for_contig(contig))
            .into_iter()
            .flatten()
    }

    fn contigs(&self) -> Vec<Contig> {
        vec![self.contig.clone()]
    }
}

impl<'s, S: VariantStore + ?Sized> VariantStore for ContigSlice<'s, S> {
    type Rows<'a>
        = std::iter::Flatten<std::option::IntoIter<S::Rows<'a>>>
    where
        Self: 'a;

    fn rows_for_contig<'a>(&'a self, contig: &Contig) -> Self::Rows<'a> {
        (contig == &self.contig)
            .then(|| self.store.rows_for_contig(contig))
            .into_iter()
            .flatten()
    }

    fn contigs(&self) -> Vec<Contig> {
        vec![self.contig.clone()]
    }
}

// ========================================================================================
//                                      Reporting
// ========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContigFailure {
    SampleAxis(SampleAxisMismatch),
    Invariant(RefBlockInvariantViolation),
}

/// Verdict for one contig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigOutcome {
    pub contig: Contig,
    pub blocks_checked: u64,
    pub failure: Option<ContigFailure>,
    pub message: String,
}

impl ContigOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of the densify spot check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub interval: GenomicInterval,
    pub rows: usize,
    pub elapsed: Duration,
    pub error: Option<DensifyError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub probe: Option<ProbeOutcome>,
    pub contigs: Vec<ContigOutcome>,
    pub sample_axis: Result<(), SampleAxisMismatch>,
    pub structural: Result<(), StructuralValidationFailure>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation failed: {}", .reasons.join("; "))]
pub struct ValidationFailed {
    pub reasons: Vec<String>,
}

impl ValidationReport {
    pub fn succeeded(&self) -> bool {
        self.failure_reasons().is_empty()
    }

    pub fn failing_contigs(&self) -> Vec<&Contig> {
        self.contigs
            .iter()
            .filter(|outcome| !outcome.passed())
            .map(|outcome| &outcome.contig)
            .collect()
    }

    fn failure_reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if let Some(ProbeOutcome {
            interval,
            error: Some(err),
            ..
        }) = &self.probe
        {
            reasons.push(format!("densify probe over {interval} failed: {err}"));
        }
        let failing = self.failing_contigs();
        if !failing.is_empty() {
            reasons.push(format!("contigs failed: {}", failing.iter().join(", ")));
        }
        if let Err(err) = &self.sample_axis {
            reasons.push(err.to_string());
        }
        if let Err(err) = &self.structural {
            reasons.push(err.to_string());
        }
        reasons
    }

    /// Converts the report into a pass/fail verdict.
    pub fn ensure_success(&self) -> Result<(), ValidationFailed> {
        let reasons = self.failure_reasons();
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(ValidationFailed { reasons })
        }
    }
}

// ========================================================================================
//                                     The run
// ========================================================================================

fn reconcile_contig<R, V>(
    dataset: &VariantDataset<R, V>,
    contig: &Contig,
) -> Result<(), SampleAxisMismatch>
where
    R: ReferenceBlockStore,
    V: VariantStore,
{
    info!("Validating chromosome {contig}...");
    let reference = ContigSlice::new(&dataset.reference, contig.clone());
    let variants = ContigSlice::new(&dataset.variants, contig.clone());
    reconcile_stores(&reference, &variants).inspect_err(|mismatch| error!("{contig}: {mismatch}"))
}

/// Combines a contig's two verdicts. A sample axis mismatch takes precedence over the
/// block checks.
fn contig_outcome(
    contig: &Contig,
    axis: Result<(), SampleAxisMismatch>,
    blocks: Result<PartitionSummary, RefBlockInvariantViolation>,
) -> ContigOutcome {
    match (axis, blocks) {
        (Err(mismatch), _) => ContigOutcome {
            contig: contig.clone(),
            blocks_checked: 0,
            message: format!("Sample axis check failed for chromosome {contig}: {mismatch}"),
            failure: Some(ContigFailure::SampleAxis(mismatch)),
        },
        (Ok(()), Ok(summary)) => {
            info!("Validation successful for chromosome {contig}");
            ContigOutcome {
                contig: contig.clone(),
                blocks_checked: summary.blocks_checked,
                failure: None,
                message: format!(
                    "Validation successful for chromosome {contig} ({} reference blocks)",
                    summary.blocks_checked
                ),
            }
        }
        (Ok(()), Err(violation)) => ContigOutcome {
            contig: contig.clone(),
            blocks_checked: 0,
            message: format!("Validation failed for chromosome {contig}: {violation}"),
            failure: Some(ContigFailure::Invariant(violation)),
        },
    }
}

fn run_probe<R, V>(
    dataset: &VariantDataset<R, V>,
    interval: &GenomicInterval,
    genome: &ReferenceGenome,
    shard_width: u32,
) -> ProbeOutcome
where
    R: ReferenceBlockStore,
    V: VariantStore,
{
    info!("Running densify on {interval} ({} loci)", interval.len());
    let started = Instant::now();
    let result = densify_sharded(
        &dataset.reference,
        &dataset.variants,
        interval,
        genome,
        shard_width,
    );
    let elapsed = started.elapsed();

    match result {
        Ok(dense) => {
            info!(
                "Took {:.1}s to densify {} rows after interval query",
                elapsed.as_secs_f64(),
                dense.nrows()
            );
            ProbeOutcome {
                interval: interval.clone(),
                rows: dense.nrows(),
                elapsed,
                error: None,
            }
        }
        Err(err) => {
            error!("Densify probe over {interval} failed: {err}");
            ProbeOutcome {
                interval: interval.clone(),
                rows: 0,
                elapsed,
                error: Some(err),
            }
        }
    }
}

/// Runs every check configured in `config` against `dataset`.
///
/// Errors only when the run itself cannot be set up; data problems are recorded in
/// the returned report.
pub fn run_validation<R, V>(
    dataset: &VariantDataset<R, V>,
    config: &ValidationConfig,
    structural: &dyn StructuralValidator<R, V>,
) -> Result<ValidationReport, ConfigError>
where
    R: ReferenceBlockStore,
    V: VariantStore,
{
    config.validate()?;
    let pool = config.thread_pool()?;
    let genome = config.reference_genome();

    let probe = config.probe_interval.as_ref().map(|interval| {
        pool.install(|| run_probe(dataset, interval, &genome, config.densify_shard_width))
    });

    let axis_checks: Vec<Result<(), SampleAxisMismatch>> = config
        .contigs
        .iter()
        .map(|contig| reconcile_contig(dataset, contig))
        .collect();

    let pb = create_progress_bar(config.contigs.len() as u64, "contigs validated");
    let block_checks = pool.install(|| {
        check_partitions(
            &dataset.reference,
            &config.contigs,
            config.max_block_length,
            &pb,
        )
    });
    pb.finish_and_clear();

    let contigs: Vec<ContigOutcome> = config
        .contigs
        .iter()
        .zip(axis_checks)
        .zip(block_checks)
        .map(|((contig, axis), blocks)| contig_outcome(contig, axis, blocks))
        .collect();

    info!("Checking sample equivalence between reference and variant data");
    let sample_axis = reconcile_stores(&dataset.reference, &dataset.variants);
    if let Err(mismatch) = &sample_axis {
        error!("{mismatch}");
    }

    info!("Running structural validation");
    let structural = structural.validate(dataset);
    if let Err(failure) = &structural {
        error!("{failure}");
    }

    let report = ValidationReport {
        probe,
        contigs,
        sample_axis,
        structural,
    };
    match report.ensure_success() {
        Ok(()) => info!("Full validation successful"),
        Err(failed) => warn!("{failed}"),
    }
    Ok(report)
}
