// ========================================================================================
//
//                            THE PARTITIONED INVARIANT CHECKER
//
// ========================================================================================
//
// ### Purpose ###
//
// Proves that every reference block is well-formed. The store is scanned one contig
// at a time; each contig is an independent partition whose verdict is the logical AND
// of its blocks' predicates. A partition stops at its first failing block. Partitions
// are fanned out across the rayon pool and never share state, so one partition's
// failure cannot disturb another's result.

use crate::blocks::{InvariantKind, ReferenceBlockStore};
use crate::types::{Contig, Locus, SampleId};
use indicatif::ProgressBar;
use log::{debug, warn};
use rayon::prelude::*;
use thiserror::Error;

/// The first failing block of a partition, with enough context to locate it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Reference block invariant violated on {contig}: {kind} (sample '{sample}', block {locus}-{end}, GQ={quality}, length={length})"
)]
pub struct RefBlockInvariantViolation {
    pub contig: Contig,
    pub kind: InvariantKind,
    pub sample: SampleId,
    /// Start of the offending block.
    pub locus: Locus,
    pub end: u32,
    pub quality: u32,
    pub length: i64,
}

/// All partitions that failed in one run, one violation each, in contig order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} of {partitions_checked} partitions failed reference block checks: {}", .violations.len(), failing_contigs(.violations))]
pub struct InvariantFailures {
    pub violations: Vec<RefBlockInvariantViolation>,
    pub partitions_checked: usize,
}

fn failing_contigs(violations: &[RefBlockInvariantViolation]) -> String {
    violations
        .iter()
        .map(|v| v.contig.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Outcome of a passing partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub contig: Contig,
    pub blocks_checked: u64,
}

/// Checks a single contig. Blocks are consumed as a forward-only sequence and the scan
/// aborts on the first violation.
pub fn check_partition<S>(
    store: &S,
    contig: &Contig,
    max_block_length: u32,
) -> Result<PartitionSummary, RefBlockInvariantViolation>
where
    S: ReferenceBlockStore + ?Sized,
{
    let mut blocks_checked = 0u64;
    for block in store
        .rows_for_contig(contig)
        .filter(|block| block.contig() == contig)
    {
        if let Err(kind) = block.check(max_block_length) {
            let length = block.length();
            let violation = RefBlockInvariantViolation {
                contig: contig.clone(),
                kind,
                sample: block.sample,
                locus: block.start,
                end: block.end,
                quality: block.quality,
                length,
            };
            warn!("{violation}");
            return Err(violation);
        }
        blocks_checked += 1;
    }

    debug!("{contig}: {blocks_checked} reference blocks passed");
    Ok(PartitionSummary {
        contig: contig.clone(),
        blocks_checked,
    })
}

/// Checks every requested contig in parallel, one verdict per contig in the order given.
///
/// `progress` advances once per finished partition.
pub fn check_partitions<S>(
    store: &S,
    contigs: &[Contig],
    max_block_length: u32,
    progress: &ProgressBar,
) -> Vec<Result<PartitionSummary, RefBlockInvariantViolation>>
where
    S: ReferenceBlockStore + ?Sized,
{
    contigs
        .par_iter()
        .map(|contig| {
            let verdict = check_partition(store, contig, max_block_length);
            progress.inc(1);
            verdict
        })
        .collect()
}

/// Checks every requested contig in parallel and reduces the per-partition verdicts.
///
/// Every partition is attempted even when some fail; the error carries one violation
/// per failing partition.
pub fn check_invariants<S>(
    store: &S,
    contigs: &[Contig],
    max_block_length: u32,
) -> Result<Vec<PartitionSummary>, InvariantFailures>
where
    S: ReferenceBlockStore + ?Sized,
{
    let outcomes = check_partitions(store, contigs, max_block_length, &ProgressBar::hidden());

    let partitions_checked = outcomes.len();
    let (passed, violations): (Vec<_>, Vec<_>) = outcomes.into_iter().partition(Result::is_ok);

    if violations.is_empty() {
        return Ok(passed.into_iter().filter_map(Result::ok).collect());
    }

    Err(InvariantFailures {
        violations: violations.into_iter().filter_map(Result::err).collect(),
        partitions_checked,
    })
}
