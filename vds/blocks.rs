// ========================================================================================
//
//                               THE REFERENCE BLOCK STORE
//
// ========================================================================================
//
// A reference block is a run-length-encoded span over which one sample is implicitly
// homozygous-reference. This module owns the block type, the three well-formedness
// predicates every block must satisfy, and the read interface the checker and the
// densifier consume.

use crate::reconcile::SampleAxisSource;
use crate::types::{Contig, Locus, SampleId};
use std::collections::BTreeMap;
use std::fmt;

/// The block-length ceiling enforced by the upstream producer.
pub const DEFAULT_MAX_BLOCK_LENGTH: u32 = 1000;

/// One homozygous-reference run for one sample. `start` and `end` are inclusive and
/// always on the same contig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceBlock {
    pub sample: SampleId,
    pub start: Locus,
    pub end: u32,
    /// Genotype quality (GQ) of the block.
    pub quality: u32,
}

/// Which block predicate failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvariantKind {
    /// GQ of exactly zero: the span should have been a missing call.
    ZeroQuality,
    /// The block ends before `start - 1`.
    NegativeLength,
    /// The block is longer than the configured ceiling.
    ExceedsMaxLength { max: u32 },
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroQuality => f.write_str("GQ must be greater than zero"),
            Self::NegativeLength => f.write_str("END must not precede START - 1"),
            Self::ExceedsMaxLength { max } => write!(f, "length must not exceed {max} bases"),
        }
    }
}

impl ReferenceBlock {
    pub fn new(sample: impl Into<SampleId>, start: Locus, end: u32, quality: u32) -> Self {
        Self {
            sample: sample.into(),
            start,
            end,
            quality,
        }
    }

    #[inline]
    pub fn contig(&self) -> &Contig {
        &self.start.contig
    }

    /// `end - start + 1`. Zero for a degenerate block, negative for a malformed one.
    #[inline]
    pub fn length(&self) -> i64 {
        i64::from(self.end) - i64::from(self.start.position) + 1
    }

    #[inline]
    pub fn covers(&self, locus: &Locus) -> bool {
        locus.contig == self.start.contig
            && locus.position >= self.start.position
            && locus.position <= self.end
    }

    /// Evaluates the block predicates in a fixed order and reports the first failure.
    ///
    /// A zero-length block (`end == start - 1`) passes.
    pub fn check(&self, max_block_length: u32) -> Result<(), InvariantKind> {
        if self.quality == 0 {
            return Err(InvariantKind::ZeroQuality);
        }
        let length = self.length();
        if length < 0 {
            return Err(InvariantKind::NegativeLength);
        }
        if length > i64::from(max_block_length) {
            return Err(InvariantKind::ExceedsMaxLength {
                max: max_block_length,
            });
        }
        Ok(())
    }
}

/// Read access to a reference-block table.
///
/// Rows for one contig are produced as a forward-only lazy sequence, so a partition
/// never has to be resident in memory all at once. Rows come in ascending start order;
/// the densifier stops reading once it passes the end of the requested interval.
pub trait ReferenceBlockStore: SampleAxisSource + Sync {
    type Rows<'a>: Iterator<Item = ReferenceBlock> + Send + 'a
    where
        Self: 'a;

    fn rows_for_contig<'a>(&'a self, contig: &Contig) -> Self::Rows<'a>;

    /// Contigs for which the store holds at least one row, in locus order.
    fn contigs(&self) -> Vec<Contig>;
}

/// A reference-block table held in memory, bucketed by contig and sorted by
/// `(start, sample)` within each bucket.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceBlocks {
    samples: Vec<SampleId>,
    by_contig: BTreeMap<Contig, Vec<ReferenceBlock>>,
}

impl InMemoryReferenceBlocks {
    pub fn new(samples: Vec<SampleId>) -> Self {
        Self {
            samples,
            by_contig: BTreeMap::new(),
        }
    }

    pub fn from_blocks(samples: Vec<SampleId>, blocks: impl IntoIterator<Item = ReferenceBlock>) -> Self {
        let mut store = Self::new(samples);
        for block in blocks {
            store
                .by_contig
                .entry(block.contig().clone())
                .or_default()
                .push(block);
        }
        for rows in store.by_contig.values_mut() {
            rows.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.sample.cmp(&b.sample)));
        }
        store
    }

    /// Inserts one block, keeping its contig bucket sorted.
    pub fn push(&mut self, block: ReferenceBlock) {
        let rows = self.by_contig.entry(block.contig().clone()).or_default();
        let at = rows.partition_point(|row| {
            (&row.start, &row.sample) <= (&block.start, &block.sample)
        });
        rows.insert(at, block);
    }

    pub fn len(&self) -> usize {
        self.by_contig.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SampleAxisSource for InMemoryReferenceBlocks {
    fn sample_axis(&self) -> &[SampleId] {
        &self.samples
    }
}

impl ReferenceBlockStore for InMemoryReferenceBlocks {
    type Rows<'a> = std::iter::Cloned<std::slice::Iter<'a, ReferenceBlock>>;

    fn rows_for_contig<'a>(&'a self, contig: &Contig) -> Self::Rows<'a> {
        self.by_contig
            .get(contig)
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .cloned()
    }

    fn contigs(&self) -> Vec<Contig> {
        self.by_contig.keys().cloned().collect()
    }
}
