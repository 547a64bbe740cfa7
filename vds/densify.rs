// ========================================================================================
//
//                                    THE DENSIFIER
//
// ========================================================================================
//
// ### Purpose ###
//
// Reconstructs a dense (locus x sample) genotype matrix from the sparse representation:
//
//   1. every reference block overlapping the interval is clipped to it,
//   2. the clipped span is expanded into hom-ref calls for the block's sample,
//   3. variant records inside the interval overwrite the expanded calls,
//   4. any cell still empty is an uncovered locus and fails the request.
//
// The stores are never mutated; clipping produces new bounds only. Because every
// sub-interval clips blocks independently, densifying `[a, c]` equals concatenating
// the rows of `[a, b]` and `[b + 1, c]`, which is what the sharded entry point relies on.

use crate::blocks::ReferenceBlockStore;
use crate::reconcile::{SampleAxisMismatch, reconcile_stores};
use crate::types::{GenomicInterval, GenotypeCall, Locus, ReferenceGenome, SampleId};
use crate::variants::VariantStore;
use ahash::AHashMap;
use log::debug;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DensifyError {
    #[error("Interval {interval} is out of range for {} ({})", .interval.contig, describe_length(.contig_length))]
    IntervalOutOfRange {
        interval: GenomicInterval,
        contig_length: Option<u32>,
    },
    #[error("No reference block or variant record covers {locus} for sample '{sample}'.")]
    UncoveredLocus { sample: SampleId, locus: Locus },
    #[error("A row at {locus} names sample '{sample}', which is not on the sample axis.")]
    UnknownSample { sample: SampleId, locus: Locus },
    #[error(transparent)]
    SampleAxis(#[from] SampleAxisMismatch),
    #[error("Dense matrix assembly failed: {0}")]
    Assembly(String),
}

fn describe_length(length: &Option<u32>) -> String {
    match length {
        Some(len) => format!("contig length {len}"),
        None => "contig not present in the reference genome".to_string(),
    }
}

/// A locus-major genotype matrix: one row per locus of the interval in ascending
/// order, one column per sample in axis order.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    loci: Vec<Locus>,
    samples: Vec<SampleId>,
    calls: Array2<GenotypeCall>,
}

impl DenseMatrix {
    pub fn empty() -> Self {
        Self {
            loci: Vec::new(),
            samples: Vec::new(),
            calls: Array2::from_elem((0, 0), GenotypeCall::NO_CALL),
        }
    }

    pub fn nrows(&self) -> usize {
        self.calls.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.calls.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn loci(&self) -> &[Locus] {
        &self.loci
    }

    pub fn samples(&self) -> &[SampleId] {
        &self.samples
    }

    pub fn calls(&self) -> ArrayView2<'_, GenotypeCall> {
        self.calls.view()
    }

    /// The call for `sample` at `locus`, if both are part of the matrix.
    pub fn get(&self, sample: &str, locus: &Locus) -> Option<GenotypeCall> {
        let col = self.samples.iter().position(|s| &**s == sample)?;
        let row = self.loci.binary_search(locus).ok()?;
        self.calls.get((row, col)).copied()
    }

    /// Stacks matrices that share a sample axis, in the given order.
    pub fn concat_rows(parts: Vec<DenseMatrix>) -> Result<DenseMatrix, DensifyError> {
        let Some(samples) = parts
            .iter()
            .find(|part| !part.samples.is_empty())
            .map(|part| part.samples.clone())
        else {
            return Ok(DenseMatrix::empty());
        };

        let mut loci = Vec::with_capacity(parts.iter().map(DenseMatrix::nrows).sum());
        let mut cells = Vec::with_capacity(loci.capacity() * samples.len());
        for part in parts.into_iter().filter(|part| !part.samples.is_empty()) {
            if part.samples != samples {
                return Err(DensifyError::Assembly(
                    "cannot stack matrices with different sample axes".to_string(),
                ));
            }
            loci.extend(part.loci);
            cells.extend(part.calls.iter().copied());
        }

        let calls = Array2::from_shape_vec((loci.len(), samples.len()), cells)
            .map_err(|e| DensifyError::Assembly(e.to_string()))?;
        Ok(DenseMatrix {
            loci,
            samples,
            calls,
        })
    }

    /// Writes the matrix as TSV: a `locus` column followed by one column per sample.
    pub fn write_tsv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut out = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);

        let mut header = Vec::with_capacity(self.samples.len() + 1);
        header.push("locus".to_string());
        header.extend(self.samples.iter().map(|s| s.to_string()));
        out.write_record(&header)?;

        for (locus, row) in self.loci.iter().zip(self.calls.rows()) {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(locus.to_string());
            record.extend(row.iter().map(GenotypeCall::to_string));
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Checks that the interval is non-empty, 1-based and within the contig.
pub fn validate_interval(
    interval: &GenomicInterval,
    genome: &ReferenceGenome,
) -> Result<(), DensifyError> {
    let contig_length = genome.contig_length(&interval.contig);
    let in_range = match contig_length {
        Some(len) => interval.start >= 1 && interval.start <= interval.end && interval.end <= len,
        None => false,
    };
    if in_range {
        Ok(())
    } else {
        Err(DensifyError::IntervalOutOfRange {
            interval: interval.clone(),
            contig_length,
        })
    }
}

/// Densifies one interval in a single pass.
pub fn densify<R, V>(
    reference: &R,
    variants: &V,
    interval: &GenomicInterval,
    genome: &ReferenceGenome,
) -> Result<DenseMatrix, DensifyError>
where
    R: ReferenceBlockStore + ?Sized,
    V: VariantStore + ?Sized,
{
    validate_interval(interval, genome)?;
    reconcile_stores(reference, variants)?;

    let samples = reference.sample_axis();
    if samples.is_empty() {
        return Ok(DenseMatrix::empty());
    }

    let column_of: AHashMap<&str, usize> = samples
        .iter()
        .enumerate()
        .map(|(col, sample)| (&**sample, col))
        .collect();
    let column = |sample: &SampleId, locus: &Locus| {
        column_of
            .get(&**sample)
            .copied()
            .ok_or_else(|| DensifyError::UnknownSample {
                sample: sample.clone(),
                locus: locus.clone(),
            })
    };

    let n_samples = samples.len();
    let n_loci = interval.len() as usize;
    let cell = |position: u32, col: usize| (position - interval.start) as usize * n_samples + col;
    let mut cells: Vec<Option<GenotypeCall>> = vec![None; n_loci * n_samples];

    let mut blocks_used = 0usize;
    // Rows arrive sorted by start, so nothing after the interval's end can overlap it.
    let blocks = reference
        .rows_for_contig(&interval.contig)
        .filter(|block| block.contig() == &interval.contig)
        .take_while(|block| block.start.position <= interval.end);
    for block in blocks {
        let Some((lo, hi)) = interval.clip(block.start.position, block.end) else {
            continue;
        };
        let col = column(&block.sample, &block.start)?;
        for position in lo..=hi {
            cells[cell(position, col)] = Some(GenotypeCall::HOM_REF);
        }
        blocks_used += 1;
    }

    let mut overrides = 0usize;
    let records = variants
        .rows_for_contig(&interval.contig)
        .take_while(|record| {
            record.locus.contig != interval.contig || record.locus.position <= interval.end
        });
    for record in records {
        if !interval.contains(&record.locus) {
            continue;
        }
        let col = column(&record.sample, &record.locus)?;
        cells[cell(record.locus.position, col)] = Some(record.call);
        overrides += 1;
    }

    if let Some(gap) = cells.iter().position(Option::is_none) {
        return Err(DensifyError::UncoveredLocus {
            sample: samples[gap % n_samples].clone(),
            locus: Locus::new(interval.contig.clone(), interval.start + (gap / n_samples) as u32),
        });
    }

    debug!(
        "{interval}: {blocks_used} blocks and {overrides} variant records densified into {n_loci} x {n_samples}"
    );

    let calls = Array2::from_shape_vec((n_loci, n_samples), cells.into_iter().flatten().collect())
        .map_err(|e| DensifyError::Assembly(e.to_string()))?;

    Ok(DenseMatrix {
        loci: interval.loci().collect(),
        samples: samples.to_vec(),
        calls,
    })
}

/// Splits the interval into shards of at most `shard_width` loci, densifies them on the
/// rayon pool and stacks the rows. Produces the same matrix as [`densify`]; when
/// several shards fail, the error of the leftmost one is returned.
pub fn densify_sharded<R, V>(
    reference: &R,
    variants: &V,
    interval: &GenomicInterval,
    genome: &ReferenceGenome,
    shard_width: u32,
) -> Result<DenseMatrix, DensifyError>
where
    R: ReferenceBlockStore + ?Sized,
    V: VariantStore + ?Sized,
{
    validate_interval(interval, genome)?;
    reconcile_stores(reference, variants)?;

    let shards = interval.split(shard_width);
    debug!("{interval}: densifying {} shards", shards.len());

    let parts: Vec<Result<DenseMatrix, DensifyError>> = shards
        .par_iter()
        .map(|shard| densify(reference, variants, shard, genome))
        .collect();

    let parts = parts.into_iter().collect::<Result<Vec<_>, _>>()?;
    DenseMatrix::concat_rows(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{InMemoryReferenceBlocks, ReferenceBlock};
    use crate::reconcile::SampleAxisSource;
    use crate::types::Contig;
    use crate::variants::{InMemoryVariants, VariantRecord};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn chr1(position: u32) -> Locus {
        Locus::new(Contig::Autosome(1), position)
    }

    fn stores(
        blocks: Vec<ReferenceBlock>,
        records: Vec<VariantRecord>,
    ) -> (InMemoryReferenceBlocks, InMemoryVariants) {
        let samples: Vec<SampleId> = vec!["s1".into()];
        (
            InMemoryReferenceBlocks::from_blocks(samples.clone(), blocks),
            InMemoryVariants::from_records(samples, records),
        )
    }

    #[test]
    fn block_is_clipped_to_the_interval() {
        let (reference, variants) = stores(
            vec![
                ReferenceBlock::new("s1", chr1(10), 20, 30),
                ReferenceBlock::new("s1", chr1(21), 30, 30),
            ],
            vec![],
        );
        let interval = GenomicInterval::new(Contig::Autosome(1), 15, 25);
        let dense = densify(&reference, &variants, &interval, &ReferenceGenome::grch38()).unwrap();

        assert_eq!(dense.nrows(), 11);
        assert_eq!(dense.loci().first(), Some(&chr1(15)));
        assert_eq!(dense.loci().last(), Some(&chr1(25)));
        assert!(dense.calls().iter().all(GenotypeCall::is_hom_ref));
    }

    #[test]
    fn block_alone_only_contributes_its_clipped_span() {
        let (reference, variants) =
            stores(vec![ReferenceBlock::new("s1", chr1(10), 20, 30)], vec![]);
        let interval = GenomicInterval::new(Contig::Autosome(1), 15, 25);
        let err = densify(&reference, &variants, &interval, &ReferenceGenome::grch38()).unwrap_err();
        assert_eq!(
            err,
            DensifyError::UncoveredLocus {
                sample: "s1".into(),
                locus: chr1(21),
            }
        );
    }

    #[test]
    fn variant_record_overrides_reference_call() {
        let alt: GenotypeCall = "1/1".parse().unwrap();
        let (reference, variants) = stores(
            vec![ReferenceBlock::new("s1", chr1(100), 110, 40)],
            vec![VariantRecord::new("s1", chr1(105), alt)],
        );
        let interval = GenomicInterval::new(Contig::Autosome(1), 100, 110);
        let dense = densify(&reference, &variants, &interval, &ReferenceGenome::grch38()).unwrap();
        assert_eq!(dense.get("s1", &chr1(105)), Some(alt));
        assert_eq!(dense.get("s1", &chr1(104)), Some(GenotypeCall::HOM_REF));
    }

    #[test]
    fn variant_record_fills_a_gap_between_blocks() {
        let het: GenotypeCall = "0|1".parse().unwrap();
        let (reference, variants) = stores(
            vec![
                ReferenceBlock::new("s1", chr1(1), 4, 40),
                ReferenceBlock::new("s1", chr1(6), 9, 40),
            ],
            vec![VariantRecord::new("s1", chr1(5), het)],
        );
        let interval = GenomicInterval::new(Contig::Autosome(1), 1, 9);
        let dense = densify(&reference, &variants, &interval, &ReferenceGenome::grch38()).unwrap();
        assert_eq!(dense.get("s1", &chr1(5)), Some(het));
    }

    #[test]
    fn interval_bounds_are_checked_against_the_contig() {
        let (reference, variants) = stores(vec![], vec![]);
        let genome = ReferenceGenome::grch38();
        for interval in [
            GenomicInterval::new(Contig::Mito, 16_000, 16_570),
            GenomicInterval::new(Contig::Mito, 0, 10),
            GenomicInterval::new(Contig::Mito, 20, 10),
            GenomicInterval::new(Contig::Other("chrUn".into()), 1, 10),
        ] {
            let err = densify(&reference, &variants, &interval, &genome).unwrap_err();
            assert!(matches!(err, DensifyError::IntervalOutOfRange { .. }), "{err}");
        }
    }

    #[test]
    fn empty_sample_axis_yields_empty_matrix() {
        let reference = InMemoryReferenceBlocks::new(vec![]);
        let variants = InMemoryVariants::new(vec![]);
        let interval = GenomicInterval::new(Contig::Autosome(1), 1, 100);
        let dense = densify(&reference, &variants, &interval, &ReferenceGenome::grch38()).unwrap();
        assert!(dense.is_empty());
        assert_eq!(dense, DenseMatrix::empty());
    }

    #[test]
    fn row_for_unknown_sample_is_rejected() {
        let reference = InMemoryReferenceBlocks::from_blocks(
            vec!["s1".into()],
            [ReferenceBlock::new("ghost", chr1(1), 10, 40)],
        );
        let variants = InMemoryVariants::new(vec!["s1".into()]);
        let interval = GenomicInterval::new(Contig::Autosome(1), 1, 10);
        let err = densify(&reference, &variants, &interval, &ReferenceGenome::grch38()).unwrap_err();
        assert!(matches!(err, DensifyError::UnknownSample { .. }));
    }

    #[test]
    fn mismatched_axes_are_rejected() {
        let reference = InMemoryReferenceBlocks::new(vec!["s1".into(), "s2".into()]);
        let variants = InMemoryVariants::new(vec!["s2".into(), "s1".into()]);
        let interval = GenomicInterval::new(Contig::Autosome(1), 1, 10);
        let err = densify(&reference, &variants, &interval, &ReferenceGenome::grch38()).unwrap_err();
        assert!(matches!(err, DensifyError::SampleAxis(_)));
    }

    #[test]
    fn sharded_densification_matches_single_pass() {
        let het: GenotypeCall = "0/1".parse().unwrap();
        let (reference, variants) = stores(
            vec![
                ReferenceBlock::new("s1", chr1(1), 17, 40),
                ReferenceBlock::new("s1", chr1(18), 40, 40),
            ],
            vec![VariantRecord::new("s1", chr1(18), het)],
        );
        let interval = GenomicInterval::new(Contig::Autosome(1), 3, 37);
        let genome = ReferenceGenome::grch38();
        let whole = densify(&reference, &variants, &interval, &genome).unwrap();
        for width in [1, 4, 7, 35, 100] {
            let sharded = densify_sharded(&reference, &variants, &interval, &genome, width).unwrap();
            assert_eq!(sharded, whole, "shard width {width}");
        }
    }

    #[test]
    fn tsv_output_has_locus_and_sample_columns() {
        let (reference, variants) =
            stores(vec![ReferenceBlock::new("s1", chr1(100), 105, 30)], vec![]);
        let interval = GenomicInterval::new(Contig::Autosome(1), 102, 103);
        let dense = densify(&reference, &variants, &interval, &ReferenceGenome::grch38()).unwrap();

        let mut buffer = Vec::new();
        dense.write_tsv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "locus\ts1\nchr1:102\t0/0\nchr1:103\t0/0\n");
    }

    struct CountingBlocks {
        inner: InMemoryReferenceBlocks,
        pulled: AtomicUsize,
    }

    impl SampleAxisSource for CountingBlocks {
        fn sample_axis(&self) -> &[SampleId] {
            self.inner.sample_axis()
        }
    }

    impl ReferenceBlockStore for CountingBlocks {
        type Rows<'a> = Box<dyn Iterator<Item = ReferenceBlock> + Send + 'a>;

        fn rows_for_contig<'a>(&'a self, contig: &Contig) -> Self::Rows<'a> {
            Box::new(self.inner.rows_for_contig(contig).inspect(move |_| {
                self.pulled.fetch_add(1, AtomicOrdering::Relaxed);
            }))
        }

        fn contigs(&self) -> Vec<Contig> {
            self.inner.contigs()
        }
    }

    #[test]
    fn block_scan_stops_after_the_interval_end() {
        let blocks = (0..10).map(|i| ReferenceBlock::new("s1", chr1(i * 10 + 1), i * 10 + 10, 30));
        let reference = CountingBlocks {
            inner: InMemoryReferenceBlocks::from_blocks(vec!["s1".into()], blocks),
            pulled: AtomicUsize::new(0),
        };
        let variants = InMemoryVariants::new(vec!["s1".into()]);
        let interval = GenomicInterval::new(Contig::Autosome(1), 1, 15);

        let dense = densify(&reference, &variants, &interval, &ReferenceGenome::grch38()).unwrap();

        assert_eq!(dense.nrows(), 15);
        // Blocks 1-10 and 11-20 overlap; 21-30 is read once to find the end.
        assert_eq!(reference.pulled.load(AtomicOrdering::Relaxed), 3);
    }
}
