use std::fs;
use std::path::Path;
use tempfile::tempdir;
use vdscheck::blocks::{InMemoryReferenceBlocks, InvariantKind, ReferenceBlock};
use vdscheck::config::ValidationConfig;
use vdscheck::densify::{DensifyError, densify};
use vdscheck::invariants::check_invariants;
use vdscheck::io::load_dataset;
use vdscheck::reconcile::{MismatchKind, reconcile_stores};
use vdscheck::types::{Contig, GenomicInterval, GenotypeCall, Locus, ReferenceGenome, SampleId};
use vdscheck::validate::{
    ContigFailure, LayoutValidator, StructuralValidationFailure, VariantDataset, run_validation,
};
use vdscheck::variants::{InMemoryVariants, VariantRecord};

type Dataset = VariantDataset<InMemoryReferenceBlocks, InMemoryVariants>;

fn axis(ids: &[&str]) -> Vec<SampleId> {
    ids.iter().map(|id| SampleId::from(*id)).collect()
}

fn chr1(position: u32) -> Locus {
    Locus::new(Contig::Autosome(1), position)
}

/// Two samples on chr1; `s2` carries a block with GQ=0.
fn two_sample_dataset() -> Dataset {
    let reference = InMemoryReferenceBlocks::from_blocks(
        axis(&["s1", "s2"]),
        vec![
            ReferenceBlock::new("s1", chr1(100), 105, 30),
            ReferenceBlock::new("s2", chr1(100), 105, 0),
        ],
    );
    let variants = InMemoryVariants::new(axis(&["s1", "s2"]));
    VariantDataset::new(reference, variants)
}

fn config_for(contigs: Vec<Contig>) -> ValidationConfig {
    ValidationConfig {
        contigs,
        threads: 2,
        ..ValidationConfig::default()
    }
}

fn always_passes(_: &Dataset) -> Result<(), StructuralValidationFailure> {
    Ok(())
}

#[test]
fn zero_quality_block_fails_only_its_contig() {
    let dataset = two_sample_dataset();
    let config = config_for(vec![Contig::Autosome(1), Contig::Autosome(2)]);

    let report = run_validation(&dataset, &config, &always_passes).unwrap();

    assert!(!report.succeeded());
    assert_eq!(report.failing_contigs(), vec![&Contig::Autosome(1)]);
    assert_eq!(report.sample_axis, Ok(()));
    assert_eq!(report.structural, Ok(()));

    match &report.contigs[0].failure {
        Some(ContigFailure::Invariant(violation)) => {
            assert_eq!(violation.kind, InvariantKind::ZeroQuality);
            assert_eq!(&*violation.sample, "s2");
            assert_eq!(violation.locus, chr1(100));
        }
        other => panic!("expected an invariant failure, got {other:?}"),
    }
    assert!(report.contigs[1].passed());
    assert_eq!(report.contigs[1].blocks_checked, 0);

    let err = report.ensure_success().unwrap_err();
    assert!(err.to_string().contains("chr1"));
}

#[test]
fn invariant_failures_are_collected_for_every_partition() {
    let reference = InMemoryReferenceBlocks::from_blocks(
        axis(&["s1"]),
        vec![
            ReferenceBlock::new("s1", chr1(10), 20, 0),
            ReferenceBlock::new("s1", Locus::new(Contig::Autosome(2), 10), 20, 30),
            ReferenceBlock::new("s1", Locus::new(Contig::X, 10), 5000, 30),
        ],
    );
    let contigs = vec![Contig::Autosome(1), Contig::Autosome(2), Contig::X];

    let failures = check_invariants(&reference, &contigs, 1000).unwrap_err();

    assert_eq!(failures.partitions_checked, 3);
    let kinds: Vec<(Contig, InvariantKind)> = failures
        .violations
        .iter()
        .map(|v| (v.contig.clone(), v.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (Contig::Autosome(1), InvariantKind::ZeroQuality),
            (Contig::X, InvariantKind::ExceedsMaxLength { max: 1000 }),
        ]
    );
}

#[test]
fn densify_inside_one_block_is_all_hom_ref() {
    let reference = InMemoryReferenceBlocks::from_blocks(
        axis(&["s1"]),
        vec![ReferenceBlock::new("s1", chr1(100), 105, 30)],
    );
    let variants = InMemoryVariants::new(axis(&["s1"]));
    let interval: GenomicInterval = "chr1:102-103".parse().unwrap();

    let dense = densify(&reference, &variants, &interval, &ReferenceGenome::grch38()).unwrap();

    assert_eq!(dense.nrows(), 2);
    assert_eq!(dense.ncols(), 1);
    assert_eq!(dense.loci(), &[chr1(102), chr1(103)]);
    assert!(dense.calls().iter().all(GenotypeCall::is_hom_ref));
}

#[test]
fn densify_reports_the_first_uncovered_locus() {
    let reference = InMemoryReferenceBlocks::from_blocks(
        axis(&["s1"]),
        vec![ReferenceBlock::new("s1", chr1(10), 20, 20)],
    );
    let variants = InMemoryVariants::new(axis(&["s1"]));
    let interval: GenomicInterval = "chr1:15-25".parse().unwrap();

    let err = densify(&reference, &variants, &interval, &ReferenceGenome::grch38()).unwrap_err();

    assert_eq!(
        err,
        DensifyError::UncoveredLocus {
            sample: SampleId::from("s1"),
            locus: chr1(21),
        }
    );
}

#[test]
fn swapped_sample_order_is_an_order_mismatch() {
    let reference = InMemoryReferenceBlocks::new(axis(&["s1", "s2"]));
    let variants = InMemoryVariants::new(axis(&["s2", "s1"]));

    let mismatch = reconcile_stores(&reference, &variants).unwrap_err();
    assert_eq!(mismatch.kind, MismatchKind::Order);
    assert_eq!(mismatch.first_differing_index, 0);
    assert!(mismatch.only_in_reference.is_empty());
    assert!(mismatch.only_in_variants.is_empty());
}

#[test]
fn sample_axis_mismatch_fails_every_contig_and_the_final_check() {
    let reference = InMemoryReferenceBlocks::from_blocks(
        axis(&["s1", "s2"]),
        vec![ReferenceBlock::new("s1", chr1(1), 10, 30)],
    );
    let variants = InMemoryVariants::new(axis(&["s1", "s3"]));
    let dataset = VariantDataset::new(reference, variants);
    let config = config_for(vec![Contig::Autosome(1), Contig::Autosome(2)]);

    let report = run_validation(&dataset, &config, &always_passes).unwrap();

    assert_eq!(report.failing_contigs().len(), 2);
    assert!(
        report
            .contigs
            .iter()
            .all(|outcome| matches!(outcome.failure, Some(ContigFailure::SampleAxis(_))))
    );
    let mismatch = report.sample_axis.clone().unwrap_err();
    assert_eq!(mismatch.kind, MismatchKind::Membership);
    assert_eq!(mismatch.only_in_reference, axis(&["s2"]));
    assert_eq!(mismatch.only_in_variants, axis(&["s3"]));
}

#[test]
fn structural_failure_alone_fails_the_run() {
    let reference = InMemoryReferenceBlocks::from_blocks(
        axis(&["s1"]),
        vec![ReferenceBlock::new("s1", chr1(1), 10, 30)],
    );
    let dataset = VariantDataset::new(reference, InMemoryVariants::new(axis(&["s1"])));
    let config = config_for(vec![Contig::Autosome(1)]);
    let rejects = |_: &Dataset| -> Result<(), StructuralValidationFailure> {
        Err(StructuralValidationFailure::new("entry schema mismatch"))
    };

    let report = run_validation(&dataset, &config, &rejects).unwrap();

    assert!(report.failing_contigs().is_empty());
    assert!(!report.succeeded());
    let err = report.ensure_success().unwrap_err();
    assert_eq!(err.reasons.len(), 1);
    assert!(err.reasons[0].contains("entry schema mismatch"));
}

#[test]
fn layout_validator_rejects_rows_for_unknown_samples() {
    let reference = InMemoryReferenceBlocks::from_blocks(
        axis(&["s1"]),
        vec![ReferenceBlock::new("s1", chr1(1), 10, 30)],
    );
    let variants = InMemoryVariants::from_records(
        axis(&["s1"]),
        vec![VariantRecord::new(
            "s9",
            chr1(5),
            "0/1".parse().unwrap(),
        )],
    );
    let dataset = VariantDataset::new(reference, variants);
    let config = config_for(vec![Contig::Autosome(1)]);

    let report = run_validation(&dataset, &config, &LayoutValidator).unwrap();

    let failure = report.structural.clone().unwrap_err();
    assert!(failure.message.contains("s9"));
    assert!(report.failing_contigs().is_empty());
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn dataset_directory_validates_and_probes() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(&root.join("reference_data/samples.tsv"), "sample_id\ns1\ns2\n");
    write(&root.join("variant_data/samples.tsv"), "sample_id\ns1\ns2\n");
    write(
        &root.join("reference_data/blocks.tsv"),
        "sample_id\tcontig\tposition\tend\tgq\n\
         s1\tchr1\t100\t110\t30\n\
         s2\tchr1\t100\t104\t25\n\
         s2\tchr1\t106\t110\t25\n",
    );
    write(
        &root.join("variant_data/calls.tsv"),
        "sample_id\tcontig\tposition\tgt\n\
         s2\tchr1\t105\t0/1\n",
    );

    let dataset = load_dataset(root).unwrap();
    let config = ValidationConfig {
        probe_interval: Some("chr1:100-110".parse().unwrap()),
        densify_shard_width: 4,
        ..config_for(vec![Contig::Autosome(1)])
    };

    let report = run_validation(&dataset, &config, &LayoutValidator).unwrap();

    assert!(report.succeeded(), "{:?}", report.ensure_success());
    let probe = report.probe.as_ref().unwrap();
    assert_eq!(probe.rows, 11);
    assert!(probe.error.is_none());
    assert_eq!(report.contigs[0].blocks_checked, 3);
}
