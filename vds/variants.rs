// ========================================================================================
//                                The variant point store
// ========================================================================================
//
// Explicit per-sample calls at single loci. A record here overrides any reference block
// that covers the same locus for the same sample.

use crate::reconcile::SampleAxisSource;
use crate::types::{Contig, GenotypeCall, Locus, SampleId};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRecord {
    pub sample: SampleId,
    pub locus: Locus,
    pub call: GenotypeCall,
}

impl VariantRecord {
    pub fn new(sample: impl Into<SampleId>, locus: Locus, call: GenotypeCall) -> Self {
        Self {
            sample: sample.into(),
            locus,
            call,
        }
    }
}

/// Read access to a variant table. Mirrors [`crate::blocks::ReferenceBlockStore`],
/// including its ascending row order.
pub trait VariantStore: SampleAxisSource + Sync {
    type Rows<'a>: Iterator<Item = VariantRecord> + Send + 'a
    where
        Self: 'a;

    fn rows_for_contig<'a>(&'a self, contig: &Contig) -> Self::Rows<'a>;

    fn contigs(&self) -> Vec<Contig>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryVariants {
    samples: Vec<SampleId>,
    by_contig: BTreeMap<Contig, Vec<VariantRecord>>,
}

impl InMemoryVariants {
    pub fn new(samples: Vec<SampleId>) -> Self {
        Self {
            samples,
            by_contig: BTreeMap::new(),
        }
    }

    pub fn from_records(
        samples: Vec<SampleId>,
        records: impl IntoIterator<Item = VariantRecord>,
    ) -> Self {
        let mut store = Self::new(samples);
        for record in records {
            store
                .by_contig
                .entry(record.locus.contig.clone())
                .or_default()
                .push(record);
        }
        for rows in store.by_contig.values_mut() {
            rows.sort_by(|a, b| a.locus.cmp(&b.locus).then_with(|| a.sample.cmp(&b.sample)));
        }
        store
    }

    pub fn push(&mut self, record: VariantRecord) {
        let rows = self.by_contig.entry(record.locus.contig.clone()).or_default();
        let at = rows.partition_point(|row| {
            (&row.locus, &row.sample) <= (&record.locus, &record.sample)
        });
        rows.insert(at, record);
    }

    pub fn len(&self) -> usize {
        self.by_contig.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SampleAxisSource for InMemoryVariants {
    fn sample_axis(&self) -> &[SampleId] {
        &self.samples
    }
}

impl VariantStore for InMemoryVariants {
    type Rows<'a> = std::iter::Cloned<std::slice::Iter<'a, VariantRecord>>;

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
