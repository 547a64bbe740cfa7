//! # Sample Set Reconciliation
//!
//! The reference-block table and the variant table are joined positionally by column,
//! so their sample axes must agree exactly: same members, same order. This module
//! proves that, or explains precisely where the two axes diverge.

use crate::types::SampleId;
use ahash::AHashSet;
use std::fmt;
use thiserror::Error;

/// Anything that exposes an ordered sample axis.
pub trait SampleAxisSource {
    fn sample_axis(&self) -> &[SampleId];
}

/// How two sample axes disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchKind {
    /// At least one identifier is present in only one axis.
    Membership,
    /// Same members, but an identifier is repeated in one axis.
    Length,
    /// Same members, different positions.
    Order,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Membership => f.write_str("sample sets differ"),
            Self::Length => f.write_str("sample counts differ"),
            Self::Order => f.write_str("sample order differs"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Sample axis mismatch between reference and variant data ({kind}) at index {first_differing_index}; only in reference data: [{}]; only in variant data: [{}]",
    join_ids(.only_in_reference),
    join_ids(.only_in_variants)
)]
pub struct SampleAxisMismatch {
    pub kind: MismatchKind,
    /// First position at which the two ordered axes hold different identifiers.
    pub first_differing_index: usize,
    pub only_in_reference: Vec<SampleId>,
    pub only_in_variants: Vec<SampleId>,
}

fn join_ids(ids: &[SampleId]) -> String {
    ids.iter()
        .map(|id| id.as_ref())
        .collect::<Vec<&str>>()
        .join(", ")
}

/// Succeeds iff the two ordered axes are element-wise equal.
pub fn reconcile_samples(
    reference: &[SampleId],
    variants: &[SampleId],
) -> Result<(), SampleAxisMismatch> {
    let first_differing_index = match reference
        .iter()
        .zip(variants)
        .position(|(a, b)| a != b)
    {
        Some(index) => index,
        None if reference.len() == variants.len() => return Ok(()),
        None => reference.len().min(variants.len()),
    };

    let reference_set: AHashSet<&SampleId> = reference.iter().collect();
    let variant_set: AHashSet<&SampleId> = variants.iter().collect();

    let only_in_reference: Vec<SampleId> = reference
        .iter()
        .filter(|id| !variant_set.contains(id))
        .cloned()
        .collect();
    let only_in_variants: Vec<SampleId> = variants
        .iter()
        .filter(|id| !reference_set.contains(id))
        .cloned()
        .collect();

    let kind = if !only_in_reference.is_empty() || !only_in_variants.is_empty() {
        MismatchKind::Membership
    } else if reference.len() != variants.len() {
        MismatchKind::Length
    } else {
        MismatchKind::Order
    };

    Err(SampleAxisMismatch {
        kind,
        first_differing_index,
        only_in_reference,
        only_in_variants,
    })
}

/// Reconciles the axes of two stores.
pub fn reconcile_stores<R, V>(reference: &R, variants: &V) -> Result<(), SampleAxisMismatch>
where
    R: SampleAxisSource + ?Sized,
    V: SampleAxisSource + ?Sized,
{
    reconcile_samples(reference.sample_axis(), variants.sample_axis())
}
