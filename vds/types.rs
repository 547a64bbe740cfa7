// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Types shared across the crate: contigs, loci, intervals, genotype calls and genome lengths.

use natord::compare;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// An opaque, cheaply clonable sample identifier. Unique within a dataset.
pub type SampleId = Arc<str>;

/// Errors raised while parsing the textual forms of the shared types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Contig name is empty.")]
    EmptyContig,
    #[error("Invalid interval '{text}': {reason}")]
    Interval { text: String, reason: String },
    #[error("Invalid genotype call '{0}'. Expected a diploid GT such as '0/0', '0|1' or './.'.")]
    Genotype(String),
}

// ========================================================================================
//                                   Locus ordering
// ========================================================================================

/// A named reference sequence.
///
/// The standard contigs (autosomes 1-22, X, Y and the mitochondrial contig) have a
/// fixed rank. Any other contig (alts, decoys, unplaced scaffolds) sorts after all of
/// them, in natural string order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Contig {
    Autosome(u8),
    X,
    Y,
    Mito,
    Other(String),
}

impl Contig {
    /// The 25 standard contigs in rank order: chr1..chr22, chrX, chrY, chrM.
    pub fn standard_set() -> Vec<Contig> {
        (1..=22)
            .map(Contig::Autosome)
            .chain([Contig::X, Contig::Y, Contig::Mito])
            .collect()
    }

    /// 1-based rank in the standard ordering table, `None` for non-standard contigs.
    #[inline]
    pub fn rank(&self) -> Option<u8> {
        match self {
            Contig::Autosome(n) => Some(*n),
            Contig::X => Some(23),
            Contig::Y => Some(24),
            Contig::Mito => Some(25),
            Contig::Other(_) => None,
        }
    }

    pub fn is_standard(&self) -> bool {
        self.rank().is_some()
    }
}

impl Ord for Contig {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => match (self, other) {
                (Contig::Other(a), Contig::Other(b)) => compare(a, b).then_with(|| a.cmp(b)),
                _ => Ordering::Equal,
            },
        }
    }
}

impl PartialOrd for Contig {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Contig {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let original = s.trim();
        if original.is_empty() {
            return Err(ParseError::EmptyContig);
        }

        let mut trimmed = original;
        if trimmed
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("chr"))
        {
            trimmed = &trimmed[3..];
        }

        if trimmed.eq_ignore_ascii_case("X") {
            return Ok(Contig::X);
        }
        if trimmed.eq_ignore_ascii_case("Y") {
            return Ok(Contig::Y);
        }
        if trimmed.eq_ignore_ascii_case("M") || trimmed.eq_ignore_ascii_case("MT") {
            return Ok(Contig::Mito);
        }

        let canonical_number =
            trimmed.bytes().all(|b| b.is_ascii_digit()) && !trimmed.starts_with('0');
        match trimmed.parse::<u8>() {
            Ok(n @ 1..=22) if canonical_number => Ok(Contig::Autosome(n)),
            _ => Ok(Contig::Other(original.to_string())),
        }
    }
}

impl TryFrom<String> for Contig {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Contig> for String {
    fn from(value: Contig) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Contig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Contig::Autosome(n) => write!(f, "chr{n}"),
            Contig::X => f.write_str("chrX"),
            Contig::Y => f.write_str("chrY"),
            Contig::Mito => f.write_str("chrM"),
            Contig::Other(name) => f.write_str(name),
        }
    }
}

/// A single 1-based position on a contig. Ordered by contig rank, then position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locus {
    pub contig: Contig,
    pub position: u32,
}

impl Locus {
    pub fn new(contig: Contig, position: u32) -> Self {
        Self { contig, position }
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.contig, self.position)
    }
}

// ========================================================================================
//                                  Genomic intervals
// ========================================================================================

/// A closed, 1-based interval `[start, end]` on a single contig.
///
/// Construction does not validate the bounds; they are checked against a
/// [`ReferenceGenome`] by whoever consumes the interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GenomicInterval {
    pub contig: Contig,
    pub start: u32,
    pub end: u32,
}

impl GenomicInterval {
    pub fn new(contig: Contig, start: u32, end: u32) -> Self {
        Self { contig, start, end }
    }

    /// Number of loci covered; zero for an inverted interval.
    #[inline]
    pub fn len(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            u64::from(self.end - self.start) + 1
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn contains(&self, locus: &Locus) -> bool {
        locus.contig == self.contig && locus.position >= self.start && locus.position <= self.end
    }

    /// The intersection of `[lo, hi]` on this interval's contig with the interval,
    /// or `None` when they do not overlap.
    #[inline]
    pub fn clip(&self, lo: u32, hi: u32) -> Option<(u32, u32)> {
        let clipped_lo = lo.max(self.start);
        let clipped_hi = hi.min(self.end);
        (clipped_lo <= clipped_hi).then_some((clipped_lo, clipped_hi))
    }

    pub fn loci(&self) -> impl Iterator<Item = Locus> + '_ {
        (self.start..=self.end).map(|position| Locus::new(self.contig.clone(), position))
    }

    /// Splits into contiguous, non-overlapping sub-intervals of at most `width` loci.
    /// A `width` of zero yields the interval itself.
    pub fn split(&self, width: u32) -> Vec<GenomicInterval> {
        if width == 0 || self.is_empty() {
            return vec![self.clone()];
        }
        let mut shards = Vec::new();
        let mut lo = self.start;
        loop {
            let hi = lo.saturating_add(width - 1).min(self.end);
            shards.push(GenomicInterval::new(self.contig.clone(), lo, hi));
            if hi == self.end {
                break;
            }
            lo = hi + 1;
        }
        shards
    }
}

impl fmt::Display for GenomicInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.start, self.end)
    }
}

impl FromStr for GenomicInterval {
    type Err = ParseError;

    /// Accepts `chr1:100-200`, `chr1:100` and suffixed forms such as `chr16:29.5M-29.7M`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let fail = |reason: &str| ParseError::Interval {
            text: text.to_string(),
            reason: reason.to_string(),
        };

        let (contig_text, range_text) = text
            .rsplit_once(':')
            .ok_or_else(|| fail("expected CONTIG:START-END"))?;
        let contig: Contig = contig_text.parse()?;

        let (start, end) = match range_text.split_once('-') {
            Some((lo, hi)) => (
                parse_position(lo).map_err(|reason| fail(&reason))?,
                parse_position(hi).map_err(|reason| fail(&reason))?,
            ),
            None => {
                let pos = parse_position(range_text).map_err(|reason| fail(&reason))?;
                (pos, pos)
            }
        };

        Ok(GenomicInterval::new(contig, start, end))
    }
}

impl TryFrom<String> for GenomicInterval {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GenomicInterval> for String {
    fn from(value: GenomicInterval) -> Self {
        value.to_string()
    }
}

/// Parses a position that may carry thousands separators and a `K`/`M` multiplier.
fn parse_position(raw: &str) -> Result<u32, String> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Err("empty position".to_string());
    }

    let (digits, multiplier) = match cleaned.chars().last() {
        Some('k' | 'K') => (&cleaned[..cleaned.len() - 1], 1_000u64),
        Some('m' | 'M') => (&cleaned[..cleaned.len() - 1], 1_000_000u64),
        _ => (cleaned.as_str(), 1u64),
    };

    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    let whole: u64 = whole
        .parse()
        .map_err(|_| format!("invalid position '{raw}'"))?;
    let mut value = whole
        .checked_mul(multiplier)
        .ok_or_else(|| format!("position '{raw}' overflows"))?;

    if !frac.is_empty() {
        let scale = u32::try_from(frac.len())
            .ok()
            .and_then(|digits| 10u64.checked_pow(digits))
            .ok_or_else(|| format!("position '{raw}' has too many decimals"))?;
        let frac_value: u64 = frac
            .parse()
            .map_err(|_| format!("invalid position '{raw}'"))?;
        if multiplier % scale != 0 {
            return Err(format!("position '{raw}' is not a whole base"));
        }
        value += frac_value * (multiplier / scale);
    }

    u32::try_from(value).map_err(|_| format!("position '{raw}' overflows"))
}

// ========================================================================================
//                                   Genotype calls
// ========================================================================================

/// A diploid genotype call: two optional allele indices plus a phasing flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenotypeCall {
    alleles: [Option<u16>; 2],
    phased: bool,
}

impl GenotypeCall {
    /// The call implied by a reference block.
    pub const HOM_REF: GenotypeCall = GenotypeCall {
        alleles: [Some(0), Some(0)],
        phased: false,
    };

    pub const NO_CALL: GenotypeCall = GenotypeCall {
        alleles: [None, None],
        phased: false,
    };

    pub fn new(first: Option<u16>, second: Option<u16>, phased: bool) -> Self {
        Self {
            alleles: [first, second],
            phased,
        }
    }

    pub fn alleles(&self) -> [Option<u16>; 2] {
        self.alleles
    }

    pub fn is_phased(&self) -> bool {
        self.phased
    }

    pub fn is_hom_ref(&self) -> bool {
        self.alleles == [Some(0), Some(0)]
    }

    pub fn is_missing(&self) -> bool {
        self.alleles.iter().all(Option::is_none)
    }
}

impl FromStr for GenotypeCall {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let phased = text.contains('|');
        let mut parts = text.split(['/', '|']);
        let parse_allele = |part: Option<&str>| -> Result<Option<u16>, ParseError> {
            match part {
                Some(".") => Ok(None),
                Some(value) => value
                    .parse::<u16>()
                    .map(Some)
                    .map_err(|_| ParseError::Genotype(text.to_string())),
                None => Err(ParseError::Genotype(text.to_string())),
            }
        };
        let first = parse_allele(parts.next())?;
        let second = parse_allele(parts.next())?;
        if parts.next().is_some() {
            return Err(ParseError::Genotype(text.to_string()));
        }
        Ok(GenotypeCall::new(first, second, phased))
    }
}

impl fmt::Display for GenotypeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |allele: Option<u16>| allele.map_or_else(|| ".".to_string(), |a| a.to_string());
        let sep = if self.phased { '|' } else { '/' };
        write!(f, "{}{sep}{}", render(self.alleles[0]), render(self.alleles[1]))
    }
}

// ========================================================================================
//                                  Reference genome
// ========================================================================================

const GRCH38_LENGTHS: [u32; 25] = [
    248_956_422,
    242_193_529,
    198_295_559,
    190_214_555,
    181_538_259,
    170_805_979,
    159_345_973,
    145_138_636,
    138_394_717,
    133_797_422,
    135_086_622,
    133_275_309,
    114_364_328,
    107_043_718,
    101_991_189,
    90_338_345,
    83_257_441,
    80_373_285,
    58_617_616,
    64_444_167,
    46_709_983,
    50_818_468,
    156_040_895,
    57_227_415,
    16_569,
];

/// Contig lengths for a reference assembly. Only used to bound intervals; the
/// ordering of contigs is fixed by [`Contig`] itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceGenome {
    pub name: String,
    contig_lengths: BTreeMap<Contig, u32>,
}

impl ReferenceGenome {
    pub fn grch38() -> Self {
        let contig_lengths = Contig::standard_set()
            .into_iter()
            .zip(GRCH38_LENGTHS)
            .collect();
        Self {
            name: "GRCh38".to_string(),
            contig_lengths,
        }
    }

    pub fn custom(name: impl Into<String>, lengths: impl IntoIterator<Item = (Contig, u32)>) -> Self {
        Self {
            name: name.into(),
            contig_lengths: lengths.into_iter().collect(),
        }
    }

    /// Adds or replaces contig lengths.
    pub fn with_lengths(mut self, lengths: impl IntoIterator<Item = (Contig, u32)>) -> Self {
        self.contig_lengths.extend(lengths);
        self
    }

    #[inline]
    pub fn contig_length(&self, contig: &Contig) -> Option<u32> {
        self.contig_lengths.get(contig).copied()
    }
}
