//! # Dataset Loading
//!
//! Reads an on-disk dataset into the in-memory stores. A dataset is a directory laid
//! out like the two joined tables it represents:
//!
//! ```text
//! <dataset>/
//! ├── reference_data/
//! │   ├── blocks.tsv    sample_id  contig  position  end  gq
//! │   └── samples.tsv   sample_id
//! └── variant_data/
//!     ├── calls.tsv     sample_id  contig  position  gt
//!     └── samples.tsv   sample_id
//! ```
//!
//! Row order in each `samples.tsv` defines that store's sample axis. Column names are
//! fixed. Loading is deliberately permissive about row content that is a *validation*
//! concern (zero GQ, inverted blocks, rows naming unknown samples): those rows are
//! loaded as-is so the checks can report them with full context.

use crate::blocks::{InMemoryReferenceBlocks, ReferenceBlock};
use crate::types::{Contig, GenotypeCall, Locus, SampleId};
use crate::validate::VariantDataset;
use crate::variants::{InMemoryVariants, VariantRecord};
use log::info;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("The required column '{column}' was not found in '{}'.", .path.display())]
    ColumnNotFound { column: String, path: PathBuf },
    #[error("Missing or null values were found in the required column '{0}'.")]
    MissingValuesFound(String),
    #[error("Invalid value in column '{column}' at data row {row}: {message}")]
    InvalidValue {
        column: String,
        row: usize,
        message: String,
    },
}

/// File locations inside a dataset directory.
#[derive(Debug, Clone)]
pub struct DatasetPaths {
    root: PathBuf,
}

impl DatasetPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reference_blocks(&self) -> PathBuf {
        self.root.join("reference_data").join("blocks.tsv")
    }

    pub fn reference_samples(&self) -> PathBuf {
        self.root.join("reference_data").join("samples.tsv")
    }

    pub fn variant_calls(&self) -> PathBuf {
        self.root.join("variant_data").join("calls.tsv")
    }

    pub fn variant_samples(&self) -> PathBuf {
        self.root.join("variant_data").join("samples.tsv")
    }
}

/// Loads both tables of a dataset directory.
pub fn load_dataset(
    root: &Path,
) -> Result<VariantDataset<InMemoryReferenceBlocks, InMemoryVariants>, DataError> {
    let paths = DatasetPaths::new(root);
    let reference_samples = load_sample_axis(&paths.reference_samples())?;
    let variant_samples = load_sample_axis(&paths.variant_samples())?;
    let reference = load_reference_blocks(&paths.reference_blocks(), reference_samples)?;
    let variants = load_variants(&paths.variant_calls(), variant_samples)?;
    Ok(VariantDataset::new(reference, variants))
}

/// Reads the ordered `sample_id` column of a samples file.
pub fn load_sample_axis(path: &Path) -> Result<Vec<SampleId>, DataError> {
    let df = read_tsv(path)?;
    let ids = internal::string_column(&df, "sample_id", path)?;
    Ok(ids.into_iter().map(SampleId::from).collect())
}

pub fn load_reference_blocks(
    path: &Path,
    samples: Vec<SampleId>,
) -> Result<InMemoryReferenceBlocks, DataError> {
    let df = read_tsv(path)?;
    let sample_ids = internal::string_column(&df, "sample_id", path)?;
    let contigs = internal::contig_column(&df, "contig", path)?;
    let positions = internal::u32_column(&df, "position", path, 1)?;
    let ends = internal::u32_column(&df, "end", path, 0)?;
    let qualities = internal::u32_column(&df, "gq", path, 0)?;

    let n_samples = samples.len();
    let blocks: Vec<ReferenceBlock> = sample_ids
        .into_iter()
        .zip(contigs)
        .zip(positions)
        .zip(ends)
        .zip(qualities)
        .map(|((((sample, contig), position), end), quality)| {
            ReferenceBlock::new(sample.as_str(), Locus::new(contig, position), end, quality)
        })
        .collect();

    info!(
        "Loaded {} reference blocks for {} samples from '{}'",
        blocks.len(),
        n_samples,
        path.display()
    );
    Ok(InMemoryReferenceBlocks::from_blocks(samples, blocks))
}

pub fn load_variants(path: &Path, samples: Vec<SampleId>) -> Result<InMemoryVariants, DataError> {
    let df = read_tsv(path)?;
    let sample_ids = internal::string_column(&df, "sample_id", path)?;
    let contigs = internal::contig_column(&df, "contig", path)?;
    let positions = internal::u32_column(&df, "position", path, 1)?;
    let calls = internal::string_column(&df, "gt", path)?
        .iter()
        .enumerate()
        .map(|(row, text)| {
            text.parse::<GenotypeCall>()
                .map_err(|err| DataError::InvalidValue {
                    column: "gt".to_string(),
                    row: row + 1,
                    message: err.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let n_samples = samples.len();
    let records: Vec<VariantRecord> = sample_ids
        .into_iter()
        .zip(contigs)
        .zip(positions)
        .zip(calls)
        .map(|(((sample, contig), position), call)| {
            VariantRecord::new(sample.as_str(), Locus::new(contig, position), call)
        })
        .collect();

    info!(
        "Loaded {} variant records for {} samples from '{}'",
        records.len(),
        n_samples,
        path.display()
    );
    Ok(InMemoryVariants::from_records(samples, records))
}

/// Reads a TSV with every column kept as text. Identifiers such as `007` must survive
/// verbatim, so numeric columns are parsed by the loaders rather than inferred.
fn read_tsv(path: &Path) -> Result<DataFrame, DataError> {
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(0))
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;
    Ok(df)
}

/// Column extraction helpers shared by the loaders.
mod internal {
    use super::*;

    fn required<'a>(df: &'a DataFrame, name: &str, path: &Path) -> Result<&'a Column, DataError> {
        let column = df.column(name).map_err(|_| DataError::ColumnNotFound {
            column: name.to_string(),
            path: path.to_path_buf(),
        })?;
        if column.null_count() > 0 {
            return Err(DataError::MissingValuesFound(name.to_string()));
        }
        Ok(column)
    }

    pub(super) fn string_column(
        df: &DataFrame,
        name: &str,
        path: &Path,
    ) -> Result<Vec<String>, DataError> {
        let column = required(df, name, path)?;
        let casted = column.cast(&DataType::String)?;
        let values: Vec<String> = casted
            .str()?
            .into_iter()
            .map(|value| value.unwrap_or_default().to_string())
            .collect();
        Ok(values)
    }

    pub(super) fn contig_column(
        df: &DataFrame,
        name: &str,
        path: &Path,
    ) -> Result<Vec<Contig>, DataError> {
        string_column(df, name, path)?
            .iter()
            .enumerate()
            .map(|(row, text)| {
                text.parse::<Contig>().map_err(|err| DataError::InvalidValue {
                    column: name.to_string(),
                    row: row + 1,
                    message: err.to_string(),
                })
            })
            .collect()
    }

    /// Parses an integer column and checks every value lies in `[minimum, u32::MAX]`.
    pub(super) fn u32_column(
        df: &DataFrame,
        name: &str,
        path: &Path,
        minimum: u32,
    ) -> Result<Vec<u32>, DataError> {
        string_column(df, name, path)?
            .iter()
            .enumerate()
            .map(|(row, text)| {
                let invalid = |message: String| DataError::InvalidValue {
                    column: name.to_string(),
                    row: row + 1,
                    message,
                };
                let value: i64 = text
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("'{text}' is not an integer")))?;
                u32::try_from(value)
                    .ok()
                    .filter(|v| *v >= minimum)
                    .ok_or_else(|| invalid(format!("{value} is outside [{minimum}, {}]", u32::MAX)))
            })
            .collect()
    }
}
