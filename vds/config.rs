//! # Run Configuration
//!
//! Every knob of a validation run lives in one `ValidationConfig`, persisted as TOML.
//! All fields have defaults, so an empty file (or no file at all) describes the
//! standard run: every standard contig, a 1000-base block ceiling, GRCh38 bounds and
//! one worker per available core.

use crate::blocks::DEFAULT_MAX_BLOCK_LENGTH;
use crate::types::{Contig, GenomicInterval, ReferenceGenome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Default number of loci per densification shard.
pub const DEFAULT_SHARD_WIDTH: u32 = 100_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize config to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where contig lengths come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenomeConfig {
    /// `GRCh38` starts from the built-in table; any other name starts empty.
    pub build: String,
    /// Extra or replacement lengths, keyed by contig name.
    pub contig_lengths: BTreeMap<Contig, u32>,
}

impl Default for GenomeConfig {
    fn default() -> Self {
        Self {
            build: "GRCh38".to_string(),
            contig_lengths: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    pub max_block_length: u32,
    pub contigs: Vec<Contig>,
    pub threads: usize,
    /// Region densified as a spot check before the per-contig checks.
    pub probe_interval: Option<GenomicInterval>,
    pub densify_shard_width: u32,
    pub genome: GenomeConfig,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_block_length: DEFAULT_MAX_BLOCK_LENGTH,
            contigs: Contig::standard_set(),
            threads: num_cpus::get(),
            probe_interval: None,
            densify_shard_width: DEFAULT_SHARD_WIDTH,
            genome: GenomeConfig::default(),
        }
    }
}

impl ValidationConfig {
    /// Saves the configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads and validates a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_block_length == 0 {
            return Err(ConfigError::Invalid(
                "max_block_length must be positive".to_string(),
            ));
        }
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be positive".to_string()));
        }
        if self.contigs.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one contig must be checked".to_string(),
            ));
        }
        if self.densify_shard_width == 0 {
            return Err(ConfigError::Invalid(
                "densify_shard_width must be positive".to_string(),
            ));
        }
        let genome = self.reference_genome();
        if let Some(missing) = self
            .probe_interval
            .as_ref()
            .filter(|probe| genome.contig_length(&probe.contig).is_none())
        {
            return Err(ConfigError::Invalid(format!(
                "probe interval {missing} is on a contig unknown to {}",
                genome.name
            )));
        }
        Ok(())
    }

    pub fn reference_genome(&self) -> ReferenceGenome {
        let overrides = self
            .genome
            .contig_lengths
            .iter()
            .map(|(contig, len)| (contig.clone(), *len));
        if self.genome.build.eq_ignore_ascii_case("GRCh38") {
            ReferenceGenome::grch38().with_lengths(overrides)
        } else {
            ReferenceGenome::custom(self.genome.build.clone(), overrides)
        }
    }

    /// A dedicated rayon pool sized by `threads`.
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool, ConfigError> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("vdscheck-worker-{i}"))
            .build()?)
    }
}
