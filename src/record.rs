//! Output record of a noise correlation run and its persistence.
//!
//! A record holds the cross-correlogram of a cluster pair (`cross_corr`) and, when spikes
//! were jittered, the correlograms of every jittered replicate (`sh_corr`, a
//! `num_jitters x num_lags` matrix stored column by column). Records are written either as
//! MAT files (see [`crate::mat`]) or as JSON documents, where NaN coefficients are encoded
//! as `null`.
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::xcorr::{CrossCorrelogram, ShuffleCorrelogramSet};
use crate::error::NCError;
use crate::mat::{self, MatVariable};

/// Key of the cross-correlogram of the spike trains.
pub const CROSS_CORR_KEY: &str = "cross_corr";
/// Key of the cross-correlograms of the jittered spike trains.
pub const SHUFFLE_CORR_KEY: &str = "sh_corr";

/// File format of the output records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    #[default]
    Mat,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Mat => "mat",
        }
    }

    /// Guess the format from the extension of a file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, NCError> {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(OutputFormat::Json),
            Some("mat") => Ok(OutputFormat::Mat),
            _ => Err(NCError::FormatError(format!(
                "unknown record format for {}",
                path.as_ref().display()
            ))),
        }
    }
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| if v.is_nan() { None } else { Some(*v) }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

/// A dense matrix stored column by column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShuffleMatrix {
    rows: usize,
    cols: usize,
    #[serde(with = "nan_as_null")]
    data: Vec<f64>,
}

impl ShuffleMatrix {
    pub fn build(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, NCError> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(NCError::FormatError(format!(
                "a {}x{} matrix cannot hold {} values",
                rows,
                cols,
                data.len()
            )));
        }
        Ok(ShuffleMatrix { rows, cols, data })
    }

    pub fn from_set(set: &ShuffleCorrelogramSet) -> Self {
        ShuffleMatrix {
            rows: set.num_shuffles(),
            cols: set.num_lags(),
            data: set.to_column_major(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the values in column-major order.
    pub fn data(&self) -> &[f64] {
        &self.data[..]
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        Some(self.data[col * self.rows + row])
    }
}

/// The result of a noise correlation run for one cluster pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseCorrRecord {
    /// Name of the cluster pair, `<clusterA>-<clusterB>`.
    pub pair: String,
    #[serde(with = "nan_as_null")]
    pub cross_corr: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sh_corr: Option<ShuffleMatrix>,
}

impl NoiseCorrRecord {
    pub fn new(
        cluster_a: &str,
        cluster_b: &str,
        cross_corr: &CrossCorrelogram,
        sh_corr: Option<&ShuffleCorrelogramSet>,
    ) -> Self {
        NoiseCorrRecord {
            pair: pair_name(cluster_a, cluster_b),
            cross_corr: cross_corr.values().to_vec(),
            sh_corr: sh_corr.map(ShuffleMatrix::from_set),
        }
    }

    /// Returns the file name of the record, `<clusterA>-<clusterB>.<ext>`.
    pub fn file_name(&self, format: OutputFormat) -> String {
        format!("{}.{}", self.pair, format.extension())
    }

    /// Save the record in the given directory and return the path of the written file.
    pub fn save_in<P: AsRef<Path>>(&self, dir: P, format: OutputFormat) -> Result<PathBuf, NCError> {
        let path = dir.as_ref().join(self.file_name(format));
        self.save_to(&path, format)?;
        Ok(path)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P, format: OutputFormat) -> Result<(), NCError> {
        match format {
            OutputFormat::Json => {
                let file = File::create(path)?;
                let mut writer = BufWriter::new(file);
                serde_json::to_writer_pretty(&mut writer, self)
                    .map_err(|e| NCError::IOError(e.to_string()))?;
                writer.flush()?;
                Ok(())
            }
            OutputFormat::Mat => {
                let mut variables = vec![MatVariable::column(CROSS_CORR_KEY, self.cross_corr.clone())];
                if let Some(sh_corr) = &self.sh_corr {
                    variables.push(MatVariable::build(
                        SHUFFLE_CORR_KEY,
                        sh_corr.rows,
                        sh_corr.cols,
                        sh_corr.data.clone(),
                    )?);
                }
                mat::save_to(path, &variables)
            }
        }
    }

    /// Load a record, the format being guessed from the file extension.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<NoiseCorrRecord, NCError> {
        match OutputFormat::from_path(&path)? {
            OutputFormat::Json => {
                let file = File::open(path)?;
                let reader = BufReader::new(file);
                serde_json::from_reader(reader).map_err(|e| NCError::IOError(e.to_string()))
            }
            OutputFormat::Mat => {
                let pair = path
                    .as_ref()
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let variables = mat::load_from(&path)?;
                let cross_corr = variables
                    .iter()
                    .find(|v| v.name() == CROSS_CORR_KEY)
                    .ok_or_else(|| NCError::FormatError(format!("missing variable {}", CROSS_CORR_KEY)))?
                    .data()
                    .to_vec();
                let sh_corr = match variables.iter().find(|v| v.name() == SHUFFLE_CORR_KEY) {
                    Some(v) => Some(ShuffleMatrix::build(v.rows(), v.cols(), v.data().to_vec())?),
                    None => None,
                };
                Ok(NoiseCorrRecord {
                    pair,
                    cross_corr,
                    sh_corr,
                })
            }
        }
    }
}

/// Returns the name of a cluster pair.
pub fn pair_name(cluster_a: &str, cluster_b: &str) -> String {
    format!("{}-{}", cluster_a, cluster_b)
}
