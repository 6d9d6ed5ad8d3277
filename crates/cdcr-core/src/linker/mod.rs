//! Mention linking: TF-IDF vectors grouped by Ward agglomerative clustering.

use thiserror::Error;

use crate::ClusterMap;

pub mod cluster;
pub mod vectorize;

pub use cluster::{Merge, agglomerative_ward, ward_merges};
pub use vectorize::{SparseVector, TfidfVectorizer};

/// Default Ward distance below which clusters are merged.
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 1.5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("empty vocabulary: no mention contains a token of two or more word characters")]
    EmptyVocabulary,
    #[error("invalid distance threshold {0}: must be finite and positive")]
    InvalidThreshold(f64),
}

/// Linker settings.
#[derive(Debug, Clone)]
pub struct LinkerConfig {
    pub distance_threshold: f64,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

/// Group mentions into clusters of likely co-referring strings.
///
/// Every mention lands in exactly one cluster, and each cluster keeps its
/// mentions in input order. Labels are `"0"`, `"1"`, ... in order of first
/// appearance. Zero mentions give an empty map and a single mention gives
/// `{"0": [mention]}`; neither is vectorised.
pub fn link_mentions(mentions: &[String], config: &LinkerConfig) -> Result<ClusterMap, LinkError> {
    let threshold = config.distance_threshold;
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(LinkError::InvalidThreshold(threshold));
    }

    let labels = match mentions.len() {
        0 => return Ok(ClusterMap::new()),
        1 => vec![0],
        _ => {
            let rows = TfidfVectorizer::new().fit_transform(mentions)?;
            agglomerative_ward(&rows, threshold)
        }
    };

    let mut clusters = ClusterMap::new();
    for (mention, label) in mentions.iter().zip(labels) {
        clusters
            .entry(label.to_string())
            .or_default()
            .push(mention.clone());
    }
    Ok(clusters)
}
