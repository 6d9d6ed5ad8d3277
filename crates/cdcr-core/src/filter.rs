//! Case-insensitive substring filtering over a previous linking result.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ClusterMap, FileMentions};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter value is required")]
    MissingValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub filtered_mentions: Vec<String>,
    pub filtered_files: FileMentions,
    pub mention_count: usize,
}

/// Select the mentions containing `value`, ignoring case.
///
/// `filtered_mentions` walks the cluster map in the caller's order and
/// `mention_count` counts those matches, duplicates included. Files with
/// no matching mention are left out of `filtered_files`. The maps are taken
/// as given; nothing checks that they came from the same batch.
pub fn filter_mentions(
    value: &str,
    clusters: &ClusterMap,
    file_mentions: &FileMentions,
) -> Result<FilterOutcome, FilterError> {
    if value.is_empty() {
        return Err(FilterError::MissingValue);
    }
    let needle = value.to_lowercase();
    let matches = |mention: &&String| mention.to_lowercase().contains(&needle);

    let filtered_mentions: Vec<String> = clusters
        .values()
        .flat_map(|mentions| mentions.iter().filter(matches).cloned())
        .collect();

    let filtered_files: FileMentions = file_mentions
        .iter()
        .filter_map(|(filename, mentions)| {
            let hits: Vec<String> = mentions.iter().filter(matches).cloned().collect();
            (!hits.is_empty()).then(|| (filename.clone(), hits))
        })
        .collect();

    Ok(FilterOutcome {
        mention_count: filtered_mentions.len(),
        filtered_mentions,
        filtered_files,
    })
}
