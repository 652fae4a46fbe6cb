//! Adoption of files uploaded to the store root before category folders
//! existed.
//!
//! This is the only place a category is guessed from a file name. Everything
//! else takes the category from the folder a file was listed in.

use remote::Client;
use serde::Serialize;

use crate::category::{Category, FolderMap};
use crate::error::Result;

/// Guess the category of a legacy file from its name.
pub fn infer_category(name: &str) -> Option<Category> {
    if name.contains("data_") && !name.contains("compressed") {
        Some(Category::Raw)
    } else if name.to_lowercase().contains("model") {
        Some(Category::Models)
    } else if name.contains("compressed") {
        Some(Category::Compressed)
    } else {
        None
    }
}

/// What an adoption pass did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptionOutcome {
    pub adopted: usize,
    /// Files matching the marker whose category could not be inferred
    pub unrecognised: Vec<String>,
    pub failures: Vec<(String, String)>,
}

/// Move unfiled files whose name contains `marker` into their category
/// folder.
///
/// Only the listing can fail the pass; a failed move is recorded and the
/// file stays at the root.
pub fn adopt_unfiled(
    client: &Client,
    folders: &FolderMap,
    marker: &str,
) -> Result<AdoptionOutcome> {
    let mut outcome = AdoptionOutcome::default();

    for file in client.list_unfiled(marker)? {
        let Some(category) = infer_category(&file.name) else {
            log::debug!("Leaving {} at the root", file.name);
            outcome.unrecognised.push(file.name);
            continue;
        };
        let target = folders.get(category)?;
        match client.move_to_folder(&file.id, target) {
            Ok(()) => {
                log::info!("Adopted {} into {}", file.name, category);
                outcome.adopted += 1;
            }
            Err(e) => {
                log::warn!("Failed to adopt {}: {}", file.name, e);
                outcome.failures.push((file.name, e.to_string()));
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::FolderLayout;
    use chrono::{TimeZone, Utc};
    use remote::RetryPolicy;
    use remote::backend::memory::MemoryBackend;
    use std::sync::Arc;

    #[test]
    fn test_inference_rules() {
        assert_eq!(infer_category("forex_data_2024-01-02.csv"), Some(Category::Raw));
        assert_eq!(infer_category("forex_data_compressed.csv.gz"), Some(Category::Compressed));
        assert_eq!(infer_category("forex_LSTM_Model_v2.h5"), Some(Category::Models));
        assert_eq!(infer_category("forex_compressed_2023.gz"), Some(Category::Compressed));
        assert_eq!(infer_category("forex_notes.txt"), None);
    }

    #[test]
    fn test_raw_rule_wins_over_model() {
        assert_eq!(infer_category("forex_data_model_inputs.csv"), Some(Category::Raw));
    }

    #[test]
    fn test_adopts_matching_root_files() {
        let store = Arc::new(MemoryBackend::new());
        let client = Client::with_backend(Box::new(store.clone()))
            .with_retry_policy(RetryPolicy::no_retry());
        let mut folders = FolderMap::default();
        folders.resolve(&client, &FolderLayout::default()).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let raw = store.insert_unfiled("forex_data_1.csv", b"t\n1\n", t).unwrap();
        let model = store.insert_unfiled("forex_model.h5", b"", t).unwrap();
        let odd = store.insert_unfiled("forex_readme.txt", b"", t).unwrap();
        let other = store.insert_unfiled("holiday.jpg", b"", t).unwrap();
        store.fail_move(&model);

        let outcome = adopt_unfiled(&client, &folders, "forex").unwrap();

        assert_eq!(outcome.adopted, 1);
        assert_eq!(outcome.unrecognised, ["forex_readme.txt"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(store.parent_of(&raw).as_ref(), Some(folders.get(Category::Raw).unwrap()));
        assert_eq!(store.parent_of(&model), None);
        assert_eq!(store.parent_of(&odd), None);
        assert_eq!(store.parent_of(&other), None);
    }
}
