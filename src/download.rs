//! HuggingFace Hub checkpoint fetcher.
//!
//! Downloads the IndexTTS checkpoint files from a HuggingFace repository
//! into the configured model directory, so a fresh host can start serving
//! without provisioning the checkpoints by hand.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hf_hub::api::sync::Api;

/// Files that make up an IndexTTS 1.x checkpoint.
pub const CHECKPOINT_FILES: &[&str] = &[
    "config.yaml",
    "bpe.model",
    "gpt.pth",
    "dvae.pth",
    "bigvgan_generator.pth",
    "bigvgan_discriminator.pth",
    "unigram_12000.vocab",
];

/// Expand bare model names (e.g. `IndexTTS-1.5` → `IndexTeam/IndexTTS-1.5`).
pub fn normalize_repo_id(repo_id: &str) -> String {
    if repo_id.contains('/') {
        repo_id.to_string()
    } else {
        format!("IndexTeam/{}", repo_id)
    }
}

/// Download a single file from a HuggingFace repository into the hub cache.
fn hf_download(api: &Api, repo_id: &str, filename: &str) -> Result<PathBuf> {
    let repo = api.model(repo_id.to_string());
    repo.get(filename)
        .with_context(|| format!("Failed to download '{}' from '{}'", filename, repo_id))
}

/// Fetch every checkpoint file missing from `model_dir`.
///
/// Files already present are left alone. Blocking; run off the async
/// runtime.
pub fn fetch_checkpoints(repo_id: &str, model_dir: &Path) -> Result<()> {
    let repo_id = normalize_repo_id(repo_id);
    std::fs::create_dir_all(model_dir)
        .with_context(|| format!("Cannot create model directory {}", model_dir.display()))?;

    let missing: Vec<&str> = CHECKPOINT_FILES
        .iter()
        .copied()
        .filter(|f| !model_dir.join(f).exists())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    tracing::info!(repo = %repo_id, files = missing.len(), "downloading IndexTTS checkpoints");
    let api = Api::new().context("Failed to initialise HuggingFace Hub client")?;

    for name in missing {
        tracing::info!(file = name, "downloading");
        let cached = hf_download(&api, &repo_id, name)?;
        let dest = model_dir.join(name);
        std::fs::copy(&cached, &dest).with_context(|| {
            format!("Cannot copy {} to {}", cached.display(), dest.display())
        })?;
    }
    tracing::info!(model_dir = %model_dir.display(), "checkpoints ready");
    Ok(())
}
