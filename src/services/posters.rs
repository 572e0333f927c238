use std::collections::HashSet;
use std::path::PathBuf;

use bytes::Bytes;
use image::ImageFormat;
use tokio::sync::RwLock;

use crate::error::ApiError;

pub const MAX_POSTER_BYTES: usize = 5 * 1024 * 1024;

/// Poster images on disk, addressed as `<email>_<movie_id>.png`.
///
/// Existence is answered from a listing snapshot taken at startup and
/// kept current by uploads, not by re-reading the directory per request.
pub struct PosterStore {
    dir: PathBuf,
    index: RwLock<HashSet<String>>,
}

impl PosterStore {
    /// Snapshot the `.png` files already present in `dir`.
    pub async fn load(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut names = HashSet::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".png") {
                names.insert(name);
            }
        }
        tracing::info!("Poster index loaded: {} files in {}", names.len(), dir.display());
        Ok(Self::with_snapshot(dir, names))
    }

    pub fn with_snapshot(dir: impl Into<PathBuf>, names: HashSet<String>) -> Self {
        Self { dir: dir.into(), index: RwLock::new(names) }
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.index.read().await.contains(name)
    }

    /// Movie ids this email has posters for, sorted.
    pub async fn movies_for(&self, email: &str) -> Vec<String> {
        let prefix = format!("{}_", email.to_lowercase());
        let index = self.index.read().await;
        let mut ids: Vec<String> = index
            .iter()
            .filter_map(|name| name.strip_prefix(&prefix)?.strip_suffix(".png"))
            .map(str::to_string)
            .collect();
        ids.sort();
        ids
    }

    pub async fn save(&self, email: &str, movie_id: &str, data: Bytes) -> Result<String, ApiError> {
        let name = poster_file_name(email, movie_id)?;
        if data.is_empty() {
            return Err(ApiError::validation("No file provided"));
        }
        if data.len() > MAX_POSTER_BYTES {
            return Err(ApiError::validation("File too large (max 5 MB)"));
        }
        if !matches!(image::guess_format(&data), Ok(ImageFormat::Png)) {
            return Err(ApiError::validation("Posters must be PNG images"));
        }

        tokio::fs::write(self.dir.join(&name), &data)
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to write poster {name}: {e}")))?;
        self.index.write().await.insert(name.clone());
        Ok(name)
    }

    pub async fn read(&self, email: &str, movie_id: &str) -> Result<Vec<u8>, ApiError> {
        let name = poster_file_name(email, movie_id)?;
        if !self.contains(&name).await {
            return Err(ApiError::not_found("Poster not found"));
        }
        tokio::fs::read(self.dir.join(&name))
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to read poster {name}: {e}")))
    }
}

/// `<email>_<movie_id>.png`, refusing anything that could escape the directory.
pub fn poster_file_name(email: &str, movie_id: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    let email_ok = !email.is_empty()
        && email.contains('@')
        && email
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '+' | '-'))
        && !email.contains("..");
    if !email_ok {
        return Err(ApiError::validation("Email cannot be used as a poster key"));
    }

    let movie_ok = (1..=64).contains(&movie_id.len())
        && movie_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !movie_ok {
        return Err(ApiError::validation("movie_id must be 1-64 letters, digits or dashes"));
    }

    Ok(format!("{email}_{movie_id}.png"))
}
