use crate::ids::PromotionId;
use crate::storage::traits::TokenStore;
use crate::token::Token;
use log::*;
use ron::ser::PrettyConfig;
use std::fs;
use std::path::PathBuf;

/// A file-based store for tokens.
///
/// Each token is saved in a file named after its promotion, e.g. `coffee-club.ron`. Promotion ids that are not safe
/// to use as file names are hex encoded behind a `~`, which never appears in a safe id. A token is written to a
/// temporary file first and then renamed over the old one, so a crash mid-write leaves the previous token intact.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Creates a new file store with the given path.
    ///
    /// # Arguments
    /// * `path` - The path to the directory where the token files will be stored. It is created if necessary.
    pub fn new(path: PathBuf) -> Result<Self, std::io::Error> {
        if !path.exists() {
            fs::create_dir_all(&path)?;
        }
        Ok(Self { path })
    }

    /// Returns the path to the directory where the token files are stored.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn file_path(&self, promotion_id: &PromotionId) -> PathBuf {
        let id = promotion_id.as_str();
        let safe = !id.is_empty()
            && !id.starts_with('.')
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        let stem = if safe { id.to_string() } else { format!("~{}", hex::encode(id)) };
        self.path.join(format!("{stem}.ron"))
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, promotion_id: &PromotionId) -> Result<Option<Token>, anyhow::Error> {
        let file_path = self.file_path(promotion_id);
        if !file_path.exists() {
            return Ok(None);
        }
        let val = fs::read_to_string(&file_path)?;
        let token: Token = ron::de::from_str(&val)?;
        if &token.promotion_id != promotion_id {
            anyhow::bail!("{} holds a token for {}, not {promotion_id}", file_path.display(), token.promotion_id);
        }
        Ok(Some(token))
    }

    fn put(&mut self, token: &Token) -> Result<(), anyhow::Error> {
        let file_path = self.file_path(&token.promotion_id);
        let tmp_path = file_path.with_extension("ron.tmp");
        let config = PrettyConfig::new().compact_arrays(true).compact_maps(true);
        let val = ron::ser::to_string_pretty(token, config)?;
        fs::write(&tmp_path, &val)?;
        fs::rename(&tmp_path, &file_path)?;
        trace!("Saved token for {} to {}", token.promotion_id, file_path.display());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Token>, anyhow::Error> {
        let mut tokens = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "ron") {
                let val = fs::read_to_string(&path)?;
                let token: Token = ron::de::from_str(&val)?;
                tokens.push(token);
            }
        }
        tokens.sort_by(|a, b| a.promotion_id.cmp(&b.promotion_id));
        Ok(tokens)
    }
}
