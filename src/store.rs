use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::{AuthError, StoredCredentials};

const STORE_DIR: &str = ".topos";
const STORE_FILE: &str = "credentials.json";

/// Owns the single credential record on disk.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.topos/credentials.json`
    pub fn default_location() -> Result<Self, AuthError> {
        let home = dirs::home_dir().ok_or(AuthError::NoHomeDirectory)?;
        Ok(Self::new(home.join(STORE_DIR).join(STORE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the whole record. The new contents go to a uniquely named
    /// sibling file that is renamed over the old one, so readers see either
    /// the previous record or the new one, and concurrent writers never share
    /// a temp file.
    pub async fn save(&self, credentials: &StoredCredentials) -> Result<(), AuthError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        create_private_dir(&parent).await?;

        let contents = serde_json::to_vec_pretty(credentials).map_err(|err| {
            AuthError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
        })?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_replacing(&parent, &path, &contents))
            .await
            .map_err(std::io::Error::other)??;

        tracing::debug!(path = %self.path.display(), "saved credentials");
        Ok(())
    }

    /// Loads the record. A missing file and an unreadable one are reported
    /// as different errors.
    pub async fn load(&self) -> Result<StoredCredentials, AuthError> {
        let contents = match fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::CredentialsNotFound {
                    path: self.path.clone(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        serde_json::from_slice(&contents).map_err(|source| AuthError::CredentialsCorrupt {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(unix)]
async fn create_private_dir(path: &Path) -> Result<(), AuthError> {
    if fs::try_exists(path).await? {
        return Ok(());
    }
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
        .await?;
    Ok(())
}

#[cfg(not(unix))]
async fn create_private_dir(path: &Path) -> Result<(), AuthError> {
    fs::create_dir_all(path).await?;
    Ok(())
}

// NamedTempFile is created 0600 on unix and removed again if persisting fails.
fn write_replacing(dir: &Path, path: &Path, contents: &[u8]) -> Result<(), AuthError> {
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}
