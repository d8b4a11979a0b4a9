use crate::model::Roster;
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Version courante du format de sauvegarde.
pub const SNAPSHOT_VERSION: u32 = 1;

pub trait Storage {
    /// Charge le planning depuis un support.
    fn load(&self) -> anyhow::Result<Roster>;
    /// Sauvegarde de manière atomique.
    fn save(&self, roster: &Roster) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    roster: Roster,
}

pub struct JsonStorage {
    path: PathBuf,
}

impl JsonStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Planning vide si le fichier n'existe pas encore.
    pub fn load_or_default(&self) -> anyhow::Result<Roster> {
        if self.path.exists() {
            self.load()
        } else {
            Ok(Roster::default())
        }
    }
}

impl Storage for JsonStorage {
    fn load(&self) -> anyhow::Result<Roster> {
        let data =
            fs::read(&self.path).with_context(|| format!("reading {}", self.path.display()))?;
        let snapshot: Snapshot = serde_json::from_slice(&data)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        if snapshot.version > SNAPSHOT_VERSION {
            bail!(
                "{} was written by a newer version (format {}, supported {})",
                self.path.display(),
                snapshot.version,
                SNAPSHOT_VERSION
            );
        }
        Ok(snapshot.roster)
    }

    fn save(&self, roster: &Roster) -> anyhow::Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            roster: roster.clone(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).with_context(|| "creating temp file")?;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).with_context(|| "atomic rename")?;
        Ok(())
    }
}
