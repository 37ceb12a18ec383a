use crate::archive::error::ArchiveError;
use crate::archive::key::{day_dir, entry_file_name, ArchiveKey, ENTRY_EXTENSION, STATIONS_DIR};
use crate::types::indicativo::Indicativo;
use chrono::NaiveDate;
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::Builder as TempFileBuilder;
use tokio::{fs, task};

/// Write-once, file-per-entity JSON archive.
///
/// An entry exists exactly when its final path exists. Entries are written to
/// a temporary file in the destination directory and then linked into place
/// without clobbering, so an interrupted write never leaves a truncated file
/// at the final path.
///
/// A day directory under `valores-climatologicos/` only ever appears complete:
/// [`ArchiveStore::put_day`] stages a new day in a hidden sibling directory and
/// renames it into place once every entry is on disk. Leftovers of killed
/// writes (`.tmp-*` files and directories) are removed the next time the
/// directory holding them is written to. The archive assumes a single writer.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &ArchiveKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    pub async fn exists(&self, key: &ArchiveKey) -> bool {
        fs::metadata(self.path_for(key))
            .await
            .is_ok_and(|metadata| metadata.is_file())
    }

    /// Writes `payload` for `key` unless an entry is already there.
    ///
    /// Returns `Ok(true)` if this call created the entry and `Ok(false)` if it
    /// already existed. Existing entries are never rewritten.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        key: &ArchiveKey,
        payload: &T,
    ) -> Result<bool, ArchiveError> {
        let path = self.path_for(key);
        if self.exists(key).await {
            debug!("Archive entry for {} already present at {:?}", key, path);
            return Ok(false);
        }

        let bytes = encode(payload, &path)?;

        let dir = path
            .parent()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ArchiveError::DirCreation(dir.clone(), e))?;

        task::spawn_blocking(move || write_new_entry(&dir, &path, &bytes)).await?
    }

    /// Writes every station's `payload` for `date`, returning how many entries
    /// this call created.
    ///
    /// If the day has no directory yet, all entries are staged together and the
    /// directory is published in one rename, so the day becomes visible to
    /// [`ArchiveStore::has_any_record_on`] only once it is complete. If the
    /// directory already exists, missing entries are added one by one.
    pub async fn put_day<T: Serialize>(
        &self,
        date: NaiveDate,
        entries: &BTreeMap<Indicativo, T>,
    ) -> Result<usize, ArchiveError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let day = self.root.join(day_dir(&date));
        if is_dir(&day).await {
            return self.put_missing(date, &day, entries).await;
        }

        let mut encoded = Vec::with_capacity(entries.len());
        for (station, payload) in entries {
            let file_name = entry_file_name(station);
            let bytes = encode(payload, &day.join(&file_name))?;
            encoded.push((file_name, bytes));
        }

        let month = day
            .parent()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        fs::create_dir_all(&month)
            .await
            .map_err(|e| ArchiveError::DirCreation(month.clone(), e))?;
        remove_stale_partials(&month).await?;

        let target = day.clone();
        let published =
            task::spawn_blocking(move || publish_day(&month, &target, &encoded)).await??;
        if published {
            return Ok(entries.len());
        }

        debug!("Day directory {:?} appeared while staging, filling it instead", day);
        self.put_missing(date, &day, entries).await
    }

    async fn put_missing<T: Serialize>(
        &self,
        date: NaiveDate,
        day: &Path,
        entries: &BTreeMap<Indicativo, T>,
    ) -> Result<usize, ArchiveError> {
        remove_stale_partials(day).await?;
        let mut written = 0;
        for (station, payload) in entries {
            let key = ArchiveKey::Record {
                date,
                station: station.clone(),
            };
            if self.put(&key, payload).await? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Removes leftovers of interrupted station writes.
    pub async fn clean_stations_dir(&self) -> Result<(), ArchiveError> {
        remove_stale_partials(&self.root.join(STATIONS_DIR)).await
    }

    /// Whether any station entry has been archived.
    pub async fn has_any_station(&self) -> Result<bool, ArchiveError> {
        dir_has_entry(&self.root.join(STATIONS_DIR)).await
    }

    /// Whether at least one station has an entry for `date`.
    pub async fn has_any_record_on(&self, date: NaiveDate) -> Result<bool, ArchiveError> {
        dir_has_entry(&self.root.join(day_dir(&date))).await
    }
}

fn encode<T: Serialize + ?Sized>(payload: &T, path: &Path) -> Result<Vec<u8>, ArchiveError> {
    let mut bytes = serde_json::to_vec_pretty(payload)
        .map_err(|e| ArchiveError::Encode(path.to_path_buf(), e))?;
    bytes.push(b'\n');
    Ok(bytes)
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_dir())
}

/// Stages `entries` in a hidden directory next to `day`, then renames it to `day`.
///
/// Returns `Ok(false)` if `day` was created by someone else in the meantime;
/// the staged copy is discarded.
fn publish_day(
    month: &Path,
    day: &Path,
    entries: &[(String, Vec<u8>)],
) -> Result<bool, ArchiveError> {
    let write_err = |e| ArchiveError::Write(day.to_path_buf(), e);

    let staging = TempFileBuilder::new()
        .prefix(".tmp-")
        .tempdir_in(month)
        .map_err(write_err)?;
    for (file_name, bytes) in entries {
        let path = staging.path().join(file_name);
        let mut file = std::fs::File::create(&path)
            .map_err(|e| ArchiveError::Write(path.clone(), e))?;
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| ArchiveError::Write(path.clone(), e))?;
    }

    match std::fs::rename(staging.path(), day) {
        Ok(()) => Ok(true),
        Err(_) if day.is_dir() => Ok(false),
        Err(e) => Err(ArchiveError::Publish(day.to_path_buf(), e)),
    }
}

/// Deletes `.tmp-*` entries in `dir` left behind by killed writes.
async fn remove_stale_partials(dir: &Path) -> Result<(), ArchiveError> {
    let read_err = |e| ArchiveError::ReadDir(dir.to_path_buf(), e);

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(read_err(e)),
    };
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        if !entry.file_name().to_string_lossy().starts_with(".tmp-") {
            continue;
        }
        let path = entry.path();
        warn!("Removing stale temporary entry {:?}", path);
        let removed = if entry.file_type().await.map_err(read_err)?.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        match removed {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArchiveError::Cleanup(path, e)),
        }
    }
    Ok(())
}

fn write_new_entry(dir: &Path, path: &Path, bytes: &[u8]) -> Result<bool, ArchiveError> {
    let write_err = |e| ArchiveError::Write(path.to_path_buf(), e);

    let mut temp = TempFileBuilder::new()
        .prefix(".tmp-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(write_err)?;
    temp.write_all(bytes).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;

    match temp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
            debug!("Archive entry {:?} appeared while writing, keeping it", path);
            Ok(false)
        }
        Err(e) => Err(ArchiveError::Publish(path.to_path_buf(), e.error)),
    }
}

async fn dir_has_entry(dir: &Path) -> Result<bool, ArchiveError> {
    let read_err = |e| ArchiveError::ReadDir(dir.to_path_buf(), e);

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(read_err(e)),
    };
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let path = entry.path();
        let is_entry = path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
            && entry.file_type().await.map_err(read_err)?.is_file();
        if is_entry {
            return Ok(true);
        }
    }
    Ok(false)
}
