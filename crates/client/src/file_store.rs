// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed persistence.
//!
//! Layout of the store directory:
//! - `state.json`: sync token, filter ids and room snapshots, rewritten
//!   through a temporary file on every change
//! - `to_device.jsonl`: pending to-device batches, one per line, each append
//!   fsynced so a crash never loses an accepted batch

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StoreResult;
use crate::persistence::{Persistence, RoomSnapshot};
use crate::to_device::ToDeviceBatch;

const STATE_FILE_NAME: &str = "state.json";
const TO_DEVICE_FILE_NAME: &str = "to_device.jsonl";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sync_token: Option<String>,
    #[serde(default)]
    filters: BTreeMap<String, String>,
    #[serde(default)]
    rooms: BTreeMap<String, RoomSnapshot>,
    #[serde(default)]
    next_batch_id: u64,
}

/// Persistence in a directory on disk.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    state: Mutex<StoredState>,
}

impl FileStore {
    /// Opens (or creates) a store in `dir`.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        let state_path = dir.join(STATE_FILE_NAME);
        let state = match fs::read_to_string(&state_path) {
            Ok(content) if !content.trim().is_empty() => serde_json::from_str(&content)?,
            Ok(_) => StoredState::default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoredState::default(),
            Err(e) => return Err(e.into()),
        };
        // Ensure the queue file exists
        OpenOptions::new().create(true).append(true).open(dir.join(TO_DEVICE_FILE_NAME))?;

        Ok(FileStore { dir: dir.to_path_buf(), state: Mutex::new(state) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn to_device_path(&self) -> PathBuf {
        self.dir.join(TO_DEVICE_FILE_NAME)
    }

    fn save_state(&self, state: &StoredState) -> StoreResult<()> {
        let path = self.dir.join(STATE_FILE_NAME);
        let tmp = path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(serde_json::to_string_pretty(state)?.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn read_batches(&self) -> StoreResult<Vec<ToDeviceBatch>> {
        let file = match File::open(self.to_device_path()) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut batches = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            batches.push(serde_json::from_str(&line)?);
        }
        Ok(batches)
    }

    fn write_batches(&self, batches: &[ToDeviceBatch]) -> StoreResult<()> {
        let mut file = File::create(self.to_device_path())?;
        for batch in batches {
            writeln!(file, "{}", serde_json::to_string(batch)?)?;
        }
        file.sync_all()?;
        Ok(())
    }

    /// Updates the in-memory state and writes it out.
    async fn modify(&self, f: impl FnOnce(&mut StoredState)) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        f(&mut state);
        self.save_state(&state)
    }
}

impl Persistence for FileStore {
    fn get_saved_sync_token(&self) -> BoxFuture<'_, StoreResult<Option<String>>> {
        async move { Ok(self.state.lock().await.sync_token.clone()) }.boxed()
    }

    fn set_sync_token(&self, token: String) -> BoxFuture<'_, StoreResult<()>> {
        self.modify(move |state| state.sync_token = Some(token)).boxed()
    }

    fn store_room(&self, room: RoomSnapshot) -> BoxFuture<'_, StoreResult<()>> {
        self.modify(move |state| {
            state.rooms.insert(room.room_id.clone(), room);
        })
        .boxed()
    }

    fn get_room(&self, room_id: String) -> BoxFuture<'_, StoreResult<Option<RoomSnapshot>>> {
        async move { Ok(self.state.lock().await.rooms.get(&room_id).cloned()) }.boxed()
    }

    fn get_filter_id(&self, name: String) -> BoxFuture<'_, StoreResult<Option<String>>> {
        async move { Ok(self.state.lock().await.filters.get(&name).cloned()) }.boxed()
    }

    fn store_filter(&self, name: String, filter_id: String) -> BoxFuture<'_, StoreResult<()>> {
        self.modify(move |state| {
            state.filters.insert(name, filter_id);
        })
        .boxed()
    }

    fn save_to_device_batches(&self, batches: Vec<ToDeviceBatch>) -> BoxFuture<'_, StoreResult<Vec<u64>>> {
        async move {
            let mut state = self.state.lock().await;
            let mut file = OpenOptions::new().create(true).append(true).open(self.to_device_path())?;
            let mut ids = Vec::with_capacity(batches.len());
            for mut batch in batches {
                state.next_batch_id += 1;
                batch.id = state.next_batch_id;
                writeln!(file, "{}", serde_json::to_string(&batch)?)?;
                ids.push(batch.id);
            }
            file.sync_all()?;
            self.save_state(&state)?;
            Ok(ids)
        }
        .boxed()
    }

    fn get_oldest_to_device_batch(&self) -> BoxFuture<'_, StoreResult<Option<ToDeviceBatch>>> {
        async move {
            let _state = self.state.lock().await;
            Ok(self.read_batches()?.into_iter().next())
        }
        .boxed()
    }

    fn remove_to_device_batch(&self, id: u64) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            let _state = self.state.lock().await;
            let mut batches = self.read_batches()?;
            let before = batches.len();
            batches.retain(|batch| batch.id != id);
            if batches.len() != before {
                self.write_batches(&batches)?;
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
#[path = "file_store_tests.rs"]
mod tests;
