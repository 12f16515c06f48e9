// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read fixture {path}: {source}")]
    Fixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read fixture: {0}")]
    Io(#[from] std::io::Error),

    #[error("fixture line {line}: not a sync response: {source}\n  hint: each line must be one JSON object with at least `next_batch`")]
    BadBatch {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid --send '{0}'\n  hint: use ROOM_ID=BODY, e.g. '!room:example.org=hello'")]
    BadSend(String),

    #[error("no state directory on this system\n  hint: pass --store <dir> instead of --persist")]
    NoStateDir,

    #[error(transparent)]
    Client(#[from] mx_client::ClientError),

    #[error(transparent)]
    Store(#[from] mx_client::StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;
