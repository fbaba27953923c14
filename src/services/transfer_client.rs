//! src/services/transfer_client.rs
//!
//! Transfer sessions against the remote file server. A session is opened per
//! request, used for a few directory/put/list commands, and closed before the
//! request finishes. The FTP implementation drives `suppaftp`'s blocking
//! client on tokio's blocking pool so no FTP I/O happens on a runtime worker.

use crate::{
    config::FtpConfig,
    models::remote::{EntryKind, RemoteEntry},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{io::Cursor, str::FromStr, sync::Arc};
use suppaftp::{FtpError, FtpResult, FtpStream, Status, list::File, types::FileType};
use thiserror::Error;
use tokio::task;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("could not connect to {addr}: {message}")]
    Connection {
        addr: String,
        code: Option<u32>,
        message: String,
    },
    #[error("remote path `{0}` already exists")]
    AlreadyExists(String),
    #[error("transfer of `{path}` failed: {message}")]
    Transfer {
        path: String,
        code: Option<u32>,
        message: String,
    },
    #[error("no open transfer session")]
    NotConnected,
}

impl TransferError {
    /// FTP reply code when the server sent one, otherwise a symbolic kind.
    pub fn code(&self) -> String {
        match self {
            Self::Connection { code: Some(c), .. } | Self::Transfer { code: Some(c), .. } => {
                c.to_string()
            }
            Self::Connection { .. } => "CONNECTION_ERROR".into(),
            Self::Transfer { .. } => "TRANSFER_ERROR".into(),
            Self::AlreadyExists(_) => "ALREADY_EXISTS".into(),
            Self::NotConnected => "NOT_CONNECTED".into(),
        }
    }

    fn connection(addr: &str, err: FtpError) -> Self {
        Self::Connection {
            addr: addr.to_string(),
            code: reply_code(&err),
            message: err.to_string(),
        }
    }

    fn transfer(path: &str, err: FtpError) -> Self {
        Self::Transfer {
            path: path.to_string(),
            code: reply_code(&err),
            message: err.to_string(),
        }
    }
}

pub type TransferResult<T> = Result<T, TransferError>;

/// One session against the remote store.
#[async_trait]
pub trait TransferClient: Send {
    /// Connect and authenticate.
    async fn open(&mut self) -> TransferResult<()>;

    /// Create `path` and any missing parents. An existing directory is not an error.
    async fn ensure_directory(&mut self, path: &str) -> TransferResult<()>;

    /// Write `bytes` to `remote_dir/filename` and return the final remote path.
    async fn put(&mut self, bytes: Bytes, remote_dir: &str, filename: &str)
    -> TransferResult<String>;

    async fn list(&mut self, path: &str) -> TransferResult<Vec<RemoteEntry>>;

    /// End the session. Safe to call repeatedly or without a successful `open`.
    async fn close(&mut self);
}

/// Hands out fresh, unopened sessions. Shared across requests; sessions are not.
pub trait TransferConnector: Send + Sync {
    fn session(&self) -> Box<dyn TransferClient>;
}

/// Join a remote directory and a file name with exactly one separator.
pub fn join_remote(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Every ancestor of `path` followed by `path` itself: `/a/b` → `/a`, `/a/b`.
fn directory_chain(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut current = String::new();
    let mut chain = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if absolute || !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        chain.push(current.clone());
    }
    chain
}

fn reply_code(err: &FtpError) -> Option<u32> {
    match err {
        FtpError::UnexpectedResponse(resp) => Some(resp.status.code()),
        _ => None,
    }
}

/// Classify the reply to `MKD dir`. Servers answer 550 both for an existing
/// directory and for a real refusal (permissions, missing parent), so a 550
/// only counts as `AlreadyExists` once `exists` confirms the directory is there.
fn classify_mkdir<F>(dir: &str, reply: FtpResult<()>, exists: F) -> TransferResult<()>
where
    F: FnOnce(&str) -> bool,
{
    match reply {
        Ok(()) => Ok(()),
        Err(FtpError::UnexpectedResponse(resp)) if resp.status == Status::FileUnavailable => {
            if exists(dir) {
                Err(TransferError::AlreadyExists(dir.to_string()))
            } else {
                Err(TransferError::transfer(dir, FtpError::UnexpectedResponse(resp)))
            }
        }
        Err(err) => Err(TransferError::transfer(dir, err)),
    }
}

/// `CWD` into `dir` and back to the previous working directory.
fn directory_exists(stream: &mut FtpStream, dir: &str) -> bool {
    let Ok(previous) = stream.pwd() else {
        return false;
    };
    if stream.cwd(dir).is_err() {
        return false;
    }
    if let Err(err) = stream.cwd(previous.as_str()) {
        warn!(%dir, %previous, error = %err, "could not restore ftp working directory");
    }
    true
}

fn parse_list_line(line: &str) -> Option<RemoteEntry> {
    let file = File::from_str(line).ok()?;
    let kind = if file.is_directory() {
        EntryKind::Directory
    } else if file.is_symlink() {
        EntryKind::Symlink
    } else {
        EntryKind::File
    };
    Some(RemoteEntry {
        name: file.name().to_string(),
        kind,
        size: file.size() as u64,
        modified: Some(DateTime::<Utc>::from(file.modified())),
    })
}

/// Creates `FtpTransferClient` sessions from the shared configuration.
#[derive(Clone)]
pub struct FtpConnector {
    config: Arc<FtpConfig>,
}

impl FtpConnector {
    pub fn new(config: Arc<FtpConfig>) -> Self {
        Self { config }
    }
}

impl TransferConnector for FtpConnector {
    fn session(&self) -> Box<dyn TransferClient> {
        Box::new(FtpTransferClient::new(self.config.clone()))
    }
}

/// FTP session backed by `suppaftp`'s blocking stream.
pub struct FtpTransferClient {
    config: Arc<FtpConfig>,
    stream: Option<FtpStream>,
}

impl FtpTransferClient {
    pub fn new(config: Arc<FtpConfig>) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    /// Run one blocking FTP command on the blocking pool, handing the stream
    /// over and back. A panicked command loses the stream and ends the session.
    async fn with_stream<T, F>(&mut self, op: F) -> TransferResult<T>
    where
        F: FnOnce(&mut FtpStream) -> TransferResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut stream = self.stream.take().ok_or(TransferError::NotConnected)?;
        let (stream, result) = task::spawn_blocking(move || {
            let result = op(&mut stream);
            (stream, result)
        })
        .await
        .map_err(|err| TransferError::Transfer {
            path: String::new(),
            code: None,
            message: format!("ftp task failed: {}", err),
        })?;
        self.stream = Some(stream);
        result
    }
}

#[async_trait]
impl TransferClient for FtpTransferClient {
    async fn open(&mut self) -> TransferResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let config = self.config.clone();
        let addr = config.addr();
        let stream = task::spawn_blocking(move || -> TransferResult<FtpStream> {
            let addr = config.addr();
            let mut stream = FtpStream::connect(addr.as_str())
                .map_err(|err| TransferError::connection(&addr, err))?;
            stream
                .login(config.user.as_str(), config.password.as_str())
                .map_err(|err| TransferError::connection(&addr, err))?;
            stream
                .transfer_type(FileType::Binary)
                .map_err(|err| TransferError::connection(&addr, err))?;
            Ok(stream)
        })
        .await
        .map_err(|err| TransferError::Connection {
            addr: addr.clone(),
            code: None,
            message: format!("ftp task failed: {}", err),
        })??;

        debug!(%addr, user = %self.config.user, "ftp session opened");
        self.stream = Some(stream);
        Ok(())
    }

    async fn ensure_directory(&mut self, path: &str) -> TransferResult<()> {
        for dir in directory_chain(path) {
            let target = dir.clone();
            let outcome = self
                .with_stream(move |stream| {
                    let reply = stream.mkdir(target.as_str());
                    classify_mkdir(&target, reply, |d| directory_exists(stream, d))
                })
                .await;
            match outcome {
                Ok(()) => debug!(%dir, "created remote directory"),
                Err(TransferError::AlreadyExists(_)) => {
                    debug!(%dir, "remote directory already present")
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn put(
        &mut self,
        bytes: Bytes,
        remote_dir: &str,
        filename: &str,
    ) -> TransferResult<String> {
        let full_path = join_remote(remote_dir, filename);
        let target = full_path.clone();
        let size = bytes.len();
        self.with_stream(move |stream| {
            let mut reader = Cursor::new(bytes);
            stream
                .put_file(target.as_str(), &mut reader)
                .map(|_| ())
                .map_err(|err| TransferError::transfer(&target, err))
        })
        .await?;
        debug!(path = %full_path, size, "uploaded file to ftp");
        Ok(full_path)
    }

    async fn list(&mut self, path: &str) -> TransferResult<Vec<RemoteEntry>> {
        let target = path.to_string();
        let lines = self
            .with_stream(move |stream| {
                stream
                    .list(Some(target.as_str()))
                    .map_err(|err| TransferError::transfer(&target, err))
            })
            .await?;

        let entries = lines
            .iter()
            .filter_map(|line| {
                let entry = parse_list_line(line);
                if entry.is_none() {
                    debug!(%line, "skipping unparseable LIST line");
                }
                entry
            })
            .collect();
        Ok(entries)
    }

    async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        match task::spawn_blocking(move || stream.quit()).await {
            Ok(Ok(())) => debug!("ftp session closed"),
            Ok(Err(err)) => warn!(error = %err, "ftp QUIT failed; dropping connection"),
            Err(err) => warn!(error = %err, "ftp QUIT task failed"),
        }
    }
}
