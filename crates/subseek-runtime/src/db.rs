use std::future::Future;
use std::path::Path;

use tokio::sync::{mpsc, oneshot};

use subseek_core::error::SubseekError;
use subseek_core::models::UploadedFile;
use subseek_core::storage::Storage;

/// Handle to the session database, owned by a dedicated thread.
///
/// Commands are queued in call order, so a save enqueued while the caller
/// still holds the store lock lands after every earlier save.
#[derive(Clone)]
pub struct DbHandle {
    tx: mpsc::UnboundedSender<DbCommand>,
}

enum DbCommand {
    SaveFiles {
        files: Vec<UploadedFile>,
        reply: oneshot::Sender<Result<(), SubseekError>>,
    },
    LoadFiles {
        reply: oneshot::Sender<Result<Vec<UploadedFile>, SubseekError>>,
    },
    SaveToken {
        token: Option<String>,
        reply: oneshot::Sender<Result<(), SubseekError>>,
    },
    LoadToken {
        reply: oneshot::Sender<Result<Option<String>, SubseekError>>,
    },
}

impl DbHandle {
    pub fn open(path: &Path) -> Option<Self> {
        let storage = Storage::open(path)
            .map_err(|e| tracing::error!("Failed to open database: {e}"))
            .ok()?;
        Self::spawn(storage)
    }

    /// In-memory database, for tests and throwaway sessions.
    pub fn open_memory() -> Option<Self> {
        let storage = Storage::open_memory()
            .map_err(|e| tracing::error!("Failed to open in-memory database: {e}"))
            .ok()?;
        Self::spawn(storage)
    }

    fn spawn(storage: Storage) -> Option<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("db-actor".into())
            .spawn(move || actor_loop(storage, rx))
            .map_err(|e| tracing::error!("Failed to spawn DB thread: {e}"))
            .ok()?;

        Some(Self { tx })
    }

    /// Queue a save of the file list. The command is sent before this
    /// returns; only the reply is awaited.
    pub fn save_files(
        &self,
        files: Vec<UploadedFile>,
    ) -> impl Future<Output = Result<(), SubseekError>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(DbCommand::SaveFiles { files, reply });
        async move { rx.await.unwrap_or_else(|_| Err(closed())) }
    }

    pub async fn load_files(&self) -> Result<Vec<UploadedFile>, SubseekError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(DbCommand::LoadFiles { reply });
        rx.await.unwrap_or_else(|_| Err(closed()))
    }

    pub async fn save_token(&self, token: Option<String>) -> Result<(), SubseekError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(DbCommand::SaveToken { token, reply });
        rx.await.unwrap_or_else(|_| Err(closed()))
    }

    pub async fn load_token(&self) -> Result<Option<String>, SubseekError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(DbCommand::LoadToken { reply });
        rx.await.unwrap_or_else(|_| Err(closed()))
    }
}

fn closed() -> SubseekError {
    SubseekError::Config("DB actor closed".into())
}

fn actor_loop(storage: Storage, mut rx: mpsc::UnboundedReceiver<DbCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            DbCommand::SaveFiles { files, reply } => {
                let _ = reply.send(storage.save_files(&files));
            }
            DbCommand::LoadFiles { reply } => {
                let _ = reply.send(storage.load_files());
            }
            DbCommand::SaveToken { token, reply } => {
                let _ = reply.send(storage.save_token(token.as_deref()));
            }
            DbCommand::LoadToken { reply } => {
                let _ = reply.send(storage.load_token());
            }
        }
    }
    tracing::debug!("DB actor stopped");
}
