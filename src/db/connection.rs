use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

/// The terminal front end and a second process may share the file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Request {
    Run(Job),
    Close,
}

struct Worker {
    requests: mpsc::Sender<Request>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(thread) = thread else {
            return;
        };

        if self.requests.send(Request::Close).is_err() {
            warn!("Log store thread already gone before close");
        }
        if let Err(err) = thread.join() {
            error!("Log store thread panicked: {err:?}");
        }
    }
}

/// Opens the store and brings its schema up to date.
fn open_store(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open log store at {}", path.display()))?;

    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL unavailable, using the default journal: {err}");
    }
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;

    run_migrations(&mut conn).context("failed to migrate log store")?;
    Ok(conn)
}

fn serve(mut conn: Connection, requests: mpsc::Receiver<Request>) {
    while let Ok(request) = requests.recv() {
        match request {
            Request::Run(job) => job(&mut conn),
            Request::Close => break,
        }
    }
    info!("Log store closed");
}

/// Handle to the SQLite log store. Every statement runs on one dedicated
/// thread that owns the connection; async callers wait on a oneshot reply.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let (requests_tx, requests_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_path = path.clone();

        let thread = thread::Builder::new()
            .name("pacekeeper-db".into())
            .spawn(move || match open_store(&thread_path) {
                Ok(conn) => {
                    if ready_tx.send(Ok(())).is_ok() {
                        serve(conn, requests_rx);
                    }
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .context("failed to spawn log store thread")?;

        ready_rx
            .recv()
            .context("log store thread exited during startup")??;

        info!("Log store ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                requests: requests_tx,
                thread: Mutex::new(Some(thread)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `job` on the store thread and returns its result.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.worker
            .requests
            .send(Request::Run(Box::new(move |conn| {
                // The caller may have been cancelled; nothing to do then.
                let _ = reply_tx.send(job(conn));
            })))
            .map_err(|_| anyhow!("log store thread is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("log store thread stopped before replying"))?
    }
}
