use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::{fs, io::AsyncWriteExt, sync::RwLock};
use tracing::{debug, warn};

use crate::{
    domain::Transaction,
    ports::database::{check_batch, DatabasePort, Error},
};

/// Transactions stored as JSON lines in a single file
///
/// Each line holds one persisted transaction. Lines are only ever appended, so the order of the
/// file is the insertion order. A last line without its newline is what an interrupted append
/// leaves behind: reads skip it and the next append cuts it off.
#[derive(Clone, Debug)]
pub struct FileDatabase {
    path: PathBuf,
    /// Readers share it; an append holds it exclusively across the balance check and the write
    lock: Arc<RwLock<()>>,
}

#[derive(Default)]
struct Snapshot {
    transactions: Vec<Transaction>,
    /// Length of the file up to and including its last newline
    complete_len: u64,
    torn: bool,
}

impl FileDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(RwLock::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Callers must hold `lock`
    async fn load(&self) -> Result<Snapshot, Error> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            // No transactions yet
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Snapshot::default()),
            Err(err) => return Err(Error::Adapter(Box::new(err))),
        };

        let complete_len = content
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map_or(0, |pos| pos + 1);
        let torn = complete_len < content.len();
        if torn {
            warn!(
                path = %self.path.display(),
                bytes = content.len() - complete_len,
                "ignoring incomplete last line"
            );
        }

        let transactions = content[..complete_len]
            .split(|byte| *byte == b'\n')
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .map(|line| serde_json::from_slice(line).map_err(|err| Error::Adapter(Box::new(err))))
            .collect::<Result<_, _>>()?;

        Ok(Snapshot {
            transactions,
            complete_len: complete_len as u64,
            torn,
        })
    }

    async fn read_all(&self) -> Result<Vec<Transaction>, Error> {
        let _guard = self.lock.read().await;
        Ok(self.load().await?.transactions)
    }
}

#[async_trait::async_trait]
impl DatabasePort for FileDatabase {
    async fn transactions_by_partner(&self, partner: &str) -> Result<Vec<Transaction>, Error> {
        let mut transactions = self.read_all().await?;
        transactions.retain(|transaction| transaction.partner == partner);
        Ok(transactions)
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>, Error> {
        self.read_all().await
    }

    async fn append_transactions(
        &self,
        batch: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, Error> {
        let _guard = self.lock.write().await;

        let snapshot = self.load().await?;
        check_batch(&snapshot.transactions, &batch)?;

        let mut buffer = Vec::new();
        for transaction in &batch {
            serde_json::to_writer(&mut buffer, transaction)
                .map_err(|err| Error::Adapter(Box::new(err)))?;
            buffer.push(b'\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| Error::Adapter(Box::new(err)))?;
        if snapshot.torn {
            file.set_len(snapshot.complete_len)
                .await
                .map_err(|err| Error::Adapter(Box::new(err)))?;
        }
        // A single write keeps the batch together in the file
        file.write_all(&buffer)
            .await
            .map_err(|err| Error::Adapter(Box::new(err)))?;
        file.sync_data()
            .await
            .map_err(|err| Error::Adapter(Box::new(err)))?;

        debug!(path = %self.path.display(), count = batch.len(), "appended transactions");
        Ok(batch)
    }
}
