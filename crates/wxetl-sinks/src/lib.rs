//! File and in-memory warehouses
//!
//! [`FsWarehouse`] keeps each table as a JSON-lines file, one
//! [`NormalizedRow`] per line. [`MemoryWarehouse`] holds tables in process
//! and is what dry runs and tests load into.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;
use wxetl_core::{NormalizedRow, RowKey, TableRef, Warehouse};

pub struct FsWarehouse {
    dir: PathBuf,
}

impl FsWarehouse {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// `{dir}/{schema}/{table}.jsonl`, or `{dir}/{table}.jsonl` without a schema
    pub fn table_path(&self, table: &TableRef) -> PathBuf {
        let mut path = self.dir.clone();
        if let Some(schema) = table.schema() {
            path.push(schema);
        }
        path.push(format!("{}.jsonl", table.name()));
        path
    }

    fn read_rows(&self, table: &TableRef) -> Result<Vec<NormalizedRow>> {
        let path = self.table_path(table);
        let file = OpenOptions::new()
            .read(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;

        let mut rows = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}", path.display(), n + 1))?;
            rows.push(row);
        }
        Ok(rows)
    }

    fn write_rows(&self, path: &Path, rows: &[NormalizedRow], append: bool) -> Result<()> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        for row in rows {
            let line = serde_json::to_string(row)?;
            f.write_all(line.as_bytes())?;
            f.write_all(b"\n")?;
        }
        f.flush()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Warehouse for FsWarehouse {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        Ok(self.table_path(table).is_file())
    }

    async fn read_existing_keys(&self, table: &TableRef) -> Result<Vec<RowKey>> {
        Ok(self.read_rows(table)?.iter().map(NormalizedRow::key).collect())
    }

    async fn create_table(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        let path = self.table_path(table);
        self.write_rows(&path, rows, false)?;
        debug!(path = %path.display(), rows = rows.len(), "created table file");
        Ok(())
    }

    async fn append_rows(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let path = self.table_path(table);
        self.write_rows(&path, rows, true)?;
        debug!(path = %path.display(), rows = rows.len(), "appended rows");
        Ok(())
    }

    async fn replace_rows(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let replaced: HashSet<RowKey> = rows.iter().map(NormalizedRow::key).collect();
        let mut kept: Vec<NormalizedRow> = self
            .read_rows(table)?
            .into_iter()
            .filter(|r| !replaced.contains(&r.key()))
            .collect();
        kept.extend_from_slice(rows);

        // rewrite beside the table, then swap
        let path = self.table_path(table);
        let staging = path.with_extension("jsonl.tmp");
        self.write_rows(&staging, &kept, false)?;
        std::fs::rename(&staging, &path)?;
        debug!(path = %path.display(), rows = rows.len(), "replaced rows");
        Ok(())
    }

    async fn recreate_table(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        let path = self.table_path(table);
        let staging = path.with_extension("jsonl.tmp");
        self.write_rows(&staging, rows, false)?;
        std::fs::rename(&staging, &path)?;
        debug!(path = %path.display(), rows = rows.len(), "recreated table file");
        Ok(())
    }

    async fn drop_table(&self, table: &TableRef) -> Result<()> {
        let path = self.table_path(table);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryWarehouse {
    tables: Mutex<HashMap<String, Vec<NormalizedRow>>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a table's rows in insertion order
    pub async fn rows(&self, table: &TableRef) -> Option<Vec<NormalizedRow>> {
        self.tables.lock().await.get(&table.to_string()).cloned()
    }
}

#[async_trait::async_trait]
impl Warehouse for MemoryWarehouse {
    fn name(&self) -> &str {
        "memory"
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        Ok(self.tables.lock().await.contains_key(&table.to_string()))
    }

    async fn read_existing_keys(&self, table: &TableRef) -> Result<Vec<RowKey>> {
        let tables = self.tables.lock().await;
        let rows = tables
            .get(&table.to_string())
            .with_context(|| format!("no table {}", table))?;
        Ok(rows.iter().map(NormalizedRow::key).collect())
    }

    async fn create_table(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        self.tables
            .lock()
            .await
            .insert(table.to_string(), rows.to_vec());
        Ok(())
    }

    async fn append_rows(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let stored = tables
            .get_mut(&table.to_string())
            .with_context(|| format!("no table {}", table))?;
        stored.extend_from_slice(rows);
        Ok(())
    }

    async fn replace_rows(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        let replaced: HashSet<RowKey> = rows.iter().map(NormalizedRow::key).collect();
        let mut tables = self.tables.lock().await;
        let stored = tables
            .get_mut(&table.to_string())
            .with_context(|| format!("no table {}", table))?;
        stored.retain(|r| !replaced.contains(&r.key()));
        stored.extend_from_slice(rows);
        Ok(())
    }

    async fn recreate_table(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        self.create_table(table, rows).await
    }

    async fn drop_table(&self, table: &TableRef) -> Result<()> {
        self.tables.lock().await.remove(&table.to_string());
        Ok(())
    }
}
