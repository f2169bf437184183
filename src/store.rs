//! Sheet-style storage for subscriptions, credentials and dedup state.
//!
//! A workbook is a set of named sheets; a sheet is a list of rows of string
//! cells whose first row is a header. The subscription sheet's fourth column
//! holds the dedup state and is the only thing this crate ever writes.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::fs;

/// Zero-based index of the dedup state column in the subscription sheet.
pub const STATE_COLUMN: usize = 3;

pub type Rows = Vec<Vec<String>>;

#[async_trait]
pub trait Workbook: Send + Sync {
    /// All rows including the header. A missing sheet is an error.
    async fn read_sheet(&self, sheet: &str) -> Result<Rows>;

    /// Overwrite `column` for the given absolute row indices.
    async fn write_column(&self, sheet: &str, column: usize, cells: &[(usize, String)]) -> Result<()>;
}

/// One subscription row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Absolute row index in the sheet (header is row 0).
    pub row: usize,
    pub keyword: String,
    pub feed_url: String,
    pub target_id: String,
    /// Raw dedup state cell, parsed by the orchestrator for its policy.
    pub state: String,
}

pub type Credentials = HashMap<String, String>;

fn cell(row: &[String], i: usize) -> String {
    row.get(i).map(|c| c.trim().to_string()).unwrap_or_default()
}

/// Header row skipped; rows without a feed URL are ignored.
pub fn parse_subscriptions(rows: &[Vec<String>]) -> Vec<Subscription> {
    rows.iter()
        .enumerate()
        .skip(1)
        .filter_map(|(i, row)| {
            let feed_url = cell(row, 1);
            if feed_url.is_empty() {
                return None;
            }
            Some(Subscription {
                row: i,
                keyword: cell(row, 0),
                feed_url,
                target_id: cell(row, 2),
                // kept verbatim so an untouched row is written back unchanged
                state: row.get(STATE_COLUMN).cloned().unwrap_or_default(),
            })
        })
        .collect()
}

/// Header row skipped; later duplicates win.
pub fn parse_credentials(rows: &[Vec<String>]) -> Credentials {
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let key = cell(row, 0);
            let value = cell(row, 1);
            (!key.is_empty() && !value.is_empty()).then_some((key, value))
        })
        .collect()
}

fn apply_column(rows: &mut Rows, column: usize, cells: &[(usize, String)]) -> Result<()> {
    for (row_idx, value) in cells {
        let row = rows
            .get_mut(*row_idx)
            .ok_or_else(|| anyhow!("row {row_idx} out of range"))?;
        if row.len() <= column {
            row.resize(column + 1, String::new());
        }
        row[column] = value.clone();
    }
    Ok(())
}

// ------------------------------------------------------------
// JSON file workbook
// ------------------------------------------------------------

/// `{"RSS": [["keyword","feed","target","state"], ...], "webhooks": [...]}`.
/// Number/bool/null cells are accepted and read as text.
pub struct JsonWorkbook {
    path: PathBuf,
}

impl JsonWorkbook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, Rows>> {
        let s = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading workbook {}", self.path.display()))?;
        let raw: BTreeMap<String, Vec<Vec<serde_json::Value>>> = serde_json::from_str(&s)
            .with_context(|| format!("parsing workbook {}", self.path.display()))?;
        Ok(raw
            .into_iter()
            .map(|(name, rows)| {
                let rows = rows
                    .into_iter()
                    .map(|r| r.into_iter().map(value_to_cell).collect())
                    .collect();
                (name, rows)
            })
            .collect())
    }

    /// Write through a temp file + rename so a crash never leaves half a workbook.
    async fn save(&self, book: &BTreeMap<String, Rows>) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_vec_pretty(book)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

fn value_to_cell(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Workbook for JsonWorkbook {
    async fn read_sheet(&self, sheet: &str) -> Result<Rows> {
        let mut book = self.load().await?;
        book.remove(sheet)
            .ok_or_else(|| anyhow!("sheet `{sheet}` not found in {}", self.path.display()))
    }

    async fn write_column(&self, sheet: &str, column: usize, cells: &[(usize, String)]) -> Result<()> {
        let mut book = self.load().await?;
        let rows = book
            .get_mut(sheet)
            .ok_or_else(|| anyhow!("sheet `{sheet}` not found in {}", self.path.display()))?;
        apply_column(rows, column, cells)?;
        self.save(&book).await
    }
}

// ------------------------------------------------------------
// In-memory workbook
// ------------------------------------------------------------

/// Workbook kept in memory; handy for tests and dry runs.
#[derive(Default)]
pub struct MemoryWorkbook {
    sheets: Mutex<BTreeMap<String, Rows>>,
    pub writes: Mutex<usize>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(self, name: &str, rows: Vec<Vec<&str>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|r| r.into_iter().map(str::to_string).collect())
            .collect();
        self.sheets
            .lock()
            .expect("workbook mutex poisoned")
            .insert(name.to_string(), rows);
        self
    }

    pub fn snapshot(&self, sheet: &str) -> Option<Rows> {
        self.sheets
            .lock()
            .expect("workbook mutex poisoned")
            .get(sheet)
            .cloned()
    }
}

#[async_trait]
impl Workbook for MemoryWorkbook {
    async fn read_sheet(&self, sheet: &str) -> Result<Rows> {
        self.snapshot(sheet)
            .ok_or_else(|| anyhow!("sheet `{sheet}` not found"))
    }

    async fn write_column(&self, sheet: &str, column: usize, cells: &[(usize, String)]) -> Result<()> {
        let mut sheets = self.sheets.lock().expect("workbook mutex poisoned");
        let rows = sheets
            .get_mut(sheet)
            .ok_or_else(|| anyhow!("sheet `{sheet}` not found"))?;
        apply_column(rows, column, cells)?;
        *self.writes.lock().expect("workbook mutex poisoned") += 1;
        Ok(())
    }
}
