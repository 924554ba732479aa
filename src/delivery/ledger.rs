use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use uuid::Uuid;

type DayCounts = BTreeMap<NaiveDate, HashMap<Uuid, u32>>;

/// Per-day display counts keyed by reminder.
pub trait DisplayLedger: Send {
    fn shown(&self, reminder_id: Uuid, day: NaiveDate) -> anyhow::Result<u32>;

    /// Counts one more display and returns the new total for the day.
    fn record(&mut self, reminder_id: Uuid, day: NaiveDate) -> anyhow::Result<u32>;
}

fn count(days: &DayCounts, reminder_id: Uuid, day: NaiveDate) -> u32 {
    days.get(&day)
        .and_then(|counts| counts.get(&reminder_id))
        .copied()
        .unwrap_or(0)
}

/// Bumps the count and drops days before `day`.
fn bump(days: &mut DayCounts, reminder_id: Uuid, day: NaiveDate) -> u32 {
    days.retain(|recorded, _| *recorded >= day);
    let slot = days.entry(day).or_default().entry(reminder_id).or_insert(0);
    *slot += 1;
    *slot
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    days: DayCounts,
}

impl DisplayLedger for MemoryLedger {
    fn shown(&self, reminder_id: Uuid, day: NaiveDate) -> anyhow::Result<u32> {
        Ok(count(&self.days, reminder_id, day))
    }

    fn record(&mut self, reminder_id: Uuid, day: NaiveDate) -> anyhow::Result<u32> {
        Ok(bump(&mut self.days, reminder_id, day))
    }
}

/// JSON file ledger that survives restarts of the client within a day.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    days: DayCounts,
}

impl FileLedger {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let days = if path.exists() {
            let raw = fs::read(&path)
                .with_context(|| format!("failed to read ledger {}", path.display()))?;
            if raw.is_empty() {
                DayCounts::new()
            } else {
                serde_json::from_slice(&raw)
                    .with_context(|| format!("ledger {} is not valid JSON", path.display()))?
            }
        } else {
            DayCounts::new()
        };
        Ok(Self { path, days })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(&self.days)?;
        fs::write(&self.path, body)
            .with_context(|| format!("failed to write ledger {}", self.path.display()))
    }
}

impl DisplayLedger for FileLedger {
    fn shown(&self, reminder_id: Uuid, day: NaiveDate) -> anyhow::Result<u32> {
        Ok(count(&self.days, reminder_id, day))
    }

    fn record(&mut self, reminder_id: Uuid, day: NaiveDate) -> anyhow::Result<u32> {
        let total = bump(&mut self.days, reminder_id, day);
        self.persist()?;
        Ok(total)
    }
}
