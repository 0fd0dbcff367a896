//! Next-capture timestamp and its persistence.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::debug;

/// Calendar timestamp as laid out under `target_date`.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct TargetDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl TargetDate {
    pub fn to_datetime(&self) -> Result<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|date| date.and_hms_opt(self.hour, self.minute, self.second))
            .ok_or_else(|| anyhow!("target_date {self:?} is not a valid local time"))
    }
}

impl From<&NaiveDateTime> for TargetDate {
    fn from(at: &NaiveDateTime) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
            day: at.day(),
            hour: at.hour(),
            minute: at.minute(),
            second: at.second(),
        }
    }
}

/// Day/hour/minute/second offset. Missing fields count as zero.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Interval {
    #[serde(default)]
    pub day: i64,
    #[serde(default)]
    pub hour: i64,
    #[serde(default)]
    pub minute: i64,
    #[serde(default)]
    pub second: i64,
}

impl Interval {
    pub fn to_delta(&self) -> Result<TimeDelta> {
        let parts = [
            TimeDelta::try_days(self.day),
            TimeDelta::try_hours(self.hour),
            TimeDelta::try_minutes(self.minute),
            TimeDelta::try_seconds(self.second),
        ];
        parts
            .into_iter()
            .try_fold(TimeDelta::zero(), |total, part| {
                part.and_then(|part| total.checked_add(&part))
            })
            .ok_or_else(|| anyhow!("interval {self:?} is out of range"))
    }

    /// Non-negative offset as a sleepable duration.
    pub fn to_duration(&self) -> Result<Duration> {
        self.to_delta()?
            .to_std()
            .map_err(|_| anyhow!("interval {self:?} must not be negative"))
    }
}

/// When the next capture is due and how far each capture pushes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub target: NaiveDateTime,
    pub recurrence: TimeDelta,
}

impl ScheduleEntry {
    pub fn new(target: NaiveDateTime, recurrence: TimeDelta) -> Self {
        Self { target, recurrence }
    }

    /// The entry one recurrence later.
    pub fn advanced(&self) -> Result<Self> {
        let target = self
            .target
            .checked_add_signed(self.recurrence)
            .ok_or_else(|| anyhow!("advancing {} overflows the calendar", self.target))?;
        Ok(Self {
            target,
            recurrence: self.recurrence,
        })
    }
}

/// Persistence for the next-capture timestamp.
pub trait ScheduleStore {
    fn load(&mut self) -> Result<ScheduleEntry>;
    fn save(&mut self, entry: &ScheduleEntry) -> Result<()>;
}

impl<S: ScheduleStore + ?Sized> ScheduleStore for Box<S> {
    fn load(&mut self) -> Result<ScheduleEntry> {
        (**self).load()
    }

    fn save(&mut self, entry: &ScheduleEntry) -> Result<()> {
        (**self).save(entry)
    }
}

/// Schedule kept in the settings YAML document.
///
/// The document is held as a generic YAML tree so `save` only replaces
/// `target_date` and leaves every other key as it was read.
#[derive(Debug)]
pub struct YamlScheduleStore {
    path: PathBuf,
    document: Value,
    entry: ScheduleEntry,
}

impl YamlScheduleStore {
    pub(crate) fn new(path: PathBuf, document: Value, entry: ScheduleEntry) -> Self {
        Self {
            path,
            document,
            entry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScheduleStore for YamlScheduleStore {
    fn load(&mut self) -> Result<ScheduleEntry> {
        Ok(self.entry)
    }

    fn save(&mut self, entry: &ScheduleEntry) -> Result<()> {
        let Value::Mapping(map) = &mut self.document else {
            bail!("{} is not a YAML mapping", self.path.display());
        };
        let target = serde_yaml::to_value(TargetDate::from(&entry.target))?;
        map.insert(Value::from("target_date"), target);

        let text = serde_yaml::to_string(&self.document)?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        self.entry = *entry;
        debug!(path = %self.path.display(), target = %entry.target, "schedule saved");
        Ok(())
    }
}

/// Schedule that lives only for the process, used by dry runs.
#[derive(Debug)]
pub struct MemoryScheduleStore {
    entry: ScheduleEntry,
}

impl MemoryScheduleStore {
    pub fn new(entry: ScheduleEntry) -> Self {
        Self { entry }
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn load(&mut self) -> Result<ScheduleEntry> {
        Ok(self.entry)
    }

    fn save(&mut self, entry: &ScheduleEntry) -> Result<()> {
        self.entry = *entry;
        Ok(())
    }
}
