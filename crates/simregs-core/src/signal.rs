//! Run-length encoded per-cycle timelines.

use std::fmt;

use crate::{BitRange, RegisterError, Sdk};

#[derive(Debug, Clone, PartialEq, Eq)]
struct SignalRecord<T> {
    value: Option<T>,
    not_changed_since: u32,
}

/// Append-only timeline of sampled values, one record per committed cycle.
///
/// Each record carries how many records in a row the value has stayed the
/// same, so renderers can find edges without rescanning history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal<T> {
    label: String,
    records: Vec<SignalRecord<T>>,
}

impl<T: PartialEq> Signal<T> {
    /// Creates an empty signal.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            records: Vec::new(),
        }
    }

    /// Display label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Appends the value sampled for the next cycle.
    ///
    /// `None` marks a cycle without a valid sample and compares equal only to
    /// another `None`. `enforce_changed` starts a new run even when the value
    /// repeats.
    pub fn record(&mut self, value: Option<T>, enforce_changed: bool) {
        let not_changed_since = match self.records.last() {
            Some(previous) if !enforce_changed && previous.value == value => {
                previous.not_changed_since + 1
            }
            _ => 0,
        };
        self.records.push(SignalRecord {
            value,
            not_changed_since,
        });
    }

    /// Number of recorded cycles.
    #[must_use]
    pub fn size(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` before the first record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Value at `cycle`; `None` past the end or for a missing sample.
    #[must_use]
    pub fn value_at(&self, cycle: usize) -> Option<&T> {
        self.records
            .get(cycle)
            .and_then(|record| record.value.as_ref())
    }

    /// Records since the value last changed, as of `cycle`.
    #[must_use]
    pub fn not_changed_since(&self, cycle: usize) -> Option<u32> {
        self.records
            .get(cycle)
            .map(|record| record.not_changed_since)
    }

    /// Returns `true` when `cycle` starts a new run.
    #[must_use]
    pub fn changed_at(&self, cycle: usize) -> bool {
        self.not_changed_since(cycle) == Some(0)
    }

    /// Returns `true` when a record follows `cycle`.
    #[must_use]
    pub fn has_next(&self, cycle: usize) -> bool {
        cycle + 1 < self.records.len()
    }

    /// Clears all records and keeps the label.
    pub fn reset(&mut self) {
        self.records.clear();
    }
}

impl<T: fmt::Display> fmt::Display for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal[label={}, values={{", self.label)?;
        for (index, record) in self.records.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            match &record.value {
                Some(value) => write!(f, "{value}")?,
                None => f.write_str("-")?,
            }
        }
        f.write_str("}]")
    }
}

/// Bit field of one register sampled into a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterProbe {
    address: u32,
    range: BitRange,
    signal: Signal<u32>,
}

impl RegisterProbe {
    /// Probe over `range` of the register at `address`.
    #[must_use]
    pub fn new(label: impl Into<String>, address: u32, range: BitRange) -> Self {
        Self {
            address,
            range,
            signal: Signal::new(label),
        }
    }

    /// Probe over a whole register.
    #[must_use]
    pub fn register(label: impl Into<String>, address: u32) -> Self {
        Self::new(label, address, BitRange::FULL)
    }

    /// Probed register address.
    #[must_use]
    pub const fn address(&self) -> u32 {
        self.address
    }

    /// Probed bit range.
    #[must_use]
    pub const fn range(&self) -> BitRange {
        self.range
    }

    /// Timeline recorded so far.
    #[must_use]
    pub const fn signal(&self) -> &Signal<u32> {
        &self.signal
    }

    fn sample(&mut self, sdk: &Sdk, enforce_changed: bool) -> Result<(), RegisterError> {
        let value = match sdk.read_field(self.address, self.range) {
            Ok(value) => Some(value),
            Err(err) if err.is_recoverable() => return Err(err),
            Err(_) => None,
        };
        self.signal.record(value, enforce_changed);
        Ok(())
    }
}

/// Set of probes sampled together once per committed cycle.
///
/// Record index `i` of every probe belongs to `cycle_at(i)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalRecorder {
    probes: Vec<RegisterProbe>,
    cycles: Vec<u64>,
}

impl SignalRecorder {
    /// Creates a recorder without probes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a probe; its history restarts with the next sample.
    pub fn add_probe(&mut self, probe: RegisterProbe) {
        self.probes.push(probe);
        self.reset();
    }

    /// Probes in insertion order.
    #[must_use]
    pub fn probes(&self) -> &[RegisterProbe] {
        &self.probes
    }

    /// Committed cycle of record `index`.
    #[must_use]
    pub fn cycle_at(&self, index: usize) -> Option<u64> {
        self.cycles.get(index).copied()
    }

    /// Number of sampled cycles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    /// Returns `true` before the first sample.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    /// Samples every probe for committed `cycle`.
    ///
    /// Returns `false` without sampling when `cycle` was already recorded.
    /// Unreadable registers are recorded as missing samples.
    ///
    /// # Errors
    ///
    /// [`RegisterError::Transport`] aborts the sample; records appended for
    /// earlier probes in the same call are rolled back.
    pub fn sample(
        &mut self,
        sdk: &Sdk,
        cycle: u64,
        enforce_changed: bool,
    ) -> Result<bool, RegisterError> {
        if self.cycles.last() == Some(&cycle) {
            return Ok(false);
        }
        let size = self.cycles.len();
        for index in 0..self.probes.len() {
            if let Err(err) = self.probes[index].sample(sdk, enforce_changed) {
                for probe in &mut self.probes[..index] {
                    probe.signal.records.truncate(size);
                }
                return Err(err);
            }
        }
        self.cycles.push(cycle);
        Ok(true)
    }

    /// Clears every probe's history.
    pub fn reset(&mut self) {
        self.cycles.clear();
        for probe in &mut self.probes {
            probe.signal.reset();
        }
    }
}
