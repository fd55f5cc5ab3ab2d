use std::sync::OnceLock;

use super::{Record, RecordStore};

/// Result of one classification job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Classified(f64),
    Failed(String),
}

impl JobOutcome {
    /// Clamp a classified score into `[0, 1]`.
    pub fn normalized(self) -> Self {
        match self {
            JobOutcome::Classified(score) => JobOutcome::Classified(score.clamp(0.0, 1.0)),
            failed => failed,
        }
    }
}

/// Backing copy of the records that workers write into during a run.
///
/// Each index has a write-once slot. A job owns exactly one index, so writes
/// never contend; readers build a fresh vector from the slots and never see a
/// half-written record.
#[derive(Debug)]
pub struct WorkingCopy {
    base: Vec<Record>,
    slots: Vec<OnceLock<JobOutcome>>,
}

impl WorkingCopy {
    pub fn from_store(store: &RecordStore) -> Self {
        let base = store.records().to_vec();
        let slots = base
            .iter()
            .map(|record| {
                let slot = OnceLock::new();
                if let Some(score) = record.prediction {
                    let _ = slot.set(JobOutcome::Classified(score));
                }
                slot
            })
            .collect();
        Self { base, slots }
    }

    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    /// The loaded record at `index`, without any outcome applied.
    pub fn base(&self, index: usize) -> Option<&Record> {
        self.base.get(index)
    }

    /// True while no job has produced an outcome for `index`.
    pub fn is_pending(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .is_some_and(|slot| slot.get().is_none())
    }

    pub fn outcome(&self, index: usize) -> Option<&JobOutcome> {
        self.slots.get(index).and_then(OnceLock::get)
    }

    /// Store the outcome for `index`.
    ///
    /// Returns `false` if the index is out of range or already holds an
    /// outcome; the first outcome always wins.
    pub fn record(&self, index: usize, outcome: JobOutcome) -> bool {
        let outcome = outcome.normalized();
        self.slots
            .get(index)
            .is_some_and(|slot| slot.set(outcome).is_ok())
    }

    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_none()).count()
    }

    pub fn classified_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.get(), Some(JobOutcome::Classified(_))))
            .count()
    }

    /// Value copy of every record with its outcome applied.
    pub fn snapshot(&self) -> Vec<Record> {
        self.base
            .iter()
            .zip(&self.slots)
            .map(|(record, slot)| {
                let mut record = record.clone();
                match slot.get() {
                    Some(JobOutcome::Classified(score)) => {
                        record.prediction = Some(*score);
                        record.failure = None;
                    }
                    Some(JobOutcome::Failed(reason)) => record.failure = Some(reason.clone()),
                    None => {}
                }
                record
            })
            .collect()
    }
}
