//! Work items and the stores that hold them during a classification run.

mod working;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::library::AssetRef;

pub use working::{JobOutcome, WorkingCopy};

/// Stable identity of a record for the lifetime of a loaded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

/// One asset to classify plus its result fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(skip, default)]
    pub id: RecordId,
    #[serde(rename = "asset_id")]
    pub asset: AssetRef,
    /// Score in `[0, 1]`; set once and never cleared.
    pub prediction: Option<f64>,
    /// Names of the groups this asset belongs to.
    #[serde(default)]
    pub collections: Vec<String>,
    /// Why the last classification attempt failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Record {
    pub fn new(asset: AssetRef) -> Self {
        Self {
            id: RecordId::new(),
            asset,
            prediction: None,
            collections: Vec::new(),
            failure: None,
        }
    }

    pub fn is_classified(&self) -> bool {
        self.prediction.is_some()
    }
}

/// Ordered, index-stable list of records plus the asset → group relation.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<Record>,
    index_by_asset: HashMap<AssetRef, usize>,
    memberships: HashMap<AssetRef, BTreeSet<String>>,
}

impl RecordStore {
    /// Build a store from assets, ordered by asset identifier.
    pub fn from_assets(mut assets: Vec<AssetRef>) -> Self {
        assets.sort();
        assets.dedup();
        let records: Vec<Record> = assets.into_iter().map(Record::new).collect();
        let index_by_asset = records
            .iter()
            .enumerate()
            .map(|(index, record)| (record.asset.clone(), index))
            .collect();
        Self {
            records,
            index_by_asset,
            memberships: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn index_of(&self, asset: &AssetRef) -> Option<usize> {
        self.index_by_asset.get(asset).copied()
    }

    /// Record that the given assets belong to `group`.
    ///
    /// Assets that are not part of the store are ignored and counted in the
    /// return value.
    pub fn assign_group(&mut self, group: &str, members: &[AssetRef]) -> usize {
        let mut unknown = 0;
        for asset in members {
            let Some(&index) = self.index_by_asset.get(asset) else {
                unknown += 1;
                continue;
            };
            let groups = self.memberships.entry(asset.clone()).or_default();
            if groups.insert(group.to_string()) {
                self.records[index].collections = groups.iter().cloned().collect();
            }
        }
        unknown
    }

    /// Group names recorded for `asset`.
    pub fn groups_for(&self, asset: &AssetRef) -> impl Iterator<Item = &str> {
        self.memberships
            .get(asset)
            .into_iter()
            .flat_map(|groups| groups.iter().map(String::as_str))
    }

    /// Records that belong to `group`, in store order.
    pub fn members_of<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Record> + 'a {
        self.records.iter().filter(move |record| {
            self.memberships
                .get(&record.asset)
                .is_some_and(|groups| groups.contains(group))
        })
    }
}

/// Immutable full copy of the record list handed to observers.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Increases by one for every published snapshot of a session.
    pub sequence: u64,
    pub records: Arc<[Record]>,
}

impl Snapshot {
    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn classified(&self) -> usize {
        self.records.iter().filter(|record| record.is_classified()).count()
    }

    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.failure.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests;
