/**
 * STORE - Historique des exécutions ping / nmap
 *
 * RÔLE :
 * Interface de persistance consommée par le recorder : ajout d'une ligne,
 * lecture de toutes les lignes d'un outil (plus récente en premier).
 *
 * IMPLÉMENTATIONS :
 * - JsonFileStore : un fichier JSON Lines par outil, une ligne ajoutée par exécution
 * - MemoryStore : en mémoire, pour les tests et le mode éphémère
 */

mod json;

pub use json::JsonFileStore;

use crate::models::{ResultRecord, Tool};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Tâche de stockage interrompue avant de répondre
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub trait ResultStore: Send + Sync {
    /// Ajoute une ligne et retourne l'id attribué (l'id fourni est ignoré)
    fn append(&self, kind: Tool, record: ResultRecord) -> Result<u64, StoreError>;

    /// Toutes les lignes d'un outil, id décroissant
    fn list_all(&self, kind: Tool) -> Result<Vec<ResultRecord>, StoreError>;
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<Tool, Vec<ResultRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryStore {
    fn append(&self, kind: Tool, mut record: ResultRecord) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock();
        let rows = tables.entry(kind).or_default();
        record.id = next_id(rows);
        let id = record.id;
        rows.push(record);
        Ok(id)
    }

    fn list_all(&self, kind: Tool) -> Result<Vec<ResultRecord>, StoreError> {
        let tables = self.tables.lock();
        Ok(newest_first(tables.get(&kind).map(Vec::as_slice).unwrap_or_default()))
    }
}

fn next_id(rows: &[ResultRecord]) -> u64 {
    rows.iter().map(|r| r.id).max().unwrap_or(0) + 1
}

fn newest_first(rows: &[ResultRecord]) -> Vec<ResultRecord> {
    let mut out = rows.to_vec();
    out.sort_by(|a, b| b.id.cmp(&a.id));
    out
}
