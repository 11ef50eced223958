use super::{newest_first, next_id, ResultStore, StoreError};
use crate::models::{ResultRecord, Tool};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Historique persistant : `<data_dir>/<outil>_results.jsonl`, une ligne JSON par exécution.
/// Le cache mémoire est la source des lectures, un ajout n'écrit que sa propre ligne.
pub struct JsonFileStore {
    data_dir: PathBuf,
    tables: Mutex<HashMap<Tool, Vec<ResultRecord>>>,
}

impl JsonFileStore {
    /// Ouvre (ou crée) le dossier de données et charge l'historique existant
    pub fn open<P: Into<PathBuf>>(data_dir: P) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        let mut tables = HashMap::new();
        for tool in Tool::ALL {
            let path = table_path(&data_dir, tool);
            let rows = if path.exists() { load_table(&path)? } else { Vec::new() };
            debug!(tool = tool.label(), rows = rows.len(), "loaded history table");
            tables.insert(tool, rows);
        }

        info!("result store opened at {:?}", data_dir);
        Ok(Self { data_dir, tables: Mutex::new(tables) })
    }
}

impl ResultStore for JsonFileStore {
    fn append(&self, kind: Tool, mut record: ResultRecord) -> Result<u64, StoreError> {
        // le lock couvre l'écriture : ids et ordre des lignes restent cohérents
        let mut tables = self.tables.lock();
        let rows = tables.entry(kind).or_default();
        record.id = next_id(rows);

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        append_line(&table_path(&self.data_dir, kind), line.as_bytes())?;

        // en cache seulement une fois la ligne sur disque
        let id = record.id;
        rows.push(record);
        Ok(id)
    }

    fn list_all(&self, kind: Tool) -> Result<Vec<ResultRecord>, StoreError> {
        let tables = self.tables.lock();
        Ok(newest_first(tables.get(&kind).map(Vec::as_slice).unwrap_or_default()))
    }
}

fn table_path(data_dir: &Path, tool: Tool) -> PathBuf {
    data_dir.join(format!("{}_results.jsonl", tool.label()))
}

fn load_table(path: &Path) -> Result<Vec<ResultRecord>, StoreError> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(StoreError::from))
        .collect()
}

fn append_line(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_data()
}
