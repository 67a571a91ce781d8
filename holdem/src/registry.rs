use log::debug;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use crate::game::{
    InternalError, Table, TableSettings,
    entities::{RandomShuffle, ShuffleStrategy, TableSnapshot, TurnMarker},
};

/// Lock a table, mapping poisoning to an internal error.
pub fn lock<'a>(id: &str, table: &'a Mutex<Table>) -> Result<MutexGuard<'a, Table>, InternalError> {
    table
        .lock()
        .map_err(|_| InternalError::Poisoned(format!("table {id}")))
}

/// All live tables by id. Tables are created on first join and never
/// removed; each one is locked on its own so different tables make
/// progress independently.
#[derive(Debug)]
pub struct TableRegistry {
    settings: TableSettings,
    shuffler: Arc<dyn ShuffleStrategy>,
    tables: RwLock<HashMap<String, Arc<Mutex<Table>>>>,
}

impl TableRegistry {
    pub fn new(settings: TableSettings, shuffler: Arc<dyn ShuffleStrategy>) -> Self {
        Self {
            settings,
            shuffler,
            tables: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &TableSettings {
        &self.settings
    }

    pub fn get(&self, id: &str) -> Result<Option<Arc<Mutex<Table>>>, InternalError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| InternalError::Poisoned("table registry".to_string()))?;
        Ok(tables.get(id).cloned())
    }

    /// Get a table, creating it with the registry's settings if it
    /// doesn't exist yet. Concurrent callers always see the same table.
    pub fn get_or_create(&self, id: &str) -> Result<Arc<Mutex<Table>>, InternalError> {
        if let Some(table) = self.get(id)? {
            return Ok(table);
        }
        let mut tables = self
            .tables
            .write()
            .map_err(|_| InternalError::Poisoned("table registry".to_string()))?;
        let table = tables.entry(id.to_string()).or_insert_with(|| {
            debug!("creating table {id}");
            let table = Table::new(id, self.settings.clone(), self.shuffler.clone());
            Arc::new(Mutex::new(table))
        });
        Ok(table.clone())
    }

    pub fn table_ids(&self) -> Result<Vec<String>, InternalError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| InternalError::Poisoned("table registry".to_string()))?;
        let mut ids: Vec<String> = tables.keys().cloned().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Pending decisions for every table with a hand in progress.
    pub fn turn_markers(&self) -> Result<Vec<(String, TurnMarker)>, InternalError> {
        let mut markers = Vec::new();
        for id in self.table_ids()? {
            if let Some(table) = self.get(&id)? {
                if let Some(marker) = lock(&id, &table)?.turn_marker() {
                    markers.push((id, marker));
                }
            }
        }
        Ok(markers)
    }

    /// A table as seen by `viewer`, if the table exists.
    pub fn snapshot(
        &self,
        id: &str,
        viewer: Option<&str>,
    ) -> Result<Option<TableSnapshot>, InternalError> {
        match self.get(id)? {
            Some(table) => Ok(Some(lock(id, &table)?.snapshot(viewer))),
            None => Ok(None),
        }
    }
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new(TableSettings::default(), Arc::new(RandomShuffle))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::{TableRegistry, lock};

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = TableRegistry::default();
        assert!(registry.get("t1").unwrap().is_none());
        let table1 = registry.get_or_create("t1").unwrap();
        let table2 = registry.get_or_create("t1").unwrap();
        assert!(Arc::ptr_eq(&table1, &table2));
        assert_eq!(lock("t1", &table1).unwrap().seats().len(), 9);
        assert_eq!(registry.table_ids().unwrap(), vec!["t1".to_string()]);
    }

    #[test]
    fn concurrent_creation_yields_one_table() {
        let registry = Arc::new(TableRegistry::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let table = registry.get_or_create("shared").unwrap();
                    let id = format!("p{i}");
                    lock("shared", &table).unwrap().join(&id, None, None).unwrap();
                    table
                })
            })
            .collect();
        let tables: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(tables.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(lock("shared", &tables[0]).unwrap().num_occupied(), 8);
    }

    #[test]
    fn markers_only_for_hands_in_progress() {
        let registry = TableRegistry::default();
        let table = registry.get_or_create("a").unwrap();
        registry.get_or_create("b").unwrap();
        {
            let mut table = lock("a", &table).unwrap();
            table.join("x", None, None).unwrap();
            table.join("y", None, None).unwrap();
            table.start_hand().unwrap();
        }
        let markers = registry.turn_markers().unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].0, "a");
        assert!(registry.snapshot("b", None).unwrap().is_some());
        assert!(registry.snapshot("c", None).unwrap().is_none());
    }
}
