//! JSON snapshot of the engine tables.
//!
//! The snapshot is written to a uniquely named temp file in the target's
//! directory, synced, then persisted over the target. A crash mid-write
//! leaves the previous snapshot intact.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::engine::Tables;
use crate::error::Result;

/// Load tables from `path`, or empty tables when the file does not exist.
pub fn load(path: &Path) -> Result<Tables> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No snapshot yet, starting empty");
        return Ok(Tables::default());
    }
    let bytes = fs::read(path)?;
    let tables: Tables = serde_json::from_slice(&bytes)?;
    tracing::debug!(
        path = %path.display(),
        procedures = tables.procedures.len(),
        documents = tables.documents.len(),
        "Snapshot loaded"
    );
    Ok(tables)
}

pub fn save(path: &Path, tables: &Tables) -> Result<()> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let bytes = serde_json::to_vec_pretty(tables)?;

    let temp = NamedTempFile::new_in(dir)?;
    let mut file = temp.as_file();
    file.write_all(&bytes)?;
    file.sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Snapshot saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::engine::Engine;
    use crate::engine::test_support::procedure_with;
    use crate::error::EngineError;
    use crate::storage::MemoryStorage;

    #[test]
    fn missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tables = load(&dir.path().join("state.json")).unwrap();
        assert!(tables.procedures.is_empty());
    }

    #[test]
    fn save_then_load_restores_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let engine = Engine::new(MemoryStorage::new(), StaticDirectory::default());
        let (procedure, permits) = procedure_with(&engine, &["Sanitario"]);
        save(&path, &engine.snapshot()).unwrap();
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("state.json")]);

        let restored = Engine::new(MemoryStorage::new(), StaticDirectory::default())
            .with_tables(load(&path).unwrap());
        let association = restored.association(procedure, permits[0]).unwrap();
        assert_eq!(association.permit_type_id, permits[0]);

        // Sequences survive, so new ids never collide with restored ones.
        let next = restored.register_permit_type("Fitosanitario").unwrap();
        assert!(next.id > permits[0]);
    }

    #[test]
    fn corrupt_snapshot_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load(&path), Err(EngineError::Json(_))));
    }

    #[test]
    fn concurrent_saves_never_publish_a_partial_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let engine = Engine::new(MemoryStorage::new(), StaticDirectory::default());
        procedure_with(&engine, &["Sanitario", "Fitosanitario"]);
        let tables = engine.snapshot();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..10 {
                        save(&path, &tables).unwrap();
                    }
                });
            }
        });

        let restored = load(&path).unwrap();
        assert_eq!(restored.procedures.len(), 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn overwrites_an_existing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        save(&path, &Tables::default()).unwrap();

        let engine = Engine::new(MemoryStorage::new(), StaticDirectory::default());
        procedure_with(&engine, &["Sanitario"]);
        save(&path, &engine.snapshot()).unwrap();
        assert_eq!(load(&path).unwrap().procedures.len(), 1);
    }
}
