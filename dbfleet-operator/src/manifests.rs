//! Loading of declared records from a directory of JSON files.
//!
//! Every `*.json` file holds one record or an array of records. A record is
//! the stored document plus a `kind` field naming its type.

use std::path::Path;

use anyhow::{bail, Context, Result};
use dbfleet_api::{
    BackupPolicy, BackupSchedule, DatabaseUser, Deployment, Resource, SearchIndexConfig, Secret,
    Store, StoreExt,
};
use serde_json::Value;
use tracing::{debug, info};

/// Loads every record under `dir` into `store`. Returns how many were created.
pub async fn load_dir(store: &dyn Store, dir: &Path) -> Result<usize> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read manifest directory {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut count = 0;
    for path in paths {
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let records = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        for record in records {
            apply(store, record)
                .await
                .with_context(|| format!("Invalid record in {}", path.display()))?;
            count += 1;
        }
        debug!("Loaded {}", path.display());
    }
    info!("Loaded {} records from {}", count, dir.display());
    Ok(count)
}

async fn apply(store: &dyn Store, mut record: Value) -> Result<()> {
    let kind = match record.as_object_mut().and_then(|map| map.remove("kind")) {
        Some(Value::String(kind)) => kind,
        _ => bail!("record has no kind"),
    };
    match kind.as_str() {
        k if k == Deployment::KIND => create::<Deployment>(store, record).await,
        k if k == BackupSchedule::KIND => create::<BackupSchedule>(store, record).await,
        k if k == BackupPolicy::KIND => create::<BackupPolicy>(store, record).await,
        k if k == SearchIndexConfig::KIND => create::<SearchIndexConfig>(store, record).await,
        k if k == DatabaseUser::KIND => create::<DatabaseUser>(store, record).await,
        k if k == Secret::KIND => create::<Secret>(store, record).await,
        other => bail!("unknown kind {}", other),
    }
}

async fn create<R: Resource>(store: &dyn Store, record: Value) -> Result<()> {
    let record: R = serde_json::from_value(record)?;
    store.create(&record).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbfleet_api::{MemoryStore, ObjectKey};
    use serde_json::json;

    fn make_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("dbfleet-manifests-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_load_dir() {
        let dir = make_dir();
        let records = json!([
            {
                "kind": "BackupPolicy",
                "meta": {"namespace": "default", "name": "keep-week"},
                "spec": {"items": []}
            },
            {
                "kind": "Deployment",
                "meta": {"namespace": "default", "name": "c1"},
                "spec": {"projectId": "proj-1", "flexSpec": {
                    "name": "c1",
                    "providerSettings": {"backingProviderName": "AWS", "regionName": "US_EAST_1"}
                }}
            }
        ]);
        std::fs::write(dir.join("records.json"), records.to_string()).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let store = MemoryStore::new();
        assert_eq!(load_dir(&store, &dir).await.unwrap(), 2);

        let d: Option<Deployment> = store.get(&ObjectKey::new("default", "c1")).await.unwrap();
        assert_eq!(d.unwrap().spec.project_id, "proj-1");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_unknown_kind_is_rejected() {
        let dir = make_dir();
        let record = json!({"kind": "Project", "meta": {"namespace": "default", "name": "p"}});
        std::fs::write(dir.join("p.json"), record.to_string()).unwrap();

        let store = MemoryStore::new();
        assert!(load_dir(&store, &dir).await.is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
