use chrono::{DateTime, Utc};
use serde_json::Value;
use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use uuid::Uuid;

use super::{
    Created,
    Deleted,
    Document,
    Health,
    Hit,
    Outcome,
    Partition,
    Refresh,
    Script,
    Search,
    Store,
    StoreError,
    Updated,
};

type Table = HashMap<Partition, BTreeMap<String, Value>>;

/// Sort key of a search hit: newest first, then by partition and key.
type SortKey = (Reverse<Option<i64>>, Partition, String);

/// A store keeping all documents in memory of this process.
///
/// Clones share the same data, which makes it possible to run several
/// workflow engines (standing in for several processes) against one store.
/// Writes are visible immediately, so [`Refresh`] has no effect.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    table: Arc<Mutex<Table>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Number of documents in a partition.
    pub fn count(&self, partition: Partition) -> usize {
        self.table().get(&partition).map_or(0, BTreeMap::len)
    }

    fn table(&self) -> MutexGuard<Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn created_at(source: &Value) -> Option<i64> {
    source.get("created_at")
        .cloned()
        .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok())
        .map(|at| at.timestamp_nanos())
}

fn sort_values(key: &SortKey) -> Vec<Value> {
    let (Reverse(created), partition, id) = key;
    vec![
        created.map_or(Value::Null, Value::from),
        Value::from(partition.as_str()),
        Value::from(id.as_str()),
    ]
}

fn parse_sort_values(values: &[Value]) -> Result<SortKey, StoreError> {
    match values {
        [created, Value::String(partition), Value::String(id)] => {
            let created = match created {
                Value::Null => None,
                Value::Number(n) => Some(n.as_i64().ok_or(StoreError::SearchAfter)?),
                _ => return Err(StoreError::SearchAfter),
            };
            let partition = partition.parse().map_err(|_| StoreError::SearchAfter)?;
            Ok((Reverse(created), partition, id.clone()))
        }
        _ => Err(StoreError::SearchAfter),
    }
}

impl Store for MemoryStore {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_simple().to_string()
    }

    fn get(&self, partition: Partition, id: &str, _: bool)
    -> Result<Option<Document>, StoreError> {
        Ok(self.table()
            .get(&partition)
            .and_then(|docs| docs.get(id))
            .map(|source| Document {
                partition,
                id: id.to_string(),
                source: source.clone(),
            }))
    }

    fn create(&self, partition: Partition, id: &str, doc: &Value, _: Refresh)
    -> Result<Created, StoreError> {
        let mut table = self.table();
        let docs = table.entry(partition).or_default();

        if docs.contains_key(id) {
            return Ok(Created::Conflict);
        }

        docs.insert(id.to_string(), doc.clone());
        Ok(Created::Created)
    }

    fn upsert(&self, partition: Partition, id: &str, doc: &Value, _: Refresh)
    -> Result<(), StoreError> {
        self.table()
            .entry(partition)
            .or_default()
            .insert(id.to_string(), doc.clone());
        Ok(())
    }

    fn update_with_script(
        &self,
        partition: Partition,
        id: &str,
        script: &Script,
        _: Refresh,
    ) -> Result<Updated, StoreError> {
        let mut table = self.table();
        let docs = table.entry(partition).or_default();

        let outcome = match docs.get_mut(id) {
            None => return Ok(Updated::NotFound),
            Some(Value::Object(source)) => script.apply(source),
            Some(_) => return Err(StoreError::Response(format!(
                "document {}/{} is not an object", partition, id))),
        };

        Ok(match outcome {
            Outcome::Updated => Updated::Updated,
            Outcome::Noop => Updated::Noop,
            Outcome::Deleted => {
                docs.remove(id);
                Updated::Deleted
            }
        })
    }

    fn delete(&self, partition: Partition, id: &str, _: Refresh)
    -> Result<Deleted, StoreError> {
        let removed = self.table()
            .get_mut(&partition)
            .and_then(|docs| docs.remove(id));

        Ok(match removed {
            Some(_) => Deleted::Deleted,
            None => Deleted::NotFound,
        })
    }

    fn search(&self, search: &Search) -> Result<Vec<Hit>, StoreError> {
        let after = search.search_after.as_ref()
            .map(|values| parse_sort_values(values))
            .transpose()?;
        let since = search.created_since.map(|at| at.timestamp_nanos());

        let table = self.table();
        let mut hits = search.partitions.iter()
            .filter_map(|partition| table.get(partition).map(|docs| (*partition, docs)))
            .flat_map(|(partition, docs)| docs.iter().map(move |(id, source)| {
                let key = (Reverse(created_at(source)), partition, id.clone());
                (key, source)
            }))
            .filter(|(_, source)| match search.guid {
                Some(ref guid) => source.get("guid").and_then(Value::as_str)
                    == Some(guid.as_str()),
                None => true,
            })
            .filter(|((Reverse(created), _, _), _)| match since {
                Some(since) => created.map_or(false, |created| created >= since),
                None => true,
            })
            .filter(|(key, _)| after.as_ref().map_or(true, |after| key > after))
            .collect::<Vec<_>>();

        hits.sort_by(|a, b| a.0.cmp(&b.0));
        hits.truncate(search.size);

        Ok(hits.into_iter()
            .map(|(key, source)| Hit {
                sort: sort_values(&key),
                document: Document {
                    partition: key.1,
                    id: key.2,
                    source: source.clone(),
                },
            })
            .collect())
    }

    fn health(&self) -> Result<Health, StoreError> {
        Ok(Health::Green)
    }

    fn init(&self) -> Result<(), StoreError> {
        let mut table = self.table();
        for partition in &Partition::ALL {
            table.entry(*partition).or_default();
        }
        Ok(())
    }

    fn drop_all(&self) -> Result<(), StoreError> {
        self.table().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    fn doc(guid: &str, created: i64) -> Value {
        json!({
            "id": guid,
            "guid": guid,
            "created_at": crate::version::from_nanos(created),
            "locked_by": "alice",
        })
    }

    #[test]
    fn create_never_overwrites() {
        let store = MemoryStore::new();
        assert_eq!(store.create(Partition::Version, "a:1", &doc("a", 1), Refresh::No)
            .unwrap(), Created::Created);
        assert_eq!(store.create(Partition::Version, "a:1", &doc("b", 2), Refresh::No)
            .unwrap(), Created::Conflict);

        let stored = store.get(Partition::Version, "a:1", true).unwrap().unwrap();
        assert_eq!(stored.source["guid"], json!("a"));
    }

    #[test]
    fn scripts_update_and_delete() {
        let store = MemoryStore::new();
        store.upsert(Partition::Draft, "a", &doc("a", 1), Refresh::No).unwrap();

        let delete = |user: &str| Script::DeleteIfOwner { username: user.into() };
        assert_eq!(store.update_with_script(
            Partition::Draft, "a", &delete("bob"), Refresh::No).unwrap(), Updated::Noop);
        assert_eq!(store.update_with_script(
            Partition::Draft, "a", &delete("alice"), Refresh::No).unwrap(), Updated::Deleted);
        assert_eq!(store.update_with_script(
            Partition::Draft, "a", &delete("alice"), Refresh::No).unwrap(), Updated::NotFound);
        assert_eq!(store.count(Partition::Draft), 0);
    }

    #[test]
    fn delete_reports_missing_documents() {
        let store = MemoryStore::new();
        store.upsert(Partition::Publish, "a", &doc("a", 1), Refresh::No).unwrap();
        assert_eq!(store.delete(Partition::Publish, "a", Refresh::No).unwrap(),
            Deleted::Deleted);
        assert_eq!(store.delete(Partition::Publish, "a", Refresh::No).unwrap(),
            Deleted::NotFound);
    }

    #[test]
    fn search_pages_newest_first() {
        let store = MemoryStore::new();
        for (inx, guid) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            store.upsert(Partition::Draft, guid, &doc(guid, inx as i64 + 1), Refresh::No)
                .unwrap();
        }
        store.upsert(Partition::Publish, "c", &doc("c", 3), Refresh::No).unwrap();

        let mut search = Search::new(&Partition::ARTICLES, 4);
        let page = store.search(&search).unwrap();
        let ids = page.iter()
            .map(|hit| (hit.document.partition, hit.document.id.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![
            (Partition::Draft, "e"),
            (Partition::Draft, "d"),
            (Partition::Draft, "c"),
            (Partition::Publish, "c"),
        ]);

        search.search_after = Some(page[3].sort.clone());
        let page = store.search(&search).unwrap();
        let ids = page.iter().map(|hit| hit.document.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn search_filters_by_guid_and_time() {
        let store = MemoryStore::new();
        store.upsert(Partition::Draft, "a", &doc("a", 10), Refresh::No).unwrap();
        store.upsert(Partition::Version, "a:5", &doc("a", 5), Refresh::No).unwrap();
        store.upsert(Partition::Draft, "b", &doc("b", 20), Refresh::No).unwrap();

        let mut search = Search::new(&Partition::ARTICLES, 10);
        search.guid = Some("a".into());
        assert_eq!(store.search(&search).unwrap().len(), 2);

        search.created_since = Some(crate::version::from_nanos(10));
        assert_eq!(store.search(&search).unwrap().len(), 1);
    }

    #[test]
    fn foreign_continuations_are_rejected() {
        let store = MemoryStore::new();
        let mut search = Search::new(&Partition::ARTICLES, 10);
        search.search_after = Some(vec![json!("x")]);
        match store.search(&search) {
            Err(StoreError::SearchAfter) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
