//! Relation expansion, reverse lookups and update cascades.

use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap, HashSet};

use tournament::{relation, Collection, Expanded, Field, Record, Relation};

use crate::persistence::{AfterUpdateHook, PersistenceError, StoreTx};

type RecordKey = (Collection, String);

/// The shared collection of `records`, `None` for an empty list.
fn common_collection(records: &[Record]) -> Result<Option<Collection>, PersistenceError> {
    let Some(first) = records.first() else {
        return Ok(None);
    };
    let expected = first.collection;
    match records.iter().find(|r| r.collection != expected) {
        Some(other) => Err(PersistenceError::MixedCollections {
            expected,
            found: other.collection,
        }),
        None => Ok(Some(expected)),
    }
}

fn unique_ids<'a>(records: impl IntoIterator<Item = &'a Record>, field: Field) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .flat_map(|r| r.get_string_list(field))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Expand the given relation fields of `records` one level deep.
///
/// Ids that no longer resolve are left out of the expansion.
pub async fn expand_relations(
    tx: &mut StoreTx,
    records: &mut [Record],
    relations: &[&'static Relation],
) -> Result<(), PersistenceError> {
    for relation in relations {
        let ids = unique_ids(records.iter(), relation.field);
        if ids.is_empty() {
            continue;
        }
        let related: HashMap<String, Record> = tx
            .find_by_ids(relation.target, &ids)
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        for record in records.iter_mut() {
            let found: Vec<Record> = record
                .get_string_list(relation.field)
                .iter()
                .filter_map(|id| related.get(id).cloned())
                .collect();
            if let Some(expanded) = to_expanded(relation, found) {
                record.set_expand(relation.field, expanded);
            }
        }
    }
    Ok(())
}

fn to_expanded(relation: &Relation, mut found: Vec<Record>) -> Option<Expanded> {
    if found.is_empty() {
        return None;
    }
    if relation.is_multiple() {
        Some(Expanded::Many(found))
    } else {
        Some(Expanded::One(Box::new(found.swap_remove(0))))
    }
}

/// Expand one relation field of `records`.
pub async fn expand_field(
    tx: &mut StoreTx,
    records: &mut [Record],
    field: Field,
) -> Result<(), PersistenceError> {
    match relation(field) {
        Some(relation) => expand_relations(tx, records, &[relation]).await,
        None => Ok(()),
    }
}

/// Expand every relation field declared by the collection of `records`.
///
/// All records must belong to the same collection.
pub async fn expand_all_relations(
    tx: &mut StoreTx,
    records: &mut [Record],
) -> Result<(), PersistenceError> {
    let Some(collection) = common_collection(records)? else {
        return Ok(());
    };
    let relations: Vec<&'static Relation> = collection.relations().collect();
    expand_relations(tx, records, &relations).await
}

/// Expand all relations of `records` recursively, across collections.
///
/// Every distinct reachable record is loaded once. A record that shows up
/// again below itself is attached without its own expansion, so cyclic
/// relation graphs terminate.
pub async fn expand_all_nested_relations(
    tx: &mut StoreTx,
    records: &mut [Record],
) -> Result<(), PersistenceError> {
    if common_collection(records)?.is_none() {
        return Ok(());
    }

    let mut loaded: HashMap<RecordKey, Record> = records
        .iter()
        .map(|r| ((r.collection, r.id.clone()), r.clone()))
        .collect();
    let mut frontier: Vec<Record> = records.to_vec();

    while !frontier.is_empty() {
        let mut wanted: BTreeMap<Collection, Vec<String>> = BTreeMap::new();
        for record in &frontier {
            for relation in record.collection.relations() {
                for id in record.get_string_list(relation.field) {
                    let ids = wanted.entry(relation.target).or_default();
                    if !loaded.contains_key(&(relation.target, id.clone())) && !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
        }

        let mut next = Vec::new();
        for (collection, ids) in wanted {
            for record in tx.find_by_ids(collection, &ids).await? {
                let key = (record.collection, record.id.clone());
                if !loaded.contains_key(&key) {
                    loaded.insert(key, record.clone());
                    next.push(record);
                }
            }
        }
        tracing::debug!(loaded = loaded.len(), next = next.len(), "Nested expansion step");
        frontier = next;
    }

    for record in records.iter_mut() {
        let mut path = vec![(record.collection, record.id.clone())];
        attach_expansions(record, &loaded, &mut path);
    }
    Ok(())
}

fn attach_expansions(
    record: &mut Record,
    loaded: &HashMap<RecordKey, Record>,
    path: &mut Vec<RecordKey>,
) {
    for relation in record.collection.relations() {
        let mut children: Vec<Record> = record
            .get_string_list(relation.field)
            .into_iter()
            .filter_map(|id| loaded.get(&(relation.target, id)).cloned())
            .collect();

        for child in children.iter_mut() {
            let key = (child.collection, child.id.clone());
            if path.contains(&key) {
                continue;
            }
            path.push(key);
            attach_expansions(child, loaded, path);
            path.pop();
        }

        if let Some(expanded) = to_expanded(relation, children) {
            record.set_expand(relation.field, expanded);
        }
    }
}

/// All records of `collection`, each with its relations expanded one level.
pub async fn fetch_and_expand_collection(
    tx: &mut StoreTx,
    collection: Collection,
) -> Result<Vec<Record>, PersistenceError> {
    let mut records = tx.find_all(collection).await?;
    expand_all_relations(tx, &mut records).await?;
    Ok(records)
}

/// Records whose single-valued `field` points at `id`.
pub async fn find_reverse_relations(
    tx: &mut StoreTx,
    field: Field,
    id: &str,
) -> Result<Vec<Record>, PersistenceError> {
    tx.find_by_field(field, id).await
}

/// Records whose multi-valued `field` contains `id`.
pub async fn find_reverse_multi_relations(
    tx: &mut StoreTx,
    field: Field,
    id: &str,
) -> Result<Vec<Record>, PersistenceError> {
    tx.find_containing(field, id).await
}

/// Records that reference `id` through `relation`, by its cardinality.
pub async fn find_referrers(
    tx: &mut StoreTx,
    relation: &Relation,
    id: &str,
) -> Result<Vec<Record>, PersistenceError> {
    if relation.is_multiple() {
        find_reverse_multi_relations(tx, relation.field, id).await
    } else {
        find_reverse_relations(tx, relation.field, id).await
    }
}

/// Save `records` unchanged so their own change notifications and hooks fire.
pub async fn cascade_relation_update(
    tx: &mut StoreTx,
    records: Vec<Record>,
) -> Result<(), PersistenceError> {
    for mut record in records {
        tx.save(&mut record).await?;
    }
    Ok(())
}

/// Delete the records of `collection` with the given ids. Unknown ids are skipped.
pub async fn delete_records_by_id(
    tx: &mut StoreTx,
    collection: Collection,
    ids: &[String],
) -> Result<usize, PersistenceError> {
    let records = tx.find_by_ids(collection, ids).await?;
    let count = records.len();
    for record in &records {
        tx.delete(record).await?;
    }
    Ok(count)
}

/// Model hook: an update of a referenced record re-saves the records that
/// point at it through one relation.
pub struct RelationCascade {
    relation: &'static Relation,
}

impl RelationCascade {
    pub fn new(relation: &'static Relation) -> Self {
        Self { relation }
    }
}

impl AfterUpdateHook for RelationCascade {
    fn name(&self) -> String {
        format!("cascade {}", self.relation.field)
    }

    fn run<'a>(
        &'a self,
        tx: &'a mut StoreTx,
        record: &'a Record,
    ) -> BoxFuture<'a, Result<(), PersistenceError>> {
        Box::pin(async move {
            let dependents = find_referrers(tx, self.relation, &record.id).await?;
            if !dependents.is_empty() {
                tracing::debug!(
                    field = %self.relation.field,
                    id = %record.id,
                    dependents = dependents.len(),
                    "Cascading relation update"
                );
            }
            cascade_relation_update(tx, dependents).await
        })
    }
}
