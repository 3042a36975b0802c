//! Pure snapshot transforms.
//!
//! Every function borrows the input snapshot and returns a fresh `Vec`, so a
//! snapshot captured for rollback is never aliased by a later mutation. All of
//! them preserve the relative order of entities they do not touch, and none of
//! them can produce two entities sharing a key.

use crate::record::Record;

/// Index of the entity with `key`, if present.
pub fn position<T: Record>(snapshot: &[T], key: &str) -> Option<usize> {
    snapshot.iter().position(|entity| entity.key() == key)
}

pub fn find<'a, T: Record>(snapshot: &'a [T], key: &str) -> Option<&'a T> {
    snapshot.iter().find(|entity| entity.key() == key)
}

/// Place `entity` at index 0, dropping any older entry with the same key.
pub fn insert_first<T: Record>(snapshot: &[T], entity: T) -> Vec<T> {
    let mut next = Vec::with_capacity(snapshot.len() + 1);
    let key = entity.key().to_string();
    next.push(entity);
    next.extend(snapshot.iter().filter(|e| e.key() != key).cloned());
    next
}

/// Replace the entity sharing `entity`'s key in place. No-op when absent.
pub fn replace_by_id<T: Record>(snapshot: &[T], entity: T) -> Vec<T> {
    let mut next = snapshot.to_vec();
    if let Some(index) = position(&next, entity.key()) {
        next[index] = entity;
    }
    next
}

/// Drop the entity with `key`. No-op when absent.
pub fn remove_by_id<T: Record>(snapshot: &[T], key: &str) -> Vec<T> {
    snapshot.iter().filter(|e| e.key() != key).cloned().collect()
}

/// Replace the entity sharing `entity`'s natural key, or append it.
pub fn replace_by_key<T: Record>(snapshot: &[T], entity: T) -> Vec<T> {
    let mut next = snapshot.to_vec();
    match position(&next, entity.key()) {
        Some(index) => next[index] = entity,
        None => next.push(entity),
    }
    next
}

/// Insert `entity` at `index` (clamped to the length). If an entity with the
/// same key is already present the snapshot is returned unchanged.
pub fn insert_at<T: Record>(snapshot: &[T], index: usize, entity: T) -> Vec<T> {
    let mut next = snapshot.to_vec();
    if position(&next, entity.key()).is_some() {
        return next;
    }
    let index = index.min(next.len());
    next.insert(index, entity);
    next
}

/// Re-insert `entity` right after the entity keyed `anchor` if that is still
/// present, otherwise at `index` (clamped). `anchor == None` means it was first.
/// No-op if an entity with the same key is already present.
pub fn insert_after<T: Record>(
    snapshot: &[T],
    anchor: Option<&str>,
    index: usize,
    entity: T,
) -> Vec<T> {
    let index = match anchor {
        Some(anchor) => position(snapshot, anchor).map_or(index, |i| i + 1),
        None => 0,
    };
    insert_at(snapshot, index, entity)
}

/// Swap the entity keyed `old_key` for `entity`, keeping its position. Any
/// other entry already carrying `entity`'s key is dropped. No-op when
/// `old_key` is absent.
pub fn rekey<T: Record>(snapshot: &[T], old_key: &str, entity: T) -> Vec<T> {
    let Some(index) = position(snapshot, old_key) else {
        return snapshot.to_vec();
    };
    let new_key = entity.key().to_string();
    let mut replacement = Some(entity);
    snapshot
        .iter()
        .enumerate()
        .filter_map(|(i, e)| {
            if i == index {
                replacement.take()
            } else if e.key() == new_key {
                None
            } else {
                Some(e.clone())
            }
        })
        .collect()
}
