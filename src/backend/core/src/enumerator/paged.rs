//! Keyset-paged sources.

use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;

use super::keyset::SortDirection;
use super::Step;
use crate::cursor::CursorValue;
use crate::error::{ResumableError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Paged Source
// ═══════════════════════════════════════════════════════════════════════════════

/// An ordered collection read as "strictly after key K, limit N".
///
/// Implementations must order by a unique key so that concurrent inserts and
/// deletes never shift the position of records not yet read.
pub trait PagedSource {
    type Record;

    /// Name used in logs and cursor errors.
    fn name(&self) -> &str {
        "paged source"
    }

    /// Fetch up to `limit` records ordered after `after` (from the start when `None`).
    fn fetch_page(&mut self, after: Option<&CursorValue>, limit: usize) -> Result<Vec<Self::Record>>;

    /// Ordering key of a record, used as its cursor.
    fn ordering_key(&self, record: &Self::Record) -> CursorValue;

    /// Reject starting cursors of the wrong shape.
    fn accepts_cursor(&self, _cursor: &CursorValue) -> Result<()> {
        Ok(())
    }
}

pub(super) fn checked_start<S: PagedSource>(
    source: &S,
    cursor: Option<CursorValue>,
) -> Result<Option<CursorValue>> {
    match cursor {
        None | Some(CursorValue::Null) => Ok(None),
        Some(cursor) => {
            source.accepts_cursor(&cursor)?;
            Ok(Some(cursor))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Record iteration
// ─────────────────────────────────────────────────────────────────────────────

pub(super) struct RecordIter<S: PagedSource> {
    source: S,
    after: Option<CursorValue>,
    buffer: VecDeque<S::Record>,
    limit: usize,
    exhausted: bool,
}

impl<S: PagedSource> RecordIter<S> {
    pub(super) fn new(source: S, after: Option<CursorValue>, limit: usize) -> Self {
        Self {
            source,
            after,
            buffer: VecDeque::with_capacity(limit),
            limit,
            exhausted: false,
        }
    }
}

impl<S: PagedSource> Iterator for RecordIter<S> {
    type Item = Step<S::Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            if self.exhausted {
                return None;
            }
            match self.source.fetch_page(self.after.as_ref(), self.limit) {
                Ok(page) => {
                    if page.len() < self.limit {
                        self.exhausted = true;
                    }
                    tracing::trace!(source = self.source.name(), records = page.len(), "Fetched page");
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        let record = self.buffer.pop_front()?;
        let cursor = self.source.ordering_key(&record);
        self.after = Some(cursor.clone());
        Some(Ok((record, cursor)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Batch iteration
// ─────────────────────────────────────────────────────────────────────────────

pub(super) struct BatchIter<S: PagedSource> {
    source: S,
    after: Option<CursorValue>,
    limit: usize,
    exhausted: bool,
}

impl<S: PagedSource> BatchIter<S> {
    pub(super) fn new(source: S, after: Option<CursorValue>, limit: usize) -> Self {
        Self {
            source,
            after,
            limit,
            exhausted: false,
        }
    }
}

impl<S: PagedSource> Iterator for BatchIter<S> {
    type Item = Step<Vec<S::Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let page = match self.source.fetch_page(self.after.as_ref(), self.limit) {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Some(Err(e));
            }
        };
        if page.len() < self.limit {
            self.exhausted = true;
        }

        let cursor = self.source.ordering_key(page.last()?);
        self.after = Some(cursor.clone());
        Some(Ok((page, cursor)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Relation
// ═══════════════════════════════════════════════════════════════════════════════

/// A shared, mutable, integer-keyed relation.
///
/// Clones share storage, so one handle can be iterated while another inserts
/// or deletes rows.
#[derive(Debug)]
pub struct InMemoryRelation<T> {
    name: String,
    rows: Arc<RwLock<BTreeMap<i64, T>>>,
    direction: SortDirection,
}

impl<T> Clone for InMemoryRelation<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            rows: Arc::clone(&self.rows),
            direction: self.direction,
        }
    }
}

impl<T: Clone> InMemoryRelation<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            direction: SortDirection::Asc,
        }
    }

    /// Iterate in the given key order. Shares storage with `self`.
    pub fn ordered(&self, direction: SortDirection) -> Self {
        Self {
            direction,
            ..self.clone()
        }
    }

    pub fn with_rows<I>(self, rows: I) -> Self
    where
        I: IntoIterator<Item = (i64, T)>,
    {
        self.rows.write().extend(rows);
        self
    }

    pub fn insert(&self, key: i64, row: T) -> Option<T> {
        self.rows.write().insert(key, row)
    }

    pub fn remove(&self, key: i64) -> Option<T> {
        self.rows.write().remove(&key)
    }

    pub fn get(&self, key: i64) -> Option<T> {
        self.rows.read().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl<T: Clone> PagedSource for InMemoryRelation<T> {
    type Record = (i64, T);

    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_page(&mut self, after: Option<&CursorValue>, limit: usize) -> Result<Vec<Self::Record>> {
        let after = match after {
            Some(cursor) => Some(key_of(&self.name, cursor)?),
            None => None,
        };

        let rows = self.rows.read();
        let page = match (self.direction, after) {
            (SortDirection::Asc, None) => rows
                .iter()
                .take(limit)
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            (SortDirection::Asc, Some(key)) => rows
                .range((Bound::Excluded(key), Bound::Unbounded))
                .take(limit)
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            (SortDirection::Desc, None) => rows
                .iter()
                .rev()
                .take(limit)
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            (SortDirection::Desc, Some(key)) => rows
                .range(..key)
                .rev()
                .take(limit)
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        };

        Ok(page)
    }

    fn ordering_key(&self, record: &Self::Record) -> CursorValue {
        CursorValue::Integer(record.0)
    }

    fn accepts_cursor(&self, cursor: &CursorValue) -> Result<()> {
        key_of(&self.name, cursor).map(|_| ())
    }
}

fn key_of(source: &str, cursor: &CursorValue) -> Result<i64> {
    cursor
        .as_i64()
        .ok_or_else(|| ResumableError::invalid_cursor(source, "an integer key", cursor.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerator::EnumeratorBuilder;
    use crate::error::ErrorCode;

    struct CountingSource {
        inner: InMemoryRelation<&'static str>,
        fetches: Arc<parking_lot::Mutex<Vec<usize>>>,
    }

    impl PagedSource for CountingSource {
        type Record = (i64, &'static str);

        fn fetch_page(&mut self, after: Option<&CursorValue>, limit: usize) -> Result<Vec<Self::Record>> {
            let page = self.inner.fetch_page(after, limit)?;
            self.fetches.lock().push(page.len());
            Ok(page)
        }

        fn ordering_key(&self, record: &Self::Record) -> CursorValue {
            self.inner.ordering_key(record)
        }
    }

    fn relation() -> InMemoryRelation<&'static str> {
        InMemoryRelation::new("letters").with_rows([(1, "a"), (2, "b"), (3, "c"), (5, "e"), (8, "h")])
    }

    #[test]
    fn test_pages_fetched_on_demand() {
        let fetches = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let source = CountingSource {
            inner: relation(),
            fetches: fetches.clone(),
        };
        let mut records = EnumeratorBuilder::new()
            .with_batch_size(2)
            .over_paged_source(source, None)
            .unwrap();

        assert_eq!(records.next().unwrap().unwrap().0, (1, "a"));
        assert_eq!(*fetches.lock(), vec![2]);

        let rest: Vec<_> = records.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(rest.len(), 4);
        assert_eq!(*fetches.lock(), vec![2, 2, 1]);
    }

    #[test]
    fn test_resume_after_key() {
        let keys: Vec<i64> = EnumeratorBuilder::new()
            .with_batch_size(2)
            .over_paged_source(relation(), Some(CursorValue::Integer(2)))
            .unwrap()
            .map(|step| step.unwrap().0 .0)
            .collect();
        assert_eq!(keys, vec![3, 5, 8]);
    }

    #[test]
    fn test_descending_order() {
        let keys: Vec<i64> = EnumeratorBuilder::new()
            .over_paged_source(relation().ordered(SortDirection::Desc), Some(CursorValue::Integer(5)))
            .unwrap()
            .map(|step| step.unwrap().0 .0)
            .collect();
        assert_eq!(keys, vec![3, 2, 1]);
    }

    #[test]
    fn test_wrong_key_type_rejected() {
        let err = EnumeratorBuilder::new()
            .over_paged_source(relation(), Some(CursorValue::from("b")))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCursor);
    }

    #[test]
    fn test_batches_carry_last_key() {
        let batches: Vec<_> = EnumeratorBuilder::new()
            .with_batch_size(2)
            .over_paged_source_batches(relation(), None)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].1, CursorValue::Integer(2));
        assert_eq!(batches[2].0, vec![(8, "h")]);
        assert_eq!(batches[2].1, CursorValue::Integer(8));
    }

    #[test]
    fn test_exact_multiple_ends_with_empty_fetch() {
        let rel = InMemoryRelation::new("pairs").with_rows([(1, ()), (2, ())]);
        let batches: Vec<_> = EnumeratorBuilder::new()
            .with_batch_size(2)
            .over_paged_source_batches(rel, None)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn test_fetch_error_fuses() {
        struct Broken;
        impl PagedSource for Broken {
            type Record = i64;
            fn fetch_page(&mut self, _: Option<&CursorValue>, _: usize) -> Result<Vec<i64>> {
                Err(ResumableError::source_fetch("broken", "connection refused"))
            }
            fn ordering_key(&self, record: &i64) -> CursorValue {
                CursorValue::Integer(*record)
            }
        }

        let mut records = EnumeratorBuilder::new().over_paged_source(Broken, None).unwrap();
        assert_eq!(
            records.next().unwrap().unwrap_err().code(),
            ErrorCode::SourceFetchFailed
        );
        assert!(records.next().is_none());
    }
}
