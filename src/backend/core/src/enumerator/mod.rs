//! Resumable lazy sequences of `(item, cursor)` pairs.
//!
//! Every enumerator is seeded from an optional starting cursor and resumes
//! strictly after the position that cursor identifies. Builders validate the
//! cursor shape eagerly, so a bad cursor fails before any item is produced.
//!
//! ```rust,ignore
//! let builder = EnumeratorBuilder::new();
//! let items = builder.over_collection(vec!["a", "b", "c"], Some(CursorValue::from(0i64)))?;
//! // yields ("b", 1), ("c", 2)
//! ```

mod keyset;
mod nested;
mod paged;

pub use keyset::{KeysetQuery, SortDirection, SortField};
pub use nested::NestedIter;
pub use paged::{InMemoryRelation, PagedSource};

use crate::cursor::CursorValue;
use crate::error::{ResumableError, Result};

/// One step of an enumerator.
pub type Step<T> = Result<(T, CursorValue)>;

/// Default number of records fetched per page.
pub const DEFAULT_BATCH_SIZE: usize = 100;

// ═══════════════════════════════════════════════════════════════════════════════
// Enumerator
// ═══════════════════════════════════════════════════════════════════════════════

/// A lazy, possibly infinite sequence of items paired with their resumption cursor.
///
/// Owned by the slice that built it; never shared across slices.
pub struct Enumerator<'a, T> {
    inner: Box<dyn Iterator<Item = Step<T>> + 'a>,
}

impl<'a, T: 'a> Enumerator<'a, T> {
    /// Wrap any iterator of steps.
    pub fn new<I>(steps: I) -> Self
    where
        I: Iterator<Item = Step<T>> + 'a,
    {
        Self {
            inner: Box::new(steps),
        }
    }

    /// Wrap an infallible iterator of `(item, cursor)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, CursorValue)>,
        I::IntoIter: 'a,
    {
        Self::new(pairs.into_iter().map(Ok))
    }

    /// An enumerator that yields nothing.
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Transform each item, keeping its cursor.
    pub fn map_items<U: 'a, F>(self, mut f: F) -> Enumerator<'a, U>
    where
        F: FnMut(T) -> U + 'a,
    {
        Enumerator::new(self.inner.map(move |step| step.map(|(item, cursor)| (f(item), cursor))))
    }
}

impl<T> Iterator for Enumerator<'_, T> {
    type Item = Step<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl<T> std::fmt::Debug for Enumerator<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enumerator").finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Turns declared source shapes into [`Enumerator`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumeratorBuilder {
    batch_size: usize,
}

impl Default for EnumeratorBuilder {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl EnumeratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size used by paged sources. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Yield `0..n`, or the suffix after the integer `cursor`.
    pub fn times(&self, n: u64, cursor: Option<CursorValue>) -> Result<Enumerator<'static, i64>> {
        let start = resume_index("times", cursor.as_ref())?;
        let end = i64::try_from(n).unwrap_or(i64::MAX);
        let start = i64::try_from(start).unwrap_or(i64::MAX);

        Ok(Enumerator::new(
            (start..end).map(|i| Ok((i, CursorValue::Integer(i)))),
        ))
    }

    /// Yield elements in iteration order, resuming after the zero-based index `cursor`.
    pub fn over_collection<'a, C>(
        &self,
        collection: C,
        cursor: Option<CursorValue>,
    ) -> Result<Enumerator<'a, C::Item>>
    where
        C: IntoIterator,
        C::IntoIter: 'a,
        C::Item: 'a,
    {
        let start = resume_index("collection", cursor.as_ref())?;

        Ok(Enumerator::new(
            collection
                .into_iter()
                .enumerate()
                .skip(start)
                .map(|(index, item)| Ok((item, CursorValue::Integer(index as i64)))),
        ))
    }

    /// Yield records page by page, resuming strictly after the ordering key `cursor`.
    pub fn over_paged_source<'a, S>(
        &self,
        source: S,
        cursor: Option<CursorValue>,
    ) -> Result<Enumerator<'a, S::Record>>
    where
        S: PagedSource + 'a,
        S::Record: 'a,
    {
        let after = paged::checked_start(&source, cursor)?;
        Ok(Enumerator::new(paged::RecordIter::new(source, after, self.batch_size)))
    }

    /// Yield whole pages; each cursor is the ordering key of the page's last record.
    pub fn over_paged_source_batches<'a, S>(
        &self,
        source: S,
        cursor: Option<CursorValue>,
    ) -> Result<Enumerator<'a, Vec<S::Record>>>
    where
        S: PagedSource + 'a,
        S::Record: 'a,
    {
        let after = paged::checked_start(&source, cursor)?;
        Ok(Enumerator::new(paged::BatchIter::new(source, after, self.batch_size)))
    }

    /// Compose two enumerators.
    ///
    /// `outer` is called once with the outer resume cursor. `inner` is called for
    /// every outer item; it receives the stored inner cursor only for the first
    /// outer item after resumption. Cursors are `[outer_resume, inner]`.
    pub fn nested<'a, O, I, F, G>(
        &self,
        outer: F,
        inner: G,
        cursor: Option<CursorValue>,
    ) -> Result<Enumerator<'a, I>>
    where
        O: 'a,
        I: 'a,
        F: FnOnce(Option<CursorValue>) -> Result<Enumerator<'a, O>>,
        G: FnMut(&O, Option<CursorValue>) -> Result<Enumerator<'a, I>> + 'a,
    {
        let (outer_resume, inner_cursor) = nested::split_cursor(cursor)?;
        let outer_enum = outer(outer_resume.clone())?;

        Ok(Enumerator::new(NestedIter::new(
            outer_enum,
            inner,
            outer_resume,
            inner_cursor,
        )))
    }
}

/// Number of leading elements to skip for an index cursor.
fn resume_index(source: &str, cursor: Option<&CursorValue>) -> Result<usize> {
    match cursor {
        None | Some(CursorValue::Null) => Ok(0),
        Some(CursorValue::Integer(i)) if *i >= 0 => usize::try_from(*i)
            .map(|i| i.saturating_add(1))
            .map_err(|_| ResumableError::invalid_cursor(source, "an index within range", "integer")),
        Some(CursorValue::Integer(_)) => Err(ResumableError::invalid_cursor(
            source,
            "a non-negative integer",
            "negative integer",
        )),
        Some(other) => Err(ResumableError::invalid_cursor(
            source,
            "an integer",
            other.type_name(),
        )),
    }
}
