//! Composition of two resumable enumerators.

use super::{Enumerator, Step};
use crate::cursor::CursorValue;
use crate::error::{ResumableError, Result};

/// Split a combined `[outer_resume, inner]` cursor.
pub(super) fn split_cursor(
    cursor: Option<CursorValue>,
) -> Result<(Option<CursorValue>, Option<CursorValue>)> {
    let parts = match cursor {
        None | Some(CursorValue::Null) => return Ok((None, None)),
        Some(CursorValue::List(parts)) if parts.len() == 2 => parts,
        Some(CursorValue::List(parts)) => {
            return Err(ResumableError::invalid_cursor(
                "nested",
                "a two-element list",
                &format!("list of {}", parts.len()),
            ))
        }
        Some(other) => {
            return Err(ResumableError::invalid_cursor(
                "nested",
                "a two-element list",
                other.type_name(),
            ))
        }
    };

    let mut parts = parts.into_iter().map(|part| match part {
        CursorValue::Null => None,
        other => Some(other),
    });
    let outer = parts.next().flatten();
    let inner = parts.next().flatten();
    Ok((outer, inner))
}

/// Iterator behind [`EnumeratorBuilder::nested`](super::EnumeratorBuilder::nested).
///
/// `outer_resume` is the cursor of the last fully processed outer item; passing
/// it back to the outer builder re-yields the outer item currently in progress.
pub struct NestedIter<'a, O, I, G> {
    outer: Enumerator<'a, O>,
    build_inner: G,
    outer_resume: CursorValue,
    current: Option<(Enumerator<'a, I>, CursorValue)>,
    pending_inner: Option<CursorValue>,
    done: bool,
}

impl<'a, O, I, G> NestedIter<'a, O, I, G>
where
    G: FnMut(&O, Option<CursorValue>) -> Result<Enumerator<'a, I>>,
{
    pub(super) fn new(
        outer: Enumerator<'a, O>,
        build_inner: G,
        outer_resume: Option<CursorValue>,
        pending_inner: Option<CursorValue>,
    ) -> Self {
        Self {
            outer,
            build_inner,
            outer_resume: outer_resume.unwrap_or(CursorValue::Null),
            current: None,
            pending_inner,
            done: false,
        }
    }

    fn fail(&mut self, error: ResumableError) -> Option<Step<I>> {
        self.done = true;
        self.current = None;
        Some(Err(error))
    }
}

impl<'a, O, I, G> Iterator for NestedIter<'a, O, I, G>
where
    G: FnMut(&O, Option<CursorValue>) -> Result<Enumerator<'a, I>>,
{
    type Item = Step<I>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if let Some((inner, outer_cursor)) = self.current.as_mut() {
                match inner.next() {
                    Some(Ok((item, inner_cursor))) => {
                        let cursor = CursorValue::List(vec![self.outer_resume.clone(), inner_cursor]);
                        return Some(Ok((item, cursor)));
                    }
                    Some(Err(e)) => return self.fail(e),
                    None => {
                        // outer item finished
                        self.outer_resume = std::mem::take(outer_cursor);
                        self.current = None;
                        continue;
                    }
                }
            }

            match self.outer.next()? {
                Ok((outer_item, outer_cursor)) => {
                    let inner_cursor = self.pending_inner.take();
                    match (self.build_inner)(&outer_item, inner_cursor) {
                        Ok(inner) => self.current = Some((inner, outer_cursor)),
                        Err(e) => return self.fail(e),
                    }
                }
                Err(e) => return self.fail(e),
            }
        }
        None
    }
}
