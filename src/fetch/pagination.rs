//! Lazy cursor pagination over a fetcher
//!
//! `related` turns repeated `fetch_page` calls into a stream of records. Pages
//! are requested only as the consumer pulls, so bounding the stream with
//! `take` also bounds the number of API calls.

use crate::fetch::{FetchError, Fetcher, Record, Relation};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

struct CursorState {
    cursor: Option<String>,
    exhausted: bool,
}

/// Streams every record of `relation` for `parent`
///
/// Fails with `QuotaExceeded` as soon as a page declares a `total_count`
/// above `total_count_limit`; no record of that page is yielded.
pub fn related<'a>(
    fetcher: &'a dyn Fetcher,
    parent: &'a str,
    relation: Relation,
    total_count_limit: u64,
) -> BoxStream<'a, Result<Record, FetchError>> {
    let initial = CursorState {
        cursor: None,
        exhausted: false,
    };

    stream::try_unfold(initial, move |state| async move {
        if state.exhausted {
            return Ok(None);
        }

        let page = fetcher
            .fetch_page(parent, relation, state.cursor.as_deref())
            .await?;

        if page.total_count > total_count_limit {
            return Err(FetchError::QuotaExceeded {
                relation,
                total_count: page.total_count,
                limit: total_count_limit,
            });
        }

        let next = CursorState {
            exhausted: !page.has_next_page || page.end_cursor.is_none(),
            cursor: page.end_cursor,
        };
        Ok(Some((page.records, next)))
    })
    .map_ok(|records| stream::iter(records.into_iter().map(Ok::<Record, FetchError>)))
    .try_flatten()
    .boxed()
}
