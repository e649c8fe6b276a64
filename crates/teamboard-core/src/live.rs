//! Typed live queries and the combined summary feed.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{future, Stream, StreamExt};
use serde::de::DeserializeOwned;

use teamboard_store::{CollectionPath, Subscription};

use crate::aggregate::Summary;
use crate::error::{CoreError, Result};
use crate::records::{decode_all, Board, Task};

/// A store subscription that yields decoded records.
///
/// Each item is the complete current result set. Documents that fail to
/// decode are skipped with a warning rather than failing the whole snapshot.
/// Dropping the value (or calling [`unsubscribe`](Self::unsubscribe)) cancels
/// the underlying subscription.
pub struct Live<T> {
    sub: Subscription,
    order: Option<fn(&T, &T) -> Ordering>,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Live<T> {
    pub(crate) fn new(sub: Subscription) -> Self {
        Self {
            sub,
            order: None,
            _record: PhantomData,
        }
    }

    /// Sort every delivered snapshot with `order`.
    pub(crate) fn ordered(mut self, order: fn(&T, &T) -> Ordering) -> Self {
        self.order = Some(order);
        self
    }

    pub fn collection(&self) -> &CollectionPath {
        self.sub.collection()
    }

    /// Wait for the next result set. `None` once the store has shut down.
    pub async fn next_records(&mut self) -> Option<Result<Vec<T>>> {
        self.next().await
    }

    pub fn unsubscribe(self) {
        self.sub.unsubscribe();
    }
}

impl<T: DeserializeOwned> Stream for Live<T> {
    type Item = Result<Vec<T>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.sub).poll_next(cx);
        polled.map(|item| {
            item.map(|snapshot| {
                let snapshot = snapshot.map_err(CoreError::from)?;
                let mut records: Vec<T> =
                    decode_all(&snapshot.documents, self.sub.collection().as_str());
                if let Some(order) = self.order {
                    records.sort_by(order);
                }
                Ok(records)
            })
        })
    }
}

impl<T> fmt::Debug for Live<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Live").field("sub", &self.sub).finish()
    }
}

/// Stream of recomputed summaries.
pub type SummaryStream = Pin<Box<dyn Stream<Item = Result<Summary>> + Send>>;

enum Input {
    Boards(Vec<Board>),
    Tasks(Vec<Task>),
}

/// Combine a boards query and a tasks query into a stream of summaries.
///
/// The first summary is emitted once both inputs have delivered; after that a
/// fresh summary is computed from the latest full sets whenever either input
/// changes. Errors from either input are passed through without ending the
/// stream.
pub fn summary_feed(boards: Live<Board>, tasks: Live<Task>) -> SummaryStream {
    let merged = futures::stream::select(
        boards.map(|r| r.map(Input::Boards)),
        tasks.map(|r| r.map(Input::Tasks)),
    );

    let summaries = merged
        .scan(
            (None::<Vec<Board>>, None::<Vec<Task>>),
            |(latest_boards, latest_tasks), input| {
                let out = match input {
                    Err(e) => Some(Err(e)),
                    Ok(update) => {
                        match update {
                            Input::Boards(b) => *latest_boards = Some(b),
                            Input::Tasks(t) => *latest_tasks = Some(t),
                        }
                        match (latest_boards.as_deref(), latest_tasks.as_deref()) {
                            (Some(b), Some(t)) => Some(Ok(Summary::compute(b, t))),
                            _ => None,
                        }
                    }
                };
                future::ready(Some(out))
            },
        )
        .filter_map(future::ready);

    Box::pin(summaries)
}
