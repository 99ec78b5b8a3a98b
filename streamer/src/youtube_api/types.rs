//! Response plumbing shared by the API calls: Google's error envelope, list paging
//! metadata, and the stream that walks `liveBroadcasts.list` pages.

use crate::error::Result;
use serde::Deserialize;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio_stream::Stream;

type Page<T> = (VecDeque<T>, Option<String>);
type PendingPage<'a, F, T> = Pin<Box<dyn Future<Output = Result<(F, Page<T>)>> + Send + 'a>>;

/// Broadcasts (or any list items) from every page of a list call, in order.
///
/// Upcoming-event listing collects this into a `Vec`, so a channel with more than one page
/// of scheduled broadcasts is still fully visible to the host. A page is only requested once
/// the previous one has been handed out. A failed page fetch is yielded once and ends the
/// listing, so callers collecting into `Result<Vec<_>>` see the error instead of a partial
/// list.
pub struct PagedStream<'a, T, F> {
    items: VecDeque<T>,
    pending: Option<PendingPage<'a, F, T>>,
    done: bool,
}

impl<'a, T, F> PagedStream<'a, T, F> {
    /// `fetch` issues one list request: without a page token first, then with each
    /// `nextPageToken` the service returns until it stops returning one.
    pub fn new<Fut>(fetch: F) -> Self
    where
        F: Fn(Option<String>) -> Fut + Send + 'a,
        Fut: Future<Output = Result<Page<T>>> + Send + 'a,
    {
        Self {
            pending: Some(Box::pin(async move {
                let page = fetch(None).await?;
                Ok((fetch, page))
            })),
            items: VecDeque::new(),
            done: false,
        }
    }
}

impl<T: Unpin, F> Unpin for PagedStream<'_, T, F> {}

impl<'a, T: Unpin, F, Fut> Stream for PagedStream<'a, T, F>
where
    F: Fn(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T>>> + Send + 'a,
{
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.items.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }
            if self.done {
                return Poll::Ready(None);
            }
            let Some(pending) = self.pending.as_mut() else {
                self.done = true;
                return Poll::Ready(None);
            };

            match pending.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => {
                    self.pending = None;
                    self.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(Ok((fetch, (items, next_page_token)))) => {
                    self.items.extend(items);
                    self.pending = match next_page_token {
                        Some(token) => Some(Box::pin(async move {
                            let page = fetch(Some(token)).await?;
                            Ok((fetch, page))
                        })),
                        None => {
                            self.done = true;
                            None
                        }
                    };
                }
            }
        }
    }
}

/// Paging details for lists of resources.
///
/// See: <https://developers.google.com/youtube/v3/docs/pageInfo>
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub total_results: u32,
    #[serde(default)]
    pub results_per_page: u32,
}

/// The JSON envelope Google APIs use for failed requests.
///
/// See: <https://developers.google.com/youtube/v3/docs/errors>
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetails {
    pub code: u16,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn follows_page_tokens_until_exhausted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let stream = PagedStream::new(move |token: Option<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(match token.as_deref() {
                    None => (VecDeque::from([1, 2]), Some("p2".to_string())),
                    Some("p2") => (VecDeque::from([3]), None),
                    Some(other) => panic!("unexpected token {other}"),
                })
            }
        });
        let items: Vec<_> = stream.collect::<Result<Vec<_>>>().await.unwrap();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn first_error_ends_the_stream() {
        let stream = PagedStream::new(|token: Option<String>| async move {
            match token {
                None => Ok((VecDeque::from([1]), Some("next".to_string()))),
                Some(_) => Err(Error::Transient("connection reset".to_string())),
            }
        });
        let mut stream = std::pin::pin!(stream);
        assert_eq!(stream.next().await.unwrap().unwrap(), 1);
        assert!(matches!(stream.next().await, Some(Err(Error::Transient(_)))));
        assert!(stream.next().await.is_none());
    }
}
