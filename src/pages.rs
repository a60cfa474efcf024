// src/pages.rs

use crate::error::{Error, Result};
use crate::model::Provider;
use tracing::warn;

/// One step of a provider's pagination
#[derive(Debug)]
pub enum Page<T> {
    /// Items from one page, and whether the provider advertised another one
    Items { items: Vec<T>, more: bool },
    /// Nothing left, including "not found"
    End,
    /// The page could not be fetched after retries
    Failed,
}

/// A lazily fetched sequence of items spread over pages.
///
/// Pages are only requested when the buffered items run out, so a caller
/// that stops iterating early never pays for the rest of the history.
/// Not restartable; build a new one to start over.
pub struct Pages<'a, T> {
    label: String,
    fetch: Box<dyn FnMut() -> Page<T> + 'a>,
    buffer: std::vec::IntoIter<T>,
    stop: Option<Box<dyn Fn(&T) -> bool + 'a>>,
    more: bool,
    failed: bool,
    pages_fetched: usize,
}

impl<'a, T> Pages<'a, T> {
    pub fn new(label: impl Into<String>, fetch: impl FnMut() -> Page<T> + 'a) -> Self {
        Self {
            label: label.into(),
            fetch: Box::new(fetch),
            buffer: Vec::new().into_iter(),
            stop: None,
            more: true,
            failed: false,
            pages_fetched: 0,
        }
    }

    /// A stream that yields `items` and never touches the network
    pub fn single(label: impl Into<String>, items: Vec<T>) -> Self
    where
        T: 'a,
    {
        let mut items = Some(items);
        Self::new(label, move || match items.take() {
            Some(items) => Page::Items { items, more: false },
            None => Page::End,
        })
    }

    /// End the stream at the first item matching `stop`; that item is not
    /// yielded and no further pages are requested.
    pub fn stop_at(mut self, stop: impl Fn(&T) -> bool + 'a) -> Self {
        self.stop = Some(Box::new(stop));
        self
    }

    /// Fetch the first page now and turn a failure into an enumeration error.
    /// Used for top-level listings where there is nothing sensible to report
    /// without them.
    pub fn require_first_page(mut self, provider: Provider) -> Result<Self> {
        self.fill();
        if self.failed {
            return Err(Error::enumeration(provider, self.label.clone()));
        }
        Ok(self)
    }

    /// True once a page failed; the stream ended early in that case
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn fill(&mut self) {
        while self.buffer.len() == 0 && self.more {
            self.pages_fetched += 1;
            match (self.fetch)() {
                Page::Items { items, more } => {
                    self.buffer = items.into_iter();
                    self.more = more;
                }
                Page::End => self.more = false,
                Page::Failed => {
                    warn!(listing = %self.label, "stopped paging after an unrecoverable error");
                    self.more = false;
                    self.failed = true;
                }
            }
        }
    }
}

impl<T> Iterator for Pages<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.fill();
        let item = self.buffer.next()?;
        if self.stop.as_ref().is_some_and(|stop| stop(&item)) {
            self.buffer = Vec::new().into_iter();
            self.more = false;
            return None;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn numbered<'a>(calls: &'a Cell<usize>, pages: usize) -> Pages<'a, usize> {
        Pages::new("numbers", move || {
            let page = calls.get();
            calls.set(page + 1);
            if page == pages {
                return Page::End;
            }
            Page::Items {
                items: (page * 10..page * 10 + 3).collect(),
                more: true,
            }
        })
    }

    #[test]
    fn fetches_pages_only_when_needed() {
        let calls = Cell::new(0);
        let mut pages = numbered(&calls, 5);
        assert_eq!(calls.get(), 0);

        assert_eq!(pages.next(), Some(0));
        assert_eq!(calls.get(), 1);
        assert_eq!(pages.by_ref().take(3).collect::<Vec<_>>(), vec![1, 2, 10]);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn runs_until_the_provider_says_end() {
        let calls = Cell::new(0);
        let all: Vec<_> = numbered(&calls, 2).collect();
        assert_eq!(all, vec![0, 1, 2, 10, 11, 12]);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn skips_empty_pages_that_promise_more() {
        let mut served = vec![
            Page::Items { items: vec![1], more: false },
            Page::Items { items: vec![], more: true },
        ];
        let pages = Pages::new("sparse", move || served.pop().unwrap_or(Page::End));
        assert_eq!(pages.collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn stop_at_ends_the_stream_without_more_requests() {
        let calls = Cell::new(0);
        let mut pages = numbered(&calls, 100).stop_at(|n| *n == 11);
        let seen: Vec<_> = pages.by_ref().collect();
        assert_eq!(seen, vec![0, 1, 2, 10]);
        assert_eq!(calls.get(), 2);
        assert_eq!(pages.next(), None);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn failure_is_remembered() {
        let mut served = vec![Page::Failed, Page::Items { items: vec![1, 2], more: true }];
        let mut pages = Pages::new("flaky", move || served.pop().unwrap_or(Page::End));
        assert_eq!(pages.by_ref().collect::<Vec<_>>(), vec![1, 2]);
        assert!(pages.failed());
        assert_eq!(pages.pages_fetched(), 2);
    }

    #[test]
    fn require_first_page_reports_enumeration_errors() {
        let pages: Pages<'_, u8> = Pages::new("repositories of acme", || Page::Failed);
        let err = pages.require_first_page(Provider::GitHub).err().unwrap();
        assert!(matches!(err, Error::Enumeration { provider: Provider::GitHub, .. }));
        assert_eq!(err.to_string(), "Could not enumerate repositories of acme on GitHub");
    }

    #[test]
    fn require_first_page_keeps_the_buffered_items() {
        let calls = Cell::new(0);
        let pages = numbered(&calls, 1).require_first_page(Provider::GitLab).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(pages.collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn single_page_streams_do_not_refetch() {
        let pages = Pages::single("fixed", vec!["a", "b"]);
        assert_eq!(pages.collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
