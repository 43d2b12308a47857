//! Request sequence numbering and stale-response rejection.

/// Monotonic request counter for one request category.
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter {
    last: u32,
}

impl SequenceCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence id. The first id handed out is 1.
    pub fn next(&mut self) -> u32 {
        self.last = self.last.wrapping_add(1).max(1);
        self.last
    }

    /// Most recently issued id, 0 before the first request.
    #[must_use]
    pub fn current(&self) -> u32 {
        self.last
    }
}

/// Outcome of offering a response to a [`StaleFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Newer than anything seen; apply it.
    Accepted,
    /// Same id as the last accepted response, let through once because the
    /// previous payload was not yet calibrated.
    Retried,
    /// Older than or equal to the last accepted id.
    Stale { last: u32 },
}

impl Admission {
    #[must_use]
    pub fn is_accepted(self) -> bool {
        !matches!(self, Admission::Stale { .. })
    }
}

/// Last-request-wins filter for one response category.
///
/// A response is applied only if its sequence id is strictly greater than
/// the last accepted one. There is no reordering buffer.
#[derive(Debug, Clone, Default)]
pub struct StaleFilter {
    last: Option<u32>,
    retry_open: bool,
}

impl StaleFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a response id.
    pub fn admit(&mut self, seq_id: u32) -> Admission {
        match self.last {
            Some(last) if seq_id < last => Admission::Stale { last },
            Some(last) if seq_id == last => {
                if self.retry_open {
                    self.retry_open = false;
                    Admission::Retried
                } else {
                    Admission::Stale { last }
                }
            }
            _ => {
                self.last = Some(seq_id);
                self.retry_open = false;
                Admission::Accepted
            }
        }
    }

    /// Shorthand for `admit(seq_id).is_accepted()`.
    pub fn accept(&mut self, seq_id: u32) -> bool {
        self.admit(seq_id).is_accepted()
    }

    /// Allow one more response carrying the last accepted id. Used when the
    /// accepted payload turned out to be uncalibrated and the server is
    /// expected to resend.
    pub fn reopen(&mut self) {
        if self.last.is_some() {
            self.retry_open = true;
        }
    }

    #[must_use]
    pub fn last_accepted(&self) -> Option<u32> {
        self.last
    }

    /// Forget all history (dataset reloaded).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_at_one() {
        let mut c = SequenceCounter::new();
        assert_eq!(c.current(), 0);
        assert_eq!(c.next(), 1);
        assert_eq!(c.next(), 2);
    }

    #[test]
    fn test_out_of_order_rejection() {
        let mut f = StaleFilter::new();
        let accepted: Vec<u32> = [5, 3, 7, 6]
            .into_iter()
            .filter(|&id| f.accept(id))
            .collect();
        assert_eq!(accepted, vec![5, 7]);
        assert_eq!(f.last_accepted(), Some(7));
    }

    #[test]
    fn test_duplicate_is_stale() {
        let mut f = StaleFilter::new();
        assert!(f.accept(4));
        assert_eq!(f.admit(4), Admission::Stale { last: 4 });
    }

    #[test]
    fn test_reopen_allows_single_retry() {
        let mut f = StaleFilter::new();
        assert!(f.accept(9));
        f.reopen();
        assert_eq!(f.admit(8), Admission::Stale { last: 9 });
        assert_eq!(f.admit(9), Admission::Retried);
        assert_eq!(f.admit(9), Admission::Stale { last: 9 });
    }

    #[test]
    fn test_reopen_closed_by_newer() {
        let mut f = StaleFilter::new();
        f.accept(1);
        f.reopen();
        assert!(f.accept(2));
        assert!(!f.accept(2));
    }
}
