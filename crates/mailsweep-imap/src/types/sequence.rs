//! UID sets.
//!
//! Bulk commands address messages by UID set (`1:500,502,610:700`). A set
//! is built from a sorted UID list by collapsing consecutive runs, which
//! keeps command lines short even for thousands of messages.

use super::Uid;

/// One element of a UID set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UidRange {
    /// Single UID.
    Single(Uid),
    /// Inclusive range.
    Range(Uid, Uid),
    /// From a UID to the highest UID in the mailbox (`n:*`).
    From(Uid),
}

impl UidRange {
    fn len(self) -> Option<usize> {
        match self {
            Self::Single(_) => Some(1),
            Self::Range(start, end) => Some((end.get() - start.get()) as usize + 1),
            Self::From(_) => None,
        }
    }
}

impl std::fmt::Display for UidRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(uid) => write!(f, "{uid}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::From(start) => write!(f, "{start}:*"),
        }
    }
}

/// A non-empty set of UIDs in wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidSet {
    ranges: Vec<UidRange>,
}

impl UidSet {
    /// Creates a set holding one UID.
    #[must_use]
    pub fn single(uid: Uid) -> Self {
        Self {
            ranges: vec![UidRange::Single(uid)],
        }
    }

    /// Creates an inclusive range. The bounds may be given in either order.
    #[must_use]
    pub fn range(start: Uid, end: Uid) -> Self {
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        let range = if lo == hi {
            UidRange::Single(lo)
        } else {
            UidRange::Range(lo, hi)
        };
        Self {
            ranges: vec![range],
        }
    }

    /// Every message in the mailbox (`1:*`).
    #[must_use]
    pub fn all() -> Self {
        Self {
            ranges: vec![UidRange::From(Uid(std::num::NonZeroU32::MIN))],
        }
    }

    /// Builds a compressed set from UIDs in any order.
    ///
    /// Duplicates are dropped. Returns `None` for an empty input.
    #[must_use]
    pub fn from_uids(uids: &[Uid]) -> Option<Self> {
        let mut sorted = uids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut iter = sorted.into_iter();
        let first = iter.next()?;
        let mut ranges = Vec::new();
        let (mut start, mut end) = (first, first);

        for uid in iter {
            if uid.get() == end.get() + 1 {
                end = uid;
            } else {
                ranges.push(Self::collapse(start, end));
                start = uid;
                end = uid;
            }
        }
        ranges.push(Self::collapse(start, end));

        Some(Self { ranges })
    }

    fn collapse(start: Uid, end: Uid) -> UidRange {
        if start == end {
            UidRange::Single(start)
        } else {
            UidRange::Range(start, end)
        }
    }

    /// Returns the ranges making up this set.
    #[must_use]
    pub fn ranges(&self) -> &[UidRange] {
        &self.ranges
    }

    /// Number of UIDs covered, `None` when the set is open-ended.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        self.ranges.iter().map(|r| r.len()).sum()
    }

    /// Always false: a `UidSet` holds at least one UID.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Returns true if the UID is covered by this set.
    #[must_use]
    pub fn contains(&self, uid: Uid) -> bool {
        self.ranges.iter().any(|r| match *r {
            UidRange::Single(u) => u == uid,
            UidRange::Range(start, end) => start <= uid && uid <= end,
            UidRange::From(start) => start <= uid,
        })
    }
}

impl std::fmt::Display for UidSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{range}")?;
        }
        Ok(())
    }
}
