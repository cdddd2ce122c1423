use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Inclusive range of ledger sequences `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerRange {
    pub min: u32,
    pub max: u32,
}

impl LedgerRange {
    /// Create a range, rejecting `min > max`.
    pub fn new(min: u32, max: u32) -> Result<Self, TypeError> {
        if min > max {
            return Err(TypeError::InvalidRange(format!("{min} > {max}")));
        }
        Ok(Self { min, max })
    }

    /// A range covering exactly one ledger.
    pub fn single(seq: u32) -> Self {
        Self { min: seq, max: seq }
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.min <= seq && seq <= self.max
    }

    /// Number of ledgers covered.
    pub fn ledger_count(&self) -> u64 {
        u64::from(self.max - self.min) + 1
    }

    /// Smallest range containing both `self` and `seq`.
    pub fn extend(self, seq: u32) -> Self {
        Self {
            min: self.min.min(seq),
            max: self.max.max(seq),
        }
    }

    /// `[max(minA, minB), min(maxA, maxB)]`, or `None` when disjoint.
    pub fn overlap(&self, other: &Self) -> Option<Self> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some(Self { min, max })
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> {
        self.min..=self.max
    }
}

impl fmt::Display for LedgerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Parses `"a-b"` or a single sequence `"a"`.
impl FromStr for LedgerRange {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|e| TypeError::InvalidRange(format!("{s:?}: {e}")))
        };
        match s.split_once('-') {
            Some((lo, hi)) => Self::new(parse(lo)?, parse(hi)?),
            None => Ok(Self::single(parse(s)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_of_skewed_ranges() {
        let a = LedgerRange::new(100, 200).unwrap();
        let b = LedgerRange::new(150, 250).unwrap();
        assert_eq!(a.overlap(&b), Some(LedgerRange::new(150, 200).unwrap()));
        assert_eq!(b.overlap(&a), a.overlap(&b));
    }

    #[test]
    fn disjoint_ranges_have_no_overlap() {
        let a = LedgerRange::new(1, 10).unwrap();
        let b = LedgerRange::new(11, 20).unwrap();
        assert_eq!(a.overlap(&b), None);
    }

    #[test]
    fn parse_forms() {
        assert_eq!("32570-32600".parse::<LedgerRange>().unwrap(), LedgerRange { min: 32570, max: 32600 });
        assert_eq!("7".parse::<LedgerRange>().unwrap(), LedgerRange::single(7));
        assert!("9-3".parse::<LedgerRange>().is_err());
        assert!("empty".parse::<LedgerRange>().is_err());
    }

    #[test]
    fn extend_and_len() {
        let r = LedgerRange::single(5).extend(9).extend(2);
        assert_eq!(r, LedgerRange { min: 2, max: 9 });
        assert_eq!(r.ledger_count(), 8);
        assert!(r.contains(2) && r.contains(9) && !r.contains(10));
        assert_eq!(r.iter().count(), 8);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn range() -> impl Strategy<Value = LedgerRange> {
            (0u32..10_000, 0u32..500).prop_map(|(min, width)| LedgerRange { min, max: min + width })
        }

        proptest! {
            #[test]
            fn overlap_is_symmetric_and_contained(a in range(), b in range()) {
                prop_assert_eq!(a.overlap(&b), b.overlap(&a));
                if let Some(o) = a.overlap(&b) {
                    prop_assert!(a.contains(o.min) && a.contains(o.max));
                    prop_assert!(b.contains(o.min) && b.contains(o.max));
                }
            }
        }
    }
}
