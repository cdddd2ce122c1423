use serde::{Deserialize, Serialize};

use crate::item::Item;
use crate::range::LedgerRange;

/// Mutable accumulator owned by a crawl while pages are arriving.
#[derive(Clone, Debug, Default)]
pub struct AggregateBuilder {
    items: Vec<Item>,
    coverage: Option<LedgerRange>,
}

impl AggregateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one item in arrival order.
    pub fn push(&mut self, item: Item) {
        if let Some(seq) = item.ledger_sequence() {
            self.coverage = Some(match self.coverage {
                Some(range) => range.extend(seq),
                None => LedgerRange::single(seq),
            });
        }
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Freeze the accumulated items. No further mutation is possible.
    pub fn freeze(self) -> AggregateResult {
        AggregateResult {
            items: self.items,
            coverage: self.coverage,
        }
    }
}

/// Frozen, read-only result of one crawl.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    items: Vec<Item>,
    coverage: Option<LedgerRange>,
}

impl AggregateResult {
    /// Build directly from items, deriving coverage.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let mut builder = AggregateBuilder::new();
        for item in items {
            builder.push(item);
        }
        builder.freeze()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Observed `[minLedger, maxLedger]`, when any item carries a ledger.
    pub fn coverage(&self) -> Option<LedgerRange> {
        self.coverage
    }
}
