/// Number of items in the built-in catalog.
pub const CATALOG_SIZE: usize = 60;

/// Per-item cost attribute of the built-in catalog (the "file sizes").
pub const ITEM_COSTS: [u32; CATALOG_SIZE] = [
    73, 18, 94, 26, 51, 62, 37, 89, 5, 43, //
    77, 14, 35, 68, 92, 10, 23, 81, 6, 57, //
    49, 87, 30, 1, 99, 64, 12, 46, 91, 28, //
    39, 83, 7, 58, 100, 22, 75, 33, 9, 67, //
    29, 56, 44, 15, 79, 2, 88, 11, 93, 16, //
    84, 31, 21, 60, 70, 4, 95, 36, 47, 8,
];

/// Lifecycle state of an item. Ordered from least to most advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Pending,
    Stage1Done,
    Stage2Done,
    Done,
}

impl Stage {
    /// The stage that follows this one, or `None` once done.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Pending => Some(Stage::Stage1Done),
            Stage::Stage1Done => Some(Stage::Stage2Done),
            Stage::Stage2Done => Some(Stage::Done),
            Stage::Done => None,
        }
    }

    /// Sub-queue slot for a stage that still has work left.
    pub fn queue_slot(self) -> Option<usize> {
        match self {
            Stage::Pending => Some(0),
            Stage::Stage1Done => Some(1),
            Stage::Stage2Done => Some(2),
            Stage::Done => None,
        }
    }
}

/// A unit of work moving through the pipeline.
///
/// Items are moved by value between queues and workers, so at any instant
/// exactly one of them owns it.
#[derive(Debug, PartialEq, Eq)]
pub struct Item {
    id: usize,
    cost: u32,
    stage: Stage,
}

impl Item {
    pub fn new(id: usize, cost: u32) -> Self {
        debug_assert!(cost > 0, "item cost must be positive");
        Self {
            id,
            cost,
            stage: Stage::Pending,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Moves the item one stage forward. Returns the new stage.
    ///
    /// # Panics
    ///
    /// Panics if the item is already done.
    pub fn advance(&mut self) -> Stage {
        match self.stage.next() {
            Some(next) => {
                self.stage = next;
                next
            }
            None => panic!("item {} advanced past Done", self.id),
        }
    }
}

/// Static list of work items, each with a fixed cost.
#[derive(Debug, Clone)]
pub struct WorkCatalog {
    costs: Vec<u32>,
}

impl Default for WorkCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl WorkCatalog {
    /// The fixed 60-item catalog every configuration runs.
    pub fn builtin() -> Self {
        Self {
            costs: ITEM_COSTS.to_vec(),
        }
    }

    pub fn from_costs(costs: Vec<u32>) -> Self {
        Self { costs }
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    pub fn costs(&self) -> &[u32] {
        &self.costs
    }

    pub fn cost(&self, index: usize) -> Option<u32> {
        self.costs.get(index).copied()
    }

    pub fn total_cost(&self) -> u64 {
        self.costs.iter().map(|&c| u64::from(c)).sum()
    }

    /// Materializes fresh `Pending` items for the given catalog indices.
    ///
    /// Indices outside the catalog are skipped.
    pub fn materialize(&self, indices: &[usize]) -> Vec<Item> {
        indices
            .iter()
            .filter_map(|&i| self.cost(i).map(|cost| Item::new(i, cost)))
            .collect()
    }
}
