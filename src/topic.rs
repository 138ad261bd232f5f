use std::collections::BTreeSet;

/// Partition layout of a topic as reported by cluster metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// The name of this topic.
    pub name: String,

    /// Partition IDs, ascending.
    pub partitions: BTreeSet<i32>,
}

impl Topic {
    /// All partition IDs, ascending.
    pub fn partition_ids(&self) -> Vec<i32> {
        self.partitions.iter().copied().collect()
    }
}
