//! Per-entity partitioning of a queue snapshot.
//!
//! Operations on the same entity must reach the backend in the order they
//! were queued (an `Update` must never overtake its `Create`). Operations on
//! different entities are independent, so a drain runs one partition per
//! entity and lets partitions proceed concurrently.

use crate::{EntityId, Operation};
use std::collections::HashMap;

/// All queued operations for one entity, in enqueue order.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub entity_id: EntityId,
    pub operations: Vec<Operation>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Group operations by `entity_id`.
///
/// Order within a partition is the input order; partitions are returned in
/// order of each entity's first appearance.
pub fn partition_by_entity(ops: impl IntoIterator<Item = Operation>) -> Vec<Partition> {
    let mut index: HashMap<EntityId, usize> = HashMap::new();
    let mut partitions: Vec<Partition> = Vec::new();

    for op in ops {
        match index.get(&op.entity_id) {
            Some(&slot) => partitions[slot].operations.push(op),
            None => {
                index.insert(op.entity_id.clone(), partitions.len());
                partitions.push(Partition {
                    entity_id: op.entity_id.clone(),
                    operations: vec![op],
                });
            }
        }
    }

    partitions
}
