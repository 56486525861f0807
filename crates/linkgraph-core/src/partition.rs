//! Id-space partitioning.
//!
//! Crawler workers claim disjoint shards of the graph by passing shard
//! bounds to [`Graph::links`](crate::Graph::links) and
//! [`Graph::edges`](crate::Graph::edges). Bounds are plain [`LinkId`]s, so
//! they can be computed once and handed out as strings.

use serde::Serialize;

use crate::error::{GraphError, Result};
use crate::id::LinkId;

/// A half-open id range `[from, to)` split into equally sized partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    start: u128,
    end: u128,
    partitions: usize,
    step: u128,
}

/// Bounds of one partition, serialised in canonical string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Extent {
    pub from: LinkId,
    pub to: LinkId,
}

impl IdRange {
    /// Split `[from, to)` into `partitions` shards.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidPartition`] if `partitions` is zero, the
    /// range is empty, or it holds fewer ids than partitions.
    pub fn new(from: LinkId, to: LinkId, partitions: usize) -> Result<Self> {
        if partitions == 0 {
            return Err(GraphError::InvalidPartition(
                "partition count must be positive".to_string(),
            ));
        }
        if from >= to {
            return Err(GraphError::InvalidPartition(format!(
                "range start {from} must precede range end {to}"
            )));
        }

        let (start, end) = (from.as_u128(), to.as_u128());
        let size = end - start;
        if size < partitions as u128 {
            return Err(GraphError::InvalidPartition(format!(
                "range of {size} ids cannot be split into {partitions} partitions"
            )));
        }

        Ok(Self {
            start,
            end,
            partitions,
            step: size / partitions as u128,
        })
    }

    /// Split the whole id space `[LinkId::MIN, LinkId::MAX)`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidPartition`] if `partitions` is zero.
    pub fn full(partitions: usize) -> Result<Self> {
        Self::new(LinkId::MIN, LinkId::MAX, partitions)
    }

    #[must_use]
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Bounds of partition `index`. The last partition absorbs the
    /// remainder and ends exactly at the range end.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidPartition`] if `index` is out of range.
    pub fn extent(&self, index: usize) -> Result<(LinkId, LinkId)> {
        if index >= self.partitions {
            return Err(GraphError::InvalidPartition(format!(
                "partition index {index} out of range (0..{})",
                self.partitions
            )));
        }

        let lo = self.start + self.step * index as u128;
        let hi = if index + 1 == self.partitions {
            self.end
        } else {
            lo + self.step
        };
        Ok((LinkId::from_u128(lo), LinkId::from_u128(hi)))
    }

    /// Bounds of every partition, in order.
    #[must_use]
    pub fn extents(&self) -> Vec<Extent> {
        (0..self.partitions)
            .filter_map(|i| self.extent(i).ok())
            .map(|(from, to)| Extent { from, to })
            .collect()
    }

    /// The partition owning `id`, or `None` if `id` is outside the range.
    #[must_use]
    pub fn partition_of(&self, id: LinkId) -> Option<usize> {
        let v = id.as_u128();
        if v < self.start || v >= self.end {
            return None;
        }
        let index = ((v - self.start) / self.step) as usize;
        Some(index.min(self.partitions - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_degenerate_requests() {
        assert!(IdRange::full(0).is_err());
        let id = LinkId::from_u128(10);
        assert!(IdRange::new(id, id, 1).is_err());
        assert!(IdRange::new(LinkId::from_u128(11), id, 1).is_err());
        assert!(IdRange::new(id, LinkId::from_u128(12), 3).is_err());
    }

    #[test]
    fn single_partition_is_the_whole_range() {
        let range = IdRange::full(1).unwrap();
        assert_eq!(range.extent(0).unwrap(), (LinkId::MIN, LinkId::MAX));
        assert!(range.extent(1).is_err());
    }

    #[test]
    fn four_way_split_has_quarter_boundaries() {
        let range = IdRange::full(4).unwrap();
        let bounds: Vec<String> = range.extents().iter().map(|e| e.from.to_string()).collect();
        assert_eq!(
            bounds,
            vec![
                "00000000-0000-0000-0000-000000000000",
                "3fffffff-ffff-ffff-ffff-ffffffffffff",
                "7fffffff-ffff-ffff-ffff-fffffffffffe",
                "bfffffff-ffff-ffff-ffff-fffffffffffd",
            ]
        );
        assert_eq!(range.extent(3).unwrap().1, LinkId::MAX);
    }

    #[test]
    fn extent_serialises_as_canonical_strings() {
        let range = IdRange::full(2).unwrap();
        let json = serde_json::to_value(range.extents()[1]).unwrap();
        assert_eq!(json["to"], "ffffffff-ffff-ffff-ffff-ffffffffffff");
    }

    proptest! {
        #[test]
        fn extents_tile_the_range(start in 0_u128..1_000_000, len in 1_u128..1_000_000, parts in 1_usize..64) {
            prop_assume!(len >= parts as u128);
            let range = IdRange::new(LinkId::from_u128(start), LinkId::from_u128(start + len), parts).unwrap();
            let extents = range.extents();
            prop_assert_eq!(extents.len(), parts);
            prop_assert_eq!(extents[0].from, LinkId::from_u128(start));
            prop_assert_eq!(extents[parts - 1].to, LinkId::from_u128(start + len));
            for pair in extents.windows(2) {
                prop_assert_eq!(pair[0].to, pair[1].from);
                prop_assert!(pair[0].from < pair[0].to);
            }
        }

        #[test]
        fn every_id_has_exactly_one_owner(raw in any::<u128>(), parts in 1_usize..128) {
            let id = LinkId::from_u128(raw);
            let range = IdRange::full(parts).unwrap();
            let owners: Vec<usize> = range
                .extents()
                .iter()
                .enumerate()
                .filter(|(_, e)| e.from <= id && id < e.to)
                .map(|(i, _)| i)
                .collect();
            if id == LinkId::MAX {
                prop_assert!(owners.is_empty());
                prop_assert_eq!(range.partition_of(id), None);
            } else {
                prop_assert_eq!(owners.len(), 1);
                prop_assert_eq!(range.partition_of(id), Some(owners[0]));
            }
        }
    }
}
