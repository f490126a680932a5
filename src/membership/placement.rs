//! Key placement on the hash ring.
//!
//! Pure functions over a sorted, de-duplicated slice of member identifiers.
//! A key at position `p` is owned by the first member with an id `>= p`,
//! walking clockwise and wrapping around to the smallest id.

use super::types::{NodeId, RingPosition};

/// Returns the `replication` members responsible for `position`, in
/// clockwise order starting from the primary.
///
/// The result has `min(replication, members.len())` distinct entries.
pub fn responsible_nodes(
    position: RingPosition,
    replication: usize,
    members: &[NodeId],
) -> Vec<NodeId> {
    debug_assert!(members.windows(2).all(|w| w[0] < w[1]));

    if members.is_empty() {
        return Vec::new();
    }

    let start = members.partition_point(|id| id.position() < position);
    let count = replication.min(members.len());

    (0..count)
        .map(|offset| members[(start + offset) % members.len()])
        .collect()
}

/// Like [`responsible_nodes`], computed as if `excluded` had already left the
/// ring. Used to find hand-off targets for a gracefully leaving node.
pub fn responsible_nodes_excluding(
    position: RingPosition,
    replication: usize,
    members: &[NodeId],
    excluded: NodeId,
) -> Vec<NodeId> {
    let remaining: Vec<NodeId> = members
        .iter()
        .copied()
        .filter(|id| *id != excluded)
        .collect();

    responsible_nodes(position, replication, &remaining)
}

/// Immediate clockwise successor of `my_id`, wrapping to the smallest member.
///
/// A sole member is its own successor.
pub fn next_in_ring(my_id: NodeId, members: &[NodeId]) -> Option<NodeId> {
    members
        .iter()
        .copied()
        .find(|id| *id > my_id)
        .or_else(|| members.first().copied())
}
