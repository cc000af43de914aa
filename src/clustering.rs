// clustering.rs
use log::{debug, info, warn};
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::{ContentType, DuplicateCandidatePair, DuplicateCluster};

/// Groups duplicate pairs into clusters: the connected components of the
/// graph whose nodes are record indexes and whose edges are duplicate pairs.
/// A chain A~B, B~C ends up as one cluster {A, B, C}.
///
/// Only components with two or more members are returned, sorted by their
/// lowest member index; members are sorted ascending.
pub fn cluster_duplicates(
    record_count: usize,
    content_type: ContentType,
    pairs: &[DuplicateCandidatePair],
) -> Vec<DuplicateCluster> {
    let mut graph = UnGraph::<usize, f64>::new_undirected();
    let mut node_map: HashMap<usize, NodeIndex> = HashMap::new();

    for pair in pairs {
        if pair.content_type != content_type {
            continue;
        }
        if pair.first_index >= record_count || pair.second_index >= record_count {
            warn!(
                "Skipping pair ({}, {}) outside of {} {} records",
                pair.first_index, pair.second_index, record_count, content_type
            );
            continue;
        }
        let node_1 = *node_map
            .entry(pair.first_index)
            .or_insert_with(|| graph.add_node(pair.first_index));
        let node_2 = *node_map
            .entry(pair.second_index)
            .or_insert_with(|| graph.add_node(pair.second_index));
        graph.add_edge(node_1, node_2, pair.similarity);
    }

    debug!(
        "Duplicate graph for {}: {} nodes, {} edges",
        content_type,
        graph.node_count(),
        graph.edge_count()
    );

    let mut visited: HashSet<usize> = HashSet::new();
    let mut clusters = Vec::new();

    // DFS from each unvisited node collects one component
    for node_idx in graph.node_indices() {
        let start = graph[node_idx];
        if visited.contains(&start) {
            continue;
        }
        let mut stack = vec![node_idx];
        let mut members = Vec::new();
        while let Some(current_idx) = stack.pop() {
            let current = graph[current_idx];
            if visited.insert(current) {
                members.push(current);
                for neighbor_idx in graph.neighbors(current_idx) {
                    if !visited.contains(&graph[neighbor_idx]) {
                        stack.push(neighbor_idx);
                    }
                }
            }
        }
        if members.len() > 1 {
            members.sort_unstable();
            let cluster_id = Uuid::new_v4().to_string();
            clusters.push(DuplicateCluster {
                label: format!("{}-cluster-{}", content_type, &cluster_id[..8]),
                content_type,
                member_indexes: members,
            });
        }
    }

    clusters.sort_by_key(|c| c.member_indexes[0]);
    info!("Grouped {} {} pairs into {} clusters.", pairs.len(), content_type, clusters.len());
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentRecord, MatchReason};
    use serde_json::Map;
    use std::path::PathBuf;

    fn pair(first_index: usize, second_index: usize) -> DuplicateCandidatePair {
        let blank = ContentRecord::new(ContentType::Cols, Map::new(), PathBuf::new(), 0);
        DuplicateCandidatePair {
            content_type: ContentType::Cols,
            first_index,
            second_index,
            first: blank.clone(),
            second: blank,
            similarity: 0.9,
            reason: MatchReason::Name,
        }
    }

    #[test]
    fn test_chain_becomes_one_cluster() {
        let clusters = cluster_duplicates(6, ContentType::Cols, &[pair(4, 5), pair(0, 2), pair(2, 3)]);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].member_indexes, vec![0, 2, 3]);
        assert_eq!(clusters[1].member_indexes, vec![4, 5]);
        assert!(clusters[0].label.starts_with("cols-cluster-"));
    }

    #[test]
    fn test_out_of_range_pairs_are_ignored() {
        let clusters = cluster_duplicates(3, ContentType::Cols, &[pair(1, 7)]);
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_no_pairs_no_clusters() {
        assert!(cluster_duplicates(10, ContentType::Cols, &[]).is_empty());
    }
}
