use std::collections::{BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex as PetgraphNodeIndex};
use petgraph::Directed;

use crate::config::ConfigEntry;
use crate::error::{CurtinError, SchemaError};

pub type NodeIndex = PetgraphNodeIndex<u32>;
type ActionPetgraph = DiGraph<ConfigEntry, (), u32>;

/// The DAG of config entries (§3 "Action graph"): an edge `dependency ->
/// dependent` exists for every field referencing another entry by `id`
/// (`device`, `volume`, `volgroup`, `devices`, `spare_devices`,
/// `backing_device`, `cache_device`, `vdevs`, `pool`, `nvme_controller`).
#[derive(Debug, Clone, Default)]
pub struct ActionGraph {
    inner: ActionPetgraph,
    by_id: HashMap<String, NodeIndex>,
}

impl ActionGraph {
    /// Builds the graph from the config's entry list, in list order
    /// (`NodeIndex` assignment mirrors that order since `petgraph` assigns
    /// indices on insertion, which the stable topological sort below relies
    /// on for tie-breaking).
    pub fn build(entries: Vec<ConfigEntry>) -> Result<Self, CurtinError> {
        let mut inner: ActionPetgraph = DiGraph::default();
        let mut by_id = HashMap::new();

        for entry in entries {
            let id = entry.id().to_string();
            if by_id.contains_key(&id) {
                return Err(CurtinError::new(SchemaError::DuplicateId(id)));
            }
            let idx = inner.add_node(entry);
            by_id.insert(id, idx);
        }

        let indices: Vec<NodeIndex> = inner.node_indices().collect();
        for idx in indices {
            let refs: Vec<String> = inner[idx]
                .references()
                .into_iter()
                .map(String::from)
                .collect();
            for target_id in refs {
                // A reference that does not resolve within the config may
                // still name an already-materialized physical device (§3
                // invariant 2); that case is a probe-time concern, not a
                // graph-construction error.
                if let Some(&target_idx) = by_id.get(&target_id) {
                    inner.add_edge(target_idx, idx, ());
                }
            }
        }

        let graph = ActionGraph { inner, by_id };
        graph.topological_order()?;
        Ok(graph)
    }

    pub fn get(&self, id: &str) -> Option<&ConfigEntry> {
        self.by_id.get(id).map(|&idx| &self.inner[idx])
    }

    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Direct dependencies of `id`: entries referenced by its fields.
    pub fn dependencies_of(&self, id: &str) -> Vec<&ConfigEntry> {
        let Some(&idx) = self.by_id.get(id) else {
            return Vec::new();
        };
        self.inner
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .map(|n| &self.inner[n])
            .collect()
    }

    /// Stable Kahn's-algorithm topological sort: among entries with no
    /// remaining unresolved dependency, the one with the smallest
    /// `NodeIndex` (i.e. earliest in the original config list) is emitted
    /// next. This keeps planning deterministic and idempotent across runs
    /// (§8 "planning twice yields identical output") and matches "ties
    /// broken by the original list order" (§4.4).
    pub fn topological_order(&self) -> Result<Vec<&ConfigEntry>, CurtinError> {
        let n = self.inner.node_count();
        let mut indegree = vec![0usize; n];
        for edge in self.inner.edge_indices() {
            let (_, target) = self.inner.edge_endpoints(edge).unwrap();
            indegree[target.index()] += 1;
        }

        let mut ready: BTreeSet<usize> = indegree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(&next) = ready.iter().next() {
            ready.remove(&next);
            let idx = NodeIndex::new(next);
            order.push(idx);
            for edge in self.inner.edges(idx) {
                let target = edge.target();
                indegree[target.index()] -= 1;
                if indegree[target.index()] == 0 {
                    ready.insert(target.index());
                }
            }
        }

        if order.len() != n {
            let stuck = indegree
                .iter()
                .position(|&d| d > 0)
                .expect("fewer than n nodes ordered implies some indegree remains positive");
            return Err(CurtinError::new(SchemaError::CyclicGraph(
                self.inner[NodeIndex::new(stuck)].id().to_string(),
            )));
        }

        Ok(order.into_iter().map(|idx| &self.inner[idx]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Disk, Format, LvmPartition, LvmVolgroup, Mount, Partition};

    fn disk(id: &str) -> ConfigEntry {
        ConfigEntry::Disk(Disk {
            id: id.into(),
            ..Default::default()
        })
    }

    fn partition(id: &str, device: &str) -> ConfigEntry {
        ConfigEntry::Partition(Partition {
            id: id.into(),
            device: device.into(),
            ..Default::default()
        })
    }

    fn format(id: &str, device: &str) -> ConfigEntry {
        ConfigEntry::Format(Format {
            id: id.into(),
            device: Some(device.into()),
            ..Default::default()
        })
    }

    fn mount(id: &str, device: &str) -> ConfigEntry {
        ConfigEntry::Mount(Mount {
            id: id.into(),
            device: Some(device.into()),
            path: Some("/".into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_disk_partition_format_mount_chain() {
        let graph = ActionGraph::build(vec![
            mount("m1", "f1"),
            format("f1", "p1"),
            partition("p1", "d1"),
            disk("d1"),
        ])
        .unwrap();

        let order: Vec<&str> = graph
            .topological_order()
            .unwrap()
            .into_iter()
            .map(ConfigEntry::id)
            .collect();
        assert_eq!(order, vec!["d1", "p1", "f1", "m1"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = ActionGraph::build(vec![disk("d1"), disk("d1")]).unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::error::ErrorKind::Schema(crate::error::SchemaError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_idempotent_ordering() {
        let graph = ActionGraph::build(vec![
            disk("d1"),
            partition("p1", "d1"),
            partition("p2", "d1"),
            format("f1", "p1"),
        ])
        .unwrap();
        let first = graph
            .topological_order()
            .unwrap()
            .into_iter()
            .map(ConfigEntry::id)
            .collect::<Vec<_>>();
        let second = graph
            .topological_order()
            .unwrap()
            .into_iter()
            .map(ConfigEntry::id)
            .collect::<Vec<_>>();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cycle_rejected() {
        // vg1 -> lv1 (vg.devices lists lv1) and lv1 -> vg1 (lv.volgroup is
        // vg1): a two-node cycle.
        let vg = ConfigEntry::LvmVolgroup(LvmVolgroup {
            id: "vg1".into(),
            name: "vg1".into(),
            devices: vec!["lv1".into()],
            ..Default::default()
        });
        let lv = ConfigEntry::LvmPartition(LvmPartition {
            id: "lv1".into(),
            volgroup: "vg1".into(),
            name: "lv1".into(),
            ..Default::default()
        });
        let err = ActionGraph::build(vec![vg, lv]).unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::error::ErrorKind::Schema(crate::error::SchemaError::CyclicGraph(_))
        ));
    }
}
