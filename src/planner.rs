use curtin_api::config::ConfigEntry;
use curtin_api::error::CurtinError;
use curtin_api::graph::ActionGraph;

/// One step of the materialization plan (§4.4): either create the entry's
/// device, or — for a `preserve: true` entry — only verify it matches the
/// config (§4.6).
#[derive(Debug, Clone, Copy)]
pub enum PlanStep<'a> {
    Materialize(&'a ConfigEntry),
    Verify(&'a ConfigEntry),
}

/// Builds the ordered plan from the action graph (§4.4). Planning the same
/// graph twice yields the identical plan (§8), since the graph's
/// topological sort is stable.
pub fn plan(graph: &ActionGraph) -> Result<Vec<PlanStep<'_>>, CurtinError> {
    let order = graph.topological_order()?;
    Ok(order
        .into_iter()
        .map(|entry| {
            if entry.preserve() {
                PlanStep::Verify(entry)
            } else {
                PlanStep::Materialize(entry)
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use curtin_api::config::{Disk, Format, Partition};

    fn disk(id: &str, preserve: bool) -> ConfigEntry {
        ConfigEntry::Disk(Disk {
            id: id.into(),
            preserve,
            ..Default::default()
        })
    }

    fn partition(id: &str, device: &str, preserve: bool) -> ConfigEntry {
        ConfigEntry::Partition(Partition {
            id: id.into(),
            device: device.into(),
            preserve,
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

    #[test]
    fn materializes_non_preserved_entries_in_dependency_order() {
        let graph = ActionGraph::build(vec![
            format("f1", "p1"),
            partition("p1", "d1", false),
            disk("d1", false),
        ])
        .unwrap();

        let steps = plan(&graph).unwrap();
        let ids: Vec<&str> = steps
            .iter()
            .map(|step| match step {
                PlanStep::Materialize(entry) | PlanStep::Verify(entry) => entry.id(),
            })
            .collect();
        assert_eq!(ids, vec!["d1", "p1", "f1"]);
        assert!(matches!(steps[0], PlanStep::Materialize(_)));
    }

    #[test]
    fn preserved_entries_become_verify_steps() {
        let graph = ActionGraph::build(vec![partition("p1", "d1", true), disk("d1", true)]).unwrap();

        let steps = plan(&graph).unwrap();
        assert!(steps.iter().all(|step| matches!(step, PlanStep::Verify(_))));
    }

    #[test]
    fn replanning_the_same_graph_is_deterministic() {
        let graph = ActionGraph::build(vec![
            format("f1", "p1"),
            partition("p1", "d1", false),
            disk("d1", false),
        ])
        .unwrap();

        let ids_of = |steps: &[PlanStep]| -> Vec<String> {
            steps
                .iter()
                .map(|step| match step {
                    PlanStep::Materialize(entry) | PlanStep::Verify(entry) => {
                        entry.id().to_string()
                    }
                })
                .collect()
        };

        let first = plan(&graph).unwrap();
        let second = plan(&graph).unwrap();
        assert_eq!(ids_of(&first), ids_of(&second));
    }
}
