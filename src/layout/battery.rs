use std::collections::{BTreeMap, BTreeSet};

use crate::ir::GeneCluster;

use super::{LayoutError, LayoutResult};

/// Clusters that share exactly the same input set.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterBattery {
    inputs: BTreeSet<String>,
    members: BTreeMap<String, GeneCluster>,
}

impl ClusterBattery {
    pub fn new(inputs: BTreeSet<String>) -> Self {
        Self {
            inputs,
            members: BTreeMap::new(),
        }
    }

    pub fn add_cluster(&mut self, cluster: GeneCluster) -> LayoutResult<()> {
        if cluster.inputs != self.inputs {
            return Err(LayoutError::invalid(format!(
                "cluster {} inputs {:?} do not match battery inputs {:?}",
                cluster.core_id, cluster.inputs, self.inputs
            )));
        }
        self.members.insert(cluster.core_id.clone(), cluster);
        Ok(())
    }

    pub fn inputs(&self) -> &BTreeSet<String> {
        &self.inputs
    }

    /// Members keyed by core node id, in sorted order. Ids stand in for
    /// node names here: two genes may share a display name but never an id.
    pub fn members(&self) -> &BTreeMap<String, GeneCluster> {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Block dimensions `(columns, rows)` used to draw the battery.
    pub fn layout(&self) -> (usize, usize) {
        let side = (self.members.len() as f64).sqrt().ceil() as usize;
        (side, side)
    }

    /// `(row, column)` of the n-th member within the block.
    pub fn cell_of(&self, index: usize) -> (usize, usize) {
        let (cols, _) = self.layout();
        let cols = cols.max(1);
        (index / cols, index % cols)
    }
}

pub fn find_batteries(clusters: &[GeneCluster], drop_singletons: bool) -> Vec<ClusterBattery> {
    let mut by_inputs: BTreeMap<BTreeSet<String>, ClusterBattery> = BTreeMap::new();
    for cluster in clusters {
        let battery = by_inputs
            .entry(cluster.inputs.clone())
            .or_insert_with(|| ClusterBattery::new(cluster.inputs.clone()));
        // Keyed by the input set itself, so membership holds by construction.
        battery
            .members
            .insert(cluster.core_id.clone(), cluster.clone());
    }
    by_inputs
        .into_values()
        .filter(|battery| !drop_singletons || battery.len() >= 2)
        .collect()
}
