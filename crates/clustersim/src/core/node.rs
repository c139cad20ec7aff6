//! Cluster node and node pool.

use std::collections::BTreeMap;

use clustersim_core::Tick;

use crate::core::error::ResourceError;
use crate::core::records::Records;
use crate::core::resources::{Resource, ResourceKind, ResourceMap};

pub type NodeId = u32;

/// Machine owning a set of resources, tracking in-flight tasks and utilization over time.
///
/// Samples are recorded under `tasks` and `<kind>-util` (e.g. `gpu-util`) on every allocation and release.
#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    name: String,
    resources: BTreeMap<ResourceKind, Resource>,
    tasks: u64,
    records: Records,
}

impl Node {
    pub fn new(id: NodeId, name: &str, resources: Vec<Resource>) -> Self {
        let resources = resources.into_iter().map(|r| (r.kind(), r)).collect();
        Self {
            id,
            name: name.to_string(),
            resources,
            tasks: 0,
            records: Records::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self, kind: ResourceKind) -> Option<&Resource> {
        self.resources.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.resources.keys().copied()
    }

    /// Number of tasks currently holding an allocation on this node.
    pub fn task_count(&self) -> u64 {
        self.tasks
    }

    pub fn utilization(&self, kind: ResourceKind) -> Option<f64> {
        self.resources.get(&kind).map(|r| r.utilization())
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    /// Whether every demanded kind exists on the node and can be satisfied.
    pub fn satisfy(&self, demand: &ResourceMap) -> bool {
        demand.iter().all(|(kind, amount)| match self.resources.get(kind) {
            Some(resource) => resource.satisfy(amount),
            None => false,
        })
    }

    /// Allocates the whole demand or nothing.
    ///
    /// `device_order` is the visit order used for device-set resources.
    pub fn alloc(&mut self, demand: &ResourceMap, device_order: &[usize], now: Tick) -> Result<ResourceMap, ResourceError> {
        for (kind, amount) in demand {
            let resource = self.resources.get(kind).ok_or(ResourceError::UnknownResource(*kind))?;
            resource.check_amount(amount)?;
            if !resource.satisfy(amount) {
                return Err(ResourceError::Exhausted {
                    kind: *kind,
                    requested: amount.clone(),
                    remaining: resource.remaining(),
                });
            }
        }

        // device sets go first since only their placement can still fail
        let mut kinds: Vec<ResourceKind> = demand.keys().copied().collect();
        kinds.sort_by_key(|kind| !kind.is_device_set());

        let mut grant = ResourceMap::new();
        for kind in kinds {
            let resource = self.resources.get_mut(&kind).ok_or(ResourceError::UnknownResource(kind))?;
            grant.insert(kind, resource.alloc(&demand[&kind], device_order)?);
        }

        self.tasks += 1;
        self.sample(now);
        Ok(grant)
    }

    /// Releases a grant produced by [`alloc`](Self::alloc), all kinds or none.
    pub fn dealloc(&mut self, grant: &ResourceMap, now: Tick) -> Result<(), ResourceError> {
        for (kind, amount) in grant {
            let resource = self.resources.get(kind).ok_or(ResourceError::UnknownResource(*kind))?;
            resource.check_release(amount)?;
        }
        for (kind, amount) in grant {
            if let Some(resource) = self.resources.get_mut(kind) {
                resource.dealloc(amount)?;
            }
        }

        self.tasks = self.tasks.saturating_sub(1);
        self.sample(now);
        Ok(())
    }

    fn sample(&mut self, now: Tick) {
        self.records.append_step("tasks", now, self.tasks as f64);
        for (kind, resource) in &self.resources {
            self.records
                .append_step(&format!("{}-util", kind), now, resource.utilization());
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// All nodes of the cluster, indexed by node id.
#[derive(Clone, Debug, Default)]
pub struct NodePool {
    nodes: Vec<Node>,
}

impl NodePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its id.
    pub fn add_node(&mut self, name: &str, resources: Vec<Resource>) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node::new(id, name, resources));
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id as usize)
    }

    pub fn ids(&self) -> Vec<NodeId> {
        (0..self.nodes.len() as NodeId).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
