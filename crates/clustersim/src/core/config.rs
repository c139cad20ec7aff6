//! Simulation configuration.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use clustersim_core::Tick;

use crate::core::dispatcher::RoutingPolicy;
use crate::core::error::ConfigurationError;
use crate::core::node::NodeId;
use crate::core::packing_algorithm::PackingScheme;
use crate::core::resources::{Amount, Resource, ResourceKind, ResourceMap};
use crate::core::workload::{WorkloadConfig, WorkloadType};

/// Holds raw simulation config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Default)]
struct RawSimulationConfig {
    pub seed: Option<u64>,
    pub horizon: Option<Tick>,
    pub nodes: Option<Vec<RawNodeConfig>>,
    pub schedulers: Option<Vec<RawSchedulerConfig>>,
    pub dispatcher: Option<RawDispatcherConfig>,
    pub workloads: Option<Vec<RawWorkloadConfig>>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawNodeConfig {
    pub name: Option<String>,
    pub name_prefix: Option<String>,
    pub resources: BTreeMap<String, Amount>,
    pub count: Option<u32>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawSchedulerConfig {
    pub name: Option<String>,
    pub name_prefix: Option<String>,
    pub packing_scheme: Option<String>,
    pub nodes: Option<Vec<NodeId>>,
    pub count: Option<u32>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Default)]
struct RawDispatcherConfig {
    pub routing_policy: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawWorkloadConfig {
    pub name: Option<String>,
    pub name_prefix: Option<String>,
    pub r#type: String,
    pub arrival_interval_range: Option<(Tick, Tick)>,
    pub runtime_range: (Tick, Tick),
    pub resource_demand: BTreeMap<String, Amount>,
    pub count: Option<u32>,
}

/// Naming of a config entry that may describe several identical instances.
#[derive(Debug, PartialEq, Serialize, Clone, Default)]
pub struct InstanceNames {
    /// Instance name.
    /// Used if count = 1.
    pub name: Option<String>,
    /// Instance name prefix.
    /// Full name is produced by appending the instance number to the prefix.
    pub name_prefix: Option<String>,
    /// Number of instances.
    pub count: u32,
}

impl InstanceNames {
    fn new(name: Option<String>, name_prefix: Option<String>, count: Option<u32>) -> Self {
        Self {
            name,
            name_prefix,
            count: count.unwrap_or(1),
        }
    }

    /// Name of the `index`-th instance, `None` when the entry leaves naming to the simulation.
    pub fn instance_name(&self, index: u32) -> Option<String> {
        if let Some(prefix) = &self.name_prefix {
            return Some(format!("{}-{}", prefix, index));
        }
        match &self.name {
            Some(name) if self.count == 1 => Some(name.clone()),
            Some(name) => Some(format!("{}-{}", name, index)),
            None => None,
        }
    }
}

/// Holds configuration of a single node or a set of identical nodes.
#[derive(Debug, PartialEq, Serialize, Clone)]
pub struct NodeConfig {
    pub names: InstanceNames,
    /// Capacity of each resource kind.
    pub resources: BTreeMap<ResourceKind, Amount>,
}

impl NodeConfig {
    /// Builds fresh resources at full capacity.
    pub fn build_resources(&self) -> Result<Vec<Resource>, ConfigurationError> {
        self.resources
            .iter()
            .map(|(kind, capacity)| Resource::with_capacity(*kind, capacity))
            .collect()
    }
}

/// Holds configuration of a single scheduler or a set of identically configured schedulers.
#[derive(Debug, PartialEq, Serialize, Clone)]
pub struct SchedulerConfig {
    pub names: InstanceNames,
    /// GPU packing scheme used by the scheduler(s).
    pub packing_scheme: PackingScheme,
    /// Nodes the scheduler(s) may place tasks on, all nodes if not set.
    pub nodes: Option<Vec<NodeId>>,
}

/// Holds configuration of a single workload or a set of identical workloads.
#[derive(Debug, PartialEq, Serialize, Clone)]
pub struct WorkloadSetConfig {
    pub names: InstanceNames,
    pub workload: WorkloadConfig,
}

/// Represents simulation configuration.
#[derive(Debug, PartialEq, Serialize, Clone)]
pub struct SimulationConfig {
    /// Seed of the simulation-wide random number generator.
    pub seed: u64,
    /// Last tick processed by a run.
    pub horizon: Tick,
    pub nodes: Vec<NodeConfig>,
    pub schedulers: Vec<SchedulerConfig>,
    /// Policy used by the dispatcher to route jobs to schedulers.
    pub routing_policy: RoutingPolicy,
    pub workloads: Vec<WorkloadSetConfig>,
}

impl SimulationConfig {
    /// Creates simulation config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self, ConfigurationError> {
        let data = std::fs::read_to_string(file_name).map_err(|source| ConfigurationError::Io {
            path: file_name.to_string(),
            source,
        })?;
        Self::from_yaml(&data)
    }

    /// Creates simulation config from YAML text.
    pub fn from_yaml(data: &str) -> Result<Self, ConfigurationError> {
        let raw: RawSimulationConfig = serde_yaml::from_str(data)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSimulationConfig) -> Result<Self, ConfigurationError> {
        let nodes = raw
            .nodes
            .unwrap_or_default()
            .into_iter()
            .map(parse_node)
            .collect::<Result<Vec<_>, _>>()?;
        let node_count: u32 = nodes.iter().map(|n| n.names.count).sum();
        let node_kinds: BTreeSet<ResourceKind> = nodes.iter().flat_map(|n| n.resources.keys().copied()).collect();

        let schedulers = raw
            .schedulers
            .unwrap_or_default()
            .into_iter()
            .map(|s| parse_scheduler(s, node_count))
            .collect::<Result<Vec<_>, _>>()?;

        let routing_policy = match raw.dispatcher.and_then(|d| d.routing_policy) {
            Some(policy) => policy.parse()?,
            None => RoutingPolicy::default(),
        };

        let workloads = raw
            .workloads
            .unwrap_or_default()
            .into_iter()
            .map(|w| parse_workload(w, &node_kinds))
            .collect::<Result<Vec<_>, _>>()?;

        let scheduler_count: u32 = schedulers.iter().map(|s| s.names.count).sum();
        let workload_count: u32 = workloads.iter().map(|w| w.names.count).sum();
        if workload_count > 0 && scheduler_count == 0 {
            return Err(ConfigurationError::invalid(
                "schedulers",
                "workloads are configured but there is no scheduler",
            ));
        }

        Ok(Self {
            seed: raw.seed.unwrap_or(123),
            horizon: raw.horizon.unwrap_or(1000),
            nodes,
            schedulers,
            routing_policy,
            workloads,
        })
    }
}

fn parse_kinds(raw: BTreeMap<String, Amount>) -> Result<BTreeMap<ResourceKind, Amount>, ConfigurationError> {
    let mut parsed = BTreeMap::new();
    for (name, amount) in raw {
        let kind: ResourceKind = name.parse()?;
        if parsed.insert(kind, amount).is_some() {
            return Err(ConfigurationError::invalid("resources", format!("{} is listed twice", kind)));
        }
    }
    Ok(parsed)
}

fn parse_node(raw: RawNodeConfig) -> Result<NodeConfig, ConfigurationError> {
    let node = NodeConfig {
        names: InstanceNames::new(raw.name, raw.name_prefix, raw.count),
        resources: parse_kinds(raw.resources)?,
    };
    node.build_resources()?;
    Ok(node)
}

fn parse_scheduler(raw: RawSchedulerConfig, node_count: u32) -> Result<SchedulerConfig, ConfigurationError> {
    let packing_scheme = match raw.packing_scheme {
        Some(scheme) => scheme.parse()?,
        None => PackingScheme::default(),
    };
    if let Some(nodes) = &raw.nodes {
        if let Some(id) = nodes.iter().find(|id| **id >= node_count) {
            return Err(ConfigurationError::invalid(
                "scheduler nodes",
                format!("node {} does not exist ({} nodes configured)", id, node_count),
            ));
        }
    }
    Ok(SchedulerConfig {
        names: InstanceNames::new(raw.name, raw.name_prefix, raw.count),
        packing_scheme,
        nodes: raw.nodes,
    })
}

fn parse_workload(raw: RawWorkloadConfig, node_kinds: &BTreeSet<ResourceKind>) -> Result<WorkloadSetConfig, ConfigurationError> {
    let workload_type: WorkloadType = raw.r#type.parse()?;
    let arrival_interval_range = match (workload_type, raw.arrival_interval_range) {
        (_, Some(range)) => range,
        (WorkloadType::Closed, None) => (0, 0),
        (WorkloadType::Open, None) => {
            return Err(ConfigurationError::invalid(
                "arrival_interval_range",
                "required for open-loop workloads",
            ))
        }
    };
    let resource_demand: ResourceMap = parse_kinds(raw.resource_demand)?;
    if let Some(kind) = resource_demand.keys().find(|kind| !node_kinds.contains(*kind)) {
        return Err(ConfigurationError::invalid(
            "resource_demand",
            format!("no node provides {}", kind),
        ));
    }

    let workload = WorkloadConfig {
        workload_type,
        arrival_interval_range,
        runtime_range: raw.runtime_range,
        resource_demand,
    };
    workload.validate()?;
    Ok(WorkloadSetConfig {
        names: InstanceNames::new(raw.name, raw.name_prefix, raw.count),
        workload,
    })
}
