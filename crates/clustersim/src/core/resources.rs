//! Resource model: scalar resources (CPU, memory) and GPU device sets.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{ConfigurationError, ResourceError};

/// Tolerance used when comparing fractional amounts.
pub const EPSILON: f64 = 1e-9;

/// Kind of a node resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Mem,
    Gpu,
}

impl ResourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Mem => "mem",
            ResourceKind::Gpu => "gpu",
        }
    }

    /// Whether the resource is a set of devices with per-device amounts.
    pub fn is_device_set(&self) -> bool {
        matches!(self, ResourceKind::Gpu)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" | "cpus" => Ok(ResourceKind::Cpu),
            "mem" | "memory" => Ok(ResourceKind::Mem),
            "gpu" | "gpus" => Ok(ResourceKind::Gpu),
            _ => Err(ConfigurationError::UnknownType {
                what: "resource",
                value: s.to_string(),
            }),
        }
    }
}

/// Amount of a resource: a plain number for scalar kinds or one entry per device for device sets.
///
/// Used for capacities, demands and grants alike.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Scalar(f64),
    PerDevice(Vec<f64>),
}

impl Amount {
    pub fn shape(&self) -> &'static str {
        match self {
            Amount::Scalar(_) => "scalar",
            Amount::PerDevice(_) => "per-device",
        }
    }

    pub fn values(&self) -> &[f64] {
        match self {
            Amount::Scalar(value) => std::slice::from_ref(value),
            Amount::PerDevice(values) => values,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Amount::Scalar(value) => write!(f, "{}", value),
            Amount::PerDevice(values) => {
                let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

/// Per-kind amounts, used both for task demands and for granted allocations.
pub type ResourceMap = BTreeMap<ResourceKind, Amount>;

fn is_valid_amount(value: f64) -> bool {
    value.is_finite() && value >= 0.
}

fn release_fits(remaining: f64, released: f64, capacity: f64) -> bool {
    remaining + released <= capacity + EPSILON
}

// Snaps values that drifted within tolerance back onto the bounds.
fn clamp(value: f64, capacity: f64) -> f64 {
    if value < EPSILON {
        0.
    } else if (capacity - value).abs() < EPSILON {
        capacity
    } else {
        value
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Single-valued resource such as CPU cores or memory.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScalarResource {
    kind: ResourceKind,
    capacity: f64,
    remaining: f64,
}

impl ScalarResource {
    pub fn new(kind: ResourceKind, capacity: f64) -> Self {
        Self {
            kind,
            capacity,
            remaining: capacity,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn satisfy(&self, requested: f64) -> bool {
        is_valid_amount(requested) && requested <= self.remaining + EPSILON
    }

    fn check_amount(&self, amount: f64) -> Result<(), ResourceError> {
        if is_valid_amount(amount) {
            Ok(())
        } else {
            Err(ResourceError::InvalidAmount {
                kind: self.kind,
                amount: Amount::Scalar(amount),
            })
        }
    }

    /// Takes `requested` units and returns the granted amount.
    pub fn alloc(&mut self, requested: f64) -> Result<f64, ResourceError> {
        self.check_amount(requested)?;
        if !self.satisfy(requested) {
            return Err(ResourceError::Exhausted {
                kind: self.kind,
                requested: Amount::Scalar(requested),
                remaining: Amount::Scalar(self.remaining),
            });
        }
        self.remaining = clamp(self.remaining - requested, self.capacity);
        Ok(requested)
    }

    pub fn check_release(&self, released: f64) -> Result<(), ResourceError> {
        self.check_amount(released)?;
        if release_fits(self.remaining, released, self.capacity) {
            Ok(())
        } else {
            Err(ResourceError::Overflow {
                kind: self.kind,
                released: Amount::Scalar(released),
                remaining: Amount::Scalar(self.remaining),
                capacity: Amount::Scalar(self.capacity),
            })
        }
    }

    pub fn dealloc(&mut self, released: f64) -> Result<(), ResourceError> {
        self.check_release(released)?;
        self.remaining = clamp(self.remaining + released, self.capacity);
        Ok(())
    }

    /// Share of capacity currently in use.
    pub fn utilization(&self) -> f64 {
        if self.capacity <= 0. {
            return 0.;
        }
        (self.capacity - self.remaining) / self.capacity
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Fixed set of GPU devices, each holding a fractional amount of capacity.
///
/// A task demand lists per-device amounts, and every entry must be seated on a distinct device.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GpuSet {
    capacity: Vec<f64>,
    remaining: Vec<f64>,
}

impl GpuSet {
    pub fn new(capacity: Vec<f64>) -> Self {
        Self {
            remaining: capacity.clone(),
            capacity,
        }
    }

    pub fn device_count(&self) -> usize {
        self.capacity.len()
    }

    pub fn capacity(&self) -> &[f64] {
        &self.capacity
    }

    pub fn remaining(&self) -> &[f64] {
        &self.remaining
    }

    /// Checks whether the demand can be seated, comparing both sides sorted in descending order.
    pub fn satisfy(&self, requested: &[f64]) -> bool {
        if requested.len() > self.remaining.len() || !requested.iter().all(|v| is_valid_amount(*v)) {
            return false;
        }
        let mut remaining = self.remaining.clone();
        let mut requested = requested.to_vec();
        remaining.sort_by(|a, b| b.total_cmp(a));
        requested.sort_by(|a, b| b.total_cmp(a));
        requested.iter().zip(remaining.iter()).all(|(req, rem)| req <= &(rem + EPSILON))
    }

    /// Seats the demand on distinct devices and returns the grant, one entry per device.
    ///
    /// Demands are placed largest-first, each onto the first unclaimed device in `visit_order` that can hold it.
    /// The set is left untouched when placement fails.
    pub fn alloc(&mut self, requested: &[f64], visit_order: &[usize]) -> Result<Vec<f64>, ResourceError> {
        check_device_amounts(requested)?;
        if !self.satisfy(requested) {
            return Err(ResourceError::Exhausted {
                kind: ResourceKind::Gpu,
                requested: Amount::PerDevice(requested.to_vec()),
                remaining: Amount::PerDevice(self.remaining.clone()),
            });
        }

        let mut demands = requested.to_vec();
        demands.sort_by(|a, b| b.total_cmp(a));

        let mut grant = vec![0.; self.device_count()];
        let mut claimed = vec![false; self.device_count()];
        for demand in demands {
            let device = visit_order
                .iter()
                .copied()
                .filter(|&idx| idx < self.remaining.len())
                .find(|&idx| !claimed[idx] && demand <= self.remaining[idx] + EPSILON);
            match device {
                Some(idx) => {
                    claimed[idx] = true;
                    grant[idx] = demand;
                }
                None => {
                    return Err(ResourceError::SchedulingInconsistency {
                        kind: ResourceKind::Gpu,
                        demand: Amount::PerDevice(requested.to_vec()),
                        remaining: Amount::PerDevice(self.remaining.clone()),
                    })
                }
            }
        }

        for (idx, amount) in grant.iter().enumerate() {
            self.remaining[idx] = clamp(self.remaining[idx] - amount, self.capacity[idx]);
        }
        Ok(grant)
    }

    pub fn check_release(&self, grant: &[f64]) -> Result<(), ResourceError> {
        if grant.len() != self.device_count() {
            return Err(ResourceError::ShapeMismatch {
                kind: ResourceKind::Gpu,
                expected: "per-device grant matching the device count",
                got: Amount::PerDevice(grant.to_vec()),
            });
        }
        check_device_amounts(grant)?;
        let fits = (0..grant.len()).all(|idx| release_fits(self.remaining[idx], grant[idx], self.capacity[idx]));
        if fits {
            Ok(())
        } else {
            Err(ResourceError::Overflow {
                kind: ResourceKind::Gpu,
                released: Amount::PerDevice(grant.to_vec()),
                remaining: Amount::PerDevice(self.remaining.clone()),
                capacity: Amount::PerDevice(self.capacity.clone()),
            })
        }
    }

    /// Returns a grant previously produced by [`alloc`](Self::alloc).
    pub fn dealloc(&mut self, grant: &[f64]) -> Result<(), ResourceError> {
        self.check_release(grant)?;
        for (idx, amount) in grant.iter().enumerate() {
            self.remaining[idx] = clamp(self.remaining[idx] + amount, self.capacity[idx]);
        }
        Ok(())
    }

    /// Share of total device capacity currently in use.
    pub fn utilization(&self) -> f64 {
        let capacity: f64 = self.capacity.iter().sum();
        if capacity <= 0. {
            return 0.;
        }
        let remaining: f64 = self.remaining.iter().sum();
        (capacity - remaining) / capacity
    }
}

fn check_device_amounts(amounts: &[f64]) -> Result<(), ResourceError> {
    if amounts.iter().all(|v| is_valid_amount(*v)) {
        Ok(())
    } else {
        Err(ResourceError::InvalidAmount {
            kind: ResourceKind::Gpu,
            amount: Amount::PerDevice(amounts.to_vec()),
        })
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Resource owned by a node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Resource {
    Scalar(ScalarResource),
    Devices(GpuSet),
}

impl Resource {
    pub fn cpu(capacity: f64) -> Self {
        Resource::Scalar(ScalarResource::new(ResourceKind::Cpu, capacity))
    }

    pub fn mem(capacity: f64) -> Self {
        Resource::Scalar(ScalarResource::new(ResourceKind::Mem, capacity))
    }

    pub fn gpu(capacity: Vec<f64>) -> Self {
        Resource::Devices(GpuSet::new(capacity))
    }

    /// Builds a resource of the given kind from a configured capacity.
    pub fn with_capacity(kind: ResourceKind, capacity: &Amount) -> Result<Self, ConfigurationError> {
        if capacity.values().iter().any(|v| !v.is_finite() || *v < 0.) {
            return Err(ConfigurationError::invalid(
                format!("{} capacity", kind),
                format!("amounts must be finite and non-negative, got {}", capacity),
            ));
        }
        match (kind.is_device_set(), capacity) {
            (false, Amount::Scalar(value)) => Ok(Resource::Scalar(ScalarResource::new(kind, *value))),
            (true, Amount::PerDevice(values)) => Ok(Resource::gpu(values.clone())),
            _ => Err(ConfigurationError::invalid(
                format!("{} capacity", kind),
                format!("expected {} amount, got {}", expected_shape(kind), capacity),
            )),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Scalar(resource) => resource.kind(),
            Resource::Devices(_) => ResourceKind::Gpu,
        }
    }

    pub fn capacity(&self) -> Amount {
        match self {
            Resource::Scalar(resource) => Amount::Scalar(resource.capacity()),
            Resource::Devices(set) => Amount::PerDevice(set.capacity().to_vec()),
        }
    }

    pub fn remaining(&self) -> Amount {
        match self {
            Resource::Scalar(resource) => Amount::Scalar(resource.remaining()),
            Resource::Devices(set) => Amount::PerDevice(set.remaining().to_vec()),
        }
    }

    /// Per-device remaining amounts, `None` for scalar resources.
    pub fn device_remaining(&self) -> Option<&[f64]> {
        match self {
            Resource::Scalar(_) => None,
            Resource::Devices(set) => Some(set.remaining()),
        }
    }

    /// Checks that `amount` has this resource's shape and only finite non-negative entries.
    pub fn check_amount(&self, amount: &Amount) -> Result<(), ResourceError> {
        if amount.shape() != expected_shape(self.kind()) {
            return Err(shape_mismatch(self.kind(), amount));
        }
        if amount.values().iter().all(|v| is_valid_amount(*v)) {
            Ok(())
        } else {
            Err(ResourceError::InvalidAmount {
                kind: self.kind(),
                amount: amount.clone(),
            })
        }
    }

    /// Feasibility test; a demand of the wrong shape is never satisfiable.
    pub fn satisfy(&self, requested: &Amount) -> bool {
        match (self, requested) {
            (Resource::Scalar(resource), Amount::Scalar(value)) => resource.satisfy(*value),
            (Resource::Devices(set), Amount::PerDevice(values)) => set.satisfy(values),
            _ => false,
        }
    }

    /// Takes the demand and returns the grant. `visit_order` only matters for device sets.
    pub fn alloc(&mut self, requested: &Amount, visit_order: &[usize]) -> Result<Amount, ResourceError> {
        match (self, requested) {
            (Resource::Scalar(resource), Amount::Scalar(value)) => resource.alloc(*value).map(Amount::Scalar),
            (Resource::Devices(set), Amount::PerDevice(values)) => set.alloc(values, visit_order).map(Amount::PerDevice),
            (resource, _) => Err(shape_mismatch(resource.kind(), requested)),
        }
    }

    pub fn check_release(&self, grant: &Amount) -> Result<(), ResourceError> {
        match (self, grant) {
            (Resource::Scalar(resource), Amount::Scalar(value)) => resource.check_release(*value),
            (Resource::Devices(set), Amount::PerDevice(values)) => set.check_release(values),
            (resource, _) => Err(shape_mismatch(resource.kind(), grant)),
        }
    }

    pub fn dealloc(&mut self, grant: &Amount) -> Result<(), ResourceError> {
        match (self, grant) {
            (Resource::Scalar(resource), Amount::Scalar(value)) => resource.dealloc(*value),
            (Resource::Devices(set), Amount::PerDevice(values)) => set.dealloc(values),
            (resource, _) => Err(shape_mismatch(resource.kind(), grant)),
        }
    }

    pub fn utilization(&self) -> f64 {
        match self {
            Resource::Scalar(resource) => resource.utilization(),
            Resource::Devices(set) => set.utilization(),
        }
    }
}

fn expected_shape(kind: ResourceKind) -> &'static str {
    if kind.is_device_set() {
        "per-device"
    } else {
        "scalar"
    }
}

fn shape_mismatch(kind: ResourceKind, got: &Amount) -> ResourceError {
    ResourceError::ShapeMismatch {
        kind,
        expected: expected_shape(kind),
        got: got.clone(),
    }
}

/// Checks that a demand has the right shape and only non-negative finite entries.
pub fn validate_demand(kind: ResourceKind, demand: &Amount) -> Result<(), ConfigurationError> {
    if demand.shape() != expected_shape(kind) {
        return Err(ConfigurationError::invalid(
            format!("{} demand", kind),
            format!("expected {} amount, got {}", expected_shape(kind), demand),
        ));
    }
    if demand.values().iter().any(|v| !v.is_finite() || *v < 0.) {
        return Err(ConfigurationError::invalid(
            format!("{} demand", kind),
            format!("amounts must be finite and non-negative, got {}", demand),
        ));
    }
    Ok(())
}
