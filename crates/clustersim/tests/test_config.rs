use clustersim::core::config::SimulationConfig;
use clustersim::core::error::ConfigurationError;
use clustersim::core::packing_algorithm::PackingScheme;
use clustersim::core::resources::{Amount, ResourceKind};
use clustersim::core::workload::WorkloadType;
use clustersim::simulation::ClusterSimulation;

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

#[test]
fn closed_config_runs() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = SimulationConfig::from_file(&name_wrapper("closed.yaml")).unwrap();
    assert_eq!(config.horizon, 110);
    assert_eq!(config.schedulers[0].packing_scheme, PackingScheme::BestFit);
    assert_eq!(config.workloads[0].names.count, 4);
    assert_eq!(config.workloads[0].workload.workload_type, WorkloadType::Closed);

    let mut cluster = ClusterSimulation::from_config(&config).unwrap();
    let summary = cluster.run(config.horizon).unwrap();
    // two trainers fit at a time, each batch takes 10 ticks
    assert_eq!(summary.completed, 20);
    assert_eq!(summary.generated, 24);

    let names: Vec<String> = cluster
        .workload_ids()
        .into_iter()
        .map(|id| cluster.context().lookup_name(id))
        .collect();
    assert_eq!(names, vec!["trainer-0", "trainer-1", "trainer-2", "trainer-3"]);
}

#[test]
fn open_config_expands_entries() {
    let config = SimulationConfig::from_file(&name_wrapper("open.yaml")).unwrap();
    assert_eq!(config.seed, 123);
    assert_eq!(config.nodes[0].resources[&ResourceKind::Mem], Amount::Scalar(32.));

    let mut cluster = ClusterSimulation::from_config(&config).unwrap();
    {
        let nodes = cluster.nodes();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes.get(1).unwrap().name(), "worker-1");
        assert_eq!(nodes.get(2).unwrap().name(), "gpu-node");
    }

    let schedulers = cluster.scheduler_ids();
    let names: Vec<String> = schedulers.iter().map(|id| cluster.context().lookup_name(*id)).collect();
    assert_eq!(names, vec!["scheduler-0", "scheduler-1"]);
    let first = cluster.scheduler(schedulers[0]).unwrap();
    assert_eq!(first.borrow().node_ids(), &[0, 1]);
    assert_eq!(first.borrow().packing_scheme(), PackingScheme::WorstFit);

    let summary = cluster.run(config.horizon).unwrap();
    assert_eq!(summary.time, 25);
    let inference = cluster.workload(cluster.workload_ids()[0]).unwrap();
    assert_eq!(inference.borrow().generated_count(), 5);
}

#[test]
fn unknown_workload_type() {
    let result = SimulationConfig::from_file(&name_wrapper("unknown-workload.yaml"));
    match result {
        Err(ConfigurationError::UnknownType { what, value }) => {
            assert_eq!(what, "workload");
            assert_eq!(value, "poisson");
        }
        other => panic!("expected unknown type error, got {:?}", other),
    }
}

#[test]
fn demand_without_provider() {
    let result = SimulationConfig::from_file(&name_wrapper("missing-resource.yaml"));
    assert!(matches!(result, Err(ConfigurationError::Invalid { .. })));
}

#[test]
fn missing_file() {
    let result = SimulationConfig::from_file(&name_wrapper("no-such-file.yaml"));
    assert!(matches!(result, Err(ConfigurationError::Io { .. })));
}

#[test]
fn records_export() {
    let config = SimulationConfig::from_file(&name_wrapper("closed.yaml")).unwrap();
    let mut cluster = ClusterSimulation::from_config(&config).unwrap();
    cluster.run(20).unwrap();

    let path = std::env::temp_dir().join("clustersim-node-records.csv");
    let path = path.to_str().unwrap();
    cluster.nodes().get(0).unwrap().records().save_csv(path).unwrap();

    let text = std::fs::read_to_string(path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("key,tick,value"));
    assert!(text.lines().any(|line| line.starts_with("gpu-util,")));
    assert!(text.lines().any(|line| line == "tasks,1,2.0"));
    std::fs::remove_file(path).unwrap();
}
