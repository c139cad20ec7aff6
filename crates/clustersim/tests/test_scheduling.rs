use clustersim_core::simulation::Simulation;

use clustersim::core::dispatcher::RoutingPolicy;
use clustersim::core::error::{ResourceError, SimulationError};
use clustersim::core::events::scheduling::TaskFinished;
use clustersim::core::packing_algorithm::PackingScheme;
use clustersim::core::resources::{Amount, Resource, ResourceKind, ResourceMap};
use clustersim::core::task::TaskStatus;
use clustersim::core::workload::WorkloadConfig;
use clustersim::simulation::ClusterSimulation;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn cpu(amount: f64) -> ResourceMap {
    let mut demand = ResourceMap::new();
    demand.insert(ResourceKind::Cpu, Amount::Scalar(amount));
    demand
}

fn gpu(amounts: Vec<f64>) -> ResourceMap {
    let mut demand = ResourceMap::new();
    demand.insert(ResourceKind::Gpu, Amount::PerDevice(amounts));
    demand
}

fn cluster(seed: u64) -> ClusterSimulation {
    init_logger();
    ClusterSimulation::new(Simulation::new(seed), RoutingPolicy::Random)
}

fn gpu_remaining(cluster: &ClusterSimulation, node_id: u32) -> Vec<f64> {
    let nodes = cluster.nodes();
    let node = nodes.get(node_id).unwrap();
    node.resource(ResourceKind::Gpu)
        .and_then(|r| r.device_remaining())
        .unwrap()
        .to_vec()
}

#[test]
fn single_task_timeline() {
    let mut cluster = cluster(123);
    let node = cluster.add_node("node", vec![Resource::cpu(4.), Resource::gpu(vec![1., 1.])]);
    let scheduler = cluster.add_scheduler("scheduler", PackingScheme::WorstFit).unwrap();
    let workload = cluster
        .add_workload("workload", WorkloadConfig::closed((10, 10), gpu(vec![0.5])))
        .unwrap();

    let summary = cluster.run(11).unwrap();
    assert_eq!(summary.time, 11);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.queued, 1);
    assert_eq!(summary.running, 0);

    // queued at 0, placed one tick later, finished after its runtime
    let scheduler = cluster.scheduler(scheduler).unwrap();
    let records = scheduler.borrow().records().clone();
    assert_eq!(records.get("task_runtime"), &[(11, 10.)]);
    assert_eq!(records.get("task_waittime"), &[(11, 1.)]);
    assert_eq!(records.get("task_total"), &[(11, 11.)]);

    let nodes = cluster.nodes();
    let node = nodes.get(node).unwrap();
    assert_eq!(node.records().get("tasks"), &[(0, 0.), (1, 1.), (10, 1.), (11, 0.)]);
    assert_eq!(node.records().get("gpu-util"), &[(0, 0.), (1, 0.25), (10, 0.25), (11, 0.)]);
    assert_eq!(node.task_count(), 0);

    let workload = cluster.workload(workload).unwrap();
    assert_eq!(workload.borrow().generated_count(), 2);
    assert_eq!(workload.borrow().completed_count(), 1);
}

#[test]
fn closed_loop_completes_ten_cycles_by_tick_110() {
    let mut cluster = cluster(123);
    cluster.add_node("node", vec![Resource::cpu(32.), Resource::gpu(vec![1.; 4])]);
    cluster.add_scheduler("scheduler", PackingScheme::BestFit).unwrap();
    let workload = cluster
        .add_workload("workload", WorkloadConfig::closed((10, 10), gpu(vec![0.4, 0.8])))
        .unwrap();

    // each cycle takes runtime plus the one tick scheduling delay, so completions land at 11, 22, ...
    // and the tenth one needs horizon 110
    let summary = cluster.run(100).unwrap();
    assert_eq!(summary.completed, 9);
    assert_eq!(summary.generated, 10);

    let summary = cluster.run(110).unwrap();
    assert_eq!(summary.completed, 10);
    assert_eq!(summary.generated, 11);
    assert_eq!(cluster.workload(workload).unwrap().borrow().completed_count(), 10);
}

#[test]
fn closed_loop_think_time() {
    let mut cluster = cluster(123);
    cluster.add_node("node", vec![Resource::cpu(4.)]);
    cluster.add_scheduler("scheduler", PackingScheme::WorstFit).unwrap();
    let config = WorkloadConfig::closed((10, 10), cpu(1.)).with_think_time((4, 4));
    cluster.add_workload("workload", config).unwrap();

    // finishes at 11, resubmits at 15, placed at 16, finishes at 26, next one waits until 30
    let summary = cluster.run(26).unwrap();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.generated, 2);
    let summary = cluster.run(30).unwrap();
    assert_eq!(summary.generated, 3);
}

#[test]
fn open_loop_arrivals() {
    let mut cluster = cluster(123);
    cluster.add_node("node", vec![Resource::cpu(4.)]);
    cluster.add_scheduler("scheduler", PackingScheme::WorstFit).unwrap();
    cluster
        .add_workload("workload", WorkloadConfig::open((5, 5), (3, 3), cpu(1.)))
        .unwrap();

    let summary = cluster.run(25).unwrap();
    assert_eq!(summary.generated, 5);
    assert_eq!(summary.dispatched, 5);
    assert_eq!(summary.completed, 4);
    assert_eq!(summary.queued, 1);
    assert_eq!(summary.backlog.values().copied().collect::<Vec<_>>(), vec![1]);
}

#[test]
fn backlog_waits_for_capacity() {
    let mut cluster = cluster(123);
    cluster.add_node("node", vec![Resource::gpu(vec![1.])]);
    let scheduler = cluster.add_scheduler("scheduler", PackingScheme::WorstFit).unwrap();
    cluster
        .add_workload("workload", WorkloadConfig::open((1, 1), (10, 10), gpu(vec![1.])))
        .unwrap();

    cluster.run(50).unwrap();
    let scheduler = cluster.scheduler(scheduler).unwrap();
    let scheduler = scheduler.borrow();
    let records = scheduler.records();
    assert_eq!(records.get("task_waittime"), &[(12, 1.), (22, 10.), (32, 19.), (42, 28.)]);
    assert_eq!(records.get("task_total"), &[(12, 11.), (22, 20.), (32, 29.), (42, 38.)]);

    let queued: Vec<_> = scheduler.queued_tasks().map(|t| t.queued_time).collect();
    let mut sorted = queued.clone();
    sorted.sort();
    assert_eq!(queued, sorted);
    assert!(scheduler.queued_tasks().all(|t| t.status == TaskStatus::Queued));
}

#[test]
fn unplaceable_tasks_do_not_block_the_queue() {
    let mut cluster = cluster(123);
    cluster.add_node("cpu-node", vec![Resource::cpu(1.)]);
    cluster.add_node("gpu-node", vec![Resource::gpu(vec![1.])]);
    cluster.add_scheduler("scheduler", PackingScheme::WorstFit).unwrap();
    cluster
        .add_workload("gpu", WorkloadConfig::open((1, 1), (10, 10), gpu(vec![1.])))
        .unwrap();
    let cpu_workload = cluster
        .add_workload("cpu", WorkloadConfig::closed((1, 1), cpu(1.)))
        .unwrap();

    cluster.run(50).unwrap();
    assert_eq!(cluster.workload(cpu_workload).unwrap().borrow().completed_count(), 25);
}

#[test]
fn packing_schemes_choose_devices() {
    let place_two = |scheme| {
        let mut cluster = cluster(123);
        cluster.add_node("node", vec![Resource::cpu(8.), Resource::gpu(vec![1.; 4])]);
        cluster.add_scheduler("scheduler", scheme).unwrap();
        cluster
            .add_workload("workload", WorkloadConfig::open((1, 1), (100, 100), gpu(vec![0.5])))
            .unwrap();
        // arrivals at 1 and 2 are placed at 2 and 3
        let summary = cluster.run(3).unwrap();
        assert_eq!(summary.running, 2);
        gpu_remaining(&cluster, 0)
    };

    assert_eq!(place_two(PackingScheme::WorstFit), vec![0.5, 0.5, 1., 1.]);
    assert_eq!(place_two(PackingScheme::BestFit), vec![0., 1., 1., 1.]);

    let random = place_two(PackingScheme::Random);
    assert_eq!(random.iter().sum::<f64>(), 3.);
    assert!(random.iter().all(|v| *v >= 0.));
}

#[test]
fn random_packing_is_reproducible() {
    let run = |seed| {
        let mut cluster = cluster(seed);
        cluster.add_node("node", vec![Resource::gpu(vec![1.; 8])]);
        cluster.add_scheduler("scheduler", PackingScheme::Random).unwrap();
        cluster
            .add_workload("workload", WorkloadConfig::open((1, 3), (5, 20), gpu(vec![0.25, 0.5])))
            .unwrap();
        cluster.run(200).unwrap();
        let nodes = cluster.nodes();
        nodes.get(0).unwrap().records().get("gpu-util").to_vec()
    };
    assert_eq!(run(7), run(7));
}

#[test]
fn gpu_contention_limits_concurrency() {
    for scheme in [PackingScheme::WorstFit, PackingScheme::BestFit] {
        let mut cluster = cluster(123);
        cluster.add_node("node", vec![Resource::cpu(32.), Resource::gpu(vec![1.; 4])]);
        cluster.add_scheduler("scheduler", scheme).unwrap();
        for i in 0..4 {
            cluster
                .add_workload(&format!("workload-{}", i), WorkloadConfig::closed((10, 10), gpu(vec![0.4, 0.8])))
                .unwrap();
        }
        let summary = cluster.run(200).unwrap();
        assert!(summary.completed > 0);

        let nodes = cluster.nodes();
        let tasks = nodes.get(0).unwrap().records().get("tasks");
        let peak = tasks.iter().map(|(_, v)| *v).fold(0., f64::max);
        assert_eq!(peak, 2.);
    }
}

#[test]
fn dispatcher_spreads_jobs() {
    let mut cluster = cluster(123);
    cluster.add_node("node", vec![Resource::cpu(100.)]);
    let first = cluster.add_scheduler("first", PackingScheme::WorstFit).unwrap();
    let second = cluster.add_scheduler("second", PackingScheme::WorstFit).unwrap();
    cluster
        .add_workload("workload", WorkloadConfig::open((1, 1), (1, 1), cpu(1.)))
        .unwrap();

    let summary = cluster.run(40).unwrap();
    assert_eq!(summary.generated, 40);
    assert_eq!(summary.dispatched, 40);

    let first = cluster.scheduler(first).unwrap().borrow().submitted_count();
    let second = cluster.scheduler(second).unwrap().borrow().submitted_count();
    assert_eq!(first + second, 40);
    assert!(first > 0);
    assert!(second > 0);
}

#[test]
fn scheduler_uses_only_its_nodes() {
    let mut cluster = cluster(123);
    let idle = cluster.add_node("idle", vec![Resource::cpu(1.)]);
    let busy = cluster.add_node("busy", vec![Resource::cpu(1.)]);
    cluster
        .add_scheduler_on_nodes("scheduler", PackingScheme::WorstFit, vec![busy])
        .unwrap();
    cluster
        .add_workload("workload", WorkloadConfig::closed((3, 3), cpu(1.)))
        .unwrap();

    let summary = cluster.run(20).unwrap();
    assert_eq!(summary.completed, 5);
    let nodes = cluster.nodes();
    assert!(nodes.get(idle).unwrap().records().get("tasks").is_empty());
    assert!(!nodes.get(busy).unwrap().records().get("tasks").is_empty());
}

#[test]
fn accounting_error_aborts_run() {
    let mut cluster = cluster(123);
    cluster.add_node("node", vec![Resource::cpu(2.)]);
    let scheduler = cluster.add_scheduler("scheduler", PackingScheme::WorstFit).unwrap();
    cluster
        .add_workload("workload", WorkloadConfig::closed((10, 10), cpu(1.)))
        .unwrap();
    cluster.run(5).unwrap();

    // release the running task's allocation behind the scheduler's back
    let placement = {
        let scheduler = cluster.scheduler(scheduler).unwrap();
        let scheduler = scheduler.borrow();
        let task = scheduler.running_tasks().next().unwrap();
        task.placement.clone().unwrap()
    };
    cluster
        .node_pool()
        .borrow_mut()
        .get_mut(placement.node_id)
        .unwrap()
        .dealloc(&placement.allocation, 5)
        .unwrap();

    match cluster.run(20) {
        Err(SimulationError::Resource {
            tick,
            node_id,
            task_id,
            source,
        }) => {
            assert_eq!(tick, 11);
            assert_eq!(node_id, 0);
            assert_eq!(task_id, 0);
            assert!(matches!(source, ResourceError::Overflow { .. }));
        }
        other => panic!("expected resource error, got {:?}", other),
    }
    assert!(cluster.scheduler(scheduler).unwrap().borrow().is_halted());
}

#[test]
fn stray_completion_aborts_run() {
    let mut cluster = cluster(123);
    cluster.add_node("node", vec![Resource::cpu(2.)]);
    let scheduler = cluster.add_scheduler("scheduler", PackingScheme::WorstFit).unwrap();
    cluster
        .add_workload("workload", WorkloadConfig::closed((10, 10), cpu(1.)))
        .unwrap();
    cluster.run(5).unwrap();

    cluster.context().emit(TaskFinished { task_id: 42 }, scheduler, 1);
    match cluster.run(20) {
        Err(SimulationError::UnknownTask { tick, task_id }) => {
            assert_eq!(tick, 6);
            assert_eq!(task_id, 42);
        }
        other => panic!("expected unknown task error, got {:?}", other),
    }
    let scheduler = cluster.scheduler(scheduler).unwrap();
    assert!(scheduler.borrow().is_halted());
    assert_eq!(scheduler.borrow().running_count(), 1);
}

#[test]
fn workloads_need_a_scheduler() {
    let mut cluster = cluster(123);
    cluster.add_node("node", vec![Resource::cpu(1.)]);
    cluster
        .add_workload("workload", WorkloadConfig::closed((1, 1), cpu(1.)))
        .unwrap();
    assert!(matches!(cluster.run(10), Err(SimulationError::Configuration(_))));
}

#[test]
fn component_names_are_unique() {
    let mut cluster = cluster(123);
    cluster.add_node("node", vec![Resource::cpu(1.)]);
    cluster.add_scheduler("scheduler", PackingScheme::WorstFit).unwrap();
    assert!(cluster.add_scheduler("scheduler", PackingScheme::BestFit).is_err());
    assert!(cluster
        .add_workload("dispatcher", WorkloadConfig::closed((1, 1), cpu(1.)))
        .is_err());
    assert!(cluster
        .add_scheduler_on_nodes("other", PackingScheme::WorstFit, vec![3])
        .is_err());
}

#[test]
fn random_workloads_keep_invariants() {
    let mut cluster = cluster(2024);
    for _ in 0..3 {
        cluster.add_node(
            "node",
            vec![Resource::cpu(16.), Resource::mem(64.), Resource::gpu(vec![1.; 4])],
        );
    }
    let schedulers = vec![
        cluster.add_scheduler("worst", PackingScheme::WorstFit).unwrap(),
        cluster.add_scheduler("best", PackingScheme::BestFit).unwrap(),
        cluster.add_scheduler("random", PackingScheme::Random).unwrap(),
    ];
    let mut mixed = cpu(4.);
    mixed.insert(ResourceKind::Mem, Amount::Scalar(16.));
    mixed.insert(ResourceKind::Gpu, Amount::PerDevice(vec![0.5, 0.25]));
    cluster
        .add_workload("mixed", WorkloadConfig::open((1, 4), (5, 30), mixed))
        .unwrap();
    cluster
        .add_workload("gpu", WorkloadConfig::open((1, 2), (10, 40), gpu(vec![1., 0.75, 0.5])))
        .unwrap();
    for i in 0..3 {
        cluster
            .add_workload(&format!("closed-{}", i), WorkloadConfig::closed((2, 15), cpu(2.)))
            .unwrap();
    }

    let summary = cluster.run(500).unwrap();
    assert!(summary.completed > 0);

    let mut accounted = 0;
    for id in schedulers {
        let scheduler = cluster.scheduler(id).unwrap();
        let scheduler = scheduler.borrow();
        accounted += scheduler.queue_len() as u64 + scheduler.running_count() as u64 + scheduler.completed_count();
        let records = scheduler.records();
        for ((_, runtime), (_, total)) in records.get("task_runtime").iter().zip(records.get("task_total")) {
            assert!(total >= runtime);
        }
        assert!(records.get("task_waittime").iter().all(|(_, wait)| *wait >= 1.));
        for task in scheduler.running_tasks() {
            assert!(task.scheduled_time.unwrap() > task.queued_time);
        }
    }
    assert_eq!(accounted, summary.dispatched);

    let nodes = cluster.nodes();
    let mut running = 0;
    for node in nodes.iter() {
        running += node.task_count();
        for kind in node.kinds() {
            let utilization = node.utilization(kind).unwrap();
            assert!((0. ..=1.).contains(&utilization));
            let key = format!("{}-util", kind);
            assert!(node.records().get(&key).iter().all(|(_, v)| (0. ..=1.).contains(v)));
        }
    }
    assert_eq!(running as usize, summary.running);
}
