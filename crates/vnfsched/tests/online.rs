use vnfsched::{
    problem::{service::ServiceIdx, timeslot::SlotRange},
    solver::{
        master::{capacity::verify_capacity, lp_solver::HighsSolver},
        online::{OnlineScheduler, prepare_batches},
        solver_params::SolverParams,
    },
};

mod test_utils;

#[test]
fn test_prepared_batches_are_reindexed() {
    let instance = test_utils::load_fixture("instance.json");

    let batches = prepare_batches(instance.services, 10);

    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].window, SlotRange::new(0, 10));
    assert_eq!(batches[1].window, SlotRange::new(10, 20));
    for batch in &batches {
        let ids: Vec<ServiceIdx> = batch.services.iter().map(|service| service.id()).collect();
        let expected: Vec<ServiceIdx> = ServiceIdx::range(batch.services.len()).collect();
        assert_eq!(ids, expected);
    }
    let external: Vec<&str> = batches[1]
        .services
        .iter()
        .map(|service| service.external_id())
        .collect();
    assert_eq!(external, vec!["video", "backup"]);
}

#[test]
fn test_online_run_respects_committed_usage() {
    let instance = test_utils::load_fixture("instance.json");
    let params = SolverParams::default();
    let mut scheduler =
        OnlineScheduler::new(&instance.network, &params, HighsSolver::default()).unwrap();

    let summary = scheduler.run(instance.services);

    assert!(summary.rejected.is_empty());
    assert_eq!(summary.batches.len(), 2);
    assert_eq!(summary.scheduled_services(), 4);

    let first = &summary.batches[0];
    let second = &summary.batches[1];
    assert!(
        verify_capacity(
            first.configurations(),
            &[],
            &instance.network,
            first.earliest_start()
        )
        .is_empty()
    );
    assert!(
        verify_capacity(
            second.configurations(),
            first.configurations(),
            &instance.network,
            second.earliest_start()
        )
        .is_empty()
    );
    assert!(second.earliest_start() >= first.makespan().max(10));
    assert_eq!(scheduler.committed_makespan(), summary.makespan());
}
