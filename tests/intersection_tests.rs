use intersection_signals::global_variables::{MAX_CARS, MAX_PEDESTRIANS};
use intersection_signals::monitoring::event_recorder::EventHistory;
use intersection_signals::shared_data::SignalEventKind;
use intersection_signals::signal_system::scheduler::TokioScheduler;
use intersection_signals::signal_system::signal_actor::SignalHandle;
use intersection_signals::{IntersectionController, Phase, Signal, SignalId, SignalKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn controller_with_history(time_unit: Duration) -> (IntersectionController, Arc<EventHistory>) {
    let history = Arc::new(EventHistory::new());
    let mut controller =
        IntersectionController::new(Arc::new(TokioScheduler::current().unwrap()), time_unit);
    controller.add_event_sink(history.clone()).unwrap();
    (controller, history)
}

fn handle(controller: &IntersectionController, id: &str) -> SignalHandle {
    controller
        .signal(&SignalId::from(id))
        .expect("signal is registered")
        .clone()
}

#[tokio::test(start_paused = true)]
async fn vehicle_and_pedestrian_signal_scenario() {
    let (mut controller, history) = controller_with_history(Duration::from_secs(1));
    controller.register(Signal::vehicle("V")).unwrap();
    controller.register(Signal::pedestrian("P")).unwrap();
    controller.connect_all().unwrap();
    controller.start_signals().unwrap();
    let v = handle(&controller, "V");
    let p = handle(&controller, "P");
    let v_id = SignalId::from("V");

    v.admit_car_demand().unwrap();
    let v_state = v.snapshot().await.unwrap();
    assert_eq!(v_state.car_demand, 1);
    assert_eq!(v_state.phase, Phase::Red);
    let p_state = p.snapshot().await.unwrap();
    assert_eq!(p_state.car_demand, 1);
    assert_eq!(p_state.pedestrian_demand, 0);
    assert_eq!(p_state.phase, Phase::Red);

    v.reevaluate().unwrap();
    let v_state = v.snapshot().await.unwrap();
    assert_eq!(v_state.phase, Phase::GreenVehicle);
    assert!(v_state.timeout_pending);
    let transition = history
        .for_signal(&v_id)
        .into_iter()
        .find(|event| event.kind == SignalEventKind::Transition)
        .expect("V turned green");
    assert_eq!(transition.green_units, Some(5));

    // the pedestrian signal only picks up stray car demand
    let p_state = p.snapshot().await.unwrap();
    assert_eq!(p_state.phase, Phase::Red);
    assert_eq!(p_state.pedestrian_demand, 0);
    assert_eq!(p_state.car_demand, 2);

    let sent_before_timeout = history.count(&v_id, SignalEventKind::Send);
    sleep(Duration::from_millis(5100)).await;

    let v_state = v.snapshot().await.unwrap();
    assert_eq!(v_state.phase, Phase::Red);
    assert_eq!(v_state.car_demand, 0);
    assert!(!v_state.timeout_pending);
    assert_eq!(history.count(&v_id, SignalEventKind::Timeout), 1);
    assert_eq!(
        history.count(&v_id, SignalEventKind::Send),
        sent_before_timeout + 1
    );

    let p_state = p.snapshot().await.unwrap();
    assert_eq!(p_state.phase, Phase::Red);
    assert_eq!(p_state.car_demand, 2);

    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn admission_reaches_every_peer() {
    let (mut controller, _history) = controller_with_history(Duration::from_secs(1));
    controller.register(Signal::vehicle("A")).unwrap();
    controller.register(Signal::vehicle("B")).unwrap();
    controller.register(Signal::pedestrian("C")).unwrap();
    controller.register(Signal::pedestrian("D")).unwrap();
    controller.connect_all().unwrap();
    controller.start_signals().unwrap();

    let a = handle(&controller, "A");
    a.admit_car_demand().unwrap();
    a.snapshot().await.unwrap();

    for id in ["B", "C", "D"] {
        let state = handle(&controller, id).snapshot().await.unwrap();
        assert!(state.car_demand >= 1, "{} missed the notification", id);
        assert!(state.car_demand <= MAX_CARS);
        assert_eq!(state.peer_count, 3);
    }

    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn merged_demand_respects_receiver_cap() {
    let (mut controller, _history) = controller_with_history(Duration::from_secs(1));
    controller.register(Signal::vehicle("A")).unwrap();
    controller.register(Signal::pedestrian("P")).unwrap();
    controller.connect_all().unwrap();
    controller.start_signals().unwrap();

    let a = handle(&controller, "A");
    for _ in 0..MAX_CARS {
        a.admit_car_demand().unwrap();
    }
    a.snapshot().await.unwrap();

    let state = handle(&controller, "P").snapshot().await.unwrap();
    assert_eq!(state.car_demand, MAX_CARS);

    controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admissions_are_not_lost() {
    let (mut controller, history) = controller_with_history(Duration::from_secs(1));
    controller.register(Signal::vehicle("V")).unwrap();
    controller.connect_all().unwrap();
    controller.start_signals().unwrap();
    let v = handle(&controller, "V");

    let tasks: Vec<_> = (0..15)
        .map(|_| {
            let v = v.clone();
            tokio::spawn(async move { v.admit_car_demand() })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(v.snapshot().await.unwrap().car_demand, 15);
    assert_eq!(history.count(&SignalId::from("V"), SignalEventKind::Admit), 15);
    controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admissions_saturate() {
    let (mut controller, _history) = controller_with_history(Duration::from_secs(1));
    controller.register(Signal::vehicle("V")).unwrap();
    controller.connect_all().unwrap();
    controller.start_signals().unwrap();
    let v = handle(&controller, "V");

    let tasks: Vec<_> = (0..25)
        .map(|_| {
            let v = v.clone();
            tokio::spawn(async move { v.admit_car_demand() })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(v.snapshot().await.unwrap().car_demand, MAX_CARS);
    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn first_tick_turns_signals_green() {
    let (mut controller, _history) = controller_with_history(Duration::from_secs(1));
    controller.register(Signal::vehicle("V")).unwrap();
    controller.register(Signal::pedestrian("P")).unwrap();
    controller.connect_all().unwrap();
    controller.run(Duration::from_secs(2)).unwrap();
    assert!(controller.is_running());

    sleep(Duration::from_millis(100)).await;
    let snapshots = controller.snapshots().await.unwrap();
    assert_eq!(snapshots[0].phase, Phase::GreenVehicle);
    assert_eq!(snapshots[0].kind, SignalKind::Vehicle);
    assert_eq!(snapshots[1].phase, Phase::GreenPedestrian);
    assert_eq!(snapshots[1].pedestrian_demand, 1);

    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stop_ends_demand_injection() {
    let (mut controller, history) = controller_with_history(Duration::from_secs(1));
    controller.register(Signal::vehicle("V")).unwrap();
    controller.connect_all().unwrap();
    controller.run(Duration::from_secs(2)).unwrap();

    // ticks at 0s and 2s
    sleep(Duration::from_secs(3)).await;
    assert!(controller.stop());
    assert!(!controller.is_running());
    assert!(!controller.stop());

    sleep(Duration::from_secs(60)).await;
    let v_id = SignalId::from("V");
    assert_eq!(history.count(&v_id, SignalEventKind::Admit), 2);
    assert_eq!(history.count(&v_id, SignalEventKind::Timeout), 1);

    let state = handle(&controller, "V").snapshot().await.unwrap();
    assert_eq!(state.phase, Phase::Red);
    assert_eq!(state.car_demand, 0);

    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_finishes_queued_work() {
    let (mut controller, history) = controller_with_history(Duration::from_secs(1));
    controller.register(Signal::pedestrian("P")).unwrap();
    controller.connect_all().unwrap();
    controller.start_signals().unwrap();

    let p = handle(&controller, "P");
    for _ in 0..5 {
        p.admit_pedestrian_demand().unwrap();
    }
    controller.shutdown().await;

    assert_eq!(history.count(&SignalId::from("P"), SignalEventKind::Admit), 5);
    assert!(p.admit_pedestrian_demand().is_err());
}

#[tokio::test(start_paused = true)]
async fn busy_intersection_keeps_invariants() {
    let (mut controller, history) = controller_with_history(Duration::from_millis(100));
    for i in 1..=4 {
        controller
            .register(Signal::vehicle(format!("vehicle-{}", i)))
            .unwrap();
    }
    for i in 1..=8 {
        controller
            .register(Signal::pedestrian(format!("pedestrian-{}", i)))
            .unwrap();
    }
    controller.connect_all().unwrap();
    controller.run(Duration::from_millis(200)).unwrap();

    for _ in 0..40 {
        sleep(Duration::from_millis(250)).await;
        for state in controller.snapshots().await.unwrap() {
            assert!(state.car_demand <= MAX_CARS);
            assert!(state.pedestrian_demand <= MAX_PEDESTRIANS);
            assert_eq!(state.peer_count, 11);
            match state.kind {
                SignalKind::Vehicle => assert_ne!(state.phase, Phase::GreenPedestrian),
                SignalKind::Pedestrian => assert_ne!(state.phase, Phase::GreenVehicle),
            }
            assert_eq!(state.phase.is_green(), state.timeout_pending);
        }
    }

    let timeouts = history
        .events()
        .iter()
        .filter(|event| event.kind == SignalEventKind::Timeout)
        .count();
    assert!(timeouts > 0);
    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dropping_a_running_intersection_stops_it() {
    let (mut controller, history) = controller_with_history(Duration::from_secs(1));
    controller.register(Signal::vehicle("V")).unwrap();
    controller.connect_all().unwrap();
    controller.run(Duration::from_secs(2)).unwrap();
    let v = handle(&controller, "V");

    sleep(Duration::from_millis(100)).await;
    drop(controller);
    sleep(Duration::from_secs(60)).await;

    assert_eq!(history.count(&SignalId::from("V"), SignalEventKind::Admit), 1);
    assert!(v.admit_car_demand().is_err());
}
