// benches/bench_signal_reevaluate.rs
use criterion::{
    black_box, criterion_group, criterion_main, AxisScale, Criterion, PlotConfiguration,
};
use intersection_signals::shared_data::SignalId;
use intersection_signals::Signal;
use std::time::Duration;

// A vehicle signal with `peers` peers and some waiting cars, still red.
fn create_waiting_signal(peers: usize, cars: u32) -> Signal {
    let mut signal = Signal::vehicle("bench");
    for i in 0..peers {
        signal.add_peer(SignalId::new(format!("peer{}", i)));
    }
    for _ in 0..cars {
        signal.admit_car_demand();
    }
    signal
}

fn bench_reevaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("reevaluate");

    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));
    group.warm_up_time(Duration::from_secs(2));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Linear));

    // Full green cycle: red -> green on reevaluate, back to red on timeout.
    for &cars in [1u32, 10, 20].iter() {
        group.bench_function(format!("green_cycle_cars_{}", cars), |b| {
            let template = create_waiting_signal(11, cars);
            b.iter(|| {
                let mut signal = template.clone();
                let reaction = signal.reevaluate();
                if let Some((generation, _)) = reaction.scheduled_timeout() {
                    black_box(signal.fire_timeout(generation));
                }
                black_box(&signal);
            });
        });
    }

    // Nothing to do: the common case for a tick hitting a green signal.
    group.bench_function("already_green", |b| {
        let mut signal = create_waiting_signal(11, 5);
        signal.reevaluate();
        b.iter(|| {
            black_box(signal.reevaluate());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_reevaluate);
criterion_main!(benches);
