use streambind::batch::sweep_binding;
use streambind::binding::{BindingConfig, Topology};
use streambind::config::{EnvironmentConfig, RunConfig};
use streambind::engine::{self, RunResult};
use streambind::environment::EnvironmentKind;
use streambind::error::ConfigError;
use streambind::observer::RunAdapter;
use streambind::perturbation::PerturbationEvent;
use streambind::stabilizer::StabilizerConfig;
use streambind::stream::StreamParams;

#[derive(Debug, Clone)]
struct Row {
    assay: &'static str,
    condition: String,
    regime: String,
    proxy: f64,
    peak: f64,
    counterfactual: bool,
}

impl Row {
    fn new(assay: &'static str, condition: impl Into<String>, r: &RunResult) -> Self {
        let snap = RunAdapter::new(r).snapshot();
        Self {
            assay,
            condition: condition.into(),
            regime: snap.regime.to_string(),
            proxy: snap.proxy,
            peak: snap.peak_deviation,
            counterfactual: snap.counterfactual,
        }
    }
}

#[derive(Debug, Clone)]
struct AssayReport {
    seed: u64,
    rows: Vec<Row>,
}

pub fn run(seed: u64) -> Result<(), ConfigError> {
    let mut rows = Vec::new();

    // === Reactive vs categorical control ===
    let reactive = RunConfig::new(vec![StreamParams::leaky(1.05, 1.0)], 100)
        .with_seed(seed)
        .with_perturbation(PerturbationEvent::offset_stream(50, 0, vec![5.0]));
    let governed = reactive.clone().with_stabilizer(StabilizerConfig::enabled());
    rows.push(Row::new("control", "reactive", &engine::run(&reactive)?));
    rows.push(Row::new("control", "stabilized", &engine::run(&governed)?));

    // === Binding regimes ===
    for (name, topology) in [
        ("fragmented", Topology::fragmented(3)),
        ("coherent", Topology::coherent_triad()),
        ("unstable", Topology::unstable_triad()),
    ] {
        let cfg = RunConfig::triad(topology).with_seed(seed);
        rows.push(Row::new("binding", name, &engine::run(&cfg)?));
    }
    let pair = RunConfig::new(vec![StreamParams::default(); 2], 100)
        .with_seed(seed)
        .with_perturbation(PerturbationEvent::offset_stream(50, 0, vec![5.0]));
    for (k, result) in sweep_binding(&pair, &[0.0, 0.25, 0.5, 1.0]) {
        rows.push(Row::new("binding", format!("mean-field k={k:.2}"), &result?));
    }

    // === Dark room ===
    let drift = EnvironmentConfig::new(EnvironmentKind::Drift {
        retention: 0.9,
        noise: 0.01,
        actuation_gain: 0.1,
    });
    let room = RunConfig::new(vec![StreamParams::default(); 2], 100)
        .with_seed(seed)
        .with_binding(BindingConfig::mean_field(0.5))
        .with_perturbation(PerturbationEvent::offset_stream(50, 0, vec![5.0]));
    for enabled in [false, true] {
        let cfg = room.clone().with_environment(drift.clone().with_actuation(enabled));
        let condition = if enabled { "drift, coupled" } else { "drift, dark room" };
        rows.push(Row::new("dark-room", condition, &engine::run(&cfg)?));
    }
    let reservoir = EnvironmentConfig::new(EnvironmentKind::Resource {
        capacity: 10.0,
        setpoint: 5.0,
        consumption: 0.05,
        noise: 0.01,
        actuation_gain: 0.5,
    })
    .with_gains(0.2, 1.0);
    for enabled in [false, true] {
        let cfg = room
            .clone()
            .with_environment(reservoir.clone().with_actuation(enabled))
            .with_stabilizer(StabilizerConfig::enabled());
        let condition = if enabled { "resource, foraging" } else { "resource, dark room" };
        rows.push(Row::new("dark-room", condition, &engine::run(&cfg)?));
    }

    // === Response complexity ===
    let mut still = StreamParams::leaky(0.5, 1.0).with_noise(0.0);
    still.sensitivity = 0.0;
    let frozen = RunConfig::new(vec![still], 100)
        .with_seed(seed)
        .with_perturbation(PerturbationEvent::offset_stream(50, 0, vec![5.0]));
    rows.push(Row::new("complexity", "inert stream", &engine::run(&frozen)?));
    rows.push(Row::new("complexity", "stabilized stream", &engine::run(&governed)?));

    tracing::info!(runs = rows.len(), "assays finished");
    print_report(&AssayReport { seed, rows });
    Ok(())
}

fn print_report(r: &AssayReport) {
    println!("streambind assays");
    println!("seed={}", r.seed);
    println!(
        "{:<11} {:<22} {:<34} {:>7} {:>8} {}",
        "assay", "condition", "regime", "proxy", "peak", "counterfactual"
    );
    for row in &r.rows {
        println!(
            "{:<11} {:<22} {:<34} {:>7.3} {:>8.3} {}",
            row.assay, row.condition, row.regime, row.proxy, row.peak, row.counterfactual
        );
    }
}
