#[path = "experiments/assays.rs"]
mod assays;

use streambind::batch::sweep_binding;
use streambind::config::RunConfig;
use streambind::engine;
use streambind::observer::RunAdapter;

const SWEEP: [f64; 6] = [0.0, 0.25, 0.5, 1.0, 1.5, 2.0];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" || args[1] == "help" {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "assays" => {
            let seed = match args.get(2) {
                Some(s) => s.parse()?,
                None => 7,
            };
            assays::run(seed)?;
        }
        "run" => {
            let cfg = load(args.get(2))?;
            let result = engine::run(&cfg)?;
            if args.iter().any(|a| a == "--json") {
                println!("{}", result.to_json_string()?);
            } else {
                let snap = RunAdapter::new(&result).snapshot();
                println!("regime={}", snap.regime);
                println!("ticks={}", snap.ticks);
                println!("proxy={:.4}", snap.proxy);
                println!("label_proxy={:?}", snap.label_proxy);
                println!("compressed_bytes={}", snap.compressed_bytes);
                println!("peak_deviation={:.4}", snap.peak_deviation);
                println!("settle_tick={:?}", snap.settle_tick);
                println!("counterfactual={}", snap.counterfactual);
            }
        }
        "sweep" => {
            let cfg = load(args.get(2))?;
            for (k, result) in sweep_binding(&cfg, &SWEEP) {
                match result {
                    Ok(r) => println!("k={k:.2} regime={} proxy={:.4}", r.regime(), r.complexity_proxy()),
                    Err(e) => println!("k={k:.2} error={e}"),
                }
            }
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(2);
        }
    }
    Ok(())
}

fn load(path: Option<&String>) -> Result<RunConfig, Box<dyn std::error::Error>> {
    let path = path.ok_or("missing <config.json>")?;
    let text = std::fs::read_to_string(path)?;
    tracing::info!("Loaded run config from {}", path);
    Ok(RunConfig::from_json_str(&text)?)
}

fn print_help() {
    println!("streambind (multi-stream binding testbed)");
    println!("usage:");
    println!("  cargo run -- assays [seed]");
    println!("  cargo run -- run <config.json> [--json]");
    println!("  cargo run -- sweep <config.json>");
    println!("  cargo run -- --help");
}
