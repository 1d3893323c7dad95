use clap::Parser;
use duel_engine::scenario::{Scenario, parse_scenario, simulate_many};
use duel_engine::settings::FileFormat;
use encoding_rs::Encoding;
use std::{fs, path::PathBuf};

#[derive(Parser)]
#[command(name = "simulate-duels")]
#[command(about = "Monte Carlo sim: many training duels from one scenario")]
struct Args {
    /// Scenario file (.yaml / .yml / .json)
    #[arg(long)]
    scenario: PathBuf,

    /// Number of duels
    #[arg(long, default_value_t = 200)]
    trials: u32,

    /// RNG base seed (trial i uses seed+i); defaults to the scenario's
    #[arg(long)]
    seed: Option<u64>,

    /// Print the stats as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn read_text_auto(path: &std::path::Path) -> anyhow::Result<String> {
    let bytes = fs::read(path)?;
    if let Some((enc, bom_len)) = Encoding::for_bom(&bytes) {
        let (cow, _, _) = enc.decode(&bytes[bom_len..]);
        Ok(cow.into_owned())
    } else {
        Ok(String::from_utf8(bytes)?)
    }
}

fn read_scenario_auto(path: &std::path::Path) -> anyhow::Result<Scenario> {
    let text = read_text_auto(path)?;
    parse_scenario(&text, FileFormat::from_path(path)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut scenario = read_scenario_auto(&args.scenario)?;
    if let Some(seed) = args.seed {
        scenario.seed = seed;
    }
    let stats = simulate_many(&scenario, args.trials)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let rate = |n: u32| {
        if stats.runs == 0 {
            0.0
        } else {
            n as f64 / stats.runs as f64 * 100.0
        }
    };
    println!("simulate-duels results");
    println!("----------------------");
    println!("scenario:           {}", scenario.name);
    println!("trials:             {}", stats.runs);
    println!("base seed:          {}", scenario.seed);
    println!();
    println!("victory rate:       {:.1}%", rate(stats.victories));
    println!("defeat rate:        {:.1}%", rate(stats.defeats));
    println!("unfinished:         {}", stats.undecided);
    println!("avg defeated:       {:.2}", stats.mean_defeated);
    println!("avg promoted:       {:.2}", stats.mean_promoted);
    println!("avg duel length:    {:.1}s", stats.mean_secs);
    println!("leftover fixes:     {}", stats.leftover_corrections);
    Ok(())
}
