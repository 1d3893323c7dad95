use std::{fs, path::Path, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use duel_engine::scenario::{Scenario, parse_scenario, run_with_seed};
use duel_engine::settings::FileFormat;
use duel_engine::{DuelSettings, MarkerSet, SpawnResolver};
use encoding_rs::Encoding;
use serde::Serialize;

#[derive(Subcommand)]
enum Cmd {
    /// Play a scenario end to end and print what happened
    Run {
        /// Scenario file (.yaml / .yml / .json)
        #[arg(long)]
        scenario: PathBuf,
        /// Override the scenario's seed
        #[arg(long)]
        seed: Option<u64>,
        /// Print the full report as JSON instead of the log
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Resolve spawn slots for a scenario's arena without fighting
    Plan {
        #[arg(long)]
        scenario: PathBuf,
        /// Number of enemy troops to place (defaults to the scenario's picks)
        #[arg(long)]
        troops: Option<usize>,
    },
    /// Show the effective settings, creating the file with defaults if it is missing
    Settings {
        #[arg(long)]
        path: PathBuf,
    },
}

#[derive(Parser)]
#[command(name = "duel-cli")]
#[command(about = "Arena training duel harness")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Serialize)]
struct SlotView {
    position: [f32; 3],
    forward: [f32; 3],
}

#[derive(Serialize)]
struct PlanView {
    player_source: String,
    enemy_source: String,
    player: SlotView,
    enemies: Vec<SlotView>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Run {
            scenario,
            seed,
            json,
        } => {
            let sc = read_scenario(&scenario)?;
            let report = run_with_seed(&sc, seed.unwrap_or(sc.seed))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for line in &report.log {
                    println!("{}", line);
                }
                for msg in &report.messages {
                    println!("[MSG] {}", msg);
                }
            }
        }
        Cmd::Plan { scenario, troops } => {
            let sc = read_scenario(&scenario)?;
            let count = troops.unwrap_or_else(|| sc.picks.iter().map(|p| p.number as usize).sum());
            let arena = sc.arena.build();
            let markers = MarkerSet::from_scene(&arena, &sc.settings.markers);
            let resolver =
                SpawnResolver::new(sc.settings.fallback_layout, sc.settings.fallback_radius);
            let plan = resolver.resolve(&markers, sc.arena.main_agent, count, |p| {
                sc.arena.ground.height_at(p)
            });
            let view = PlanView {
                player_source: format!("{:?}", plan.player_source()),
                enemy_source: format!("{:?}", plan.enemy_source()),
                player: SlotView {
                    position: plan.player().position.to_array(),
                    forward: plan.player().forward.to_array(),
                },
                enemies: plan
                    .enemies()
                    .iter()
                    .map(|s| SlotView {
                        position: s.position.to_array(),
                        forward: s.forward.to_array(),
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Cmd::Settings { path } => {
            let settings = DuelSettings::load_or_create(&path);
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }
    Ok(())
}

fn read_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let format = FileFormat::from_path(path)?;
    let text = read_text_auto(path)
        .with_context(|| format!("failed to read scenario: {}", path.display()))?;
    parse_scenario(&text, format)
        .with_context(|| format!("failed to parse scenario: {}", path.display()))
}

fn read_text_auto(path: &Path) -> anyhow::Result<String> {
    let bytes = fs::read(path)?;
    if let Some((enc, bom_len)) = Encoding::for_bom(&bytes) {
        let (cow, _, _) = enc.decode(&bytes[bom_len..]);
        Ok(cow.into_owned())
    } else {
        Ok(String::from_utf8(bytes)?)
    }
}
