use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result, anyhow, ensure};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::duel::{DuelOutcome, DuelState};
use crate::geometry::{DEFAULT_FORWARD, Frame};
use crate::host::{RosterId, Simulation};
use crate::interception::ArenaPolicy;
use crate::orchestrator::{DuelOrchestrator, RosterPick};
use crate::promotion::PromotionReconciler;
use crate::sandbox::{
    Ground, RosterElement, SandboxArena, SandboxRoster, Skirmish, SkirmishOdds, TierCostModel,
    WoundQuirk,
};
use crate::settings::{DuelSettings, FileFormat};
use crate::spawn::SpawnPlan;
use crate::troop::{CombatantTemplate, Side, TroopId};

const DEFAULT_TICK_SECS: f32 = 0.1;
const DEFAULT_EXCHANGE_SECS: f32 = 1.0;
const DEFAULT_TIME_LIMIT_SECS: f32 = 180.0;
/// Upper bound on simulated ticks per run, whatever the time limit says.
pub const MAX_TICKS: u32 = 1_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MarkerSpec {
    pub tag: String,
    pub position: Vec3,
    #[serde(default = "default_forward")]
    pub forward: Vec3,
}

fn default_forward() -> Vec3 {
    DEFAULT_FORWARD
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ArenaSpec {
    pub markers: Vec<MarkerSpec>,
    pub ground: Ground,
    /// Where the arena mission put the player; `null` means nobody was spawned.
    pub main_agent: Option<Vec3>,
}

impl Default for ArenaSpec {
    fn default() -> Self {
        Self {
            markers: Vec::new(),
            ground: Ground::default(),
            main_agent: Some(Vec3::ZERO),
        }
    }
}

impl ArenaSpec {
    pub fn build(&self) -> SandboxArena {
        let mut arena = SandboxArena::new(self.ground);
        for m in &self.markers {
            arena.add_marker(&m.tag, Frame::new(m.position, m.forward));
        }
        match self.main_agent {
            Some(p) => arena.with_main_agent(p),
            None => arena,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PickSpec {
    pub troop: TroopId,
    pub number: u32,
    #[serde(default)]
    pub wounded: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub settings: DuelSettings,
    #[serde(default)]
    pub arena: ArenaSpec,
    pub player: CombatantTemplate,
    /// Every template the roster or the picks refer to.
    #[serde(default)]
    pub troops: Vec<CombatantTemplate>,
    #[serde(default)]
    pub roster: Vec<RosterElement>,
    #[serde(default)]
    pub picks: Vec<PickSpec>,
    #[serde(default)]
    pub quirk: WoundQuirk,
    #[serde(default)]
    pub odds: SkirmishOdds,
    #[serde(default = "default_tick")]
    pub tick_secs: f32,
    #[serde(default = "default_exchange")]
    pub exchange_secs: f32,
    #[serde(default = "default_time_limit")]
    pub time_limit_secs: f32,
}

fn default_tick() -> f32 {
    DEFAULT_TICK_SECS
}

fn default_exchange() -> f32 {
    DEFAULT_EXCHANGE_SECS
}

fn default_time_limit() -> f32 {
    DEFAULT_TIME_LIMIT_SECS
}

impl Scenario {
    pub fn template(&self, id: &TroopId) -> Option<&CombatantTemplate> {
        self.troops.iter().find(|t| &t.id == id)
    }

    fn roster_picks(&self) -> Result<Vec<RosterPick>> {
        self.picks
            .iter()
            .map(|p| {
                let template = self
                    .template(&p.troop)
                    .cloned()
                    .ok_or_else(|| anyhow!("pick refers to unknown troop '{}'", p.troop))?;
                Ok(RosterPick {
                    template,
                    number: p.number,
                    wounded: p.wounded,
                })
            })
            .collect()
    }

    /// Number of ticks the time limit allows, capped at [`MAX_TICKS`].
    fn tick_budget(&self) -> Result<u32> {
        ensure!(
            self.tick_secs.is_finite() && self.tick_secs > 0.0,
            "tick_secs must be a positive number, got {}",
            self.tick_secs
        );
        ensure!(
            self.exchange_secs.is_finite() && self.exchange_secs > 0.0,
            "exchange_secs must be a positive number, got {}",
            self.exchange_secs
        );
        ensure!(
            self.time_limit_secs.is_finite() && self.time_limit_secs >= 0.0,
            "time_limit_secs must be a non-negative number, got {}",
            self.time_limit_secs
        );
        let ticks = (f64::from(self.time_limit_secs) / f64::from(self.tick_secs)).ceil();
        Ok(ticks.min(f64::from(MAX_TICKS)) as u32)
    }
}

/// Whole ticks covering `secs`, at least one.
fn ticks_for(secs: f32, tick: f32) -> u32 {
    let ticks = (f64::from(secs) / f64::from(tick)).ceil();
    ticks.clamp(1.0, f64::from(MAX_TICKS)) as u32
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let format = FileFormat::from_path(path)?;
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario: {}", path.display()))?;
    parse_scenario(&text, format)
        .with_context(|| format!("failed to parse scenario: {}", path.display()))
}

pub fn parse_scenario(text: &str, format: FileFormat) -> Result<Scenario> {
    format.parse(text)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ScenarioReport {
    pub name: String,
    pub seed: u64,
    /// False when the selection was refused and no duel ran.
    pub started: bool,
    pub outcome: DuelOutcome,
    pub final_state: DuelState,
    pub ticks: u32,
    pub elapsed_secs: f32,
    pub plan: Option<SpawnPlan>,
    pub defeated: Vec<TroopId>,
    pub promoted: Vec<TroopId>,
    pub roster_before: Vec<RosterElement>,
    pub roster_after: Vec<RosterElement>,
    pub pending_corrections: usize,
    pub messages: Vec<String>,
    pub banners: Vec<String>,
    pub menu: Option<String>,
    pub log: Vec<String>,
}

pub fn run_scenario(scenario: &Scenario) -> Result<ScenarioReport> {
    run_with_seed(scenario, scenario.seed)
}

/// Play one duel end to end in the sandbox: select, spawn, fight, grant promotion XP.
pub fn run_with_seed(scenario: &Scenario, seed: u64) -> Result<ScenarioReport> {
    let budget = scenario.tick_budget()?;
    let mut logs = Vec::new();
    let settings = scenario.settings.clone();
    let picks = scenario.roster_picks()?;

    let mut arena = scenario.arena.build();
    let reconciler = Arc::new(PromotionReconciler::new());
    let mut roster = SandboxRoster::new(RosterId(1), scenario.roster.clone())
        .with_upgrades(&scenario.troops)
        .with_quirk(scenario.quirk);
    roster.subscribe(reconciler.clone());
    let costs = TierCostModel::from_templates(&scenario.troops);
    let roster_before = roster.elements().to_vec();

    let mut orchestrator = DuelOrchestrator::new(settings.clone());
    let policy = ArenaPolicy::new(settings.markers.clone());

    let mut report = ScenarioReport {
        name: scenario.name.clone(),
        seed,
        started: false,
        outcome: DuelOutcome::Undecided,
        final_state: DuelState::AwaitingPlayerSpawn,
        ticks: 0,
        elapsed_secs: 0.0,
        plan: None,
        defeated: Vec::new(),
        promoted: Vec::new(),
        roster_before,
        roster_after: Vec::new(),
        pending_corrections: 0,
        messages: Vec::new(),
        banners: Vec::new(),
        menu: None,
        log: Vec::new(),
    };

    if !orchestrator.select(&picks, &mut arena) {
        logs.push(format!(
            "[SELECT] refused: {}",
            arena.messages.last().map(String::as_str).unwrap_or("")
        ));
        report.roster_after = roster.elements().to_vec();
        report.messages = arena.messages;
        report.log = logs;
        return Ok(report);
    }
    let Some(mut duel) = orchestrator.begin(scenario.player.clone()) else {
        return Err(anyhow!("selection accepted but no duel was built"));
    };
    report.started = true;

    if !policy.should_run_builtin_spawn(orchestrator.session()) {
        logs.push("[ARENA] built-in practice fight suppressed".to_string());
    }

    match duel.start(&mut arena) {
        Ok(()) => {
            if let Some(plan) = duel.plan() {
                logs.push(format!(
                    "[SPAWN] player from {:?}, enemies from {:?} ({} slots)",
                    plan.player_source(),
                    plan.enemy_source(),
                    plan.enemies().len()
                ));
            }
            for h in duel.combatants() {
                logs.push(format!("[SPAWN][{}] {} as {:?}", h.template.name, h.agent, h.side));
            }
        }
        Err(e) => logs.push(format!("[SPAWN] duel not started: {}", e)),
    }

    let mut skirmish = Skirmish::from_seed(seed, scenario.odds);
    let tick = scenario.tick_secs;
    let exchange_every = ticks_for(scenario.exchange_secs, tick);
    let linger = ticks_for(settings.victory_banner_ms as f32 / 1000.0, tick);
    let mut since_exchange = 0_u32;
    let mut since_victory = 0_u32;
    let mut last_state = duel.state();

    while report.ticks < budget {
        arena.advance();
        let state = duel.tick(tick, &mut arena);
        report.ticks += 1;
        let elapsed = report.ticks as f32 * tick;
        if state != last_state {
            logs.push(format!("[STATE] {:?} -> {:?} at {:.1}s", last_state, state, elapsed));
            last_state = state;
        }

        match state {
            DuelState::Ended => break,
            DuelState::VictoryPending => {
                // the player walks out once the banner is gone
                since_victory += 1;
                if since_victory >= linger {
                    logs.push("[END] player leaves the arena".to_string());
                    break;
                }
            }
            DuelState::Active => {
                since_exchange += 1;
                if since_exchange >= exchange_every {
                    since_exchange = 0;
                    for r in skirmish.exchange(&mut arena) {
                        let victim = arena.agent(r.affected).map(|a| a.name.clone());
                        logs.push(format!(
                            "[HIT][{}] falls to {}",
                            victim.unwrap_or_else(|| r.affected.to_string()),
                            r.affector.map(|a| a.to_string()).unwrap_or_default()
                        ));
                        duel.on_combatant_removed(r.affected, r.affector);
                    }
                }
            }
            DuelState::AwaitingPlayerSpawn | DuelState::PlayerDown => {}
        }
    }

    report.outcome = duel.outcome();
    report.final_state = duel.state();
    report.elapsed_secs = report.ticks as f32 * tick;
    report.plan = duel.plan().cloned();
    report.defeated = duel.defeated_troops().iter().map(|t| t.id.clone()).collect();

    report.promoted = orchestrator.conclude(&duel, &mut roster, &reconciler, &costs, &mut arena);
    roster.settle();
    for id in &report.promoted {
        logs.push(format!("[PROMO][{}] ready for promotion", id));
    }
    report.pending_corrections = reconciler.pending();
    report.roster_after = roster.elements().to_vec();

    let standing = arena.active_on(Side::Enemy).len();
    logs.push(format!(
        "[END] outcome={:?} defeated={} promoted={} enemies_standing={} player_active={}",
        report.outcome,
        report.defeated.len(),
        report.promoted.len(),
        standing,
        arena.main_agent().is_some_and(|a| arena.is_active(a))
    ));
    info!(scenario = %scenario.name, seed, outcome = ?report.outcome, "scenario finished");

    report.messages = arena.messages;
    report.banners = arena.banners.into_iter().map(|(text, _)| text).collect();
    report.menu = arena.menu;
    report.log = logs;
    Ok(report)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchStats {
    pub runs: u32,
    pub victories: u32,
    pub defeats: u32,
    pub undecided: u32,
    pub mean_defeated: f64,
    pub mean_promoted: f64,
    pub mean_secs: f64,
    /// Corrections still pending after a run settled; anything but zero is a leak.
    pub leftover_corrections: usize,
}

/// Run the scenario `runs` times with seeds `seed, seed + 1, ...`.
pub fn simulate_many(scenario: &Scenario, runs: u32) -> Result<BatchStats> {
    let mut stats = BatchStats {
        runs,
        ..BatchStats::default()
    };
    if runs == 0 {
        return Ok(stats);
    }
    let (mut defeated, mut promoted, mut secs) = (0usize, 0usize, 0f64);
    for i in 0..runs {
        let report = run_with_seed(scenario, scenario.seed.wrapping_add(u64::from(i)))?;
        match report.outcome {
            DuelOutcome::Victory => stats.victories += 1,
            DuelOutcome::Defeat => stats.defeats += 1,
            DuelOutcome::Undecided => stats.undecided += 1,
        }
        defeated += report.defeated.len();
        promoted += report.promoted.len();
        secs += f64::from(report.elapsed_secs);
        stats.leftover_corrections += report.pending_corrections;
    }
    let n = f64::from(runs);
    stats.mean_defeated = defeated as f64 / n;
    stats.mean_promoted = promoted as f64 / n;
    stats.mean_secs = secs / n;
    Ok(stats)
}
