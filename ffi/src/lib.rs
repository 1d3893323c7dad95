use std::ffi::{CStr, CString, c_char};

use duel_engine::geometry::Frame;
use duel_engine::sandbox::Ground;
use duel_engine::scenario::{Scenario, run_with_seed, simulate_many};
use duel_engine::{
    CombatantTemplate, FallbackLayout, MarkerSet, RosterPick, SpawnResolver, validate_selection,
};
use serde::Deserialize;
use serde_json::json;

const VERSION: &str = concat!("duel-ffi ", env!("CARGO_PKG_VERSION"));

/// Largest troop count a spawn request may ask slots for.
pub const MAX_TROOP_COUNT: usize = 1024;
/// Largest batch a single simulate call may run.
pub const MAX_SAMPLES: u32 = 10_000;

fn ok(value: serde_json::Value) -> String {
    json!({ "ok": true, "result": value }).to_string()
}

fn err(e: impl std::fmt::Display) -> String {
    json!({ "ok": false, "error": e.to_string() }).to_string()
}

fn to_c(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(c) => c.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// # Safety
/// `input` must be null or a valid NUL-terminated string.
unsafe fn from_c(input: *const c_char) -> Result<String, String> {
    if input.is_null() {
        return Err(err("null input"));
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    let raw = unsafe { CStr::from_ptr(input) };
    raw.to_str()
        .map(str::to_owned)
        .map_err(|e| err(format!("invalid_utf8: {}", e)))
}

macro_rules! json_entry {
    ($name:ident, $internal:ident) => {
        /// Takes a JSON request, returns a `{"ok": ...}` envelope owned by the caller.
        /// Free it with `duel_string_free`.
        ///
        /// # Safety
        /// `input` must be null or a valid NUL-terminated string.
        #[no_mangle]
        pub unsafe extern "C" fn $name(input: *const c_char) -> *mut c_char {
            let out = match unsafe { from_c(input) } {
                Ok(text) => $internal(&text),
                Err(e) => e,
            };
            to_c(out)
        }
    };
}

#[no_mangle]
pub extern "C" fn duel_version() -> *mut c_char {
    to_c(VERSION.to_string())
}

/// # Safety
/// `s` must be null or a pointer previously returned by this library, freed at most once.
#[no_mangle]
pub unsafe extern "C" fn duel_string_free(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    // SAFETY: produced by `CString::into_raw` in `to_c`.
    drop(unsafe { CString::from_raw(s) });
}

json_entry!(duel_run_scenario_json, run_scenario_internal);
json_entry!(duel_simulate_many_json, simulate_many_internal);
json_entry!(duel_resolve_spawns_json, resolve_spawns_internal);
json_entry!(duel_validate_selection_json, validate_selection_internal);

// Internal functions for testing without the C boundary

/// A scenario, optionally with a `"seed"` override already inside it.
pub fn run_scenario_internal(input: &str) -> String {
    let scenario: Scenario = match serde_json::from_str(input) {
        Ok(s) => s,
        Err(e) => return err(format!("invalid_scenario: {}", e)),
    };
    match run_with_seed(&scenario, scenario.seed) {
        Ok(report) => match serde_json::to_value(report) {
            Ok(v) => ok(v),
            Err(e) => err(e),
        },
        Err(e) => err(format!("{:#}", e)),
    }
}

/// A scenario plus a top-level `"samples"` count (default 100).
pub fn simulate_many_internal(input: &str) -> String {
    let mut root: serde_json::Value = match serde_json::from_str(input) {
        Ok(v) => v,
        Err(e) => return err(format!("invalid_scenario: {}", e)),
    };
    let samples = match root.get("samples") {
        None => 100,
        Some(v) => match v.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) if n <= MAX_SAMPLES => n,
            _ => return err(format!("invalid_samples: expected 0..={}, got {}", MAX_SAMPLES, v)),
        },
    };
    if let Some(obj) = root.as_object_mut() {
        obj.remove("samples");
    }
    let scenario: Scenario = match serde_json::from_value(root) {
        Ok(s) => s,
        Err(e) => return err(format!("invalid_scenario: {}", e)),
    };
    match simulate_many(&scenario, samples) {
        Ok(stats) => match serde_json::to_value(stats) {
            Ok(v) => ok(v),
            Err(e) => err(e),
        },
        Err(e) => err(format!("{:#}", e)),
    }
}

#[derive(Debug, Deserialize)]
struct SpawnRequestJson {
    #[serde(default)]
    player: Option<Frame>,
    #[serde(default)]
    enemies: Vec<Frame>,
    #[serde(default)]
    generic: Vec<Frame>,
    #[serde(default)]
    fallback_origin: Option<[f32; 3]>,
    troop_count: usize,
    #[serde(default)]
    layout: FallbackLayout,
    #[serde(default)]
    radius: Option<f32>,
    #[serde(default)]
    ground: Ground,
}

pub fn resolve_spawns_internal(input: &str) -> String {
    let req: SpawnRequestJson = match serde_json::from_str(input) {
        Ok(r) => r,
        Err(e) => return err(format!("invalid_request: {}", e)),
    };
    if req.troop_count > MAX_TROOP_COUNT {
        return err(format!(
            "invalid_request: troop_count {} exceeds {}",
            req.troop_count, MAX_TROOP_COUNT
        ));
    }
    let markers = MarkerSet {
        player: req.player,
        enemies: req.enemies,
        generic: req.generic,
    };
    let mut resolver = SpawnResolver::default();
    resolver.layout = req.layout;
    if let Some(r) = req.radius {
        resolver.radius = r;
    }
    let ground = req.ground;
    let plan = resolver.resolve(
        &markers,
        req.fallback_origin.map(Into::into),
        req.troop_count,
        |p| ground.height_at(p),
    );
    let slots: Vec<_> = (0..req.troop_count).map(|i| *plan.enemy_slot(i)).collect();
    ok(json!({
        "plan": plan,
        "assignments": slots,
    }))
}

#[derive(Debug, Deserialize)]
struct PickJson {
    template: CombatantTemplate,
    number: u32,
    #[serde(default)]
    wounded: u32,
}

#[derive(Debug, Deserialize)]
struct SelectionRequestJson {
    picks: Vec<PickJson>,
    #[serde(default = "default_max")]
    max: usize,
}

fn default_max() -> usize {
    duel_engine::settings::DEFAULT_MAX_TRAINING_TROOPS
}

pub fn validate_selection_internal(input: &str) -> String {
    let req: SelectionRequestJson = match serde_json::from_str(input) {
        Ok(r) => r,
        Err(e) => return err(format!("invalid_request: {}", e)),
    };
    let picks: Vec<RosterPick> = req
        .picks
        .into_iter()
        .map(|p| RosterPick {
            template: p.template,
            number: p.number,
            wounded: p.wounded,
        })
        .collect();
    match validate_selection(&picks, req.max) {
        Ok(sel) => {
            let ids = |list: &[CombatantTemplate]| -> Vec<String> {
                list.iter().map(|t| t.id.to_string()).collect()
            };
            ok(json!({
                "troops": ids(&sel.troops),
                "companions": ids(&sel.companions),
            }))
        }
        Err(e) => err(e),
    }
}
