//! Spawn resolution: scene markers in, concrete placements out.
//!
//! Markers are optional and frequently missing in community scenes, so every lookup has a
//! fallback and the result always holds one player slot and at least one enemy slot.

use std::f32::consts::{PI, TAU};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::geometry::{self, DEFAULT_FORWARD, Frame};
use crate::host::SceneQuery;
use crate::settings::MarkerTags;

/// Generic markers closer than this to the player slot are not offered to enemies.
pub const PLAYER_CLEARANCE: f32 = 0.1;

pub const DEFAULT_FALLBACK_RADIUS: f32 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackLayout {
    /// Evenly around the player, first slot straight ahead.
    Circle,
    /// Across the half-plane the player faces.
    #[default]
    Semicircle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnSource {
    PlayerMarker,
    EnemyMarkers,
    GenericMarkers,
    MainAgentPosition,
    WorldOrigin,
    Synthesized,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnSlot {
    pub position: Vec3,
    pub forward: Vec3,
}

impl SpawnSlot {
    fn from_frame(frame: Frame) -> Self {
        Self {
            position: frame.origin,
            forward: frame.forward,
        }
    }

    /// Same position, turned toward `target`.
    pub fn facing(&self, target: Vec3) -> SpawnSlot {
        SpawnSlot {
            position: self.position,
            forward: geometry::look_direction(self.position, target),
        }
    }
}

/// Marker transforms as read from the scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerSet {
    pub player: Option<Frame>,
    pub enemies: Vec<Frame>,
    pub generic: Vec<Frame>,
}

impl MarkerSet {
    pub fn from_scene<S: SceneQuery + ?Sized>(scene: &S, tags: &MarkerTags) -> Self {
        Self {
            player: scene.find_marker(&tags.player),
            enemies: scene.find_markers(&tags.opponent),
            generic: scene.find_markers(&tags.generic),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpawnPlan {
    player: SpawnSlot,
    enemies: Vec<SpawnSlot>,
    player_source: SpawnSource,
    enemy_source: SpawnSource,
}

impl SpawnPlan {
    pub fn player(&self) -> &SpawnSlot {
        &self.player
    }

    pub fn enemies(&self) -> &[SpawnSlot] {
        &self.enemies
    }

    pub fn player_source(&self) -> SpawnSource {
        self.player_source
    }

    pub fn enemy_source(&self) -> SpawnSource {
        self.enemy_source
    }

    /// Slot for the `troop_index`-th troop; slots are reused cyclically.
    pub fn enemy_slot(&self, troop_index: usize) -> &SpawnSlot {
        &self.enemies[troop_index % self.enemies.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnResolver {
    pub layout: FallbackLayout,
    pub radius: f32,
}

impl Default for SpawnResolver {
    fn default() -> Self {
        Self {
            layout: FallbackLayout::default(),
            radius: DEFAULT_FALLBACK_RADIUS,
        }
    }
}

impl SpawnResolver {
    pub fn new(layout: FallbackLayout, radius: f32) -> Self {
        Self { layout, radius }
    }

    /// `fallback_origin` is where the simulation currently has the player, if anywhere.
    pub fn resolve(
        &self,
        markers: &MarkerSet,
        fallback_origin: Option<Vec3>,
        troop_count: usize,
        ground: impl Fn(Vec3) -> f32,
    ) -> SpawnPlan {
        let (player, player_source) = resolve_player(markers, fallback_origin, &ground);
        let (enemies, enemy_source) = self.resolve_enemies(markers, &player, troop_count, &ground);
        SpawnPlan {
            player,
            enemies,
            player_source,
            enemy_source,
        }
    }

    fn resolve_enemies(
        &self,
        markers: &MarkerSet,
        player: &SpawnSlot,
        troop_count: usize,
        ground: &impl Fn(Vec3) -> f32,
    ) -> (Vec<SpawnSlot>, SpawnSource) {
        if !markers.enemies.is_empty() {
            let slots = markers
                .enemies
                .iter()
                .map(|f| clean(*f, ground))
                .collect();
            return (slots, SpawnSource::EnemyMarkers);
        }

        // Compared after grounding: the player slot is grounded too, raw marker heights are not.
        let generic: Vec<SpawnSlot> = markers
            .generic
            .iter()
            .map(|f| clean(*f, ground))
            .filter(|s| !geometry::nearly_equal(s.position, player.position, PLAYER_CLEARANCE))
            .collect();
        if !generic.is_empty() {
            return (generic, SpawnSource::GenericMarkers);
        }

        let count = troop_count.max(1);
        let (span, inset) = match self.layout {
            FallbackLayout::Circle => (TAU, false),
            FallbackLayout::Semicircle => (PI, true),
        };
        let slots = ring(player, player.forward, count, self.radius, span, inset, ground);
        (slots, SpawnSource::Synthesized)
    }

    /// Companion slots on a small arc behind the player, each facing the player.
    pub fn ally_slots(
        &self,
        player: &SpawnSlot,
        count: usize,
        radius: f32,
        ground: impl Fn(Vec3) -> f32,
    ) -> Vec<SpawnSlot> {
        if count == 0 {
            return Vec::new();
        }
        ring(player, -player.forward, count, radius, PI, true, &ground)
    }
}

fn resolve_player(
    markers: &MarkerSet,
    fallback_origin: Option<Vec3>,
    ground: &impl Fn(Vec3) -> f32,
) -> (SpawnSlot, SpawnSource) {
    if let Some(frame) = markers.player {
        return (clean(frame, ground), SpawnSource::PlayerMarker);
    }
    if let Some(frame) = markers.generic.first() {
        return (clean(*frame, ground), SpawnSource::GenericMarkers);
    }
    let (origin, source) = match fallback_origin {
        Some(p) => (p, SpawnSource::MainAgentPosition),
        None => (Vec3::ZERO, SpawnSource::WorldOrigin),
    };
    let slot = SpawnSlot {
        position: geometry::ground_clamp(origin, ground),
        forward: DEFAULT_FORWARD,
    };
    (slot, source)
}

fn clean(frame: Frame, ground: &impl Fn(Vec3) -> f32) -> SpawnSlot {
    SpawnSlot::from_frame(frame.orthonormalized().grounded(ground))
}

/// `count` points on an arc of `span` radians centred on `heading`.
///
/// A closed ring (`inset == false`) starts straight ahead; an open arc keeps its end points
/// off the arc's edges so nobody spawns exactly beside the centre.
fn ring(
    center: &SpawnSlot,
    heading: Vec3,
    count: usize,
    radius: f32,
    span: f32,
    inset: bool,
    ground: &impl Fn(Vec3) -> f32,
) -> Vec<SpawnSlot> {
    let base = heading.y.atan2(heading.x);
    (0..count)
        .map(|i| {
            let angle = if inset {
                let step = span / (count + 1) as f32;
                base - span / 2.0 + step * (i + 1) as f32
            } else {
                base + span / count as f32 * i as f32
            };
            let offset = Vec3::new(radius * angle.cos(), radius * angle.sin(), 0.0);
            let position = geometry::ground_clamp(center.position + offset, ground);
            SpawnSlot {
                position,
                forward: geometry::look_direction(position, center.position),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(_: Vec3) -> f32 {
        0.0
    }

    #[test]
    fn semicircle_sits_in_front_of_the_player() {
        let player = SpawnSlot {
            position: Vec3::ZERO,
            forward: Vec3::Y,
        };
        let slots = ring(&player, player.forward, 3, 7.0, PI, true, &flat);
        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|s| s.position.y > 0.0));
        // middle slot straight ahead
        assert!((slots[1].position - Vec3::new(0.0, 7.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn closed_ring_starts_ahead() {
        let player = SpawnSlot {
            position: Vec3::new(1.0, 1.0, 0.0),
            forward: Vec3::X,
        };
        let slots = ring(&player, player.forward, 4, 2.0, TAU, false, &flat);
        assert!((slots[0].position - Vec3::new(3.0, 1.0, 0.0)).length() < 1e-4);
        assert!((slots[2].position - Vec3::new(-1.0, 1.0, 0.0)).length() < 1e-4);
    }
}
