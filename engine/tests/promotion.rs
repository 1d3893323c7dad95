use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use duel_engine::sandbox::{RosterElement, SandboxRoster, TierCostModel, UPGRADE_XP_BY_TIER, WoundQuirk};
use duel_engine::{
    CombatantTemplate, CountsChange, CountsMutation, Expectation, PromotionReconciler,
    RosterError, RosterId, TroopId, TroopRoster, UpgradeCostModel,
};

const ROSTER: RosterId = RosterId(7);

fn recruit() -> CombatantTemplate {
    CombatantTemplate::new("imperial_recruit", "Imperial Recruit")
        .with_tier(1)
        .with_upgrade("imperial_infantryman")
        .with_upgrade("imperial_archer")
}

fn looter() -> CombatantTemplate {
    CombatantTemplate::new("looter", "Looter").with_tier(0).with_upgrade("mountain_bandit")
}

fn veteran() -> CombatantTemplate {
    CombatantTemplate::new("legionary", "Legionary").with_tier(6)
}

fn el(troop: &str, number: i32, wounded: i32, xp: i32) -> RosterElement {
    RosterElement {
        troop: TroopId::from(troop),
        number,
        wounded,
        xp,
    }
}

fn catalog() -> Vec<CombatantTemplate> {
    vec![recruit(), looter(), veteran()]
}

fn roster(elements: Vec<RosterElement>, quirk: WoundQuirk) -> (SandboxRoster, Arc<PromotionReconciler>) {
    let reconciler = Arc::new(PromotionReconciler::new());
    let mut roster = SandboxRoster::new(ROSTER, elements)
        .with_upgrades(&catalog())
        .with_quirk(quirk);
    roster.subscribe(reconciler.clone());
    (roster, reconciler)
}

fn costs() -> TierCostModel {
    TierCostModel::from_templates(&catalog())
}

fn recruit_cost() -> i32 {
    UPGRADE_XP_BY_TIER[1]
}

fn expectation(xp: i32) -> Expectation {
    Expectation {
        roster: ROSTER,
        upgrade_target: TroopId::from("imperial_infantryman"),
        source: TroopId::from("imperial_recruit"),
        expected_xp: xp,
    }
}

fn target_added(index: usize) -> CountsChange {
    CountsChange {
        troop: TroopId::from("imperial_infantryman"),
        count: 1,
        wounded: 1,
        xp: recruit_cost(),
        outcome: Ok(index),
    }
}

#[test]
fn wounded_only_stack_is_refused() {
    let (mut roster, reconciler) = roster(vec![el("imperial_recruit", 2, 2, 0)], WoundQuirk::Immediate);
    let before = roster.elements().to_vec();

    assert!(!reconciler.grant_upgrade_xp(&mut roster, &recruit(), &costs()));
    assert_eq!(roster.elements(), before.as_slice());
    assert_eq!(reconciler.pending(), 0);
}

#[test]
fn missing_troop_or_upgrade_path_is_refused() {
    let (mut roster, reconciler) = roster(
        vec![el("imperial_recruit", 2, 0, 0), el("legionary", 4, 0, 0)],
        WoundQuirk::Immediate,
    );
    let before = roster.elements().to_vec();

    assert!(!reconciler.grant_upgrade_xp(&mut roster, &looter(), &costs()));
    assert!(!reconciler.grant_upgrade_xp(&mut roster, &veteran(), &costs()));
    assert_eq!(roster.elements(), before.as_slice());
}

#[test]
fn free_upgrade_is_refused() {
    struct Free;
    impl UpgradeCostModel for Free {
        fn xp_cost(&self, _: RosterId, _: &TroopId, _: &TroopId) -> i32 {
            0
        }
    }
    let (mut roster, reconciler) = roster(vec![el("imperial_recruit", 2, 0, 0)], WoundQuirk::Immediate);
    assert!(!reconciler.grant_upgrade_xp(&mut roster, &recruit(), &Free));
    assert_eq!(roster.elements(), &[el("imperial_recruit", 2, 0, 0)]);
}

#[test]
fn grant_and_correction_net_out() {
    let (mut roster, reconciler) = roster(
        vec![el("looter", 4, 1, 0), el("imperial_recruit", 3, 0, 0)],
        WoundQuirk::Immediate,
    );

    assert!(reconciler.grant_upgrade_xp(&mut roster, &recruit(), &costs()));

    let recruit_id = TroopId::from("imperial_recruit");
    assert_eq!(roster.headcount(&recruit_id), 3);
    assert_eq!(roster.wounded_count(&recruit_id), 0);
    assert_eq!(roster.headcount(&TroopId::from("imperial_infantryman")), 0);
    assert_eq!(
        roster.elements(),
        &[el("looter", 4, 1, 0), el("imperial_recruit", 3, 0, recruit_cost())]
    );
    assert_eq!(reconciler.pending(), 0);
}

#[test]
fn grant_records_one_expectation_until_the_roster_reports() {
    let (mut roster, reconciler) = roster(vec![el("imperial_recruit", 3, 0, 0)], WoundQuirk::Deferred);

    assert!(reconciler.grant_upgrade_xp(&mut roster, &recruit(), &costs()));
    assert_eq!(reconciler.ledger().snapshot(), vec![expectation(recruit_cost())]);
    assert!(roster.has_deferred());

    roster.settle();
    assert_eq!(reconciler.pending(), 0);
    assert_eq!(roster.elements(), &[el("imperial_recruit", 3, 0, recruit_cost())]);
}

#[test]
fn second_grant_waits_for_the_first_correction() {
    let (mut roster, reconciler) = roster(vec![el("imperial_recruit", 3, 0, 0)], WoundQuirk::Deferred);
    assert!(reconciler.grant_upgrade_xp(&mut roster, &recruit(), &costs()));
    let after_first = roster.elements().to_vec();

    assert!(!reconciler.grant_upgrade_xp(&mut roster, &recruit(), &costs()));
    assert_eq!(roster.elements(), after_first.as_slice());
    assert_eq!(reconciler.pending(), 1);
}

#[test]
fn consecutive_grants_are_each_corrected() {
    let (mut roster, reconciler) = roster(
        vec![el("imperial_recruit", 2, 0, 0), el("looter", 5, 0, 0)],
        WoundQuirk::Immediate,
    );
    assert!(reconciler.grant_upgrade_xp(&mut roster, &recruit(), &costs()));
    assert!(reconciler.grant_upgrade_xp(&mut roster, &looter(), &costs()));
    assert!(reconciler.grant_upgrade_xp(&mut roster, &recruit(), &costs()));

    assert_eq!(
        roster.elements(),
        &[
            el("imperial_recruit", 2, 0, 2 * recruit_cost()),
            el("looter", 5, 0, UPGRADE_XP_BY_TIER[0]),
        ]
    );
    assert_eq!(reconciler.pending(), 0);
}

#[test]
fn exact_xp_match_wins_over_a_stray() {
    let reconciler = PromotionReconciler::new();
    let mut roster = SandboxRoster::new(
        ROSTER,
        vec![
            el("imperial_recruit", 3, 0, 0),
            el("imperial_recruit", 1, 1, 75),
            el("imperial_recruit", 1, 1, recruit_cost()),
            el("imperial_infantryman", 1, 1, 0),
        ],
    );
    reconciler.ledger().expect(expectation(recruit_cost())).unwrap();

    reconciler.on_counts_changed(&mut roster, &target_added(3));
    assert_eq!(
        roster.elements(),
        &[el("imperial_recruit", 3, 0, 0), el("imperial_recruit", 1, 1, 75)]
    );
}

#[test]
fn stray_wounded_copy_is_removed_when_no_exact_match() {
    let reconciler = PromotionReconciler::new();
    let mut roster = SandboxRoster::new(
        ROSTER,
        vec![
            el("imperial_recruit", 3, 0, 0),
            el("imperial_recruit", 1, 1, 75),
            el("imperial_infantryman", 2, 1, 0),
        ],
    );
    reconciler.ledger().expect(expectation(recruit_cost())).unwrap();

    reconciler.on_counts_changed(&mut roster, &target_added(2));
    assert_eq!(
        roster.elements(),
        &[el("imperial_recruit", 3, 0, 0), el("imperial_infantryman", 1, 0, 0)]
    );
}

#[test]
fn unrelated_or_failed_mutations_leave_the_ledger_alone() {
    let reconciler = PromotionReconciler::new();
    let mut roster = SandboxRoster::new(ROSTER, vec![el("imperial_infantryman", 1, 1, 0)]);
    reconciler.ledger().expect(expectation(recruit_cost())).unwrap();

    let mut failed = target_added(0);
    failed.outcome = Err(RosterError::UnknownTroop(TroopId::from("imperial_infantryman")));
    reconciler.on_counts_changed(&mut roster, &failed);

    let mut other = target_added(0);
    other.troop = TroopId::from("looter");
    reconciler.on_counts_changed(&mut roster, &other);

    let mut elsewhere = SandboxRoster::new(RosterId(99), vec![el("imperial_infantryman", 1, 1, 0)]);
    reconciler.on_counts_changed(&mut elsewhere, &target_added(0));

    assert_eq!(reconciler.pending(), 1);
    assert_eq!(roster.elements(), &[el("imperial_infantryman", 1, 1, 0)]);
    assert_eq!(elsewhere.elements(), &[el("imperial_infantryman", 1, 1, 0)]);
}

/// Roster whose XP column cannot be read.
struct UnreadableXp(SandboxRoster);

impl TroopRoster for UnreadableXp {
    fn id(&self) -> RosterId {
        self.0.id()
    }
    fn len(&self) -> usize {
        self.0.len()
    }
    fn troop_at(&self, index: usize) -> Result<TroopId, RosterError> {
        self.0.troop_at(index)
    }
    fn number_at(&self, index: usize) -> Result<i32, RosterError> {
        self.0.number_at(index)
    }
    fn wounded_at(&self, index: usize) -> Result<i32, RosterError> {
        self.0.wounded_at(index)
    }
    fn xp_at(&self, index: usize) -> Result<i32, RosterError> {
        Err(RosterError::IndexOutOfRange { index, len: 0 })
    }
    fn add_to_counts(&mut self, mutation: CountsMutation) -> Result<usize, RosterError> {
        self.0.add_to_counts(mutation)
    }
    fn add_to_counts_at_index(&mut self, index: usize, count: i32, wounded: i32) -> Result<(), RosterError> {
        self.0.add_to_counts_at_index(index, count, wounded)
    }
    fn add_xp_to_troop(&mut self, troop: &TroopId, xp: i32) -> Result<(), RosterError> {
        self.0.add_xp_to_troop(troop, xp)
    }
}

#[test]
fn a_failed_correction_drops_every_pending_expectation() {
    let reconciler = PromotionReconciler::new();
    let mut roster = UnreadableXp(SandboxRoster::new(
        ROSTER,
        vec![el("imperial_recruit", 2, 1, 0), el("imperial_infantryman", 1, 1, 0)],
    ));
    reconciler.ledger().expect(expectation(recruit_cost())).unwrap();
    reconciler
        .ledger()
        .expect(Expectation {
            upgrade_target: TroopId::from("mountain_bandit"),
            source: TroopId::from("looter"),
            ..expectation(80)
        })
        .unwrap();

    reconciler.on_counts_changed(&mut roster, &target_added(1));
    assert_eq!(reconciler.pending(), 0);

    // the guard was released: a fresh expectation is handled again
    let mut plain = SandboxRoster::new(
        ROSTER,
        vec![el("imperial_recruit", 2, 1, recruit_cost()), el("imperial_infantryman", 1, 1, 0)],
    );
    reconciler.ledger().expect(expectation(recruit_cost())).unwrap();
    reconciler.on_counts_changed(&mut plain, &target_added(1));
    assert_eq!(plain.elements(), &[el("imperial_recruit", 1, 0, recruit_cost())]);
}

#[test]
fn concurrent_reports_consume_an_expectation_once() {
    let reconciler = Arc::new(PromotionReconciler::new());
    reconciler.ledger().expect(expectation(recruit_cost())).unwrap();
    let start = vec![
        el("imperial_recruit", 3, 0, 0),
        el("imperial_recruit", 1, 1, recruit_cost()),
        el("imperial_infantryman", 1, 1, 0),
    ];

    let corrected = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reconciler = Arc::clone(&reconciler);
                let start = start.clone();
                s.spawn(move || {
                    let mut roster = SandboxRoster::new(ROSTER, start.clone());
                    reconciler.on_counts_changed(&mut roster, &target_added(2));
                    roster.elements() != start.as_slice()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|changed| *changed)
            .count()
    });

    assert_eq!(corrected, 1);
    assert_eq!(reconciler.pending(), 0);
}

/// Roster that runs a hook before every indexed count change.
struct Hooked<F> {
    inner: SandboxRoster,
    before_index: F,
}

impl<F> TroopRoster for Hooked<F>
where
    F: FnMut(usize) -> Result<(), RosterError>,
{
    fn id(&self) -> RosterId {
        self.inner.id()
    }
    fn len(&self) -> usize {
        self.inner.len()
    }
    fn troop_at(&self, index: usize) -> Result<TroopId, RosterError> {
        self.inner.troop_at(index)
    }
    fn number_at(&self, index: usize) -> Result<i32, RosterError> {
        self.inner.number_at(index)
    }
    fn wounded_at(&self, index: usize) -> Result<i32, RosterError> {
        self.inner.wounded_at(index)
    }
    fn xp_at(&self, index: usize) -> Result<i32, RosterError> {
        self.inner.xp_at(index)
    }
    fn add_to_counts(&mut self, mutation: CountsMutation) -> Result<usize, RosterError> {
        self.inner.add_to_counts(mutation)
    }
    fn add_to_counts_at_index(&mut self, index: usize, count: i32, wounded: i32) -> Result<(), RosterError> {
        (self.before_index)(index)?;
        self.inner.add_to_counts_at_index(index, count, wounded)
    }
    fn add_xp_to_troop(&mut self, troop: &TroopId, xp: i32) -> Result<(), RosterError> {
        self.inner.add_xp_to_troop(troop, xp)
    }
}

fn bandit_expectation() -> Expectation {
    Expectation {
        roster: RosterId(8),
        upgrade_target: TroopId::from("mountain_bandit"),
        source: TroopId::from("looter"),
        expected_xp: UPGRADE_XP_BY_TIER[0],
    }
}

#[test]
fn a_failed_compensation_step_does_not_stop_the_correction() {
    let reconciler = PromotionReconciler::new();
    let mut roster = Hooked {
        inner: SandboxRoster::new(
            ROSTER,
            vec![
                el("imperial_recruit", 3, 0, 0),
                el("imperial_recruit", 1, 1, recruit_cost()),
                el("imperial_infantryman", 1, 1, 0),
            ],
        ),
        before_index: |index: usize| match index {
            2 => Err(RosterError::IndexOutOfRange { index, len: 0 }),
            _ => Ok(()),
        },
    };
    reconciler.ledger().expect(expectation(recruit_cost())).unwrap();
    reconciler.ledger().expect(bandit_expectation()).unwrap();

    reconciler.on_counts_changed(&mut roster, &target_added(2));

    assert_eq!(reconciler.ledger().snapshot(), vec![bandit_expectation()]);
    assert_eq!(
        roster.inner.elements(),
        &[el("imperial_recruit", 3, 0, 0), el("imperial_infantryman", 1, 1, 0)]
    );
}

#[test]
fn a_correction_on_another_thread_is_not_blocked() {
    let reconciler = PromotionReconciler::new();
    reconciler.ledger().expect(expectation(recruit_cost())).unwrap();
    reconciler.ledger().expect(bandit_expectation()).unwrap();

    let gate = Arc::new(Barrier::new(2));
    let parked = Mutex::new(Some(Arc::clone(&gate)));
    let mut first = Hooked {
        inner: SandboxRoster::new(
            ROSTER,
            vec![
                el("imperial_recruit", 3, 0, 0),
                el("imperial_recruit", 1, 1, recruit_cost()),
                el("imperial_infantryman", 1, 1, 0),
            ],
        ),
        // Holds the first correction open until the other thread is done.
        before_index: move |_: usize| -> Result<(), RosterError> {
            if let Some(gate) = parked.lock().unwrap().take() {
                gate.wait();
                gate.wait();
            }
            Ok(())
        },
    };
    let mut second = SandboxRoster::new(
        RosterId(8),
        vec![
            el("looter", 3, 0, 0),
            el("looter", 1, 1, UPGRADE_XP_BY_TIER[0]),
            el("mountain_bandit", 1, 1, 0),
        ],
    );
    let bandit_added = CountsChange {
        troop: TroopId::from("mountain_bandit"),
        count: 1,
        wounded: 1,
        xp: UPGRADE_XP_BY_TIER[0],
        outcome: Ok(2),
    };

    thread::scope(|s| {
        let reconciler = &reconciler;
        let first = &mut first;
        let worker = s.spawn(move || reconciler.on_counts_changed(first, &target_added(2)));

        gate.wait();
        reconciler.on_counts_changed(&mut second, &bandit_added);
        let pending_meanwhile = reconciler.pending();
        gate.wait();

        worker.join().unwrap();
        assert_eq!(pending_meanwhile, 0);
    });

    assert_eq!(second.elements(), &[el("looter", 3, 0, 0)]);

    assert_eq!(first.inner.elements(), &[el("imperial_recruit", 3, 0, 0)]);
    assert_eq!(reconciler.pending(), 0);
}
