use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use super::*;
use crate::consts::TOKEN_PALETTE;
use crate::entity::{Cell, Character, Contents, Ping, Position};

fn icon_at(x: i32, y: i32, z: i32, icon: &str) -> Character {
    Character::new(Position::new(x, y, z), Contents::icon(icon))
}

fn assert_local_matches_replay(state: &MergeState) {
    assert_eq!(state.local(), &state.replay_local(), "local drifted from network + queued + unqueued");
}

fn assert_no_shared_cells(index: &EntityIndex) {
    let mut positions: Vec<Position> = index.iter().filter_map(Entity::position).collect();
    let total = positions.len();
    positions.sort();
    positions.dedup();
    assert_eq!(positions.len(), total, "two entities share a cell");
    assert!(index.is_consistent());
}

// =============================================================
// Local edits and batching
// =============================================================

#[test]
fn local_upsert_shows_locally_but_not_in_network() {
    let mut state = MergeState::new();
    let a = icon_at(0, 0, 1, "orc");
    state.apply_local_action(Action::upsert(a.clone()));

    assert!(state.local().contains(&a.id));
    assert!(state.network().is_empty());
    assert_eq!(state.unqueued_actions().len(), 1);
    assert_local_matches_replay(&state);
}

#[test]
fn collect_update_moves_unqueued_into_queue() {
    let mut state = MergeState::new();
    state.apply_local_action(Action::upsert(icon_at(0, 0, 0, "orc")));
    state.apply_local_action(Action::upsert(icon_at(1, 0, 0, "elf")));
    let id = Uuid::new_v4();

    let update = state.collect_update(id).expect("update should be collected");
    assert_eq!(update.update_id, id);
    assert_eq!(update.actions.len(), 2);
    assert!(state.unqueued_actions().is_empty());
    assert_eq!(state.queued_updates(), &[update]);
    assert_eq!(state.local().len(), 2);
    assert_local_matches_replay(&state);
}

#[test]
fn collect_update_with_nothing_pending_is_noop() {
    let mut state = MergeState::new();
    assert!(state.collect_update(Uuid::new_v4()).is_none());
    assert!(state.queued_updates().is_empty());
}

// =============================================================
// Network updates
// =============================================================

#[test]
fn confirmation_moves_entity_into_network_and_clears_queue() {
    let mut state = MergeState::new();
    let a = icon_at(0, 0, 1, "orc");
    state.apply_local_action(Action::upsert(a.clone()));
    let local_before = state.local().clone();
    let id = Uuid::new_v4();
    let update = state.collect_update(id).expect("update");

    state.apply_network_update(&update.actions, Some(id));

    assert!(state.network().contains(&a.id));
    assert!(state.queued_updates().is_empty());
    assert_eq!(state.local(), &local_before);
}

#[test]
fn confirming_same_update_twice_is_idempotent() {
    let mut state = MergeState::new();
    state.apply_local_action(Action::upsert(icon_at(0, 0, 0, "goblin")));
    state.apply_local_action(Action::upsert(icon_at(1, 0, 0, "goblin")));
    let id = Uuid::new_v4();
    let update = state.collect_update(id).expect("update");

    state.apply_network_update(&update.actions, Some(id));
    let network_once = state.network().clone();
    let local_once = state.local().clone();

    state.apply_network_update(&update.actions, Some(id));
    assert_eq!(state.network(), &network_once);
    assert_eq!(state.local(), &local_once);
}

#[test]
fn remote_update_rebuilds_local_under_pending_edits() {
    let mut state = MergeState::new();
    let mine = icon_at(0, 0, 0, "orc");
    state.apply_local_action(Action::upsert(mine.clone()));
    state.collect_update(Uuid::new_v4());
    let theirs = icon_at(5, 5, 0, "elf");

    state.apply_network_update(&[Action::upsert(theirs.clone())], Some(Uuid::new_v4()));

    assert_eq!(state.queued_updates().len(), 1);
    assert!(state.local().contains(&mine.id));
    assert!(state.local().contains(&theirs.id));
    assert!(!state.network().contains(&mine.id));
    assert_local_matches_replay(&state);
}

#[test]
fn remote_claim_of_cell_drops_pending_local_placement() {
    let mut state = MergeState::new();
    let mine = icon_at(2, 2, 0, "orc");
    state.apply_local_action(Action::upsert(mine.clone()));
    let theirs = icon_at(2, 2, 0, "elf");

    state.apply_network_update(&[Action::upsert(theirs.clone())], None);

    assert!(!state.local().contains(&mine.id));
    assert_eq!(state.local().occupant_at(Position::new(2, 2, 0)).map(Entity::id), Some(theirs.id));
    assert_eq!(state.unqueued_actions().len(), 1);
}

#[test]
fn acknowledgement_out_of_order_keeps_other_update_queued() {
    let mut state = MergeState::new();
    let a = icon_at(0, 0, 0, "orc");
    let b = icon_at(1, 0, 0, "elf");
    state.apply_local_action(Action::upsert(a.clone()));
    let first = state.collect_update(Uuid::new_v4()).expect("first");
    state.apply_local_action(Action::upsert(b.clone()));
    let second = state.collect_update(Uuid::new_v4()).expect("second");

    state.apply_network_update(&second.actions, Some(second.update_id));

    assert_eq!(state.queued_updates(), &[first]);
    assert!(state.network().contains(&b.id));
    assert!(state.local().contains(&a.id));
    assert_local_matches_replay(&state);
}

#[test]
fn upsert_into_confirmed_occupied_cell_leaves_local_unchanged() {
    let mut state = MergeState::new();
    state.apply_network_update(&[Action::upsert(icon_at(0, 0, 0, "orc"))], None);
    let before = state.local().clone();

    state.apply_local_action(Action::upsert(icon_at(0, 0, 0, "elf")));

    assert_eq!(state.local(), &before);
    assert_eq!(state.local().len(), 1);
}

// Two identical Characters confirmed in sequence: the second confirmation
// colors every uncolored member of the group. When the first already holds a
// color, exactly one new color is handed out. When neither does, both are
// colored at that moment, in group order; the first never changes afterwards.
#[test]
fn second_confirmed_duplicate_gets_new_color_and_first_keeps_its_own() {
    let mut state = MergeState::new();
    let mut first = icon_at(0, 0, 0, "goblin");
    first.color = Some(TOKEN_PALETTE[3].to_owned());
    let second = icon_at(1, 0, 0, "goblin");

    state.apply_network_update(&[Action::upsert(first.clone())], Some(Uuid::new_v4()));
    state.apply_network_update(&[Action::upsert(second.clone())], Some(Uuid::new_v4()));

    let color = |id| state.local().get(&id).and_then(Entity::color).map(str::to_owned);
    assert_eq!(color(first.id), Some(TOKEN_PALETTE[3].to_owned()));
    assert_eq!(color(second.id), Some(TOKEN_PALETTE[0].to_owned()));
}

#[test]
fn uncolored_duplicates_are_both_colored_on_second_confirmation() {
    let mut state = MergeState::new();
    let first = icon_at(0, 0, 0, "goblin");
    let second = icon_at(1, 0, 0, "goblin");

    state.apply_network_update(&[Action::upsert(first.clone())], Some(Uuid::new_v4()));
    assert_eq!(state.local().get(&first.id).and_then(Entity::color), None);

    state.apply_network_update(&[Action::upsert(second.clone())], Some(Uuid::new_v4()));

    let color = |id| state.local().get(&id).and_then(Entity::color).map(str::to_owned);
    assert_eq!(color(first.id), Some(TOKEN_PALETTE[0].to_owned()));
    assert_eq!(color(second.id), Some(TOKEN_PALETTE[1].to_owned()));
}

#[test]
fn repeated_confirmation_with_delete_in_batch_is_idempotent() {
    let mut state = MergeState::new();
    let a = icon_at(0, 0, 0, "goblin");
    state.apply_network_update(&[Action::upsert(a.clone())], None);

    let b = icon_at(1, 0, 0, "goblin");
    let actions = [Action::upsert(b.clone()), Action::delete(a.id)];
    let update_id = Uuid::new_v4();

    state.apply_network_update(&actions, Some(update_id));
    let once = state.network().clone();
    assert_eq!(once.get(&b.id).and_then(Entity::color), Some(TOKEN_PALETTE[1]));

    state.apply_network_update(&actions, Some(update_id));
    assert_eq!(state.network(), &once);
    assert_local_matches_replay(&state);
}

#[test]
fn optimistic_duplicate_is_colored_only_after_confirmation() {
    let mut state = MergeState::new();
    state.apply_network_update(&[Action::upsert(icon_at(0, 0, 0, "goblin"))], None);
    let copy = icon_at(1, 0, 0, "goblin");
    state.apply_local_action(Action::upsert(copy.clone()));
    assert_eq!(state.local().get(&copy.id).and_then(Entity::color), None);

    let id = Uuid::new_v4();
    let update = state.collect_update(id).expect("update");
    state.apply_network_update(&update.actions, Some(id));
    assert!(state.local().get(&copy.id).and_then(Entity::color).is_some());
}

#[test]
fn replace_network_supersedes_stale_confirmed_state() {
    let mut state = MergeState::new();
    let stale = icon_at(0, 0, 0, "orc");
    state.apply_network_update(&[Action::upsert(stale.clone())], None);
    let pending = icon_at(3, 3, 0, "elf");
    state.apply_local_action(Action::upsert(pending.clone()));
    let fresh = icon_at(9, 9, 0, "imp");

    state.replace_network(vec![fresh.clone().into()]);

    assert!(!state.network().contains(&stale.id));
    assert!(state.network().contains(&fresh.id));
    assert!(state.local().contains(&pending.id));
    assert!(!state.local().contains(&stale.id));
}

// =============================================================
// Rejection
// =============================================================

#[test]
fn rejected_update_is_dropped_and_local_rebuilt() {
    let mut state = MergeState::new();
    let a = icon_at(0, 0, 0, "orc");
    state.apply_local_action(Action::upsert(a.clone()));
    let id = Uuid::new_v4();
    state.collect_update(id);

    assert!(state.reject_update(id));
    assert!(state.queued_updates().is_empty());
    assert!(!state.local().contains(&a.id));
    assert_local_matches_replay(&state);
}

#[test]
fn rejecting_unknown_update_is_idempotent_noop() {
    let mut state = MergeState::new();
    state.apply_local_action(Action::upsert(icon_at(0, 0, 0, "orc")));
    let id = Uuid::new_v4();
    state.collect_update(id);
    assert!(state.reject_update(id));
    assert!(!state.reject_update(id));
    assert!(!state.reject_update(Uuid::new_v4()));
}

// =============================================================
// Undo / redo
// =============================================================

#[test]
fn undo_then_redo_restores_state_after_action() {
    let mut state = MergeState::new();
    let a = icon_at(0, 0, 0, "orc");
    state.apply_network_update(&[Action::upsert(a.clone())], None);
    let mut moved = a.clone();
    moved.pos = Position::new(4, 4, 0);

    state.apply_local_action(Action::upsert(moved.clone()));
    let after_action = state.local().clone();
    state.apply_undo_fence();

    assert!(state.undo());
    assert_eq!(state.local().get(&a.id).and_then(Entity::position), Some(Position::new(0, 0, 0)));
    assert!(state.redo());
    assert_eq!(state.local(), &after_action);
    assert_local_matches_replay(&state);
}

#[test]
fn undo_of_create_deletes_and_of_delete_recreates() {
    let mut state = MergeState::new();
    let a = icon_at(0, 0, 0, "orc");
    state.apply_local_action(Action::upsert(a.clone()));
    state.apply_undo_fence();
    state.apply_local_action(Action::delete(a.id));
    state.apply_undo_fence();

    assert!(state.undo());
    assert!(state.local().contains(&a.id));
    assert!(state.undo());
    assert!(!state.local().contains(&a.id));
    assert!(!state.undo());
}

#[test]
fn undo_actions_are_queued_for_the_server() {
    let mut state = MergeState::new();
    let a = icon_at(0, 0, 0, "orc");
    state.apply_local_action(Action::upsert(a.clone()));
    state.apply_undo_fence();
    state.collect_update(Uuid::new_v4());

    state.undo();

    assert_eq!(state.unqueued_actions(), &[Action::delete(a.id)]);
    assert_eq!(state.undo_state().undo_sets().len(), 2);
}

#[test]
fn new_edit_after_undo_makes_redo_a_noop() {
    let mut state = MergeState::new();
    state.apply_local_action(Action::upsert(icon_at(0, 0, 0, "orc")));
    state.apply_undo_fence();
    state.undo();

    state.apply_local_action(Action::upsert(icon_at(1, 1, 0, "elf")));

    let before = state.local().clone();
    assert!(!state.redo());
    assert_eq!(state.local(), &before);
}

#[test]
fn fenced_group_undoes_as_one_step() {
    let mut state = MergeState::new();
    let mut token = icon_at(0, 0, 0, "orc");
    state.apply_network_update(&[Action::upsert(token.clone())], None);
    for x in 1..=3 {
        token.pos = Position::new(x, 0, 0);
        state.apply_local_action(Action::upsert(token.clone()));
    }
    state.apply_undo_fence();

    assert!(state.undo());
    assert_eq!(state.local().get(&token.id).and_then(Entity::position), Some(Position::new(0, 0, 0)));
    assert!(!state.undo());
}

#[test]
fn pings_are_not_recorded_for_undo() {
    let mut state = MergeState::new();
    state.apply_local_action(Action::ping(Ping::new(Cell::new(0, 0))));
    assert!(!state.apply_undo_fence());
    assert!(!state.undo());
}

// =============================================================
// Ping expiry
// =============================================================

#[test]
fn expire_ping_removes_confirmed_and_pending_pings() {
    let mut state = MergeState::new();
    let remote = Ping::new(Cell::new(1, 1));
    state.apply_network_update(&[Action::ping(remote.clone())], None);
    let mine = Ping::new(Cell::new(2, 2));
    state.apply_local_action(Action::ping(mine.clone()));
    state.collect_update(Uuid::new_v4());

    assert!(state.expire_ping(remote.id));
    assert!(state.expire_ping(mine.id));

    assert!(state.local().is_empty());
    assert!(state.network().is_empty());
    assert_eq!(state.pending_action_count(), 0);
    assert!(!state.expire_ping(mine.id));
}

#[test]
fn expire_ping_ignores_non_ping_entities() {
    let mut state = MergeState::new();
    let a = icon_at(0, 0, 0, "orc");
    state.apply_network_update(&[Action::upsert(a.clone())], None);
    assert!(!state.expire_ping(a.id));
    assert!(state.local().contains(&a.id));
}

// =============================================================
// Randomized operation sequences
// =============================================================

fn random_position(rng: &mut StdRng) -> Position {
    Position::new(rng.random_range(0..4), rng.random_range(0..4), rng.random_range(0..2))
}

fn random_local_id(state: &MergeState, rng: &mut StdRng) -> Option<EntityId> {
    let ids: Vec<EntityId> = state.local().sorted_entities().iter().map(|e| e.id()).collect();
    if ids.is_empty() {
        return None;
    }
    Some(ids[rng.random_range(0..ids.len())])
}

#[test]
fn random_sequences_keep_local_equal_to_replay() {
    const ICONS: [&str; 3] = ["orc", "elf", "imp"];

    for seed in 0..16 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut state = MergeState::with_max_undo_sets(8);
        let mut in_flight: Vec<Update> = Vec::new();

        for _ in 0..200 {
            match rng.random_range(0..11) {
                0 => {
                    let icon = ICONS[rng.random_range(0..ICONS.len())];
                    let c = Character::new(random_position(&mut rng), Contents::icon(icon));
                    state.apply_local_action(Action::upsert(c));
                }
                1 => {
                    if let Some(id) = random_local_id(&state, &mut rng) {
                        if let Some(Entity::Character(c)) = state.local().get(&id).cloned() {
                            let moved = Character { pos: random_position(&mut rng), ..c };
                            state.apply_local_action(Action::upsert(moved));
                        }
                    }
                }
                2 => {
                    let id = random_local_id(&state, &mut rng).unwrap_or_else(Uuid::new_v4);
                    state.apply_local_action(Action::delete(id));
                }
                3 => {
                    let pos = random_position(&mut rng).cell();
                    state.apply_local_action(Action::ping(Ping::new(pos)));
                }
                4 => {
                    state.apply_undo_fence();
                }
                5 => {
                    state.undo();
                }
                6 => {
                    state.redo();
                }
                7 => {
                    if let Some(update) = state.collect_update(Uuid::new_v4()) {
                        in_flight.push(update);
                    }
                }
                8 => {
                    if !in_flight.is_empty() {
                        let update = in_flight.remove(rng.random_range(0..in_flight.len()));
                        state.apply_network_update(&update.actions, Some(update.update_id));
                    }
                }
                9 => {
                    if !in_flight.is_empty() {
                        let update = in_flight.remove(rng.random_range(0..in_flight.len()));
                        state.reject_update(update.update_id);
                    }
                }
                _ => {
                    let icon = ICONS[rng.random_range(0..ICONS.len())];
                    let remote = Character::new(random_position(&mut rng), Contents::icon(icon));
                    state.apply_network_update(&[Action::upsert(remote)], Some(Uuid::new_v4()));
                }
            }

            assert_local_matches_replay(&state);
            assert_no_shared_cells(state.local());
            assert_no_shared_cells(state.network());
            assert_eq!(state.queued_updates().len(), in_flight.len());
        }
    }
}
