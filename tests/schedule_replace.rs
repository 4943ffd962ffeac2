use obs_scheduler::{
    core::store::{ErrorKind, ScheduleStore, StoreError},
    item::{Item, ItemDraft},
    op::Op,
    schedule::{DEFAULT_ADD_LEAD_MS, EntryDraft, START_GRID_MS, default_start},
    types::{EntryId, ItemId, ItemKind},
};

fn store_with(names: &[&str]) -> (ScheduleStore, Vec<Item>) {
    let mut store = ScheduleStore::new();
    let items = names
        .iter()
        .map(|name| {
            store
                .create_item(ItemDraft::new(*name, 5000, ItemKind::Video))
                .unwrap()
                .0
        })
        .collect();
    store.drain_pending_ops();
    (store, items)
}

#[test]
fn replace_then_get_joins_items_with_unset_clock() {
    let (mut store, items) = store_with(&["intro.mp4"]);
    let a = &items[0];

    let (view, op) = store
        .replace_schedule(vec![EntryDraft::new(100, a.id.clone())])
        .unwrap();
    assert!(matches!(op.op, Op::ReplaceSchedule { ref entries } if entries.len() == 1));

    assert_eq!(view.contest_timestamp, None);
    assert_eq!(view.schedule.len(), 1);
    assert_eq!(view.schedule[0].start_timestamp, 100);
    assert_eq!(view.schedule[0].item, *a);
    assert_eq!(store.schedule(), view);
}

#[test]
fn unknown_item_aborts_replace_and_names_first_offender() {
    let (mut store, items) = store_with(&["a", "b"]);
    store
        .replace_schedule(vec![
            EntryDraft::new(5, items[0].id.clone()),
            EntryDraft::new(6, items[1].id.clone()),
        ])
        .unwrap();
    store.drain_pending_ops();
    let before = store.entries().to_vec();

    let err = store
        .replace_schedule(vec![
            EntryDraft::new(1, items[1].id.clone()),
            EntryDraft::new(2, "missing-1"),
            EntryDraft::new(3, "missing-2"),
        ])
        .unwrap_err();

    assert_eq!(err, StoreError::InvalidReference(ItemId::from("missing-1")));
    assert_eq!(err.kind(), ErrorKind::InvalidReference);
    assert_eq!(store.entries(), before.as_slice());
    assert!(store.drain_pending_ops().is_empty());
}

#[test]
fn serve_order_is_by_start_with_stable_ties() {
    let (mut store, items) = store_with(&["a", "b", "c", "d"]);
    let id = |i: usize| items[i].id.clone();

    let (view, _) = store
        .replace_schedule(vec![
            EntryDraft::new(300, id(0)),
            EntryDraft::new(100, id(1)),
            EntryDraft::new(300, id(2)),
            EntryDraft::new(100, id(3)),
            EntryDraft::new(200, id(0)),
        ])
        .unwrap();

    assert_eq!(view.start_timestamps(), vec![100, 100, 200, 300, 300]);
    assert_eq!(view.item_ids(), vec![id(1), id(3), id(0), id(0), id(2)]);
}

#[test]
fn replace_assigns_fresh_entry_ids_and_discards_old_rows() {
    let (mut store, items) = store_with(&["a"]);
    let a = items[0].id.clone();

    let (first, _) = store
        .replace_schedule(vec![EntryDraft::new(1, a.clone()), EntryDraft::new(1, a.clone())])
        .unwrap();
    let (second, _) = store.replace_schedule(vec![EntryDraft::new(1, a.clone())]).unwrap();

    assert_ne!(first.schedule[0].id, first.schedule[1].id);
    assert_eq!(second.schedule.len(), 1);
    assert!(first.schedule.iter().all(|e| e.id != second.schedule[0].id));

    let (empty, _) = store.replace_schedule(Vec::new()).unwrap();
    assert!(empty.schedule.is_empty());
}

#[test]
fn contest_clock_is_independent_of_entry_timestamps() {
    let (mut store, items) = store_with(&["a"]);
    store
        .replace_schedule(vec![EntryDraft::new(500, items[0].id.clone())])
        .unwrap();
    assert_eq!(store.contest_start(), None);
    assert!(store.contest_state().is_none());

    let (view, _) = store.set_contest_start(Some(10_000)).unwrap();
    assert_eq!(view.contest_timestamp, Some(10_000));
    assert_eq!(view.start_timestamps(), vec![500]);

    let (view, _) = store.set_contest_start(None).unwrap();
    assert_eq!(view.contest_timestamp, None);
    assert!(store.contest_state().is_some());

    // Replace leaves the clock alone.
    store.set_contest_start(Some(42)).unwrap();
    let (view, _) = store.replace_schedule(Vec::new()).unwrap();
    assert_eq!(view.contest_timestamp, Some(42));
}

#[test]
fn add_remove_and_reschedule_single_entries() {
    let (mut store, items) = store_with(&["a", "b"]);
    let (view, _) = store.add_entry(&items[0].id, Some(2_000)).unwrap();
    let first = view.schedule[0].id.clone();
    let (view, _) = store.add_entry(&items[1].id, Some(1_000)).unwrap();
    assert_eq!(view.item_ids(), vec![items[1].id.clone(), items[0].id.clone()]);
    assert!(view.schedule.iter().any(|e| e.id == first));

    let (view, op) = store.reschedule_entry(&first, 500).unwrap();
    assert!(op.is_some());
    assert_eq!(view.schedule[0].id, first);
    assert_eq!(view.start_timestamps(), vec![500, 1_000]);

    let (view, op) = store.remove_entry(&first).unwrap();
    assert!(op.is_some());
    assert_eq!(view.item_ids(), vec![items[1].id.clone()]);

    let err = store.add_entry(&ItemId::from("nope"), Some(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidReference);
}

#[test]
fn unknown_entry_edits_leave_table_unchanged() {
    let (mut store, items) = store_with(&["a"]);
    store.add_entry(&items[0].id, Some(10)).unwrap();
    store.drain_pending_ops();
    let before = store.schedule();

    let ghost = EntryId::from("ghost");
    let (view, op) = store.remove_entry(&ghost).unwrap();
    assert!(op.is_none());
    assert_eq!(view, before);

    let (view, op) = store.reschedule_entry(&ghost, 99).unwrap();
    assert!(op.is_none());
    assert_eq!(view, before);
    assert!(store.drain_pending_ops().is_empty());
}

#[test]
fn added_entry_without_start_lands_on_contest_minute_grid() {
    let (mut store, items) = store_with(&["a"]);
    store.set_contest_start(Some(17_345)).unwrap();

    let (view, _) = store.add_entry(&items[0].id, None).unwrap();
    let start = view.schedule[0].start_timestamp;
    assert_eq!((start - 17_345).rem_euclid(START_GRID_MS), 0);
}

#[test]
fn default_start_snaps_relative_to_anchor() {
    let now = 1_000_000;
    let raw = now + DEFAULT_ADD_LEAD_MS;

    assert_eq!(default_start(now, None), raw - raw % START_GRID_MS);
    assert_eq!(default_start(now, Some(raw)), raw);
    assert_eq!(default_start(now, Some(raw - 1_500)), raw - 1_500);
    assert_eq!(default_start(now, Some(raw - 61_000)), raw - 1_000);
}
