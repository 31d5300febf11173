use feedstate_core::db::open_db_in_memory;
use feedstate_core::{
    DeferredSyncHandler, FeedList, Item, ItemId, ItemRepository, ItemStateObserver,
    ItemStateService, Node, NodeId, NodeRegistry, SqliteItemRepository, SqliteSearchFolderIndex,
    StateCommit, StateResult, SubscriptionHandler, LOCAL_SOURCE, REMOTE_SYNC_SOURCE,
};
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct RecordingObserver {
    updated_items: Vec<ItemId>,
    updated_nodes: Vec<NodeId>,
    resets: usize,
    orphaned: Vec<ItemId>,
}

impl RecordingObserver {
    fn clear(&mut self) {
        self.updated_items.clear();
        self.updated_nodes.clear();
        self.resets = 0;
        self.orphaned.clear();
    }
}

impl ItemStateObserver for RecordingObserver {
    fn item_updated(&mut self, item: &Item) {
        self.updated_items.push(item.id);
    }

    fn node_counters_updated(&mut self, node: &Node) {
        self.updated_nodes.push(node.id.clone());
    }

    fn new_item_count_reset(&mut self) {
        self.resets += 1;
    }

    fn item_orphaned(&mut self, item: &Item) {
        self.orphaned.push(item.id);
    }
}

/// Commits immediately and counts accepted read changes.
#[derive(Default)]
struct CountingHandler {
    reads: AtomicUsize,
}

impl SubscriptionHandler for CountingHandler {
    fn source_kind(&self) -> &str {
        "counted"
    }

    fn accept_flag_change(
        &self,
        commit: &mut dyn StateCommit,
        item: &mut Item,
        new_state: bool,
    ) -> StateResult<()> {
        commit.on_flag_state_changed(item, new_state)
    }

    fn accept_read_change(
        &self,
        commit: &mut dyn StateCommit,
        item: &mut Item,
        new_state: bool,
    ) -> StateResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        commit.on_read_state_changed(item, new_state)
    }
}

type Service<'conn> = ItemStateService<
    SqliteItemRepository<'conn>,
    SqliteSearchFolderIndex<'conn>,
    FeedList,
    RecordingObserver,
>;

/// Builds:
///
/// ```text
/// news/
///   feed-a
///   tech/
///     feed-b
/// feed-c
/// ```
fn service<'conn>(conn: &'conn Connection, feed_c_source: &str) -> Service<'conn> {
    let mut feeds = FeedList::new();
    feeds.insert_node(None, Node::folder("news", "News")).unwrap();
    feeds
        .insert_node(Some("news"), Node::feed("feed-a", "A", LOCAL_SOURCE))
        .unwrap();
    feeds
        .insert_node(Some("news"), Node::folder("tech", "Tech"))
        .unwrap();
    feeds
        .insert_node(Some("tech"), Node::feed("feed-b", "B", LOCAL_SOURCE))
        .unwrap();
    feeds
        .insert_node(None, Node::feed("feed-c", "C", feed_c_source))
        .unwrap();

    ItemStateService::new(
        SqliteItemRepository::new(conn),
        SqliteSearchFolderIndex::try_new(conn).unwrap(),
        feeds,
        RecordingObserver::default(),
    )
}

fn store(service: &Service<'_>, item: Item) -> ItemId {
    service.items().create_item(&item).unwrap()
}

fn reload(service: &Service<'_>, id: ItemId) -> Item {
    service.items().load_item(id).unwrap().unwrap()
}

fn refresh_counters(service: &mut Service<'_>) {
    for feed in ["feed-a", "feed-b", "feed-c"] {
        service.update_node_counters(feed).unwrap();
    }
    service.observer_mut().clear();
}

fn unread(service: &Service<'_>, node_id: &str) -> u32 {
    service.nodes().resolve(node_id).unwrap().unread_count
}

fn needs_recount(service: &Service<'_>, node_id: &str) -> bool {
    service.nodes().resolve(node_id).unwrap().needs_recount
}

#[test]
fn nodes_without_unread_items_short_circuit() {
    let conn = open_db_in_memory().unwrap();
    let mut service = service(&conn, "counted");
    let handler = Arc::new(CountingHandler::default());
    service.handlers_mut().register(handler.clone()).unwrap();
    let id = store(&service, Item::new("feed-c", "not yet counted"));

    assert_eq!(service.mark_all_read("feed-c").unwrap(), 0);
    assert_eq!(service.mark_all_read("missing").unwrap(), 0);

    assert_eq!(handler.reads.load(Ordering::SeqCst), 0);
    assert!(!reload(&service, id).read_status);
    assert!(!needs_recount(&service, "feed-c"));
}

#[test]
fn bulk_pass_only_flags_nodes_for_recount() {
    let conn = open_db_in_memory().unwrap();
    let mut service = service(&conn, LOCAL_SOURCE);
    let first = store(&service, Item::with_guid("feed-a", "guid1", "first"));
    let second = store(&service, Item::new("feed-a", "second"));
    let mut seen = Item::new("feed-a", "seen");
    seen.read_status = true;
    store(&service, seen);
    let copy = store(&service, Item::with_guid("feed-c", "guid1", "copy"));
    store(&service, Item::new("feed-b", "untouched"));
    refresh_counters(&mut service);
    assert_eq!(unread(&service, "feed-a"), 2);

    let accepted = service.mark_all_read("feed-a").unwrap();

    assert_eq!(accepted, 2);
    assert!(reload(&service, first).read_status);
    assert!(reload(&service, second).read_status);
    assert!(reload(&service, copy).read_status);

    assert!(needs_recount(&service, "feed-a"));
    assert!(needs_recount(&service, "feed-c"));
    assert!(!needs_recount(&service, "feed-b"));
    assert_eq!(unread(&service, "feed-a"), 2);

    assert!(service.observer().updated_items.is_empty());
    assert!(service.observer().updated_nodes.is_empty());
    assert_eq!(service.observer().resets, 0);
}

#[test]
fn dirty_pass_recounts_children_before_parents() {
    let conn = open_db_in_memory().unwrap();
    let mut service = service(&conn, LOCAL_SOURCE);
    store(&service, Item::with_guid("feed-a", "guid1", "first"));
    store(&service, Item::with_guid("feed-c", "guid1", "copy"));
    store(&service, Item::new("feed-b", "untouched"));
    refresh_counters(&mut service);
    assert_eq!(unread(&service, "news"), 2);

    service.mark_all_read("feed-a").unwrap();
    let recounted = service.update_dirty_counters().unwrap();

    assert_eq!(recounted, 3);
    assert_eq!(
        service.observer().updated_nodes,
        vec![
            "feed-a".to_string(),
            "feed-c".to_string(),
            "news".to_string()
        ]
    );
    assert_eq!(service.observer().resets, 1);
    assert_eq!(unread(&service, "feed-a"), 0);
    assert_eq!(unread(&service, "feed-c"), 0);
    assert_eq!(unread(&service, "news"), 1);
    assert!(!needs_recount(&service, "feed-a"));
    assert!(!needs_recount(&service, "feed-c"));

    assert_eq!(service.update_dirty_counters().unwrap(), 0);
}

#[test]
fn folder_pass_covers_nested_feeds() {
    let conn = open_db_in_memory().unwrap();
    let mut service = service(&conn, LOCAL_SOURCE);
    let a = store(&service, Item::new("feed-a", "a"));
    let b = store(&service, Item::new("feed-b", "b"));
    let c = store(&service, Item::new("feed-c", "c"));
    refresh_counters(&mut service);
    assert_eq!(unread(&service, "news"), 2);

    assert_eq!(service.mark_all_read("news").unwrap(), 2);
    assert!(reload(&service, a).read_status);
    assert!(reload(&service, b).read_status);
    assert!(!reload(&service, c).read_status);

    assert_eq!(service.update_dirty_counters().unwrap(), 4);
    assert_eq!(
        service.observer().updated_nodes,
        vec![
            "feed-b".to_string(),
            "feed-a".to_string(),
            "tech".to_string(),
            "news".to_string()
        ]
    );
    assert_eq!(unread(&service, "news"), 0);
    assert_eq!(unread(&service, "tech"), 0);
    assert_eq!(unread(&service, "feed-c"), 1);
}

#[test]
fn orphaned_duplicates_are_skipped_in_bulk() {
    let conn = open_db_in_memory().unwrap();
    let mut service = service(&conn, LOCAL_SOURCE);
    let first = store(&service, Item::with_guid("feed-a", "guid1", "first"));
    let lost = store(&service, Item::with_guid("feed-gone", "guid1", "lost"));
    refresh_counters(&mut service);

    assert_eq!(service.mark_all_read("feed-a").unwrap(), 1);

    assert!(reload(&service, first).read_status);
    assert!(!reload(&service, lost).read_status);
    assert_eq!(service.observer().orphaned, vec![lost]);
    assert_eq!(service.update_dirty_counters().unwrap(), 2);
}

#[test]
fn unreadable_rows_do_not_abort_the_batch() {
    let conn = open_db_in_memory().unwrap();
    let mut service = service(&conn, LOCAL_SOURCE);
    let first = store(&service, Item::with_guid("feed-a", "guid1", "first"));
    conn.execute(
        "INSERT INTO items (node_id, source_id, valid_guid, title) VALUES ('', 'guid1', 1, 'lost copy');",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO items (node_id, source_id, valid_guid, title) VALUES ('feed-a', '', 1, 'no guid');",
        [],
    )
    .unwrap();
    let second = store(&service, Item::new("feed-a", "second"));
    refresh_counters(&mut service);
    assert_eq!(unread(&service, "feed-a"), 3);

    assert_eq!(service.mark_all_read("feed-a").unwrap(), 2);

    assert!(reload(&service, first).read_status);
    assert!(reload(&service, second).read_status);
    assert_eq!(service.update_dirty_counters().unwrap(), 2);
    assert_eq!(unread(&service, "feed-a"), 1);
}

#[test]
fn remote_feed_items_are_queued_during_bulk() {
    let conn = open_db_in_memory().unwrap();
    let mut service = service(&conn, REMOTE_SYNC_SOURCE);
    let remote = Arc::new(DeferredSyncHandler::default());
    service.handlers_mut().register(remote.clone()).unwrap();
    let first = store(&service, Item::new("feed-c", "first"));
    let second = store(&service, Item::new("feed-c", "second"));
    refresh_counters(&mut service);

    assert_eq!(service.mark_all_read("feed-c").unwrap(), 2);

    assert!(!reload(&service, first).read_status);
    assert!(!reload(&service, second).read_status);
    assert!(needs_recount(&service, "feed-c"));
    assert_eq!(remote.pending_len(), 2);

    for change in remote.take_pending() {
        assert!(service.commit_deferred(change).unwrap());
    }
    assert!(reload(&service, first).read_status);
    assert!(reload(&service, second).read_status);
    assert_eq!(unread(&service, "feed-c"), 0);
    assert!(!needs_recount(&service, "feed-c"));
}

#[test]
fn popup_shown_is_scoped_to_one_node() {
    let conn = open_db_in_memory().unwrap();
    let mut service = service(&conn, LOCAL_SOURCE);
    let a1 = store(&service, Item::new("feed-a", "a1"));
    let a2 = store(&service, Item::new("feed-a", "a2"));
    let c = store(&service, Item::new("feed-c", "c"));

    assert_eq!(service.set_all_popup_shown("feed-a").unwrap(), 2);
    assert_eq!(service.set_all_popup_shown("feed-a").unwrap(), 0);

    assert!(reload(&service, a1).popup_status);
    assert!(reload(&service, a2).popup_status);
    assert!(!reload(&service, c).popup_status);
    assert!(service.observer().updated_items.is_empty());
    assert!(service.observer().updated_nodes.is_empty());
    assert_eq!(service.observer().resets, 0);
}
