//! Item repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist item state bits keyed by numeric id.
//! - Answer duplicate lookups by GUID-derived source id.
//! - Provide per-node item sets and unread counts for counter recomputes.
//!
//! # Invariants
//! - Write paths must call `Item::validate()` before SQL mutations.
//! - Duplicate lookups only consider rows with `valid_guid = 1`.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::item::{Item, ItemId, ItemValidationError};
use crate::model::node::NodeId;
use crate::model::search_folder::SearchRuleError;
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const ITEM_SELECT_SQL: &str = "SELECT
    id,
    node_id,
    source_id,
    valid_guid,
    title,
    read_status,
    flag_status,
    update_status,
    popup_status
FROM items";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for item and search folder persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(ItemValidationError),
    InvalidRule(SearchRuleError),
    Db(DbError),
    NotFound(ItemId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidRule(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "item not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::InvalidRule(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ItemValidationError> for RepoError {
    fn from(value: ItemValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<SearchRuleError> for RepoError {
    fn from(value: SearchRuleError) -> Self {
        Self::InvalidRule(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Item store consumed by state propagation.
pub trait ItemRepository {
    /// Inserts a new item and returns its assigned id. `item.id` is ignored.
    fn create_item(&self, item: &Item) -> RepoResult<ItemId>;
    /// Loads one item; `None` when the id is unknown.
    fn load_item(&self, id: ItemId) -> RepoResult<Option<Item>>;
    /// Releases an item obtained from `load_item`.
    ///
    /// Stores without a cache simply drop the value.
    fn unload_item(&self, item: Item) {
        drop(item);
    }
    /// Persists the state bits of an existing item.
    fn update_item_state(&self, item: &Item) -> RepoResult<()>;
    /// Ids of every valid-GUID item sharing `source_id`, the caller included.
    fn find_duplicate_ids(&self, source_id: &str) -> RepoResult<Vec<ItemId>>;
    /// Distinct owning node ids of every valid-GUID item sharing `source_id`.
    fn find_duplicate_node_ids(&self, source_id: &str) -> RepoResult<Vec<NodeId>>;
    /// Marks the popup of every item under `node_id` as shown.
    fn mark_all_popup_shown(&self, node_id: &str) -> RepoResult<usize>;
    /// Ids of the items owned by `node_id`, in insertion order.
    fn list_item_ids(&self, node_id: &str) -> RepoResult<Vec<ItemId>>;
    /// Number of unread items owned by `node_id`.
    fn count_unread(&self, node_id: &str) -> RepoResult<u32>;
}

impl<R: ItemRepository + ?Sized> ItemRepository for &R {
    fn create_item(&self, item: &Item) -> RepoResult<ItemId> {
        (**self).create_item(item)
    }

    fn load_item(&self, id: ItemId) -> RepoResult<Option<Item>> {
        (**self).load_item(id)
    }

    fn unload_item(&self, item: Item) {
        (**self).unload_item(item)
    }

    fn update_item_state(&self, item: &Item) -> RepoResult<()> {
        (**self).update_item_state(item)
    }

    fn find_duplicate_ids(&self, source_id: &str) -> RepoResult<Vec<ItemId>> {
        (**self).find_duplicate_ids(source_id)
    }

    fn find_duplicate_node_ids(&self, source_id: &str) -> RepoResult<Vec<NodeId>> {
        (**self).find_duplicate_node_ids(source_id)
    }

    fn mark_all_popup_shown(&self, node_id: &str) -> RepoResult<usize> {
        (**self).mark_all_popup_shown(node_id)
    }

    fn list_item_ids(&self, node_id: &str) -> RepoResult<Vec<ItemId>> {
        (**self).list_item_ids(node_id)
    }

    fn count_unread(&self, node_id: &str) -> RepoResult<u32> {
        (**self).count_unread(node_id)
    }
}

/// SQLite-backed item repository.
pub struct SqliteItemRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteItemRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ItemRepository for SqliteItemRepository<'_> {
    fn create_item(&self, item: &Item) -> RepoResult<ItemId> {
        item.validate()?;

        self.conn.execute(
            "INSERT INTO items (
                node_id,
                source_id,
                valid_guid,
                title,
                read_status,
                flag_status,
                update_status,
                popup_status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                item.node_id.as_str(),
                item.source_id.as_str(),
                bool_to_int(item.valid_guid),
                item.title.as_str(),
                bool_to_int(item.read_status),
                bool_to_int(item.flag_status),
                bool_to_int(item.update_status),
                bool_to_int(item.popup_status),
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn load_item(&self, id: ItemId) -> RepoResult<Option<Item>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ITEM_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }
        Ok(None)
    }

    fn update_item_state(&self, item: &Item) -> RepoResult<()> {
        item.validate()?;

        let changed = self.conn.execute(
            "UPDATE items
             SET
                read_status = ?1,
                flag_status = ?2,
                update_status = ?3,
                popup_status = ?4,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?5;",
            params![
                bool_to_int(item.read_status),
                bool_to_int(item.flag_status),
                bool_to_int(item.update_status),
                bool_to_int(item.popup_status),
                item.id,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(item.id));
        }
        Ok(())
    }

    fn find_duplicate_ids(&self, source_id: &str) -> RepoResult<Vec<ItemId>> {
        if source_id.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT id FROM items
             WHERE source_id = ?1 AND valid_guid = 1
             ORDER BY id ASC;",
        )?;
        let ids = stmt
            .query_map([source_id], |row| row.get::<_, ItemId>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn find_duplicate_node_ids(&self, source_id: &str) -> RepoResult<Vec<NodeId>> {
        if source_id.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT node_id FROM items
             WHERE source_id = ?1 AND valid_guid = 1
             ORDER BY node_id ASC;",
        )?;
        let node_ids = stmt
            .query_map([source_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(node_ids)
    }

    fn mark_all_popup_shown(&self, node_id: &str) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE items
             SET
                popup_status = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE node_id = ?1 AND popup_status = 0;",
            [node_id],
        )?;
        Ok(changed)
    }

    fn list_item_ids(&self, node_id: &str) -> RepoResult<Vec<ItemId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM items WHERE node_id = ?1 ORDER BY id ASC;")?;
        let ids = stmt
            .query_map([node_id], |row| row.get::<_, ItemId>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn count_unread(&self, node_id: &str) -> RepoResult<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE node_id = ?1 AND read_status = 0;",
            [node_id],
            |row| row.get::<_, i64>(0),
        )?;
        u32::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("unread count out of range: {count}")))
    }
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<Item> {
    let item = Item {
        id: row.get("id")?,
        node_id: row.get("node_id")?,
        source_id: row.get("source_id")?,
        valid_guid: parse_flag(row, "valid_guid")?,
        title: row.get("title")?,
        read_status: parse_flag(row, "read_status")?,
        flag_status: parse_flag(row, "flag_status")?,
        update_status: parse_flag(row, "update_status")?,
        popup_status: parse_flag(row, "popup_status")?,
    };
    item.validate()?;
    Ok(item)
}

fn parse_flag(row: &Row<'_>, column: &'static str) -> RepoResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid {column} value `{other}` in items.{column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
