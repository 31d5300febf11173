//! Saved search index contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist saved search definitions and their item memberships.
//! - Re-evaluate one item against one saved search on demand.
//!
//! # Invariants
//! - Every cached folder was compiled successfully before it is used.
//! - Membership rows exist only for items that currently match.

use crate::model::item::{Item, ItemId};
use crate::model::search_folder::{
    CompiledSearchFolder, SearchFolder, SearchFolderId, SearchRule,
};
use crate::repo::item_repo::{bool_to_int, RepoError, RepoResult};
use log::debug;
use rusqlite::{params, Connection};

/// Saved search index consumed by state propagation.
pub trait SavedSearchIndex {
    /// Ids of every saved search, in creation order.
    fn search_folder_ids(&self) -> Vec<SearchFolderId>;
    /// Adds or removes `item` from one saved search according to its rules.
    ///
    /// Returns whether the item is a member afterwards.
    fn recheck_membership(&self, folder_id: SearchFolderId, item: &Item) -> RepoResult<bool>;
}

impl<S: SavedSearchIndex + ?Sized> SavedSearchIndex for &S {
    fn search_folder_ids(&self) -> Vec<SearchFolderId> {
        (**self).search_folder_ids()
    }

    fn recheck_membership(&self, folder_id: SearchFolderId, item: &Item) -> RepoResult<bool> {
        (**self).recheck_membership(folder_id, item)
    }
}

/// SQLite-backed saved search index with compiled rules cached in memory.
pub struct SqliteSearchFolderIndex<'conn> {
    conn: &'conn Connection,
    folders: Vec<CompiledSearchFolder>,
}

impl<'conn> SqliteSearchFolderIndex<'conn> {
    /// Loads and compiles every persisted saved search.
    ///
    /// # Errors
    /// - `RepoError::InvalidData` when stored rules are not valid JSON.
    /// - `RepoError::InvalidRule` when a stored rule no longer compiles.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let folders = load_folders(conn)?
            .iter()
            .map(SearchFolder::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { conn, folders })
    }

    /// Persists a new saved search. Existing items are not back-filled.
    pub fn create_folder(
        &mut self,
        name: &str,
        rules: Vec<SearchRule>,
        match_all: bool,
    ) -> RepoResult<SearchFolder> {
        let mut folder = SearchFolder {
            id: 0,
            name: name.trim().to_string(),
            rules,
            match_all,
        };
        folder.compile()?;
        let rules_json = serde_json::to_string(&folder.rules)
            .map_err(|err| RepoError::InvalidData(format!("cannot encode rules: {err}")))?;

        self.conn.execute(
            "INSERT INTO search_folders (name, rules_json, match_all) VALUES (?1, ?2, ?3);",
            params![folder.name.as_str(), rules_json, bool_to_int(match_all)],
        )?;
        folder.id = self.conn.last_insert_rowid();

        self.folders.push(folder.compile()?);
        Ok(folder)
    }

    /// Lists member item ids of one saved search.
    pub fn list_members(&self, folder_id: SearchFolderId) -> RepoResult<Vec<ItemId>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id FROM search_folder_items
             WHERE folder_id = ?1
             ORDER BY item_id ASC;",
        )?;
        let ids = stmt
            .query_map([folder_id], |row| row.get::<_, ItemId>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn folder(&self, folder_id: SearchFolderId) -> Option<&CompiledSearchFolder> {
        self.folders.iter().find(|folder| folder.id() == folder_id)
    }
}

impl SavedSearchIndex for SqliteSearchFolderIndex<'_> {
    fn search_folder_ids(&self) -> Vec<SearchFolderId> {
        self.folders.iter().map(CompiledSearchFolder::id).collect()
    }

    fn recheck_membership(&self, folder_id: SearchFolderId, item: &Item) -> RepoResult<bool> {
        let Some(folder) = self.folder(folder_id) else {
            debug!(
                "event=search_recheck module=search status=skipped reason=unknown_folder folder_id={folder_id}"
            );
            return Ok(false);
        };

        let is_member = folder.matches(item);
        if is_member {
            self.conn.execute(
                "INSERT OR IGNORE INTO search_folder_items (folder_id, item_id) VALUES (?1, ?2);",
                params![folder_id, item.id],
            )?;
        } else {
            self.conn.execute(
                "DELETE FROM search_folder_items WHERE folder_id = ?1 AND item_id = ?2;",
                params![folder_id, item.id],
            )?;
        }
        Ok(is_member)
    }
}

fn load_folders(conn: &Connection) -> RepoResult<Vec<SearchFolder>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, rules_json, match_all FROM search_folders ORDER BY id ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut folders = Vec::new();

    while let Some(row) = rows.next()? {
        let id: SearchFolderId = row.get(0)?;
        let rules_json: String = row.get(2)?;
        let rules: Vec<SearchRule> = serde_json::from_str(&rules_json).map_err(|err| {
            RepoError::InvalidData(format!(
                "invalid rules_json for search folder {id}: {err}"
            ))
        })?;
        folders.push(SearchFolder {
            id,
            name: row.get(1)?,
            rules,
            match_all: row.get::<_, i64>(3)? == 1,
        });
    }

    Ok(folders)
}
