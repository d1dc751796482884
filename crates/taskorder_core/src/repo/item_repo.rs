//! Item store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Define the narrow read/write contracts the ordering engine consumes.
//! - Keep SQL details and row parsing inside the repository boundary.
//!
//! # Invariants
//! - Only active (`is_deleted=0`) items are returned by domain queries.
//! - Domain listing is deterministic: effective key ASC, id ASC.
//! - Writes never open their own transaction; callers wrap multi-step
//!   operations with [`Transactional::transaction`].

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::item::{
    Item, ItemId, ListBackend, ListId, OrderDomain, TaskList, APPLE_EPOCH_MS,
};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const ITEM_SELECT_SQL: &str = "SELECT
    id,
    uuid,
    list_uuid,
    parent_id,
    title,
    sort_order,
    is_completed,
    is_deleted,
    created_at,
    updated_at
FROM items";

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from item store operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target list does not exist.
    ListNotFound(ListId),
    /// Target item does not exist.
    ItemNotFound(ItemId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ListNotFound(id) => write!(f, "task list not found: {id}"),
            Self::ItemNotFound(id) => write!(f, "item not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "item repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted item data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
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

/// Read side of the item store.
pub trait ItemQuery {
    /// Loads one item by row id, deleted or not.
    fn fetch(&self, id: ItemId) -> RepoResult<Option<Item>>;
    /// Loads one item by its global identifier, deleted or not.
    fn fetch_by_uuid(&self, uuid: &str) -> RepoResult<Option<Item>>;
    /// Loads one list.
    fn fetch_list(&self, list_uuid: ListId) -> RepoResult<Option<TaskList>>;
    /// Active members of one domain ordered by effective key, then id.
    fn active_children_of(&self, domain: &OrderDomain) -> RepoResult<Vec<Item>>;
    /// Global identifiers of all active items in a list, oldest first.
    fn active_identifiers(&self, list_uuid: ListId) -> RepoResult<Vec<String>>;
}

/// Write side of the item store.
pub trait OrderWriter {
    fn write_key(&self, id: ItemId, key: Option<i64>) -> RepoResult<()>;
    fn write_parent(&self, id: ItemId, parent_id: Option<ItemId>) -> RepoResult<()>;
    /// Bumps the modification timestamp so sync picks the rows up.
    fn touch_modified(&self, ids: &[ItemId]) -> RepoResult<()>;
    fn write_serialized_tree(&self, list_uuid: ListId, text: &str) -> RepoResult<()>;
}

/// Legacy manual-ordering blob storage.
pub trait TreeBlobStore {
    /// Returns `None` when the list has never stored a tree.
    fn load_serialized_tree(&self, list_uuid: ListId) -> RepoResult<Option<String>>;
}

/// Atomic unit of work over the item store.
pub trait Transactional {
    /// Runs `f` so that either all of its writes land or none do.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RepoError>;
}

/// Everything the ordering engine needs from storage.
pub trait ItemStore: ItemQuery + OrderWriter + TreeBlobStore + Transactional {}

impl<T> ItemStore for T where T: ItemQuery + OrderWriter + TreeBlobStore + Transactional + ?Sized {}

/// Insert request for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub list_uuid: ListId,
    pub parent_id: Option<ItemId>,
    pub title: String,
    pub sort_order: Option<i64>,
    /// Epoch ms; defaults to the current time.
    pub created_at: Option<i64>,
}

impl NewItem {
    pub fn new(list_uuid: ListId, title: impl Into<String>) -> Self {
        Self {
            list_uuid,
            parent_id: None,
            title: title.into(),
            sort_order: None,
            created_at: None,
        }
    }

    pub fn with_parent(mut self, parent_id: ItemId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_order(mut self, sort_order: i64) -> Self {
        self.sort_order = Some(sort_order);
        self
    }

    pub fn created_at(mut self, created_at: i64) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// SQLite-backed item store.
pub struct SqliteItemRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteItemRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Creates one task list.
    pub fn create_list(&self, name: &str, backend: ListBackend) -> RepoResult<TaskList> {
        let list_uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO task_lists (list_uuid, name, backend) VALUES (?1, ?2, ?3);",
            params![list_uuid.to_string(), name, backend.as_str()],
        )?;
        Ok(TaskList {
            list_uuid,
            name: name.to_string(),
            backend,
        })
    }

    /// Inserts one item without assigning a position.
    ///
    /// Positioning is a separate step owned by the ordering engine.
    pub fn create_item(&self, request: &NewItem) -> RepoResult<Item> {
        if self.fetch_list(request.list_uuid)?.is_none() {
            return Err(RepoError::ListNotFound(request.list_uuid));
        }
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO items (
                uuid,
                list_uuid,
                parent_id,
                title,
                sort_order,
                created_at,
                updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                COALESCE(?6, strftime('%s', 'now') * 1000),
                COALESCE(?6, strftime('%s', 'now') * 1000)
            );",
            params![
                uuid,
                request.list_uuid.to_string(),
                request.parent_id,
                request.title.as_str(),
                request.sort_order,
                request.created_at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.fetch(id)?.ok_or(RepoError::ItemNotFound(id))
    }

    /// Soft-deletes one item.
    pub fn soft_delete_item(&self, id: ItemId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE items
             SET is_deleted = 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND is_deleted = 0;",
            [id],
        )?;
        if changed == 0 {
            return Err(RepoError::ItemNotFound(id));
        }
        Ok(())
    }

    /// Marks one item completed or not.
    pub fn set_completed(&self, id: ItemId, completed: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE items
             SET is_completed = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id, bool_to_int(completed)],
        )?;
        if changed == 0 {
            return Err(RepoError::ItemNotFound(id));
        }
        Ok(())
    }
}

impl ItemQuery for SqliteItemRepository<'_> {
    fn fetch(&self, id: ItemId) -> RepoResult<Option<Item>> {
        let sql = format!("{ITEM_SELECT_SQL} WHERE id = ?1;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_item_row(row)?)),
            None => Ok(None),
        }
    }

    fn fetch_by_uuid(&self, uuid: &str) -> RepoResult<Option<Item>> {
        let sql = format!("{ITEM_SELECT_SQL} WHERE uuid = ?1;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([uuid])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_item_row(row)?)),
            None => Ok(None),
        }
    }

    fn fetch_list(&self, list_uuid: ListId) -> RepoResult<Option<TaskList>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT name, backend FROM task_lists WHERE list_uuid = ?1;",
                [list_uuid.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((name, backend)) = row else {
            return Ok(None);
        };
        let backend = ListBackend::parse(&backend).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid backend `{backend}` in task_lists.backend"))
        })?;
        Ok(Some(TaskList {
            list_uuid,
            name,
            backend,
        }))
    }

    fn active_children_of(&self, domain: &OrderDomain) -> RepoResult<Vec<Item>> {
        let sql = format!(
            "{ITEM_SELECT_SQL}
             WHERE list_uuid = ?1
               AND parent_id IS ?2
               AND is_deleted = 0
             ORDER BY IFNULL(sort_order, (created_at - {APPLE_EPOCH_MS}) / 1000) ASC, id ASC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![domain.list_uuid.to_string(), domain.parent_id])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }
        Ok(items)
    }

    fn active_identifiers(&self, list_uuid: ListId) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid
             FROM items
             WHERE list_uuid = ?1
               AND is_deleted = 0
             ORDER BY created_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query([list_uuid.to_string()])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }
}

impl OrderWriter for SqliteItemRepository<'_> {
    fn write_key(&self, id: ItemId, key: Option<i64>) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE items SET sort_order = ?2 WHERE id = ?1;",
            params![id, key],
        )?;
        Ok(())
    }

    fn write_parent(&self, id: ItemId, parent_id: Option<ItemId>) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE items SET parent_id = ?2 WHERE id = ?1;",
            params![id, parent_id],
        )?;
        Ok(())
    }

    fn touch_modified(&self, ids: &[ItemId]) -> RepoResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE items
             SET updated_at = MAX(updated_at + 1, strftime('%s', 'now') * 1000)
             WHERE id IN ({placeholders});"
        );
        self.conn.execute(&sql, params_from_iter(ids.iter()))?;
        Ok(())
    }

    fn write_serialized_tree(&self, list_uuid: ListId, text: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE task_lists
             SET serialized_tree = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE list_uuid = ?1;",
            params![list_uuid.to_string(), text],
        )?;
        if changed == 0 {
            return Err(RepoError::ListNotFound(list_uuid));
        }
        Ok(())
    }
}

impl TreeBlobStore for SqliteItemRepository<'_> {
    fn load_serialized_tree(&self, list_uuid: ListId) -> RepoResult<Option<String>> {
        let value: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT serialized_tree FROM task_lists WHERE list_uuid = ?1;",
                [list_uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.flatten())
    }
}

impl Transactional for SqliteItemRepository<'_> {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RepoError>,
    {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|err| E::from(RepoError::from(err)))?;
        // Dropping `tx` on the error path rolls every write back.
        let value = f()?;
        tx.commit().map_err(|err| E::from(RepoError::from(err)))?;
        Ok(value)
    }
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<Item> {
    let list_text: String = row.get("list_uuid")?;
    let list_uuid = Uuid::parse_str(&list_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid `{list_text}` in items.list_uuid"))
    })?;

    Ok(Item {
        id: row.get("id")?,
        uuid: row.get("uuid")?,
        list_uuid,
        parent_id: row.get("parent_id")?,
        title: row.get("title")?,
        sort_order: row.get("sort_order")?,
        is_completed: parse_flag(row.get("is_completed")?, "items.is_completed")?,
        is_deleted: parse_flag(row.get("is_deleted")?, "items.is_deleted")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_flag(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}
