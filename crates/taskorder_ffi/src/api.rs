//! FFI reorder API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose list projection, drag commit and manual-tree edits to Dart via FRB.
//! - Translate core errors into flat response envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every DB-backed call opens its own connection; no state survives
//!   between calls except the resolved DB path.

use log::warn;
use std::path::PathBuf;
use std::sync::OnceLock;
use taskorder_core::db::open_db;
use taskorder_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    ItemId, ListBackend, ManualOrderService, NewItem, OrderingConfig, ReorderCoordinator,
    SqliteItemRepository, VisualRow,
};
use uuid::Uuid;

const DB_FILE_NAME: &str = "taskorder.sqlite3";
const DB_PATH_ENV: &str = "TASKORDER_DB_PATH";
static DB_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Core crate version.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - Idempotent for the same `level + log_dir`.
/// - Returns empty string on success and an error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// One rendered row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDto {
    pub item_id: i64,
    pub uuid: String,
    pub parent_id: Option<i64>,
    pub indent: i32,
    pub has_children: bool,
}

/// Response envelope carrying the list's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowsResponse {
    pub ok: bool,
    pub rows: Vec<RowDto>,
    pub message: String,
}

/// Response envelope for mutating calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderResponse {
    pub ok: bool,
    /// Item ids whose persisted position changed, ascending.
    pub touched: Vec<i64>,
    /// Rows after the mutation; empty on failure.
    pub rows: Vec<RowDto>,
    pub message: String,
}

impl ReorderResponse {
    fn success(touched: impl IntoIterator<Item = ItemId>, rows: &[VisualRow]) -> Self {
        let touched: Vec<i64> = touched.into_iter().collect();
        Self {
            ok: true,
            message: format!("{} item(s) updated.", touched.len()),
            touched,
            rows: rows.iter().map(to_row_dto).collect(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            touched: Vec::new(),
            rows: Vec::new(),
            message: message.into(),
        }
    }
}

/// Creates a list.
///
/// `backend` is one of `calendar|task_list|manual`. Returns the list UUID or
/// an error message prefixed with `error:`.
#[flutter_rust_bridge::frb(sync)]
pub fn create_list(name: String, backend: String) -> String {
    let Some(backend) = ListBackend::parse(backend.trim()) else {
        return format!("error: unsupported backend `{}`", backend.trim());
    };
    match with_repo(|repo| {
        repo.create_list(name.trim(), backend)
            .map_err(|err| err.to_string())
    }) {
        Ok(list) => list.list_uuid.to_string(),
        Err(err) => format!("error: {err}"),
    }
}

/// Creates one item and positions it per `config_json`.
#[flutter_rust_bridge::frb(sync)]
pub fn create_item(
    list_uuid: String,
    title: String,
    parent_id: Option<i64>,
    config_json: Option<String>,
) -> ReorderResponse {
    let result = with_coordinator(&list_uuid, config_json.as_deref(), |repo, coordinator| {
        let mut request = NewItem::new(coordinator.list().list_uuid, title.trim());
        if let Some(parent_id) = parent_id {
            request = request.with_parent(parent_id);
        }
        let item = repo.create_item(&request).map_err(|err| err.to_string())?;
        coordinator.refresh().map_err(|err| err.to_string())?;
        let mut touched = coordinator
            .place_new_item(item.id)
            .map_err(|err| err.to_string())?;
        touched.insert(item.id);
        Ok(ReorderResponse::success(touched, coordinator.rows()))
    });
    result.unwrap_or_else(|err| ReorderResponse::failure(format!("create_item failed: {err}")))
}

/// Projects a list into display rows.
#[flutter_rust_bridge::frb(sync)]
pub fn list_rows(list_uuid: String) -> RowsResponse {
    match with_coordinator(&list_uuid, None, |_, coordinator| {
        Ok(coordinator.rows().iter().map(to_row_dto).collect::<Vec<_>>())
    }) {
        Ok(rows) => RowsResponse {
            ok: true,
            message: format!("{} row(s).", rows.len()),
            rows,
        },
        Err(err) => RowsResponse {
            ok: false,
            rows: Vec::new(),
            message: format!("list_rows failed: {err}"),
        },
    }
}

/// Applies one completed drag gesture.
///
/// # FFI contract
/// - `indent` is clamped to the backend's bounds before commit.
/// - Drops inside the dragged item's own subtree change nothing.
#[flutter_rust_bridge::frb(sync)]
pub fn commit_move(
    list_uuid: String,
    from_slot: u32,
    to_slot: u32,
    indent: i32,
    config_json: Option<String>,
) -> ReorderResponse {
    let result = with_coordinator(&list_uuid, config_json.as_deref(), |_, coordinator| {
        coordinator.begin_drag();
        coordinator.update_drag(from_slot as usize, to_slot as usize, indent);
        let touched = coordinator.commit_drag().map_err(|err| err.to_string())?;
        Ok(ReorderResponse::success(touched, coordinator.rows()))
    });
    result.unwrap_or_else(|err| ReorderResponse::failure(format!("commit_move failed: {err}")))
}

/// Indents (`delta > 0`) or outdents (`delta < 0`) one item of a manual list.
#[flutter_rust_bridge::frb(sync)]
pub fn manual_indent(list_uuid: String, item_uuid: String, delta: i32) -> ReorderResponse {
    apply_manual_indent(&list_uuid, item_uuid.trim(), delta)
        .unwrap_or_else(|err| ReorderResponse::failure(format!("manual_indent failed: {err}")))
}

fn apply_manual_indent(
    list_uuid: &str,
    item_uuid: &str,
    delta: i32,
) -> Result<ReorderResponse, String> {
    let list_uuid = parse_list_uuid(list_uuid)?;
    with_repo(|repo| {
        let mut service =
            ManualOrderService::load(repo, list_uuid).map_err(|err| err.to_string())?;
        let changed = service
            .indent(item_uuid, delta)
            .map_err(|err| err.to_string())?;
        let coordinator = ReorderCoordinator::load(repo, list_uuid, OrderingConfig::default())
            .map_err(|err| err.to_string())?;
        let touched = coordinator
            .rows()
            .iter()
            .filter(|row| changed && row.uuid == item_uuid)
            .map(|row| row.item_id)
            .collect::<Vec<_>>();
        Ok(ReorderResponse::success(touched, coordinator.rows()))
    })
}

fn resolve_db_path() -> PathBuf {
    DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(DB_FILE_NAME)
        })
        .clone()
}

fn parse_list_uuid(raw: &str) -> Result<Uuid, String> {
    Uuid::parse_str(raw.trim()).map_err(|_| format!("invalid list uuid `{}`", raw.trim()))
}

fn parse_config(raw: Option<&str>) -> Result<OrderingConfig, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(OrderingConfig::default()),
        Some(text) => OrderingConfig::from_json_str(text).map_err(|err| err.to_string()),
    }
}

fn with_repo<T>(
    f: impl FnOnce(&SqliteItemRepository<'_>) -> Result<T, String>,
) -> Result<T, String> {
    let conn = open_db(resolve_db_path()).map_err(|err| format!("DB open failed: {err}"))?;
    let repo =
        SqliteItemRepository::try_new(&conn).map_err(|err| format!("repo init failed: {err}"))?;
    f(&repo)
}

fn with_coordinator<T>(
    list_uuid: &str,
    config_json: Option<&str>,
    f: impl FnOnce(
        &SqliteItemRepository<'_>,
        &mut ReorderCoordinator<'_, SqliteItemRepository<'_>>,
    ) -> Result<T, String>,
) -> Result<T, String> {
    let list_uuid = parse_list_uuid(list_uuid)?;
    let config = parse_config(config_json)?;
    with_repo(|repo| {
        let mut coordinator =
            ReorderCoordinator::load(repo, list_uuid, config).map_err(|err| {
                warn!("event=ffi_load module=ffi status=error error={err}");
                err.to_string()
            })?;
        f(repo, &mut coordinator)
    })
}

fn to_row_dto(row: &VisualRow) -> RowDto {
    RowDto {
        item_id: row.item_id,
        uuid: row.uuid.clone(),
        parent_id: row.parent_id,
        indent: row.indent,
        has_children: row.has_children,
    }
}
