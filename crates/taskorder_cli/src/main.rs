//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `taskorder_core` linkage.
//! - Run one in-memory reorder so engine wiring can be checked without the
//!   Flutter runtime.

use std::process::ExitCode;
use taskorder_core::{
    open_db_in_memory, ListBackend, NewItem, OrderingConfig, ReorderCoordinator,
    SqliteItemRepository,
};

fn main() -> ExitCode {
    println!("taskorder_core ping={}", taskorder_core::ping());
    println!("taskorder_core version={}", taskorder_core::core_version());

    match demo_reorder() {
        Ok(rows) => {
            println!("demo_reorder rows={rows}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("demo_reorder failed: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Creates three calendar items, drags the last one to the top and prints
/// the resulting order.
fn demo_reorder() -> Result<String, Box<dyn std::error::Error>> {
    let conn = open_db_in_memory()?;
    let repo = SqliteItemRepository::try_new(&conn)?;
    let list = repo.create_list("demo", ListBackend::Calendar)?;

    let mut coordinator = ReorderCoordinator::load(&repo, list.list_uuid, OrderingConfig::default())?;
    let mut titles = Vec::new();
    for title in ["alpha", "beta", "gamma"] {
        let item = repo.create_item(&NewItem::new(list.list_uuid, title))?;
        coordinator.place_new_item(item.id)?;
        titles.push((item.id, title));
    }

    coordinator.begin_drag();
    coordinator.update_drag(2, 0, 0);
    coordinator.commit_drag()?;

    let order = coordinator
        .rows()
        .iter()
        .filter_map(|row| {
            titles
                .iter()
                .find(|(id, _)| *id == row.item_id)
                .map(|(_, title)| *title)
        })
        .collect::<Vec<_>>()
        .join(",");
    Ok(order)
}
