//! Banks command - list the statement formats that can be imported

use anyhow::Result;

use super::get_context;
use crate::output::create_table;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context("banks")?;
    let banks = ctx.registry.banks();

    if json {
        let list: Vec<_> = banks
            .iter()
            .map(|(id, name)| serde_json::json!({"bankId": id, "displayName": name}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["Bank ID", "Name"]);
    for (id, name) in banks {
        table.add_row(vec![id, name]);
    }
    println!("{}", table);
    Ok(())
}
