//! `pvs live-fields`: the static live-data field map.

use pvs_core::LIVE_FIELDS;

use crate::cli::LiveFieldsArgs;
use crate::error::CliError;

pub fn handle(args: &LiveFieldsArgs) -> Result<(), CliError> {
    if args.json {
        let rows: Vec<_> = LIVE_FIELDS
            .iter()
            .map(|f| {
                serde_json::json!({
                    "wire": f.wire,
                    "name": f.name,
                    "kind": f.kind.to_string(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let width = LIVE_FIELDS.iter().map(|f| f.wire.len()).max().unwrap_or(0);
    for field in &LIVE_FIELDS {
        let kind = field.kind.to_string();
        println!("{:<width$}  {kind:<9}  {}", field.wire, field.name);
    }
    Ok(())
}
