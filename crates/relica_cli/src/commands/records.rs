//! Record commands.

use super::{parse_conditions, CommandResult, StoreArgs};
use relica_storage::Record;
use serde_json::{Map, Value};
use tracing::info;

/// Inserts or replaces a record from a JSON object of fields.
pub fn put(store: &StoreArgs, id: &str, fields: &str) -> CommandResult<()> {
    let fields: Map<String, Value> = match serde_json::from_str(fields)? {
        Value::Object(map) => map,
        other => return Err(format!("Fields must be a JSON object, got {other}").into()),
    };

    let model = store.open_model()?;
    let record = fields
        .into_iter()
        .fold(Record::new(id), |record, (name, value)| record.with_field(name, value));
    let saved = model.upsert(record)?;

    info!(model = model.model_name(), id = %saved.id, "record saved");
    println!("{}", serde_json::to_string(&saved.to_value())?);
    Ok(())
}

/// Deletes a record.
pub fn delete(store: &StoreArgs, id: &str) -> CommandResult<()> {
    let model = store.open_model()?;
    if model.destroy_by_id(id)? {
        println!("✓ Deleted {id}");
    } else {
        println!("No record {id}");
    }
    Ok(())
}

/// Lists records.
pub fn list(store: &StoreArgs, conditions: &[String], format: &str) -> CommandResult<()> {
    let model = store.open_model()?;
    let records = model.find(&parse_conditions(conditions)?)?;

    if format == "json" {
        let values: Vec<Value> = records.iter().map(Record::to_value).collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
    } else {
        for record in &records {
            println!("{}", record.to_value());
        }
        println!("({} records)", records.len());
    }
    Ok(())
}
