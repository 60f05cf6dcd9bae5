//! `ipactl schema` and `ipactl task-schema`.

use super::helpers::print_json;
use crate::task::task_json_schema;
use anyhow::Result;
use ipa_common::{ObjectSchema, Registry};

pub fn run(object_type: Option<&str>) -> Result<()> {
    let registry = Registry::builtin()?;
    match object_type {
        Some(name) => print_json(registry.get(name)?),
        None => {
            for schema in registry.iter() {
                println!("{}", summary_line(schema));
            }
            Ok(())
        }
    }
}

pub fn run_task_schema() -> Result<()> {
    print_json(&task_json_schema())
}

/// `name  identity=a,b  attributes=N`
fn summary_line(schema: &ObjectSchema) -> String {
    let managed = schema.attributes().iter().filter(|a| !a.identity).count();
    format!(
        "{:<10} identity={}  attributes={}",
        schema.name(),
        schema.identity_keys().join(","),
        managed
    )
}
