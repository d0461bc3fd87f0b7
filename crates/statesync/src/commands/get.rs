use serde_json::Value;
use tabled::Tabled;

use statesync_config::Config;
use statesync_core::{ObjectStorage, RawJson};

use crate::cli::{GetArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn detail(value: &Value) -> String {
    match value {
        Value::Object(fields) => {
            let rows: Vec<FieldRow> = fields
                .iter()
                .map(|(field, value)| FieldRow {
                    field: field.clone(),
                    value: output::display_value(value),
                })
                .collect();
            output::render_table(&rows)
        }
        other => output::display_value(other),
    }
}

pub async fn handle(args: GetArgs, global: &GlobalOpts, config: &Config) -> Result<(), CliError> {
    let connection = super::connect(global, config)?;
    let path = super::parse_path("path", &args.path)?;

    let document = ObjectStorage::open(&connection, &path, RawJson).await?;
    let current = document.current();
    let resolved = document.path().to_string();
    document.close();
    connection.shutdown();

    let value = current.ok_or(CliError::NotFound { path: resolved })?;
    let out = output::render_single(&global.output, value.as_ref(), detail, |v| v.to_string())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
