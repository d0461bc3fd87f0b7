use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::path::Path as FsPath;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabled::Tabled;

use statesync_config::Config;
use statesync_core::{
    Change, CollectionProjection, CoreError, FnListener, KeyValueStorage, ProjectionMode,
    RawJson, StringKey,
};

use crate::cli::{GlobalOpts, ModeArg, OutputFormat, ReplayArgs};
use crate::error::CliError;
use crate::output;

// ── Script ───────────────────────────────────────────────────────────

/// One scripted write. A missing or null `value` deletes.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum Step {
    /// Goes through the adapter's `write`, relative to the collection.
    Key {
        key: String,
        #[serde(default)]
        value: Value,
    },
    /// Goes straight to the store, relative to the namespace.
    Path {
        path: String,
        #[serde(default)]
        value: Value,
    },
}

fn parse_script(body: &str) -> Result<Vec<Step>, CliError> {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|err| CliError::Script {
                line: idx + 1,
                reason: err.to_string(),
            })
        })
        .collect()
}

fn load_script(file: &FsPath) -> Result<Vec<Step>, CliError> {
    parse_script(&std::fs::read_to_string(file)?)
}

// ── Report ───────────────────────────────────────────────────────────

/// A dispatched change; step 0 is the initial snapshot.
#[derive(Debug, Serialize)]
struct ChangeRecord {
    step: usize,
    kind: &'static str,
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new: Option<Value>,
}

impl ChangeRecord {
    fn new(step: usize, change: &Change<'_, String, Value>) -> Self {
        let (old, new) = match change {
            Change::Created { value, .. } => (None, Some((*value).clone())),
            Change::Updated { old, new, .. } => (Some((*old).clone()), Some((*new).clone())),
            Change::Deleted { old, .. } => (Some((*old).clone()), None),
        };
        Self {
            step,
            kind: change.kind(),
            key: change.key().clone(),
            old,
            new,
        }
    }

    fn line(&self, color: bool) -> String {
        let kind = output::paint_kind(self.kind, color);
        match (&self.old, &self.new) {
            (Some(old), Some(new)) => format!("{kind} {} {old} -> {new}", self.key),
            (_, Some(value)) | (Some(value), None) => format!("{kind} {} {value}", self.key),
            (None, None) => format!("{kind} {}", self.key),
        }
    }
}

#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Step")]
    step: usize,
    #[tabled(rename = "Change")]
    kind: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Old")]
    old: String,
    #[tabled(rename = "New")]
    new: String,
}

impl From<&ChangeRecord> for ChangeRow {
    fn from(record: &ChangeRecord) -> Self {
        let show = |v: &Option<Value>| v.as_ref().map(output::display_value).unwrap_or_default();
        Self {
            step: record.step,
            kind: record.kind.to_owned(),
            key: record.key.clone(),
            old: show(&record.old),
            new: show(&record.new),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct ItemRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value", display_with = "output::display_value")]
    value: Value,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    changes: Vec<ChangeRecord>,
    items: Vec<ItemRow>,
}

fn render(report: &ReplayReport, format: &OutputFormat, color: bool) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            let changes: Vec<ChangeRow> = report.changes.iter().map(ChangeRow::from).collect();
            Ok(format!(
                "{}\n\n{}",
                output::render_table(&changes),
                output::render_table(&report.items)
            ))
        }
        OutputFormat::Plain => {
            let mut lines: Vec<String> = report.changes.iter().map(|c| c.line(color)).collect();
            lines.push(String::new());
            lines.extend(
                report
                    .items
                    .iter()
                    .map(|item| format!("{}\t{}", item.key, item.value)),
            );
            Ok(lines.join("\n"))
        }
        structured => output::render_single(structured, report, |_| String::new(), |_| String::new()),
    }
}

// ── Ordering ─────────────────────────────────────────────────────────

/// `"/a/b"` is a JSON pointer, anything else a top-level field name.
fn field<'v>(value: &'v Value, name: &str) -> Option<&'v Value> {
    if name.starts_with('/') {
        value.pointer(name)
    } else {
        value.get(name)
    }
}

/// Total order over JSON values: missing and null first, then booleans,
/// numbers, strings, arrays and objects.
fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or_default()
                .total_cmp(&y.as_f64().unwrap_or_default()),
        },
        _ => rank(a).cmp(&rank(b)),
    }
}

fn projection_mode(mode: ModeArg) -> ProjectionMode {
    match mode {
        ModeArg::Rebuild => ProjectionMode::Rebuild,
        ModeArg::Incremental => ProjectionMode::Incremental,
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(
    args: ReplayArgs,
    global: &GlobalOpts,
    config: &Config,
) -> Result<(), CliError> {
    let steps = load_script(&args.script)?;
    let connection = super::connect(global, config)?;
    let base = super::parse_path("collection", &args.collection)?;

    let storage = KeyValueStorage::new(&connection, &base, StringKey, RawJson);
    let step = Rc::new(Cell::new(0));
    let changes = Rc::new(RefCell::new(Vec::new()));
    let _recording = {
        let step = Rc::clone(&step);
        let changes = Rc::clone(&changes);
        storage.subscribe(FnListener(move |change: Change<'_, String, Value>| {
            changes
                .borrow_mut()
                .push(ChangeRecord::new(step.get(), &change));
        }))
    };
    storage.start().await?;

    let mut builder = CollectionProjection::builder().mode(projection_mode(args.mode));
    if let Some(name) = args.sort {
        let desc = args.desc;
        builder = builder.sort_by(move |a: &Value, b: &Value| {
            let order = compare_json(field(a, &name), field(b, &name));
            if desc { order.reverse() } else { order }
        });
    }
    let projection = builder.attach(&storage);

    for (idx, next) in steps.into_iter().enumerate() {
        step.set(idx + 1);
        match next {
            Step::Key { key, value } if value.is_null() => storage.delete(&key).await?,
            Step::Key { key, value } => storage.write(&key, Some(&value)).await?,
            Step::Path { path, value } => {
                let target = connection.resolve(&super::parse_path("path", &path)?);
                connection
                    .store()
                    .set(&target, value)
                    .await
                    .map_err(CoreError::from)?;
            }
        }
        let applied = storage.pump();
        tracing::debug!(step = idx + 1, applied, "replayed step");
    }

    let items = projection
        .get()
        .iter()
        .map(|(key, value)| ItemRow {
            key: key.clone(),
            value: value.as_ref().clone(),
        })
        .collect();
    projection.detach();
    storage.close();
    connection.shutdown();

    let report = ReplayReport {
        changes: changes.take(),
        items,
    };
    let out = render(&report, &global.output, output::should_color(&global.color))?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn script_lines_parse_into_steps() {
        let steps = parse_script(
            "{\"key\": \"a\", \"value\": 1}\n\n{\"key\": \"b\"}\n{\"path\": \"x/y\", \"value\": null}\n",
        )
        .unwrap();
        assert_eq!(
            steps,
            [
                Step::Key {
                    key: "a".into(),
                    value: json!(1)
                },
                Step::Key {
                    key: "b".into(),
                    value: Value::Null
                },
                Step::Path {
                    path: "x/y".into(),
                    value: Value::Null
                },
            ]
        );
    }

    #[test]
    fn bad_line_reports_its_number() {
        let err = parse_script("{\"key\": \"a\"}\n{\"value\": 1}\n").unwrap_err();
        assert!(matches!(err, CliError::Script { line: 2, .. }), "{err}");
    }

    #[test]
    fn json_order_ranks_types_then_values() {
        let mut values = vec![json!("b"), json!(10), Value::Null, json!(2), json!("a"), json!(true)];
        values.sort_by(|a, b| compare_json(Some(a), Some(b)));
        assert_eq!(
            values,
            [Value::Null, json!(true), json!(2), json!(10), json!("a"), json!("b")]
        );
        assert_eq!(compare_json(None, Some(&json!(0))), Ordering::Less);
        assert_eq!(compare_json(Some(&json!(1.5)), Some(&json!(1))), Ordering::Greater);
    }

    #[test]
    fn fields_resolve_by_name_or_pointer() {
        let value = json!({"score": 3, "stats": {"wins": 2}});
        assert_eq!(field(&value, "score"), Some(&json!(3)));
        assert_eq!(field(&value, "/stats/wins"), Some(&json!(2)));
        assert_eq!(field(&value, "missing"), None);
    }

    #[test]
    fn plain_report_lists_changes_then_items() {
        let report = ReplayReport {
            changes: vec![ChangeRecord {
                step: 1,
                kind: "update",
                key: "a".into(),
                old: Some(json!(1)),
                new: Some(json!(2)),
            }],
            items: vec![ItemRow {
                key: "a".into(),
                value: json!(2),
            }],
        };
        let out = render(&report, &OutputFormat::Plain, false).unwrap();
        assert_eq!(out, "update a 1 -> 2\n\na\t2");
    }
}
