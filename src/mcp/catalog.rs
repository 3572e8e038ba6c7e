use crate::errors::{ErrorCode, McpError};
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

static TOOL_CATALOG: Lazy<Vec<ToolDef>> = Lazy::new(|| {
    let raw = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tool_catalog.json"));
    serde_json::from_str(raw).expect("tool_catalog.json must be valid JSON")
});

static TOOL_VALIDATORS: Lazy<HashMap<String, JSONSchema>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for tool in TOOL_CATALOG.iter() {
        if let Ok(schema) = JSONSchema::compile(&tool.input_schema) {
            map.insert(tool.name.clone(), schema);
        }
    }
    map
});

pub fn tool_catalog() -> &'static Vec<ToolDef> {
    &TOOL_CATALOG
}

pub fn tool_by_name(name: &str) -> Option<&'static ToolDef> {
    TOOL_CATALOG.iter().find(|tool| tool.name == name)
}

/// Missing or `null` arguments mean "no arguments".
pub fn normalize_args(args: Option<Value>) -> Value {
    match args {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(other) => other,
    }
}

pub fn validate_tool_args(tool_name: &str, args: &Value) -> Result<(), McpError> {
    let Some(schema) = TOOL_VALIDATORS.get(tool_name) else {
        return Ok(());
    };
    if let Err(errors) = schema.validate(args) {
        let rendered: Vec<String> = errors.take(10).map(describe_error).collect();
        let mut lines = vec![format!("Invalid arguments for {}", tool_name)];
        lines.extend(rendered.iter().map(|line| format!("- {}", line)));
        return Err(McpError::new(ErrorCode::InvalidParams, lines.join("\n")));
    }
    Ok(())
}

fn describe_error(err: jsonschema::ValidationError<'_>) -> String {
    let instance_path = if err.instance_path.to_string().is_empty() {
        "(root)".to_string()
    } else {
        err.instance_path.to_string()
    };
    match &err.kind {
        jsonschema::error::ValidationErrorKind::AdditionalProperties { unexpected } => {
            let names: Vec<String> = unexpected.iter().map(|u| format!("'{}'", u)).collect();
            format!(
                "{}: unknown field {} (this tool takes no arguments)",
                instance_path,
                names.join(", ")
            )
        }
        jsonschema::error::ValidationErrorKind::Type { kind } => {
            format!("{}: expected {}", instance_path, format_type_kind(kind))
        }
        _ => format!("{}: {}", instance_path, err),
    }
}

fn format_type_kind(kind: &jsonschema::error::TypeKind) -> String {
    match kind {
        jsonschema::error::TypeKind::Single(primitive) => primitive.to_string(),
        jsonschema::error::TypeKind::Multiple(types) => {
            let list: Vec<String> = (*types).into_iter().map(|t| t.to_string()).collect();
            if list.is_empty() {
                "unknown".to_string()
            } else {
                list.join(" | ")
            }
        }
    }
}
