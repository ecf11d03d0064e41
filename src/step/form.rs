//! The Step form: a JSON list of `{ "kind", "params", "body" }` objects.

use super::fields::FieldType;
use super::kind::Kind;
use super::schema::{Bodies, FieldMap, Step, StepKind, extra_fields};
use crate::error::CompileError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Serialize, Deserialize)]
struct RawStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    kind: String,
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    body: Vec<RawStep>,
    #[serde(default, alias = "else", skip_serializing_if = "Vec::is_empty")]
    else_body: Vec<RawStep>,
    #[serde(default, skip_serializing_if = "is_false")]
    detached: bool,
}

fn is_false(flag: &bool) -> bool {
    !flag
}

/// Parses a Step form document. The root is either a list of steps or an
/// object with a `steps` list. Steps without an `id` get a positional one.
pub fn parse_steps(json: &str) -> Result<Vec<Step>, CompileError> {
    let document: Value = serde_json::from_str(json)
        .map_err(|e| CompileError::MalformedDocument(format!("invalid JSON: {}", e)))?;

    let list = match document {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut object) => object.remove("steps").ok_or_else(|| {
            CompileError::MalformedDocument("expected a list of steps".to_string())
        })?,
        _ => {
            return Err(CompileError::MalformedDocument(
                "expected a list of steps".to_string(),
            ));
        }
    };

    let raw: Vec<RawStep> = serde_json::from_value(list)
        .map_err(|e| CompileError::MalformedDocument(format!("invalid step object: {}", e)))?;

    let mut counter = 0;
    convert_list(raw, &mut counter)
}

fn convert_list(raw: Vec<RawStep>, counter: &mut usize) -> Result<Vec<Step>, CompileError> {
    raw.into_iter()
        .map(|step| convert_step(step, counter))
        .collect()
}

fn convert_step(raw: RawStep, counter: &mut usize) -> Result<Step, CompileError> {
    *counter += 1;
    let id = raw.id.unwrap_or_else(|| format!("step-{}", counter));

    let kind = Kind::from_tag(&raw.kind).ok_or_else(|| CompileError::UnknownKind {
        element_id: id.clone(),
        kind: raw.kind.clone(),
    })?;

    if !kind.is_container() && !(raw.body.is_empty() && raw.else_body.is_empty()) {
        return Err(CompileError::InvalidField {
            element_id: id,
            field: "body".to_string(),
            message: format!("'{}' steps cannot have a body", kind),
        });
    }

    let mut fields = FieldMap::new();
    for (key, value) in raw.params {
        if let Some(text) = param_to_text(&id, &key, value)? {
            fields.insert(key, text);
        }
    }

    let bodies = Bodies {
        body: convert_list(raw.body, counter)?,
        else_body: convert_list(raw.else_body, counter)?,
    };
    let step_kind = StepKind::from_fields(kind, &id, &fields, bodies, false)?;
    let extra = extra_fields(kind, &fields);
    Ok(Step::new(id, step_kind)
        .with_extra(extra)
        .detached(raw.detached))
}

fn param_to_text(id: &str, key: &str, value: Value) -> Result<Option<String>, CompileError> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => {
            let parts = items
                .into_iter()
                .map(|item| param_to_text(id, key, item).map(Option::unwrap_or_default))
                .collect::<Result<Vec<_>, _>>()?;
            parts.join(",")
        }
        Value::Object(_) => {
            return Err(CompileError::InvalidField {
                element_id: id.to_string(),
                field: key.to_string(),
                message: "nested objects are not valid parameter values".to_string(),
            });
        }
    };
    Ok(Some(text))
}

/// Serializes steps back into the Step form (pretty-printed JSON).
pub fn steps_to_json(steps: &[Step]) -> String {
    let raw: Vec<RawStep> = steps.iter().map(to_raw).collect();
    // A Vec of plain structs with string keys cannot fail to serialize.
    serde_json::to_string_pretty(&raw).unwrap_or_else(|_| "[]".to_string())
}

fn to_raw(step: &Step) -> RawStep {
    let kind = step.kind_tag();
    let params = step
        .all_fields()
        .into_iter()
        .map(|(key, raw)| {
            let ty = kind.field(&key).map_or(FieldType::Text, |spec| spec.ty);
            let value = ty.to_json(&raw);
            (key, value)
        })
        .collect();
    let (body, else_body) = step.kind.bodies();
    RawStep {
        id: Some(step.id.clone()),
        kind: kind.as_str().to_string(),
        params,
        body: body.iter().map(to_raw).collect(),
        else_body: else_body.iter().map(to_raw).collect(),
        detached: step.detached,
    }
}
