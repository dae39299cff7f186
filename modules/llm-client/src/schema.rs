use schemars::{schema_for, JsonSchema};

/// Types whose JSON schema is shipped to a model alongside the prompt.
///
/// Automatically implemented for any type that implements [`JsonSchema`].
pub trait StructuredOutput: JsonSchema {
    /// Generate the schema in the strict form chat models follow most
    /// reliably:
    /// 1. `additionalProperties: false` on all object schemas
    /// 2. ALL properties listed in `required`
    /// 3. Fully inlined (no `$ref` references)
    fn output_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        let definitions = value
            .get("definitions")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        inline_refs(&mut value, &definitions);
        tighten_objects(&mut value);

        if let serde_json::Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }
}

impl<T: JsonSchema> StructuredOutput for T {}

fn inline_refs(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    if let Some(resolved) = resolve_ref(value, definitions) {
        *value = resolved;
        inline_refs(value, definitions);
        return;
    }
    match value {
        serde_json::Value::Object(map) => {
            for v in map.values_mut() {
                inline_refs(v, definitions);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}

fn resolve_ref(
    value: &serde_json::Value,
    definitions: &serde_json::Value,
) -> Option<serde_json::Value> {
    let name = value.get("$ref")?.as_str()?.strip_prefix("#/definitions/")?;
    definitions.get(name).cloned()
}

fn tighten_objects(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if map.get("type").and_then(|t| t.as_str()) == Some("object") {
                map.insert(
                    "additionalProperties".to_string(),
                    serde_json::Value::Bool(false),
                );
                let required: Option<Vec<serde_json::Value>> = match map.get("properties") {
                    Some(serde_json::Value::Object(props)) => Some(
                        props
                            .keys()
                            .cloned()
                            .map(serde_json::Value::String)
                            .collect(),
                    ),
                    _ => None,
                };
                if let Some(required) = required {
                    map.insert("required".to_string(), serde_json::Value::Array(required));
                }
            }
            for v in map.values_mut() {
                tighten_objects(v);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                tighten_objects(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Inner {
        detail: String,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Reply {
        name: String,
        items: Vec<Inner>,
    }

    #[test]
    fn schemas_are_strict_and_fully_inlined() {
        let schema = Reply::output_schema();

        assert_eq!(schema["additionalProperties"], serde_json::json!(false));
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "name"));
        assert!(required.iter().any(|v| v == "items"));
        assert!(schema.get("definitions").is_none());
        assert!(schema.get("$schema").is_none());

        // the Inner definition was inlined into the array item schema
        let item = &schema["properties"]["items"]["items"];
        assert!(item.get("$ref").is_none());
        assert_eq!(
            item["properties"]["detail"]["type"],
            serde_json::json!("string")
        );
        assert_eq!(item["additionalProperties"], serde_json::json!(false));
    }
}
