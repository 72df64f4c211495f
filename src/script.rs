//! The boundary between host objects and script-land.
//!
//! Only two shapes cross it: the request, marshaled into Lua as userdata
//! with accessor methods, and the handler's return table, read back
//! field-by-field. Arbitrary `content` values are deep-converted to JSON
//! with unsupported kinds mapped to null.

use mlua::{UserData, UserDataMethods, Value};
use serde_json::{Map, Number};

use crate::http::Request;

/// Deep-convert a Lua value into a JSON value.
///
/// Booleans, integers, floats, strings and tables map directly; everything
/// else (nil, functions, threads, userdata, non-finite floats) becomes null.
/// Tables always become JSON objects, with keys coerced to strings.
pub fn lua_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::Number(Number::from(*i)),
        Value::Number(n) => Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.to_string_lossy().to_string()),
        Value::Table(table) => {
            let mut object = Map::new();
            for pair in table.clone().pairs::<Value, Value>() {
                if let Ok((key, value)) = pair {
                    object.insert(table_key(&key), lua_to_json(&value));
                }
            }
            serde_json::Value::Object(object)
        }
        _ => serde_json::Value::Null,
    }
}

fn table_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        other => other.type_name().to_string(),
    }
}

/// Coerce a scalar Lua value to a string, for status reasons and header
/// values. Non-scalar values are rejected rather than stringified.
pub fn coerce_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_string_lossy().to_string()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The request as scripts see it.
///
/// Getters mirror [`Request`]. The setters replace the wrapped request with
/// a rebuilt copy, so `Request` itself stays immutable; alias request
/// mutators use them and return the userdata.
pub struct LuaRequest(pub Request);

impl UserData for LuaRequest {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("method", |_, this, ()| Ok(this.0.method().to_string()));
        methods.add_method("target", |_, this, ()| Ok(this.0.target().to_string()));
        methods.add_method("version", |_, this, ()| Ok(this.0.version().to_string()));
        methods.add_method("resource", |_, this, ()| Ok(this.0.resource().to_string()));
        methods.add_method("query_string", |_, this, ()| {
            Ok(this.0.query_string().to_string())
        });
        methods.add_method("body", |_, this, ()| Ok(this.0.body().to_string()));

        methods.add_method("header", |_, this, name: String| {
            Ok(this.0.header(&name).map(str::to_string))
        });
        methods.add_method("query", |_, this, name: String| {
            Ok(this.0.query_value(&name).map(str::to_string))
        });

        methods.add_method("headers", |lua, this, ()| {
            let table = lua.create_table()?;
            for (key, value) in this.0.headers() {
                table.set(key.as_str(), value.as_str())?;
            }
            Ok(table)
        });
        methods.add_method("query_params", |lua, this, ()| {
            let table = lua.create_table()?;
            for (key, value) in this.0.query_params() {
                table.set(key.as_str(), value.as_str())?;
            }
            Ok(table)
        });

        methods.add_method_mut("set_target", |_, this, target: String| {
            this.0 = this.0.with_target(target);
            Ok(())
        });
        methods.add_method_mut("set_header", |_, this, (key, value): (String, String)| {
            this.0 = this.0.with_header(key, value);
            Ok(())
        });
        methods.add_method_mut("set_body", |_, this, body: String| {
            this.0 = this.0.with_body(body);
            Ok(())
        });
    }
}
