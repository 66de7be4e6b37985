//! JSON conversion: to-json, from-json.
//!
//! Integers that fit `i64` stay exact in both directions; other numbers go
//! through `f64`. Bigger exact numbers are written as strings, since JSON
//! readers rarely agree on how to take them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value as Json;

use super::{args_or_inputs, Builtin, CallArgs};
use crate::eval::{Cause, ExecResult, Frame, NsBuilder, Value};
use crate::num::Num;

pub(crate) fn register(b: NsBuilder) -> NsBuilder {
    b.add_fn(ToJson).add_fn(FromJson)
}

pub(crate) fn to_json(v: &Value) -> Result<Json, Cause> {
    Ok(match v {
        Value::Nil => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Str(s) => Json::String(s.clone()),
        Value::Num(Num::Int(i)) => Json::from(*i),
        Value::Num(Num::Float(f)) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| Cause::bad_value("number", "finite float", v.repr()))?,
        Value::Num(n) => Json::String(n.to_string()),
        Value::List(items) => Json::Array(items.iter().map(to_json).collect::<Result<_, _>>()?),
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), to_json(v)?)))
                .collect::<Result<_, Cause>>()?,
        ),
        other => return Err(Cause::wrong_type("value with a JSON form", other.kind())),
    })
}

pub(crate) fn from_json(j: Json) -> Value {
    match j {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Bool(b),
        Json::String(s) => Value::Str(s),
        Json::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Value::Num(Num::Int(i)),
            (None, Some(f)) => Value::Num(Num::Float(f)),
            // u64 beyond i64, without arbitrary precision
            (None, None) => Value::Str(n.to_string()),
        },
        Json::Array(items) => Value::list(items.into_iter().map(from_json).collect()),
        Json::Object(entries) => {
            Value::map(entries.into_iter().map(|(k, v)| (k, from_json(v))).collect::<BTreeMap<_, _>>())
        }
    }
}

/// Writes each value (arguments, or else inputs) as one line of JSON.
pub struct ToJson;

#[async_trait]
impl Builtin for ToJson {
    fn name(&self) -> &str {
        "to-json"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.only_opts(&[])?;
        for v in args_or_inputs(frame, args.args).await? {
            let mut line = serde_json::to_string(&to_json(&v)?).map_err(Cause::io)?;
            line.push('\n');
            frame.write(line.as_bytes()).await?;
        }
        Ok(())
    }
}

/// Reads a stream of JSON documents from the byte input.
pub struct FromJson;

#[async_trait]
impl Builtin for FromJson {
    fn name(&self) -> &str {
        "from-json"
    }

    async fn call(&self, frame: &Frame, args: CallArgs) -> ExecResult<()> {
        args.arity(0, Some(0))?;
        let bytes = frame.ports.input.bytes.read_all(frame.cancel_token()).await?;
        let stream = serde_json::Deserializer::from_slice(&bytes).into_iter::<Json>();
        for doc in stream {
            let doc = doc.map_err(|e| Cause::bad_value("input", "JSON", e.to_string()))?;
            frame.put(from_json(doc)).await?;
        }
        Ok(())
    }
}
