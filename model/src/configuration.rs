use crate::error::{self, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use snafu::ResultExt;
use std::fmt::Debug;

/// The `Configuration` trait is for "plain old data" structs that are persisted between stages or
/// handed to an external tool as a flat map of named values, e.g. the variables of a Terraform
/// deployment.
///
/// The traits aggregated by the `Configuration` trait provide a way for stages to strongly type
/// data which is otherwise only a JSON document on disk.
pub trait Configuration:
    Serialize + DeserializeOwned + Clone + Debug + Send + Sync + Sized + 'static
{
    /// Convert the `Configuration` object to a serde `Map`.
    fn into_map(self) -> Result<Map<String, Value>> {
        match self.into_value()? {
            Value::Object(map) => Ok(map),
            _ => Err(error::ConfigWrongValueTypeSnafu {}.build().into()),
        }
    }

    /// Convert the `Configuration` object to a serde `Value`.
    fn into_value(self) -> Result<Value> {
        Ok(serde_json::to_value(self).context(error::ConfigSerializationSnafu)?)
    }
}
