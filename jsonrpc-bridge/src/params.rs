//! Positional call arguments.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MethodError;

/// Ordered positional arguments of a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Vec<Value>);

impl Params {
    /// Empty argument list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw argument at `index`.
    pub fn raw(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Decode the argument at `index`.
    ///
    /// A missing position decodes from `null`, so `Option<T>` arguments may
    /// be left out by the caller. A type mismatch is reported as
    /// [`MethodError::InvalidParams`].
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, MethodError> {
        let value = self.0.get(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|e| MethodError::InvalidParams(format!("parameter {}: {}", index, e)))
    }

    /// Append an argument.
    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }

    /// Iterate over the raw arguments.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    /// Unwrap into the raw argument vector.
    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl FromIterator<Value> for Params {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Params {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Build [`Params`] from JSON-convertible expressions.
///
/// ```rust
/// use jsonrpc_bridge::params;
///
/// let params = params![1, "two", [3]];
/// assert_eq!(params.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::new()
    };
    ($($arg:expr),+ $(,)?) => {
        $crate::Params::from(vec![$($crate::serde_json::json!($arg)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_decodes_positional_arguments() {
        let params = Params::from(vec![json!(1), json!("two")]);

        assert_eq!(params.get::<i64>(0).unwrap(), 1);
        assert_eq!(params.get::<String>(1).unwrap(), "two");
    }

    #[test]
    fn test_missing_argument_decodes_as_null() {
        let params = Params::new();

        assert_eq!(params.get::<Option<i64>>(0).unwrap(), None);
        assert!(matches!(
            params.get::<i64>(0),
            Err(MethodError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_type_mismatch_is_invalid_params() {
        let params = Params::from(vec![json!("not a number")]);
        let err = params.get::<u32>(0).unwrap_err();

        assert!(err.to_string().starts_with("parameter 0:"));
    }

    #[test]
    fn test_params_macro() {
        let params = crate::params![1, 2];
        assert_eq!(params.into_inner(), vec![json!(1), json!(2)]);
        assert!(crate::params![].is_empty());
    }
}
