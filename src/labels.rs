//! Human-readable labels for variables and values.
//!
//! The mapping is consumed, not produced: callers load it however they like
//! (it deserializes from JSON/TOML via serde) and hand it to the expander and
//! sample extractor. Labels never affect filtering; absent entries fall back
//! to the raw variable name or value.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db::value::Value;
use crate::sql::filter::ValSpec;

/// Variable and value labels, keyed by variable name.
///
/// Value labels are keyed by the value's text form, so `1` and `"1"` share a
/// label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarLabels {
    #[serde(default)]
    pub var2var_lbl: HashMap<String, String>,
    #[serde(default)]
    pub var2val2lbl: HashMap<String, HashMap<String, String>>,
}

impl VarLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var_label(mut self, var: impl Into<String>, lbl: impl Into<String>) -> Self {
        self.var2var_lbl.insert(var.into(), lbl.into());
        self
    }

    pub fn with_val_label(
        mut self,
        var: impl Into<String>,
        val: impl Into<Value>,
        lbl: impl Into<String>,
    ) -> Self {
        self.var2val2lbl
            .entry(var.into())
            .or_default()
            .insert(val.into().to_string(), lbl.into());
        self
    }

    /// Label of a variable, falling back to its name.
    pub fn var_label<'a>(&'a self, var: &'a str) -> &'a str {
        self.var2var_lbl.get(var).map_or(var, String::as_str)
    }

    /// Label of a value of `var`, falling back to the value's text form.
    pub fn val_label(&self, var: &str, val: &Value) -> String {
        let key = val.to_string();
        self.var2val2lbl
            .get(var)
            .and_then(|labels| labels.get(&key))
            .cloned()
            .unwrap_or(key)
    }

    /// Pair a value with its resolved label.
    pub fn val_spec(&self, var: &str, val: Value) -> ValSpec {
        let lbl = self.val_label(var, &val);
        ValSpec { val, lbl }
    }
}
