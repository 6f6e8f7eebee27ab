//! Database engine descriptors.
//!
//! An [`EngineDescriptor`] holds the SQL dialect facts needed to generate
//! portable SQL for one database engine:
//!
//! - Identifier quoting: `` ` `` (SQLite, MySQL), `"` (Postgres), `[]` (T-SQL)
//! - Parameter placeholder: `?`, `%s`, `$1`...
//! - Conditional expression template: `CASE WHEN %s THEN %s ELSE %s END`, `IIF(%s, %s, %s)`
//! - Not-equals spelling: `!=` vs `<>`
//! - Cartesian join keyword
//! - String literal quote and its escaped form
//! - Whether a boolean predicate can be summed directly
//!
//! Unlike a fixed set of dialects, descriptors are data: a small built-in
//! table covers the internal SQLite database used for CSV ingestion, and any
//! other engine is described by a descriptor file in `<descriptor_dir>`,
//! either `<engine>.yaml` or `<engine>.toml` (YAML wins when both exist):
//!
//! ```toml
//! if_clause = "CASE WHEN %s THEN %s ELSE %s END"
//! placeholder = "%s"
//! left_entity_quote = "\""
//! right_entity_quote = "\""
//! gte_not_equals = "<>"
//! cartesian_joiner = " CROSS JOIN "
//! str_value_quote = "'"
//! str_value_quote_escaped = "''"
//! summable = false
//! ```
//!
//! An engine with neither a built-in entry nor a descriptor file is a
//! configuration error. The registry never guesses a dialect.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::helpers;
use crate::error::{Error, Result};

/// Name of the built-in engine backing the internal database.
pub const SQLITE: &str = "sqlite";

/// Descriptor file formats, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    Yaml,
    Toml,
}

impl DescriptorFormat {
    pub const ALL: [DescriptorFormat; 2] = [DescriptorFormat::Yaml, DescriptorFormat::Toml];

    pub fn extension(self) -> &'static str {
        match self {
            DescriptorFormat::Yaml => "yaml",
            DescriptorFormat::Toml => "toml",
        }
    }
}

/// Keys every descriptor file must provide.
pub const DESCRIPTOR_KEYS: [&str; 9] = [
    "if_clause",
    "placeholder",
    "left_entity_quote",
    "right_entity_quote",
    "gte_not_equals",
    "cartesian_joiner",
    "str_value_quote",
    "str_value_quote_escaped",
    "summable",
];

/// SQL dialect facts for one database engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDescriptor {
    pub name: String,
    /// Conditional template with exactly three `%s` holes (condition, then, else).
    pub if_clause: String,
    pub placeholder: String,
    pub left_entity_quote: String,
    pub right_entity_quote: String,
    pub gte_not_equals: String,
    pub cartesian_joiner: String,
    pub str_value_quote: String,
    pub str_value_quote_escaped: String,
    /// True when `SUM(<predicate>)` counts matching rows natively.
    pub summable: bool,
}

impl EngineDescriptor {
    /// Descriptor of the embedded SQLite engine.
    pub fn sqlite() -> Self {
        Self {
            name: SQLITE.to_string(),
            if_clause: "CASE WHEN %s THEN %s ELSE %s END".to_string(),
            placeholder: "?".to_string(),
            left_entity_quote: "`".to_string(),
            right_entity_quote: "`".to_string(),
            gte_not_equals: "!=".to_string(),
            cartesian_joiner: " JOIN ".to_string(),
            str_value_quote: "'".to_string(),
            str_value_quote_escaped: "''".to_string(),
            summable: true,
        }
    }

    /// Parse a descriptor from TOML text. `path` is only used for error messages.
    pub fn from_toml(name: &str, content: &str, path: &Path) -> Result<Self> {
        let table: toml::Table = toml::from_str(content).map_err(|e| Error::InvalidDescriptor {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let document = serde_json::to_value(table).map_err(|e| Error::InvalidDescriptor {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_document(name, &document, path)
    }

    /// Parse a descriptor from YAML text. `path` is only used for error messages.
    pub fn from_yaml(name: &str, content: &str, path: &Path) -> Result<Self> {
        let document: serde_json::Value =
            serde_yaml::from_str(content).map_err(|e| Error::InvalidDescriptor {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Self::from_document(name, &document, path)
    }

    fn from_document(name: &str, document: &serde_json::Value, path: &Path) -> Result<Self> {
        let table = document.as_object().ok_or_else(|| Error::InvalidDescriptor {
            path: path.to_path_buf(),
            reason: "expected a key-value document".to_string(),
        })?;

        let text = |key: &str| -> Result<String> {
            let value = table.get(key).ok_or_else(|| Error::MissingDescriptorField {
                path: path.to_path_buf(),
                key: key.to_string(),
            })?;
            let s = value.as_str().ok_or_else(|| Error::InvalidDescriptor {
                path: path.to_path_buf(),
                reason: format!("'{key}' must be a string"),
            })?;
            if s.is_empty() {
                return Err(Error::InvalidDescriptor {
                    path: path.to_path_buf(),
                    reason: format!("'{key}' must not be empty"),
                });
            }
            Ok(s.to_string())
        };

        let summable = table
            .get("summable")
            .ok_or_else(|| Error::MissingDescriptorField {
                path: path.to_path_buf(),
                key: "summable".to_string(),
            })?
            .as_bool()
            .ok_or_else(|| Error::InvalidDescriptor {
                path: path.to_path_buf(),
                reason: "'summable' must be a boolean".to_string(),
            })?;

        let descriptor = Self {
            name: name.to_string(),
            if_clause: text("if_clause")?,
            placeholder: text("placeholder")?,
            left_entity_quote: text("left_entity_quote")?,
            right_entity_quote: text("right_entity_quote")?,
            gte_not_equals: text("gte_not_equals")?,
            cartesian_joiner: text("cartesian_joiner")?,
            str_value_quote: text("str_value_quote")?,
            str_value_quote_escaped: text("str_value_quote_escaped")?,
            summable,
        };

        let holes = helpers::count_holes(&descriptor.if_clause);
        if holes != 3 {
            return Err(Error::InvalidDescriptor {
                path: path.to_path_buf(),
                reason: format!("'if_clause' needs exactly 3 %s holes, found {holes}"),
            });
        }

        Ok(descriptor)
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Quote an identifier (table or column name).
    pub fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_entity(ident, &self.left_entity_quote, &self.right_entity_quote)
    }

    /// Quote and escape a string literal.
    pub fn quote_string(&self, s: &str) -> String {
        helpers::quote_value(s, &self.str_value_quote, &self.str_value_quote_escaped)
    }

    /// Render the engine's conditional expression.
    pub fn if_then_else(&self, cond: &str, then: &str, otherwise: &str) -> String {
        // Hole count is checked on load; the sqlite built-in is known good.
        helpers::fill_template(&self.if_clause, &[cond, then, otherwise])
            .unwrap_or_else(|| format!("CASE WHEN {cond} THEN {then} ELSE {otherwise} END"))
    }

    /// `n` comma-separated parameter placeholders.
    pub fn placeholders(&self, n: usize) -> String {
        vec![self.placeholder.as_str(); n].join(", ")
    }

    pub fn not_equals(&self, lhs: &str, rhs: &str) -> String {
        format!("{lhs} {} {rhs}", self.gte_not_equals)
    }

    /// Cartesian product of two table expressions.
    pub fn cross_join(&self, left: &str, right: &str) -> String {
        format!("{left}{}{right}", self.cartesian_joiner)
    }

    /// Aggregate counting the rows where `cond` holds.
    pub fn conditional_count(&self, cond: &str) -> String {
        if self.summable {
            format!("SUM({cond})")
        } else {
            format!("SUM({})", self.if_then_else(cond, "1", "0"))
        }
    }

    /// Aggregate summing `expr` over the rows where `cond` holds.
    pub fn conditional_sum(&self, cond: &str, expr: &str) -> String {
        format!("SUM({})", self.if_then_else(cond, expr, "0"))
    }
}

/// Resolves engine names to descriptors.
///
/// Built-ins are consulted first, then `<descriptor_dir>/<engine>.yaml` and
/// `<descriptor_dir>/<engine>.toml`.
#[derive(Debug, Clone)]
pub struct EngineRegistry {
    builtins: BTreeMap<String, EngineDescriptor>,
    descriptor_dir: PathBuf,
}

impl EngineRegistry {
    /// Registry with the built-in descriptors and the given external folder.
    pub fn new(descriptor_dir: impl Into<PathBuf>) -> Self {
        let mut builtins = BTreeMap::new();
        builtins.insert(SQLITE.to_string(), EngineDescriptor::sqlite());
        Self {
            builtins,
            descriptor_dir: descriptor_dir.into(),
        }
    }

    /// Folder searched for external descriptor files.
    pub fn descriptor_dir(&self) -> &Path {
        &self.descriptor_dir
    }

    /// Names of the built-in engines.
    pub fn builtin_names(&self) -> Vec<&str> {
        self.builtins.keys().map(String::as_str).collect()
    }

    /// Paths an external descriptor for `engine` may live at, in lookup order.
    ///
    /// Names that could escape the descriptor folder are rejected.
    pub fn descriptor_paths(&self, engine: &str) -> Result<Vec<(DescriptorFormat, PathBuf)>> {
        let escapes = engine == "."
            || engine.contains("..")
            || engine.contains(['/', '\\', '\0'])
            || Path::new(engine).is_absolute();
        if escapes {
            return Err(Error::InvalidEngineName(engine.to_string()));
        }
        Ok(DescriptorFormat::ALL
            .into_iter()
            .map(|format| {
                let file = format!("{engine}.{}", format.extension());
                (format, self.descriptor_dir.join(file))
            })
            .collect())
    }

    /// Look up the descriptor for `engine`.
    pub fn resolve(&self, engine: &str) -> Result<EngineDescriptor> {
        if engine.is_empty() {
            return Err(Error::MissingEngineName);
        }
        if let Some(descriptor) = self.builtins.get(engine) {
            return Ok(descriptor.clone());
        }

        let candidates = self.descriptor_paths(engine)?;
        let Some((format, path)) = candidates.iter().find(|(_, path)| path.is_file()) else {
            return Err(Error::UnknownEngine {
                engine: engine.to_string(),
                builtins: self.builtin_names().join(", "),
                searched: candidates.iter().map(|(_, path)| path.clone()).collect(),
            });
        };

        let content = fs::read_to_string(path)?;
        let descriptor = match format {
            DescriptorFormat::Yaml => EngineDescriptor::from_yaml(engine, &content, path)?,
            DescriptorFormat::Toml => EngineDescriptor::from_toml(engine, &content, path)?,
        };
        debug!(engine = %engine, path = %path.display(), "loaded external engine descriptor");
        Ok(descriptor)
    }
}
