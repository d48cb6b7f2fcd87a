use std::fmt::{Display, Formatter};

use grantshift_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Quotes one identifier for use in a statement, doubling embedded quotes.
///
/// Already-quoted input is normalised first so quoting is idempotent.
#[must_use]
pub fn quote_identifier(identifier: &str) -> String {
    let raw = unquote_identifier(identifier);
    format!("\"{}\"", raw.replace('"', "\"\""))
}

/// Quotes a string literal, escaping backslashes and single quotes.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Removes one level of identifier quoting if present.
#[must_use]
pub fn unquote_identifier(identifier: &str) -> String {
    let trimmed = identifier.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return trimmed[1..trimmed.len() - 1].replace("\"\"", "\"");
    }

    trimmed.to_owned()
}

/// A dot-separated object name as reported by account metadata.
///
/// Parsing understands quoted parts, so `SALES."my.schema".ORDERS` has three parts.
/// Comparison is done on the unquoted parts, which replaces matching every
/// quoting combination of a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectName {
    parts: Vec<String>,
}

impl ObjectName {
    /// Parses a possibly quoted, dot-separated name.
    pub fn parse(value: &str) -> AppResult<Self> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut chars = value.trim().chars().peekable();

        while let Some(character) = chars.next() {
            match character {
                '"' if in_quotes && chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                '"' => in_quotes = !in_quotes,
                '.' if !in_quotes => {
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(character),
            }
        }

        if in_quotes {
            return Err(AppError::Validation(format!(
                "object name '{value}' has an unterminated quoted part"
            )));
        }
        parts.push(current);

        if parts.iter().any(String::is_empty) {
            return Err(AppError::Validation(format!(
                "object name '{value}' has an empty part"
            )));
        }

        Ok(Self { parts })
    }

    /// Builds a name from already unquoted parts.
    #[must_use]
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the unquoted parts.
    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Returns the database part for qualified names.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.parts.first().map(String::as_str)
    }

    /// Returns the schema part for schema-qualified names.
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.parts.get(1).map(String::as_str)
    }

    /// Returns the last part.
    #[must_use]
    pub fn object(&self) -> Option<&str> {
        self.parts.last().map(String::as_str)
    }

    /// Returns true when the name is the schema itself or lives inside it.
    #[must_use]
    pub fn is_in_schema(&self, database: &str, schema: &str) -> bool {
        self.database() == Some(database) && self.schema() == Some(schema)
    }

    /// Returns true when the name is exactly `database.schema.object`.
    #[must_use]
    pub fn is_object(&self, database: &str, schema: &str, object: &str) -> bool {
        self.parts.len() == 3 && self.is_in_schema(database, schema) && self.object() == Some(object)
    }

    /// Returns a copy with the database part replaced.
    #[must_use]
    pub fn with_database(&self, database: &str) -> Self {
        let mut parts = self.parts.clone();
        if let Some(first) = parts.first_mut() {
            database.clone_into(first);
        }

        Self { parts }
    }
}

impl Display for ObjectName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        let rendered = self
            .parts
            .iter()
            .map(|part| quote_identifier_part(part))
            .collect::<Vec<_>>()
            .join(".");
        formatter.write_str(&rendered)
    }
}

fn quote_identifier_part(part: &str) -> String {
    format!("\"{}\"", part.replace('"', "\"\""))
}

/// A routine reference parsed from a grant name such as `"CLEAN(X VARCHAR):VARCHAR(100)"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineSignature {
    name: String,
    argument_types: Vec<String>,
}

impl RoutineSignature {
    /// Parses `NAME(ARG TYPE, ...)` with an optional `:RETURN` or ` RETURN ...` suffix.
    pub fn parse(value: &str) -> AppResult<Self> {
        let open = value.find('(').ok_or_else(|| {
            AppError::Validation(format!("routine signature '{value}' has no argument list"))
        })?;
        let close = matching_close(value, open).ok_or_else(|| {
            AppError::Validation(format!(
                "routine signature '{value}' has an unterminated argument list"
            ))
        })?;

        let name = value[..open].trim().to_owned();
        if name.is_empty() {
            return Err(AppError::Validation(format!(
                "routine signature '{value}' has no name"
            )));
        }

        let argument_types = split_top_level(&value[open + 1..close])
            .into_iter()
            .filter(|argument| !argument.is_empty())
            .map(|argument| argument_type(&argument))
            .collect();

        Ok(Self {
            name,
            argument_types,
        })
    }

    /// Returns the routine name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the argument types in declaration order.
    #[must_use]
    pub fn argument_types(&self) -> &[String] {
        &self.argument_types
    }

    /// Renders the comma-separated argument type list.
    #[must_use]
    pub fn argument_list(&self) -> String {
        self.argument_types.join(", ")
    }
}

fn matching_close(value: &str, open: usize) -> Option<usize> {
    let mut depth = 0_usize;
    for (index, character) in value.char_indices().skip_while(|(index, _)| *index < open) {
        match character {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }

    None
}

fn split_top_level(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0_usize;

    for character in value.chars() {
        match character {
            '(' => {
                depth += 1;
                current.push(character);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(character);
            }
            ',' if depth == 0 => items.push(std::mem::take(&mut current).trim().to_owned()),
            _ => current.push(character),
        }
    }
    items.push(current.trim().to_owned());

    items
}

// Grant names carry `NAME TYPE`, SHOW FUNCTIONS arguments carry just `TYPE`.
fn argument_type(argument: &str) -> String {
    let argument = argument.trim();
    match argument.split_once(char::is_whitespace) {
        Some((first, rest)) if !first.contains('(') && !rest.trim().is_empty() => {
            rest.trim().to_owned()
        }
        _ => argument.to_owned(),
    }
}
