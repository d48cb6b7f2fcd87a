use std::fmt::{Display, Formatter};

use grantshift_core::{AppError, AppResult};

use crate::{MetadataRow, ObjectName, RoutineSignature, quote_identifier, quote_literal};

/// Kind of user-defined routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutineKind {
    /// User-defined function.
    Function,
    /// Stored procedure.
    Procedure,
}

impl RoutineKind {
    /// Returns the statement keyword.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "FUNCTION",
            Self::Procedure => "PROCEDURE",
        }
    }

    /// Returns the plural keyword used by `SHOW`.
    #[must_use]
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Function => "FUNCTIONS",
            Self::Procedure => "PROCEDURES",
        }
    }
}

impl Display for RoutineKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Implementation language of a routine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoutineLanguage {
    /// SQL body.
    Sql,
    /// Python handler.
    Python,
    /// JavaScript body.
    JavaScript,
    /// Java handler.
    Java,
    /// Any other language, kept with its reported keyword.
    Other(String),
}

impl RoutineLanguage {
    /// Parses the reported language keyword.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "SQL" => Self::Sql,
            "PYTHON" => Self::Python,
            "JAVASCRIPT" => Self::JavaScript,
            "JAVA" => Self::Java,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns the statement keyword.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sql => "SQL",
            Self::Python => "PYTHON",
            Self::JavaScript => "JAVASCRIPT",
            Self::Java => "JAVA",
            Self::Other(keyword) => keyword.as_str(),
        }
    }
}

/// A routine read from the source account: its `SHOW` row plus its `DESC` properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineDefinition {
    kind: RoutineKind,
    database: String,
    schema: String,
    name: String,
    is_secure: bool,
    language: Option<RoutineLanguage>,
    signature: RoutineSignature,
    properties: MetadataRow,
}

impl RoutineDefinition {
    /// Builds a definition from a `SHOW FUNCTIONS` or `SHOW PROCEDURES` row.
    pub fn from_show_row(kind: RoutineKind, row: &MetadataRow) -> AppResult<Self> {
        let name = row.require("name")?.to_owned();
        let arguments = row.require("arguments")?;
        let signature = RoutineSignature::parse(arguments)?;

        Ok(Self {
            kind,
            database: row.require("catalog_name")?.to_owned(),
            schema: row.require("schema_name")?.to_owned(),
            name,
            is_secure: row.get("is_secure").is_some_and(|value| value == "Y"),
            language: row
                .get("language")
                .filter(|value| !value.is_empty())
                .map(RoutineLanguage::parse),
            signature,
            properties: MetadataRow::new(),
        })
    }

    /// Attaches `DESC` output given as `property`/`value` rows.
    pub fn with_description(mut self, rows: &[MetadataRow]) -> AppResult<Self> {
        let mut properties = MetadataRow::new();
        for row in rows {
            properties.insert(row.require("property")?, row.get("value").unwrap_or_default());
        }

        if let Some(language) = properties.get("language") {
            self.language = Some(RoutineLanguage::parse(language));
        }
        self.properties = properties;
        Ok(self)
    }

    /// Returns the routine kind.
    #[must_use]
    pub fn kind(&self) -> RoutineKind {
        self.kind
    }

    /// Returns the database the routine lives in.
    #[must_use]
    pub fn database(&self) -> &str {
        self.database.as_str()
    }

    /// Returns the schema the routine lives in.
    #[must_use]
    pub fn schema(&self) -> &str {
        self.schema.as_str()
    }

    /// Returns the routine name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the reported language, if known yet.
    #[must_use]
    pub fn language(&self) -> Option<&RoutineLanguage> {
        self.language.as_ref()
    }

    /// Returns the argument type list.
    #[must_use]
    pub fn signature(&self) -> &RoutineSignature {
        &self.signature
    }

    /// Returns the fully qualified name without arguments.
    #[must_use]
    pub fn object_name(&self) -> ObjectName {
        ObjectName::from_parts([
            self.database.as_str(),
            self.schema.as_str(),
            self.name.as_str(),
        ])
    }

    /// Returns the `DESC` statement for this routine.
    #[must_use]
    pub fn describe_sql(&self) -> String {
        format!(
            "DESC {} {}({})",
            self.kind,
            self.object_name(),
            self.signature.argument_list()
        )
    }

    /// Renders the `CREATE` statement, run inside the routine's schema.
    ///
    /// Fails with a validation error for unsupported kind/language pairs.
    pub fn to_ddl(&self) -> AppResult<String> {
        let language = self.language.as_ref().ok_or_else(|| {
            AppError::Validation(format!("{} '{}' has no reported language", self.kind, self.name))
        })?;

        match (self.kind, language) {
            (RoutineKind::Function, RoutineLanguage::Sql) => self.sql_function(),
            (RoutineKind::Function, RoutineLanguage::Python) => self.python_function(),
            (RoutineKind::Function, RoutineLanguage::JavaScript) => self.javascript_function(),
            (RoutineKind::Procedure, RoutineLanguage::Sql) => self.sql_procedure(),
            (RoutineKind::Procedure, RoutineLanguage::Java | RoutineLanguage::Python) => {
                self.handler_procedure(language)
            }
            (RoutineKind::Procedure, RoutineLanguage::JavaScript) => self.javascript_procedure(),
            (kind, language) => Err(AppError::Validation(format!(
                "language '{}' is not supported for {} '{}'",
                language.as_str(),
                kind,
                self.name
            ))),
        }
    }

    fn header(&self) -> AppResult<String> {
        Ok(format!(
            "CREATE {}{} {}{}\nRETURNS {}",
            if self.is_secure { "SECURE " } else { "" },
            self.kind,
            quote_identifier(&self.name),
            self.properties.require("signature")?,
            self.properties.require("returns")?
        ))
    }

    fn body(&self) -> AppResult<&str> {
        Ok(self.properties.require("body")?.trim())
    }

    fn execute_as(&self) -> String {
        self.properties
            .get("execute as")
            .unwrap_or("OWNER")
            .to_owned()
    }

    fn sql_function(&self) -> AppResult<String> {
        Ok(format!("{}\nAS\n$$\n{}\n$$", self.header()?, self.body()?))
    }

    fn javascript_function(&self) -> AppResult<String> {
        Ok(format!(
            "{}\nLANGUAGE JAVASCRIPT\nAS\n$$\n{}\n$$",
            self.header()?,
            self.body()?
        ))
    }

    fn python_function(&self) -> AppResult<String> {
        let mut ddl = format!(
            "{}\nLANGUAGE PYTHON\nRUNTIME_VERSION = {}\nHANDLER = {}",
            self.header()?,
            quote_literal(self.properties.require("runtime_version")?),
            quote_literal(self.properties.require("handler")?)
        );
        self.push_dependencies(&mut ddl);
        ddl.push_str(&format!("\nAS\n$$\n{}\n$$", self.body()?));
        Ok(ddl)
    }

    fn sql_procedure(&self) -> AppResult<String> {
        Ok(format!(
            "{}\nLANGUAGE SQL\nEXECUTE AS {}\nAS\n{}",
            self.header()?,
            self.execute_as(),
            self.body()?
        ))
    }

    fn javascript_procedure(&self) -> AppResult<String> {
        Ok(format!(
            "{}\nLANGUAGE JAVASCRIPT\nEXECUTE AS {}\nAS\n$$\n{}\n$$",
            self.header()?,
            self.execute_as(),
            self.body()?
        ))
    }

    fn handler_procedure(&self, language: &RoutineLanguage) -> AppResult<String> {
        let mut ddl = format!(
            "{}\nLANGUAGE {}\nRUNTIME_VERSION = {}\nHANDLER = {}",
            self.header()?,
            language.as_str(),
            quote_literal(self.properties.require("runtime_version")?),
            quote_literal(self.properties.require("handler")?)
        );
        self.push_dependencies(&mut ddl);
        ddl.push_str(&format!(
            "\nEXECUTE AS {}\nAS\n$$\n{}\n$$",
            self.execute_as(),
            self.body()?
        ));
        Ok(ddl)
    }

    // DESC reports lists as `[a, b]`; an empty list is omitted.
    fn push_dependencies(&self, ddl: &mut String) {
        for (property, keyword) in [("packages", "PACKAGES"), ("imports", "IMPORTS")] {
            let Some(list) = self.properties.get(property) else {
                continue;
            };
            let inner = list.trim().trim_start_matches('[').trim_end_matches(']').trim();
            if !inner.is_empty() {
                ddl.push_str(&format!("\n{keyword} = ({inner})"));
            }
        }
    }
}
