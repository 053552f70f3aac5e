use super::column::ForeignAction;
use crate::error::{ModelError, ModelResult};

/// Table-level foreign key, built with `Blueprint::foreign`
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyBuilder {
    pub column: String,
    pub references: Option<String>,
    pub on: Option<String>,
    pub on_delete: Option<ForeignAction>,
    pub on_update: Option<ForeignAction>,
}

impl ForeignKeyBuilder {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            references: None,
            on: None,
            on_delete: None,
            on_update: None,
        }
    }

    pub fn references(&mut self, column: impl Into<String>) -> &mut Self {
        self.references = Some(column.into());
        self
    }

    pub fn on(&mut self, table: impl Into<String>) -> &mut Self {
        self.on = Some(table.into());
        self
    }

    pub fn on_delete(&mut self, action: ForeignAction) -> &mut Self {
        self.on_delete = Some(action);
        self
    }

    pub fn on_update(&mut self, action: ForeignAction) -> &mut Self {
        self.on_update = Some(action);
        self
    }

    pub fn cascade_on_delete(&mut self) -> &mut Self {
        self.on_delete(ForeignAction::Cascade)
    }

    pub fn restrict_on_delete(&mut self) -> &mut Self {
        self.on_delete(ForeignAction::Restrict)
    }

    pub fn null_on_delete(&mut self) -> &mut Self {
        self.on_delete(ForeignAction::SetNull)
    }

    /// `(table, column)` the key points at
    pub fn target(&self) -> ModelResult<(&str, &str)> {
        match (self.on.as_deref(), self.references.as_deref()) {
            (Some(table), Some(column)) if !table.is_empty() && !column.is_empty() => {
                Ok((table, column))
            }
            _ => Err(ModelError::Schema(format!(
                "foreign key on '{}' must name a table and a column",
                self.column
            ))),
        }
    }
}
