use super::column::{ColumnDefinition, ColumnType};
use super::foreign::ForeignKeyBuilder;
use crate::error::{ModelError, ModelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Index,
    Unique,
    Primary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub kind: IndexKind,
    pub name: String,
    pub columns: Vec<String>,
}

/// Alter-mode operations on existing columns and indexes
#[derive(Debug, Clone, PartialEq)]
pub enum BlueprintCommand {
    DropColumn(String),
    RenameColumn { from: String, to: String },
    DropIndex(String),
}

/// Describes the columns, indexes and keys of one table
#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    pub table: String,
    pub temporary: bool,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDefinition>,
    pub indexes: Vec<IndexDefinition>,
    pub foreign_keys: Vec<ForeignKeyBuilder>,
    pub commands: Vec<BlueprintCommand>,
}

impl Blueprint {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            temporary: false,
            if_not_exists: false,
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn add_column(&mut self, name: &str, column_type: ColumnType) -> &mut ColumnDefinition {
        self.columns.push(ColumnDefinition::new(name, column_type));
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    pub fn id(&mut self) -> &mut ColumnDefinition {
        self.add_column("id", ColumnType::Id)
    }

    pub fn id_named(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Id)
    }

    pub fn big_id(&mut self) -> &mut ColumnDefinition {
        self.add_column("id", ColumnType::BigId)
    }

    pub fn string(&mut self, name: &str, length: u32) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::String(length))
    }

    pub fn text(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Text)
    }

    pub fn integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Integer)
    }

    pub fn big_integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::BigInteger)
    }

    pub fn boolean(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Boolean)
    }

    pub fn datetime(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::DateTime)
    }

    pub fn timestamp(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Timestamp)
    }

    pub fn date(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Date)
    }

    pub fn time(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Time)
    }

    pub fn float(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Float)
    }

    pub fn decimal(&mut self, name: &str, precision: u8, scale: u8) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Decimal(precision, scale))
    }

    pub fn binary(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Binary)
    }

    pub fn json(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Json)
    }

    pub fn uuid(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Uuid)
    }

    /// Integer column sized to match `id()` keys
    pub fn foreign_id(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Integer)
    }

    /// `created_at` and `updated_at`, defaulting to the current time
    pub fn timestamps(&mut self) {
        self.timestamp("created_at").default_raw("CURRENT_TIMESTAMP");
        self.timestamp("updated_at").default_raw("CURRENT_TIMESTAMP");
    }

    pub fn soft_deletes(&mut self) -> &mut ColumnDefinition {
        self.timestamp("deleted_at").nullable()
    }

    pub fn soft_deletes_named(&mut self, name: &str) -> &mut ColumnDefinition {
        self.timestamp(name).nullable()
    }

    pub fn remember_token(&mut self) -> &mut ColumnDefinition {
        self.string("remember_token", 100).nullable()
    }

    pub fn index(&mut self, columns: &[&str], name: Option<&str>) {
        self.add_index(IndexKind::Index, columns, name);
    }

    pub fn unique(&mut self, columns: &[&str], name: Option<&str>) {
        self.add_index(IndexKind::Unique, columns, name);
    }

    pub fn primary(&mut self, columns: &[&str]) {
        self.add_index(IndexKind::Primary, columns, None);
    }

    fn add_index(&mut self, kind: IndexKind, columns: &[&str], name: Option<&str>) {
        let prefix = match kind {
            IndexKind::Index => "idx",
            IndexKind::Unique => "unq",
            IndexKind::Primary => "pk",
        };
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}_{}", prefix, self.table, columns.join("_")));
        self.indexes.push(IndexDefinition {
            kind,
            name,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
    }

    pub fn foreign(&mut self, column: &str) -> &mut ForeignKeyBuilder {
        self.foreign_keys.push(ForeignKeyBuilder::new(column));
        let last = self.foreign_keys.len() - 1;
        &mut self.foreign_keys[last]
    }

    pub fn temporary(&mut self) {
        self.temporary = true;
    }

    pub fn drop_column(&mut self, name: &str) {
        self.commands.push(BlueprintCommand::DropColumn(name.to_string()));
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        self.commands.push(BlueprintCommand::RenameColumn {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    pub fn drop_index(&mut self, name: &str) {
        self.commands.push(BlueprintCommand::DropIndex(name.to_string()));
    }

    /// Table-level keys plus keys declared with `ColumnDefinition::references`
    pub fn all_foreign_keys(&self) -> ModelResult<Vec<ForeignKeyBuilder>> {
        let mut keys = self.foreign_keys.clone();
        for column in &self.columns {
            let Some(target) = &column.references else {
                continue;
            };
            let (table, referenced) = target.split_once('.').ok_or_else(|| {
                ModelError::Schema(format!(
                    "reference '{}' on column '{}' must be written as table.column",
                    target, column.name
                ))
            })?;
            let mut key = ForeignKeyBuilder::new(&column.name);
            key.on(table).references(referenced);
            key.on_delete = column.on_delete;
            keys.push(key);
        }
        for key in &keys {
            key.target()?;
        }
        Ok(keys)
    }
}
