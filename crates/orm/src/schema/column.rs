use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    /// Auto-incrementing integer primary key
    Id,
    /// Auto-incrementing big integer primary key
    BigId,
    String(u32),
    Text,
    Integer,
    BigInteger,
    Boolean,
    DateTime,
    Timestamp,
    Date,
    Time,
    Float,
    Decimal(u8, u8),
    Binary,
    Json,
    Uuid,
}

impl ColumnType {
    pub fn is_auto_increment(&self) -> bool {
        matches!(self, ColumnType::Id | ColumnType::BigId)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    Value(Value),
    /// Emitted verbatim, e.g. `CURRENT_TIMESTAMP`
    Raw(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignAction {
    Cascade,
    Restrict,
    SetNull,
    NoAction,
}

impl ForeignAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ForeignAction::Cascade => "CASCADE",
            ForeignAction::Restrict => "RESTRICT",
            ForeignAction::SetNull => "SET NULL",
            ForeignAction::NoAction => "NO ACTION",
        }
    }
}

/// A column being added to a table, with its modifiers
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub primary: bool,
    pub unsigned: bool,
    pub default: Option<ColumnDefault>,
    pub comment: Option<String>,
    /// `table.column` this column points at
    pub references: Option<String>,
    pub on_delete: Option<ForeignAction>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            unique: false,
            primary: false,
            unsigned: false,
            default: None,
            comment: None,
            references: None,
            on_delete: None,
        }
    }

    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    pub fn not_null(&mut self) -> &mut Self {
        self.nullable = false;
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    pub fn primary(&mut self) -> &mut Self {
        self.primary = true;
        self
    }

    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = true;
        self
    }

    pub fn default(&mut self, value: impl Into<Value>) -> &mut Self {
        self.default = Some(ColumnDefault::Value(value.into()));
        self
    }

    pub fn default_raw(&mut self, sql: impl Into<String>) -> &mut Self {
        self.default = Some(ColumnDefault::Raw(sql.into()));
        self
    }

    pub fn comment(&mut self, comment: impl Into<String>) -> &mut Self {
        self.comment = Some(comment.into());
        self
    }

    /// Point this column at `table.column`
    pub fn references(&mut self, target: impl Into<String>) -> &mut Self {
        self.references = Some(target.into());
        self
    }

    pub fn on_delete(&mut self, action: ForeignAction) -> &mut Self {
        self.on_delete = Some(action);
        self
    }

    pub fn cascade_on_delete(&mut self) -> &mut Self {
        self.on_delete(ForeignAction::Cascade)
    }
}
