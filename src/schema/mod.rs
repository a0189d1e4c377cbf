//! Model registry: static metadata describing every table of the schema.
//!
//! The registry is the single source of truth used to validate queries,
//! decode rows and drive both storage engines.

mod models;

use std::ops::RangeInclusive;

pub use models::{
    ACCOUNT, BLOCKCHAIN_TRANSACTION, Model, SESSION, TASK, TASK_DEVELOPER, TASK_REPOSITORY, USER,
    VERIFICATION,
};

/// Scalar type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Int,
    Boolean,
    DateTime,
    Json,
    /// Text column restricted to the listed literals.
    Enum(&'static [&'static str]),
}

impl ScalarKind {
    pub fn is_textual(&self) -> bool {
        matches!(self, ScalarKind::String | ScalarKind::Enum(_))
    }

    /// Kinds usable with lt/gt and min/max.
    pub fn is_orderable(&self) -> bool {
        matches!(
            self,
            ScalarKind::String | ScalarKind::Int | ScalarKind::DateTime | ScalarKind::Enum(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::String => "String",
            ScalarKind::Int => "Int",
            ScalarKind::Boolean => "Boolean",
            ScalarKind::DateTime => "DateTime",
            ScalarKind::Json => "Json",
            ScalarKind::Enum(_) => "Enum",
        }
    }
}

/// Value applied by the client when a create payload omits the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    GeneratedId,
    Now,
    Bool(bool),
    Literal(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    /// Record key and column name.
    pub name: &'static str,
    pub kind: ScalarKind,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default: Option<DefaultValue>,
    /// Refreshed to "now" on every update.
    pub updated_at: bool,
    /// Int stored as a 32-bit INTEGER column.
    pub int4: bool,
}

impl FieldMeta {
    pub const fn new(name: &'static str, kind: ScalarKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            primary_key: false,
            unique: false,
            default: None,
            updated_at: false,
            int4: false,
        }
    }

    pub const fn int4(self) -> Self {
        Self { int4: true, ..self }
    }

    pub const fn id(self) -> Self {
        Self {
            primary_key: true,
            unique: true,
            default: Some(DefaultValue::GeneratedId),
            ..self
        }
    }

    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }

    pub const fn default(self, value: DefaultValue) -> Self {
        Self {
            default: Some(value),
            ..self
        }
    }

    pub const fn updated_at(self) -> Self {
        Self {
            updated_at: true,
            default: Some(DefaultValue::Now),
            ..self
        }
    }

    /// Values an Int column can hold.
    pub fn int_range(&self) -> RangeInclusive<i64> {
        if self.int4 {
            i64::from(i32::MIN)..=i64::from(i32::MAX)
        } else {
            i64::MIN..=i64::MAX
        }
    }

    /// Required in create payloads (no default, not nullable).
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// Referential action applied to the owning side when the referenced row
/// is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    Restrict,
    SetNull,
}

#[derive(Debug, Clone, Copy)]
pub struct RelationMeta {
    pub name: &'static str,
    /// Target model name.
    pub target: &'static str,
    pub cardinality: Cardinality,
    /// Field on this model used for the join.
    pub local_field: &'static str,
    /// Field on the target model used for the join.
    pub foreign_field: &'static str,
    /// Present when this model holds the foreign key.
    pub on_delete: Option<OnDelete>,
}

impl RelationMeta {
    pub fn is_owning(&self) -> bool {
        self.on_delete.is_some()
    }

    pub fn target_meta(&self) -> Option<&'static ModelMeta> {
        model(self.target)
    }
}

#[derive(Debug)]
pub struct ModelMeta {
    pub name: &'static str,
    pub table: &'static str,
    pub fields: &'static [FieldMeta],
    pub relations: &'static [RelationMeta],
}

impl ModelMeta {
    pub fn field(&self, name: &str) -> Option<&'static FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&'static RelationMeta> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn primary_key(&self) -> &'static FieldMeta {
        self.fields
            .iter()
            .find(|f| f.primary_key)
            .unwrap_or(&self.fields[0])
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &'static FieldMeta> {
        self.fields.iter().filter(|f| f.unique)
    }

    pub fn is_unique(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| f.unique)
    }
}

/// All registered models, in dependency order (referenced tables first).
pub static MODELS: [&ModelMeta; 8] = [
    &USER,
    &SESSION,
    &ACCOUNT,
    &VERIFICATION,
    &TASK,
    &TASK_DEVELOPER,
    &TASK_REPOSITORY,
    &BLOCKCHAIN_TRANSACTION,
];

pub fn all_models() -> &'static [&'static ModelMeta] {
    &MODELS
}

/// Looks a model up by its name (`"Task"`) or table name (`"tasks"`).
pub fn model(name: &str) -> Option<&'static ModelMeta> {
    MODELS
        .iter()
        .copied()
        .find(|m| m.name == name || m.table == name)
}

/// Relations of other models that hold a foreign key pointing at `target`.
pub fn inverse_relations(target: &str) -> Vec<(&'static ModelMeta, &'static RelationMeta)> {
    MODELS
        .iter()
        .copied()
        .flat_map(|m| m.relations.iter().map(move |r| (m, r)))
        .filter(|(_, r)| r.is_owning() && r.target == target)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_relation_targets_a_registered_model() {
        for meta in all_models() {
            for relation in meta.relations {
                let target = model(relation.target);
                assert!(
                    target.is_some(),
                    "{}.{} points at unknown model {}",
                    meta.name,
                    relation.name,
                    relation.target
                );
                let target = target.unwrap();
                assert!(meta.field(relation.local_field).is_some());
                assert!(target.field(relation.foreign_field).is_some());
            }
        }
    }

    #[test]
    fn every_model_has_a_primary_key() {
        for meta in all_models() {
            let pk = meta.primary_key();
            assert!(pk.primary_key, "{} has no primary key", meta.name);
            assert_eq!(pk.name, "id");
        }
    }

    #[test]
    fn model_lookup_accepts_name_and_table() {
        assert_eq!(model("Task").map(|m| m.table), Some("tasks"));
        assert_eq!(model("task_developers").map(|m| m.name), Some("TaskDeveloper"));
        assert!(model("Invoice").is_none());
    }

    #[test]
    fn unique_columns_follow_schema() {
        assert!(USER.is_unique("email"));
        assert!(SESSION.is_unique("token"));
        assert!(TASK_DEVELOPER.is_unique("task_id"));
        assert!(TASK_REPOSITORY.is_unique("task_id"));
        assert!(!BLOCKCHAIN_TRANSACTION.is_unique("task_id"));
    }

    #[test]
    fn inverse_relations_of_user() {
        let owners: Vec<_> = inverse_relations("User")
            .into_iter()
            .map(|(m, r)| format!("{}.{}", m.name, r.name))
            .collect();
        assert!(owners.contains(&"Session.user".to_string()));
        assert!(owners.contains(&"Task.creator".to_string()));
        assert!(owners.contains(&"BlockchainTransaction.user".to_string()));
        assert!(!owners.iter().any(|o| o.starts_with("User.")));
    }

    #[test]
    fn integer_columns_carry_their_width() {
        let network = TASK_DEVELOPER.field("network_id").unwrap();
        let block = BLOCKCHAIN_TRANSACTION.field("block_number").unwrap();

        assert_eq!(*network.int_range().end(), i64::from(i32::MAX));
        assert!(!network.int_range().contains(&5_000_000_000));
        assert!(block.int_range().contains(&5_000_000_000));
    }

    #[test]
    fn required_fields_exclude_defaults_and_nullables() {
        let required: Vec<_> = TASK
            .fields
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name)
            .collect();
        assert_eq!(
            required,
            vec!["title", "description", "value_in_wei", "deadline", "creator_id"]
        );
    }
}
