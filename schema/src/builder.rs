//! SchemaBuilder for declaring a schema in code.

use crate::{
    Cardinality, ContentKind, DataFieldDef, LinkFieldDef, RoleDef, Schema, SchemaError,
    SchemaResult, ThingDef, ThingKind,
};
use indexmap::IndexMap;

/// Builder for a [`Schema`]. Declaration order is preserved.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    things: IndexMap<String, ThingDef>,
}

impl SchemaBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity.
    pub fn add_entity(&mut self, name: impl Into<String>) -> ThingBuilder<'_> {
        self.add_thing(name, ThingKind::Entity)
    }

    /// Declare a relation.
    pub fn add_relation(&mut self, name: impl Into<String>) -> ThingBuilder<'_> {
        self.add_thing(name, ThingKind::Relation)
    }

    fn add_thing(&mut self, name: impl Into<String>, kind: ThingKind) -> ThingBuilder<'_> {
        ThingBuilder {
            builder: self,
            thing: ThingDef::new(name, kind),
        }
    }

    /// Assemble the raw schema. Reference resolution happens in
    /// [`crate::enrich_schema`].
    pub fn build(self) -> SchemaResult<Schema> {
        Ok(Schema {
            things: self.things,
        })
    }
}

/// Builder for one thing declaration.
pub struct ThingBuilder<'a> {
    builder: &'a mut SchemaBuilder,
    thing: ThingDef,
}

impl<'a> ThingBuilder<'a> {
    /// Set the parent type.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.thing.extends = Some(parent.into());
        self
    }

    /// Add a data field. Fields with `ContentKind::Id` content are collected
    /// as the thing's id fields.
    pub fn data_field(mut self, field: DataFieldDef) -> Self {
        if field.content == ContentKind::Id {
            self.thing.id_fields.push(field.path.clone());
        }
        self.thing.data_fields.insert(field.path.clone(), field);
        self
    }

    /// Add a link field.
    pub fn link_field(mut self, field: LinkFieldDef) -> Self {
        self.thing.link_fields.insert(field.path.clone(), field);
        self
    }

    /// Add a role (relations only; enrichment rejects roles on entities).
    pub fn role(mut self, role: RoleDef) -> Self {
        self.thing.roles.insert(role.name.clone(), role);
        self
    }

    /// Shorthand for a role with the given cardinality.
    pub fn role_named(self, name: impl Into<String>, cardinality: Cardinality) -> Self {
        self.role(RoleDef::new(name, cardinality))
    }

    /// Finish this thing.
    pub fn done(self) -> SchemaResult<()> {
        if self.builder.things.contains_key(&self.thing.name) {
            return Err(SchemaError::DuplicateThing(self.thing.name));
        }
        self.builder
            .things
            .insert(self.thing.name.clone(), self.thing);
        Ok(())
    }
}
