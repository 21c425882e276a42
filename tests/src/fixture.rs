//! The fixture schema shared by the integration scenarios.
//!
//! A small collaboration domain: `User` extends `Account` (so inherited
//! fields and their ancestor storage paths are exercised everywhere),
//! users belong to spaces through the many-to-many `Space-User` relation,
//! and `Home` is a one-to-one relation between a user and a house.

use graft_core::DataValue;
use graft_schema::{
    enrich_schema, Cardinality, ContentKind, DataFieldDef, LinkFieldDef, RoleDef, Schema,
    SchemaBuilder,
};
use std::sync::Arc;

/// Build and enrich the fixture schema.
///
/// Panics on failure; the fixture is static and a broken declaration is a
/// bug in the harness, not a condition to handle.
pub fn fixture_schema() -> Schema {
    let mut builder = SchemaBuilder::new();
    builder
        .add_entity("Account")
        .data_field(DataFieldDef::new("id", ContentKind::Id))
        .data_field(
            DataFieldDef::new("email", ContentKind::Text)
                .with_storage("contact_email")
                .with_pattern("^[^@]+@[^@]+$"),
        )
        .done()
        .unwrap();
    builder
        .add_entity("User")
        .extends("Account")
        .data_field(DataFieldDef::new("name", ContentKind::Text).required())
        .data_field(
            DataFieldDef::new("role", ContentKind::Text)
                .with_default("member".into())
                .with_allowed_values(vec!["member".into(), "admin".into()]),
        )
        .data_field(DataFieldDef::new("prefs", ContentKind::Json))
        .data_field(
            DataFieldDef::new("greeting", ContentKind::Text)
                .virtual_field()
                .with_computed_default(Arc::new(|fields| {
                    let name = fields
                        .get("name")
                        .and_then(|value| value.as_str())
                        .unwrap_or("there");
                    DataValue::String(format!("Hello, {name}"))
                })),
        )
        .link_field(LinkFieldDef::new("spaces", "Space-User", "users"))
        .link_field(LinkFieldDef::new("home", "Home", "resident").one())
        .done()
        .unwrap();
    builder
        .add_entity("Space")
        .data_field(DataFieldDef::new("id", ContentKind::Id))
        .data_field(DataFieldDef::new("name", ContentKind::Text))
        .link_field(LinkFieldDef::new("users", "Space-User", "spaces"))
        .done()
        .unwrap();
    builder
        .add_entity("House")
        .data_field(DataFieldDef::new("id", ContentKind::Id))
        .data_field(DataFieldDef::new("address", ContentKind::Text))
        .link_field(LinkFieldDef::new("resident", "Home", "house").one())
        .done()
        .unwrap();
    builder
        .add_relation("Space-User")
        .role(RoleDef::new("users", Cardinality::Many))
        .role(RoleDef::new("spaces", Cardinality::Many))
        .done()
        .unwrap();
    builder
        .add_relation("Home")
        .role(RoleDef::new("resident", Cardinality::One))
        .role(RoleDef::new("house", Cardinality::One))
        .done()
        .unwrap();
    enrich_schema(builder.build().unwrap()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_enriches() {
        let schema = fixture_schema();
        let user = schema.thing("User").unwrap();
        assert_eq!(user.all_extends, vec!["Account".to_string()]);
        assert_eq!(
            user.data_field("email").unwrap().storage_path,
            "contact_email"
        );
        assert_eq!(user.single_id_field(), Some("id"));
    }
}
