//! Schema definition types.

use graft_core::DataValue;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Whether a thing is an entity or a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThingKind {
    Entity,
    Relation,
}

impl fmt::Display for ThingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThingKind::Entity => write!(f, "entity"),
            ThingKind::Relation => write!(f, "relation"),
        }
    }
}

/// How many values a field or role slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

impl Cardinality {
    /// True for the MANY side.
    pub fn is_many(&self) -> bool {
        matches!(self, Cardinality::Many)
    }
}

/// Content type of a data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Identity field; exactly one per thing is addressable by `$id`.
    Id,
    Text,
    Number,
    Boolean,
    Date,
    /// Arbitrary JSON, serialized to a string before storage.
    Json,
}

impl ContentKind {
    /// Parse a content kind from its schema-text name.
    pub fn parse(name: &str) -> Result<Self, crate::SchemaError> {
        match name {
            "ID" => Ok(ContentKind::Id),
            "TEXT" => Ok(ContentKind::Text),
            "NUMBER" => Ok(ContentKind::Number),
            "BOOLEAN" => Ok(ContentKind::Boolean),
            "DATE" => Ok(ContentKind::Date),
            "JSON" => Ok(ContentKind::Json),
            other => Err(crate::SchemaError::UnsupportedContent {
                content: other.to_string(),
            }),
        }
    }
}

/// What a link field reaches through its relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    /// The players of the opposite role(s).
    Role,
    /// The relation instance itself.
    Relation,
}

/// A derived-value function: computes a field value from the node's own
/// current data fields.
pub type ComputedFn = Arc<dyn Fn(&IndexMap<String, DataValue>) -> DataValue + Send + Sync>;

/// Default for a data field: a literal, or a derived-value function.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(DataValue),
    Computed(ComputedFn),
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            DefaultValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DefaultValue::Literal(a), DefaultValue::Literal(b)) => a == b,
            (DefaultValue::Computed(a), DefaultValue::Computed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Validation rules on a data field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Validations {
    /// Must be present on create.
    pub required: bool,
    /// Must be unique across instances.
    pub unique: bool,
    /// Regex the (string) value must match.
    pub pattern: Option<String>,
    /// Closed set of allowed values.
    pub allowed_values: Option<Vec<DataValue>>,
}

/// A scalar attribute of a thing.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFieldDef {
    /// Field name as requests address it.
    pub path: String,
    /// Attribute name under which the value is stored. For inherited fields
    /// this stays the path under the originally declaring ancestor, so
    /// storage is inheritance-stable.
    pub storage_path: String,
    /// Content type.
    pub content: ContentKind,
    /// ONE or MANY values.
    pub cardinality: Cardinality,
    /// Default applied on create when the field is absent.
    pub default: Option<DefaultValue>,
    /// Validation rules.
    pub validations: Validations,
    /// Not stored at all; always produced by the derived-value function.
    pub is_virtual: bool,
    /// Ancestor that originally declared this field (enrichment-filled).
    pub inherited_from: Option<String>,
}

impl DataFieldDef {
    pub fn new(path: impl Into<String>, content: ContentKind) -> Self {
        let path = path.into();
        Self {
            storage_path: path.clone(),
            path,
            content,
            cardinality: Cardinality::One,
            default: None,
            validations: Validations::default(),
            is_virtual: false,
            inherited_from: None,
        }
    }

    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }

    pub fn required(mut self) -> Self {
        self.validations.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.validations.unique = true;
        self
    }

    pub fn with_storage(mut self, storage_path: impl Into<String>) -> Self {
        self.storage_path = storage_path.into();
        self
    }

    pub fn with_default(mut self, value: DataValue) -> Self {
        self.default = Some(DefaultValue::Literal(value));
        self
    }

    pub fn with_computed_default(mut self, f: ComputedFn) -> Self {
        self.default = Some(DefaultValue::Computed(f));
        self
    }

    /// Mark as virtual: never fetched from storage, always computed.
    /// Requires a computed default to produce the value.
    pub fn virtual_field(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.validations.pattern = Some(pattern.into());
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<DataValue>) -> Self {
        self.validations.allowed_values = Some(values);
        self
    }
}

/// Static narrowing of a link field's opposite players.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkFilter {
    /// Keep only opposites on this thing.
    pub thing: Option<String>,
    /// Keep only opposites playing this role.
    pub role: Option<String>,
}

impl LinkFilter {
    /// True when the given player passes the filter.
    pub fn matches(&self, player: &PlayedBy) -> bool {
        if let Some(thing) = &self.thing {
            if thing != &player.thing {
                return false;
            }
        }
        if let Some(role) = &self.role {
            if role != &player.plays {
                return false;
            }
        }
        true
    }
}

/// One resolved endpoint of a relation: a thing playing a role through a
/// declared link field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedBy {
    /// The thing that declared the link field.
    pub thing: String,
    /// The link field's path on that thing.
    pub path: String,
    /// The relation reached through.
    pub relation: String,
    /// The role the declaring thing plays.
    pub plays: String,
    /// Whether the link field targets the opposite players or the relation.
    pub target: LinkTarget,
    /// Declared cardinality of the link field.
    pub cardinality: Cardinality,
}

/// A declared, possibly indirect, relationship endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkFieldDef {
    /// Field name as requests address it.
    pub path: String,
    /// The relation this field goes through.
    pub relation: String,
    /// The role this thing plays in that relation.
    pub plays: String,
    /// What the field's value is: opposite players, or the relation itself.
    pub target: LinkTarget,
    /// ONE or MANY linked values.
    pub cardinality: Cardinality,
    /// Static narrowing of the opposite players.
    pub filter: Option<LinkFilter>,
    /// Ancestor that originally declared this field (enrichment-filled).
    pub inherited_from: Option<String>,
    /// Who sits on the other side (enrichment-filled).
    pub opposite_players: Vec<PlayedBy>,
}

impl LinkFieldDef {
    pub fn new(
        path: impl Into<String>,
        relation: impl Into<String>,
        plays: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            relation: relation.into(),
            plays: plays.into(),
            target: LinkTarget::Role,
            cardinality: Cardinality::Many,
            filter: None,
            inherited_from: None,
            opposite_players: Vec::new(),
        }
    }

    pub fn one(mut self) -> Self {
        self.cardinality = Cardinality::One;
        self
    }

    /// Target the relation instance itself instead of the opposite players.
    pub fn target_relation(mut self) -> Self {
        self.target = LinkTarget::Relation;
        self
    }

    pub fn with_filter(mut self, filter: LinkFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// A relation's named slot.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleDef {
    /// Role name.
    pub name: String,
    /// How many players the slot holds per relation instance.
    pub cardinality: Cardinality,
    /// Link fields that fill this slot (enrichment-filled). Resolves to
    /// exactly one distinct declaring thing.
    pub played_by: Vec<PlayedBy>,
    /// Ancestor that originally declared this role (enrichment-filled).
    pub inherited_from: Option<String>,
}

impl RoleDef {
    pub fn new(name: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            cardinality,
            played_by: Vec::new(),
            inherited_from: None,
        }
    }

    /// The single thing allowed to play this role. Enrichment guarantees
    /// exactly one distinct declaring thing, so any entry will do.
    pub fn player(&self) -> Option<&PlayedBy> {
        self.played_by.first()
    }
}

/// An entity or relation type.
#[derive(Debug, Clone, PartialEq)]
pub struct ThingDef {
    /// Type name.
    pub name: String,
    /// Entity or relation.
    pub kind: ThingKind,
    /// Direct parent, if any.
    pub extends: Option<String>,
    /// Full ancestor chain, nearest first (enrichment-filled).
    pub all_extends: Vec<String>,
    /// Paths of the id field(s), collected from `ContentKind::Id` data
    /// fields.
    pub id_fields: Vec<String>,
    /// Scalar attributes by path.
    pub data_fields: IndexMap<String, DataFieldDef>,
    /// Relationship endpoints by path.
    pub link_fields: IndexMap<String, LinkFieldDef>,
    /// Role slots by name (relations only).
    pub roles: IndexMap<String, RoleDef>,
}

impl ThingDef {
    pub fn new(name: impl Into<String>, kind: ThingKind) -> Self {
        Self {
            name: name.into(),
            kind,
            extends: None,
            all_extends: Vec::new(),
            id_fields: Vec::new(),
            data_fields: IndexMap::new(),
            link_fields: IndexMap::new(),
            roles: IndexMap::new(),
        }
    }

    /// True for relation things.
    pub fn is_relation(&self) -> bool {
        self.kind == ThingKind::Relation
    }

    /// Get a data field by path.
    pub fn data_field(&self, path: &str) -> Option<&DataFieldDef> {
        self.data_fields.get(path)
    }

    /// Get a link field by path.
    pub fn link_field(&self, path: &str) -> Option<&LinkFieldDef> {
        self.link_fields.get(path)
    }

    /// Get a role by name.
    pub fn role(&self, name: &str) -> Option<&RoleDef> {
        self.roles.get(name)
    }

    /// The single id field, when the thing has exactly one.
    pub fn single_id_field(&self) -> Option<&str> {
        match self.id_fields.as_slice() {
            [one] => Some(one.as_str()),
            _ => None,
        }
    }
}

/// A declared set of things. Enrichment fills the resolution fields in
/// place; running it again is a no-op.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    /// Things by name, in declaration order.
    pub things: IndexMap<String, ThingDef>,
}

impl Schema {
    /// Get a thing by name.
    pub fn thing(&self, name: &str) -> Option<&ThingDef> {
        self.things.get(name)
    }

    /// All relations.
    pub fn relations(&self) -> impl Iterator<Item = &ThingDef> {
        self.things.values().filter(|t| t.is_relation())
    }
}
