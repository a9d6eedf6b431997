//! The declared application model, and how it becomes the desired schema.
//!
//! A [`Model`] is plain data: entities with properties and a few annotations
//! each. It derives [`Facet`] so it can be loaded from a styx file, but it can
//! just as well be built in code:
//!
//! ```
//! use keel::{EntityModel, Model, PropertyModel};
//!
//! let model = Model::new().entity(
//!     EntityModel::new("Temp")
//!         .key(["Id"])
//!         .property(PropertyModel::new("Id", "int32").generated_on_add())
//!         .property(PropertyModel::new("Con", "Option<String>").max_length(1000))
//!         .property(PropertyModel::new("Temp", "text").max_length(10)),
//! );
//! let schema = keel::model::read_desired_schema(&model).unwrap();
//! assert_eq!(schema.get_table("temp").unwrap().columns.len(), 3);
//! ```

use crate::schema::{ColumnDescriptor, GenerationPolicy, Schema, TableDescriptor, ident_eq};
use crate::types::{SemanticType, effective_max_length, effective_precision_scale};
use crate::{Error, Result};
use facet::Facet;

/// Anything that can list the entities of an application model.
pub trait ModelProvider: Sync {
    fn entities(&self) -> &[EntityModel];
}

/// A declarative application model.
#[derive(Facet, Debug, Clone, Default, PartialEq)]
pub struct Model {
    /// Entities, in declaration order
    #[facet(default)]
    pub entities: Vec<EntityModel>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, entity: EntityModel) -> Self {
        self.entities.push(entity);
        self
    }
}

impl ModelProvider for Model {
    fn entities(&self) -> &[EntityModel] {
        &self.entities
    }
}

/// One entity, mapped to one table.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct EntityModel {
    /// Entity name, also the table name unless `table` is set
    pub name: String,

    /// Table name override
    #[facet(default)]
    pub table: Option<String>,

    /// Names of the properties forming the primary key
    #[facet(default)]
    pub key: Vec<String>,

    #[facet(default)]
    pub indexes: Vec<IndexModel>,

    #[facet(default)]
    pub properties: Vec<PropertyModel>,
}

impl EntityModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            key: Vec::new(),
            indexes: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn key<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key = properties.into_iter().map(Into::into).collect();
        self
    }

    pub fn index(mut self, index: IndexModel) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn property(mut self, property: PropertyModel) -> Self {
        self.properties.push(property);
        self
    }

    /// The table this entity maps to.
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    fn find_property(&self, name: &str) -> Option<&PropertyModel> {
        self.properties.iter().find(|p| ident_eq(&p.name, name))
    }
}

/// An index over one or more properties.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct IndexModel {
    pub properties: Vec<String>,

    #[facet(default)]
    pub unique: bool,
}

impl IndexModel {
    pub fn unique<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            properties: properties.into_iter().map(Into::into).collect(),
            unique: true,
        }
    }
}

/// One property, mapped to one column.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct PropertyModel {
    /// Property name, also the column name unless `column` is set
    pub name: String,

    /// Semantic type name (`int32`, `text`, ...). `Option<T>` declares a
    /// nullable property.
    #[facet(rename = "type")]
    pub value_type: String,

    /// Column name override
    #[facet(default)]
    pub column: Option<String>,

    /// Whether the declared type admits null
    #[facet(default)]
    pub optional: bool,

    /// Forces NOT NULL regardless of the declared type
    #[facet(default)]
    pub required: bool,

    /// Value assigned by the database on insert
    #[facet(default)]
    pub generated_on_add: bool,

    /// Explicit generation: `identity`, `computed` or `none`
    #[facet(default)]
    pub generation: Option<String>,

    #[facet(default)]
    pub max_length: Option<u32>,

    /// Fallback for `max_length`
    #[facet(default)]
    pub string_length: Option<u32>,

    #[facet(default)]
    pub precision: Option<u32>,

    #[facet(default)]
    pub scale: Option<u32>,

    /// Explicit column type, emitted verbatim
    #[facet(default)]
    pub column_type: Option<String>,

    #[facet(default)]
    pub default_value: Option<String>,

    #[facet(default)]
    pub collation: Option<String>,

    /// Expression for computed columns
    #[facet(default)]
    pub computed_sql: Option<String>,
}

impl PropertyModel {
    pub fn new(name: impl Into<String>, value_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: value_type.into(),
            column: None,
            optional: false,
            required: false,
            generated_on_add: false,
            generation: None,
            max_length: None,
            string_length: None,
            precision: None,
            scale: None,
            column_type: None,
            default_value: None,
            collation: None,
            computed_sql: None,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn generated_on_add(mut self) -> Self {
        self.generated_on_add = true;
        self
    }

    pub fn generation(mut self, generation: impl Into<String>) -> Self {
        self.generation = Some(generation.into());
        self
    }

    pub fn max_length(mut self, len: u32) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn string_length(mut self, len: u32) -> Self {
        self.string_length = Some(len);
        self
    }

    pub fn precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn column_type(mut self, ddl_type: impl Into<String>) -> Self {
        self.column_type = Some(ddl_type.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    pub fn computed_sql(mut self, sql: impl Into<String>) -> Self {
        self.computed_sql = Some(sql.into());
        self.generation = Some("computed".to_string());
        self
    }

    /// The column this property maps to.
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// Build the desired schema from a model.
pub fn read_desired_schema<P: ModelProvider + ?Sized>(provider: &P) -> Result<Schema> {
    let mut schema = Schema::new();
    for entity in provider.entities() {
        schema.insert(table_from_entity(entity)?)?;
    }
    Ok(schema)
}

fn table_from_entity(entity: &EntityModel) -> Result<TableDescriptor> {
    for key in &entity.key {
        if entity.find_property(key).is_none() {
            return Err(Error::InvalidModel(format!(
                "key of {} names unknown property `{}`",
                entity.name, key
            )));
        }
    }
    for index in &entity.indexes {
        if index.properties.is_empty() {
            return Err(Error::InvalidModel(format!(
                "index on {} lists no properties",
                entity.name
            )));
        }
        if let Some(unknown) = index
            .properties
            .iter()
            .find(|p| entity.find_property(p).is_none())
        {
            return Err(Error::InvalidModel(format!(
                "index on {} names unknown property `{}`",
                entity.name, unknown
            )));
        }
    }

    let columns = entity
        .properties
        .iter()
        .map(|property| column_from_property(entity, property))
        .collect::<Result<Vec<_>>>()?;

    TableDescriptor::new(entity.table_name(), columns)
}

fn column_from_property(entity: &EntityModel, property: &PropertyModel) -> Result<ColumnDescriptor> {
    let (type_name, nullable_type) = match property
        .value_type
        .trim()
        .strip_prefix("Option<")
        .and_then(|rest| rest.strip_suffix('>'))
    {
        Some(inner) => (inner, true),
        None => (property.value_type.trim(), false),
    };
    let semantic_type =
        SemanticType::from_name(type_name).ok_or_else(|| Error::UnsupportedSemanticTypeName {
            name: property.value_type.clone(),
            entity: entity.name.clone(),
            property: property.name.clone(),
        })?;

    let is_primary_key = entity.key.iter().any(|k| ident_eq(k, &property.name));

    let annotated = match property.generation.as_deref().map(str::trim) {
        None => None,
        Some(g) if g.eq_ignore_ascii_case("identity") => Some(GenerationPolicy::Identity),
        Some(g) if g.eq_ignore_ascii_case("computed") => Some(GenerationPolicy::Computed),
        Some(g) if g.eq_ignore_ascii_case("none") => Some(GenerationPolicy::None),
        Some(other) => {
            return Err(Error::InvalidModel(format!(
                "{}.{} has unknown generation `{}`",
                entity.name, property.name, other
            )));
        }
    };
    let generation = annotated.unwrap_or(if property.generated_on_add {
        GenerationPolicy::Identity
    } else {
        GenerationPolicy::None
    });
    let is_auto_increment =
        property.generated_on_add || annotated == Some(GenerationPolicy::Identity);

    let raw_type_override = property.column_type.clone();
    let max_length = effective_max_length(
        semantic_type,
        property.max_length.or(property.string_length),
        raw_type_override.as_deref(),
    );
    let (precision, scale) = effective_precision_scale(
        semantic_type,
        property.precision,
        property.scale,
        raw_type_override.as_deref(),
    );

    // Only single-property unique indexes map to a column constraint, and a
    // primary key is already unique.
    let is_unique = !is_primary_key
        && entity.indexes.iter().any(|index| {
            index.unique
                && index.properties.len() == 1
                && ident_eq(&index.properties[0], &property.name)
        });

    // The database fills generated columns itself; they carry no default.
    let generated = generation == GenerationPolicy::Computed
        || (generation == GenerationPolicy::Identity && is_primary_key);
    let default_value = property.default_value.clone().filter(|_| !generated);

    Ok(ColumnDescriptor {
        name: property.column_name().to_string(),
        semantic_type,
        is_nullable: (property.optional || nullable_type) && !property.required && !is_primary_key,
        is_primary_key,
        is_auto_increment,
        max_length,
        raw_type_override,
        default_value,
        is_unique,
        collation: property.collation.clone(),
        precision,
        scale,
        generation,
        computed_expression: match generation {
            GenerationPolicy::Computed => property.computed_sql.clone(),
            _ => None,
        },
        key_object: None,
    })
}
