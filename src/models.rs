use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct TreeId(pub i64);

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TreeId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PersonId(pub String);

impl PersonId {
    /// Fresh id for synthetic nodes (placeholders and empty cards).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PersonId {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for PersonId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PersonId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for PersonId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Other,
}

impl Gender {
    /// Gender offered for a new partner: `M` pairs with `F`, everything else with `M`.
    pub const fn opposite(self) -> Self {
        match self {
            Gender::Male => Gender::Female,
            _ => Gender::Male,
        }
    }

    pub const fn as_db_code(self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other => "O",
        }
    }

    /// Database codes are `M`, `F`, `O` (other) and `U` (unknown); the graph
    /// only distinguishes the first two.
    pub fn from_db_code(value: &str) -> Option<Self> {
        match value {
            "M" => Some(Gender::Male),
            "F" => Some(Gender::Female),
            "O" | "U" => Some(Gender::Other),
            _ => None,
        }
    }
}

impl From<String> for Gender {
    fn from(value: String) -> Self {
        Gender::from_db_code(&value).unwrap_or(Gender::Other)
    }
}

impl From<Gender> for String {
    fn from(value: Gender) -> Self {
        value.as_db_code().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PersonData {
    #[serde(default)]
    pub gender: Gender,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PersonData {
    pub fn with_gender(gender: Gender) -> Self {
        Self {
            gender,
            fields: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Rels {
    #[serde(default)]
    pub parents: Vec<PersonId>,
    #[serde(default)]
    pub spouses: Vec<PersonId>,
    #[serde(default)]
    pub children: Vec<PersonId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelType {
    Father,
    Mother,
    Spouse,
    Son,
    Daughter,
}

impl RelType {
    pub const fn is_child(self) -> bool {
        matches!(self, RelType::Son | RelType::Daughter)
    }
}

/// Marks a placeholder relative created while an add-relative interaction is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRelData {
    pub rel_type: RelType,
    pub label: String,
    pub rel_id: PersonId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_parent_id: Option<PersonId>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datum {
    pub id: PersonId,
    #[serde(default)]
    pub data: PersonData,
    #[serde(default)]
    pub rels: Rels,
    #[serde(
        rename = "_new_rel_data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub new_rel_data: Option<NewRelData>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub to_add: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unknown: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub main: bool,
}

impl Datum {
    pub fn new(id: impl Into<PersonId>, gender: Gender) -> Self {
        Self {
            id: id.into(),
            data: PersonData::with_gender(gender),
            rels: Rels::default(),
            new_rel_data: None,
            to_add: false,
            unknown: false,
            main: false,
        }
    }

    pub fn gender(&self) -> Gender {
        self.data.gender
    }

    pub fn is_placeholder(&self) -> bool {
        self.new_rel_data.is_some()
    }

    /// Placeholders and empty `to_add` cards are not part of the committed family.
    pub fn is_committed(&self) -> bool {
        !self.is_placeholder() && !self.to_add
    }

    pub fn rel_type(&self) -> Option<RelType> {
        self.new_rel_data.as_ref().map(|rel| rel.rel_type)
    }

    pub fn relative_ids(&self) -> impl Iterator<Item = &PersonId> {
        self.rels
            .parents
            .iter()
            .chain(self.rels.spouses.iter())
            .chain(self.rels.children.iter())
    }
}

/// Which relatives an add-relative interaction may offer for a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanAdd {
    pub parent: bool,
    pub spouse: bool,
    pub child: bool,
}

impl Default for CanAdd {
    fn default() -> Self {
        Self {
            parent: true,
            spouse: true,
            child: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddRelLabels {
    pub father: String,
    pub mother: String,
    pub spouse: String,
    pub son: String,
    pub daughter: String,
}

impl AddRelLabels {
    pub fn label(&self, rel_type: RelType) -> &str {
        match rel_type {
            RelType::Father => &self.father,
            RelType::Mother => &self.mother,
            RelType::Spouse => &self.spouse,
            RelType::Son => &self.son,
            RelType::Daughter => &self.daughter,
        }
    }
}

impl Default for AddRelLabels {
    fn default() -> Self {
        Self {
            father: "Add father".to_string(),
            mother: "Add mother".to_string(),
            spouse: "Add spouse".to_string(),
            son: "Add son".to_string(),
            daughter: "Add daughter".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PersonRow {
    pub id: i64,
    pub tree_id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub maiden_name: Option<String>,
    pub gender: String,
    pub is_living: bool,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
    pub notes: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UnionRow {
    pub id: i64,
    pub tree_id: i64,
    pub partner1_id: i64,
    pub partner2_id: Option<i64>,
    pub union_type: String,
    pub status: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ParentChildRow {
    pub id: i64,
    pub parent_id: i64,
    pub child_id: i64,
    pub relationship_type: String,
    pub created_at: NaiveDateTime,
}

/// All rows persisted for one tree, fetched in a single batch before editing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeRows {
    pub persons: Vec<PersonRow>,
    pub unions: Vec<UnionRow>,
    pub links: Vec<ParentChildRow>,
}
