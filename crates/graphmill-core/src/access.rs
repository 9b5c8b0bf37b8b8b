//! Read-access policy: per-role rules merged with most-permissive-wins semantics.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::Properties;
use crate::schema::{NodeLabel, RelationType};

pub const WILDCARD: &str = "*";

/// How much of the dataset a label rule covers. `All` is the wider scope.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    #[default]
    Department,
    All,
}

impl Scope {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Department => "DEPARTMENT",
            Self::All => "ALL",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Property visibility for one label or relation type.
///
/// Serialized as a list of property names; a list containing `"*"` is the wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum PropertyAccess {
    All,
    Only(BTreeSet<String>),
}

impl Default for PropertyAccess {
    fn default() -> Self {
        Self::Only(BTreeSet::new())
    }
}

impl PropertyAccess {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().map(Into::into).collect::<Vec<_>>().into()
    }

    #[must_use]
    pub fn allows(&self, property: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.contains(property),
        }
    }

    /// Wildcard absorbs; otherwise the union of both sets.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::Only(a), Self::Only(b)) => Self::Only(a.union(b).cloned().collect()),
        }
    }

    #[must_use]
    pub fn filter(&self, properties: &Properties) -> Properties {
        properties
            .iter()
            .filter(|(key, _)| self.allows(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl From<Vec<String>> for PropertyAccess {
    fn from(names: Vec<String>) -> Self {
        if names.iter().any(|n| n == WILDCARD) {
            Self::All
        } else {
            Self::Only(names.into_iter().collect())
        }
    }
}

impl From<PropertyAccess> for Vec<String> {
    fn from(access: PropertyAccess) -> Self {
        match access {
            PropertyAccess::All => vec![WILDCARD.to_string()],
            PropertyAccess::Only(names) => names.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRule {
    #[serde(default)]
    pub allowed_properties: PropertyAccess,
    #[serde(default)]
    pub scope: Scope,
}

impl NodeRule {
    #[must_use]
    pub const fn new(allowed_properties: PropertyAccess, scope: Scope) -> Self {
        Self {
            allowed_properties,
            scope,
        }
    }

    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            allowed_properties: self.allowed_properties.merge(&other.allowed_properties),
            scope: self.scope.max(other.scope),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRule {
    #[serde(default)]
    pub allowed_properties: PropertyAccess,
}

impl RelationshipRule {
    #[must_use]
    pub const fn new(allowed_properties: PropertyAccess) -> Self {
        Self { allowed_properties }
    }

    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            allowed_properties: self.allowed_properties.merge(&other.allowed_properties),
        }
    }
}

/// Effective read permissions of one role, or of a merged set of roles.
///
/// The default value grants nothing and is the identity element of [`AccessPolicy::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    #[serde(default)]
    pub node_rules: BTreeMap<NodeLabel, NodeRule>,
    #[serde(default)]
    pub allowed_relationships: BTreeSet<RelationType>,
    #[serde(default)]
    pub relationship_rules: BTreeMap<RelationType, RelationshipRule>,
}

impl AccessPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_node_rule(mut self, label: NodeLabel, rule: NodeRule) -> Self {
        self.node_rules.insert(label, rule);
        self
    }

    /// Allows traversal of `relation` and sets which of its properties are visible.
    #[must_use]
    pub fn with_relationship(mut self, relation: RelationType, properties: PropertyAccess) -> Self {
        self.allowed_relationships.insert(relation);
        self.relationship_rules
            .insert(relation, RelationshipRule::new(properties));
        self
    }

    /// Dimension-by-dimension union; a rule present on one side only passes through.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut node_rules = self.node_rules.clone();
        for (label, rule) in &other.node_rules {
            node_rules
                .entry(*label)
                .and_modify(|existing| *existing = existing.merge(rule))
                .or_insert_with(|| rule.clone());
        }

        let mut relationship_rules = self.relationship_rules.clone();
        for (relation, rule) in &other.relationship_rules {
            relationship_rules
                .entry(*relation)
                .and_modify(|existing| *existing = existing.merge(rule))
                .or_insert_with(|| rule.clone());
        }

        Self {
            node_rules,
            allowed_relationships: self
                .allowed_relationships
                .union(&other.allowed_relationships)
                .copied()
                .collect(),
            relationship_rules,
        }
    }

    #[must_use]
    pub fn can_read_label(&self, label: NodeLabel) -> bool {
        self.node_rules.contains_key(&label)
    }

    #[must_use]
    pub fn can_traverse(&self, relation: RelationType) -> bool {
        self.allowed_relationships.contains(&relation)
    }

    /// True when reads of `label` must be restricted to the caller's department.
    #[must_use]
    pub fn requires_department_scope(&self, label: NodeLabel) -> bool {
        self.node_rules
            .get(&label)
            .is_some_and(|rule| rule.scope == Scope::Department)
    }

    /// `None` when the label is not readable at all.
    #[must_use]
    pub fn filter_node_properties(
        &self,
        label: NodeLabel,
        properties: &Properties,
    ) -> Option<Properties> {
        self.node_rules
            .get(&label)
            .map(|rule| rule.allowed_properties.filter(properties))
    }

    /// `None` when the relation cannot be traversed. A traversable relation
    /// without a property rule exposes no properties.
    #[must_use]
    pub fn filter_relationship_properties(
        &self,
        relation: RelationType,
        properties: &Properties,
    ) -> Option<Properties> {
        if !self.can_traverse(relation) {
            return None;
        }
        Some(
            self.relationship_rules
                .get(&relation)
                .map(|rule| rule.allowed_properties.filter(properties))
                .unwrap_or_default(),
        )
    }

    /// Applies every dimension to a single node read.
    ///
    /// Department-scoped labels are only visible when both departments are
    /// known and equal (compared trimmed and case-insensitively).
    #[must_use]
    pub fn visible_node(
        &self,
        label: NodeLabel,
        properties: &Properties,
        node_department: Option<&str>,
        caller_department: Option<&str>,
    ) -> Option<Properties> {
        let filtered = self.filter_node_properties(label, properties)?;
        if !self.requires_department_scope(label) {
            return Some(filtered);
        }
        match (node_department, caller_department) {
            (Some(node), Some(caller))
                if node.trim().eq_ignore_ascii_case(caller.trim()) && !caller.trim().is_empty() =>
            {
                Some(filtered)
            }
            _ => None,
        }
    }
}

/// Role name to static policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyTable {
    roles: BTreeMap<String, AccessPolicy>,
}

impl PolicyTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a table from a JSON object keyed by role name.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidPolicyTable(e.to_string()))
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>, policy: AccessPolicy) -> Self {
        self.roles.insert(role.into(), policy);
        self
    }

    #[must_use]
    pub fn get(&self, role: &str) -> Option<&AccessPolicy> {
        self.roles.get(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// Effective policy for a caller holding all of `roles`. Unknown role
    /// names are skipped; no roles yields the empty policy.
    pub fn merge_policies<S: AsRef<str>>(&self, roles: &[S]) -> AccessPolicy {
        roles
            .iter()
            .filter_map(|role| self.roles.get(role.as_ref()))
            .fold(AccessPolicy::default(), |merged, policy| merged.merge(policy))
    }

    /// The stock roles: `admin`, `hr_manager`, `manager`, `editor`, `viewer`.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .with_role("admin", admin())
            .with_role("hr_manager", hr_manager())
            .with_role("manager", manager())
            .with_role("editor", editor())
            .with_role("viewer", viewer())
    }
}

fn everything(scope: Scope) -> AccessPolicy {
    let mut policy = AccessPolicy::new();
    for label in NodeLabel::ALL {
        policy = policy.with_node_rule(label, NodeRule::new(PropertyAccess::All, scope));
    }
    for relation in RelationType::ALL {
        policy = policy.with_relationship(relation, PropertyAccess::All);
    }
    policy
}

fn admin() -> AccessPolicy {
    everything(Scope::All)
}

fn hr_manager() -> AccessPolicy {
    everything(Scope::All)
        .with_node_rule(
            NodeLabel::Project,
            NodeRule::new(
                PropertyAccess::only(["name", "code", "status"]),
                Scope::All,
            ),
        )
        .with_relationship(RelationType::OwnedBy, PropertyAccess::default())
        .with_relationship(RelationType::RequiresSkill, PropertyAccess::default())
}

fn manager() -> AccessPolicy {
    AccessPolicy::new()
        .with_node_rule(
            NodeLabel::Employee,
            NodeRule::new(
                PropertyAccess::only(["name", "email", "employee_id", "title", "hire_date"]),
                Scope::Department,
            ),
        )
        .with_node_rule(
            NodeLabel::Department,
            NodeRule::new(PropertyAccess::All, Scope::All),
        )
        .with_node_rule(
            NodeLabel::Project,
            NodeRule::new(PropertyAccess::All, Scope::All),
        )
        .with_node_rule(NodeLabel::Skill, NodeRule::new(PropertyAccess::All, Scope::All))
        .with_node_rule(
            NodeLabel::Position,
            NodeRule::new(PropertyAccess::only(["title", "level"]), Scope::All),
        )
        .with_node_rule(
            NodeLabel::Certification,
            NodeRule::new(PropertyAccess::All, Scope::All),
        )
        .with_relationship(RelationType::ReportsTo, PropertyAccess::All)
        .with_relationship(RelationType::BelongsTo, PropertyAccess::All)
        .with_relationship(RelationType::WorksOn, PropertyAccess::All)
        .with_relationship(RelationType::HasSkill, PropertyAccess::only(["level"]))
        .with_relationship(RelationType::HoldsPosition, PropertyAccess::default())
        .with_relationship(RelationType::HasCertification, PropertyAccess::default())
}

fn editor() -> AccessPolicy {
    AccessPolicy::new()
        .with_node_rule(
            NodeLabel::Project,
            NodeRule::new(PropertyAccess::All, Scope::All),
        )
        .with_node_rule(NodeLabel::Skill, NodeRule::new(PropertyAccess::All, Scope::All))
        .with_node_rule(
            NodeLabel::Department,
            NodeRule::new(PropertyAccess::only(["name", "code"]), Scope::All),
        )
        .with_node_rule(
            NodeLabel::Employee,
            NodeRule::new(PropertyAccess::only(["name"]), Scope::Department),
        )
        .with_relationship(RelationType::OwnedBy, PropertyAccess::All)
        .with_relationship(RelationType::RequiresSkill, PropertyAccess::All)
        .with_relationship(RelationType::WorksOn, PropertyAccess::default())
}

fn viewer() -> AccessPolicy {
    AccessPolicy::new()
        .with_node_rule(
            NodeLabel::Employee,
            NodeRule::new(PropertyAccess::only(["name"]), Scope::Department),
        )
        .with_node_rule(
            NodeLabel::Department,
            NodeRule::new(PropertyAccess::only(["name"]), Scope::All),
        )
        .with_node_rule(
            NodeLabel::Skill,
            NodeRule::new(PropertyAccess::only(["name"]), Scope::All),
        )
        .with_node_rule(
            NodeLabel::Project,
            NodeRule::new(PropertyAccess::only(["name"]), Scope::Department),
        )
        .with_relationship(RelationType::BelongsTo, PropertyAccess::default())
        .with_relationship(RelationType::HasSkill, PropertyAccess::default())
}
