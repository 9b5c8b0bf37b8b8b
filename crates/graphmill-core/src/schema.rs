use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Employee,
    Department,
    Skill,
    Project,
    Position,
    Certification,
}

impl NodeLabel {
    pub const ALL: [Self; 6] = [
        Self::Employee,
        Self::Department,
        Self::Skill,
        Self::Project,
        Self::Position,
        Self::Certification,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "Employee",
            Self::Department => "Department",
            Self::Skill => "Skill",
            Self::Project => "Project",
            Self::Position => "Position",
            Self::Certification => "Certification",
        }
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeLabel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Employee" => Ok(Self::Employee),
            "Department" => Ok(Self::Department),
            "Skill" => Ok(Self::Skill),
            "Project" => Ok(Self::Project),
            "Position" => Ok(Self::Position),
            "Certification" => Ok(Self::Certification),
            _ => Err(crate::Error::InvalidNodeLabel(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    // Employee facts
    HasSkill,
    BelongsTo,
    WorksOn,
    HoldsPosition,
    HasCertification,
    ReportsTo,

    // Project facts
    OwnedBy,
    RequiresSkill,
}

impl RelationType {
    pub const ALL: [Self; 8] = [
        Self::HasSkill,
        Self::BelongsTo,
        Self::WorksOn,
        Self::HoldsPosition,
        Self::HasCertification,
        Self::ReportsTo,
        Self::OwnedBy,
        Self::RequiresSkill,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HasSkill => "HAS_SKILL",
            Self::BelongsTo => "BELONGS_TO",
            Self::WorksOn => "WORKS_ON",
            Self::HoldsPosition => "HOLDS_POSITION",
            Self::HasCertification => "HAS_CERTIFICATION",
            Self::ReportsTo => "REPORTS_TO",
            Self::OwnedBy => "OWNED_BY",
            Self::RequiresSkill => "REQUIRES_SKILL",
        }
    }

    /// The only (source, target) label pair an edge of this type may connect.
    #[must_use]
    pub const fn endpoints(&self) -> (NodeLabel, NodeLabel) {
        match self {
            Self::HasSkill => (NodeLabel::Employee, NodeLabel::Skill),
            Self::BelongsTo => (NodeLabel::Employee, NodeLabel::Department),
            Self::WorksOn => (NodeLabel::Employee, NodeLabel::Project),
            Self::HoldsPosition => (NodeLabel::Employee, NodeLabel::Position),
            Self::HasCertification => (NodeLabel::Employee, NodeLabel::Certification),
            Self::ReportsTo => (NodeLabel::Employee, NodeLabel::Employee),
            Self::OwnedBy => (NodeLabel::Project, NodeLabel::Department),
            Self::RequiresSkill => (NodeLabel::Project, NodeLabel::Skill),
        }
    }

    #[must_use]
    pub fn accepts(&self, source: NodeLabel, target: NodeLabel) -> bool {
        self.endpoints() == (source, target)
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HAS_SKILL" => Ok(Self::HasSkill),
            "BELONGS_TO" => Ok(Self::BelongsTo),
            "WORKS_ON" => Ok(Self::WorksOn),
            "HOLDS_POSITION" => Ok(Self::HoldsPosition),
            "HAS_CERTIFICATION" => Ok(Self::HasCertification),
            "REPORTS_TO" => Ok(Self::ReportsTo),
            "OWNED_BY" => Ok(Self::OwnedBy),
            "REQUIRES_SKILL" => Ok(Self::RequiresSkill),
            _ => Err(crate::Error::InvalidRelationType(s.to_string())),
        }
    }
}

/// Human-readable schema listing used in oracle prompts.
#[must_use]
pub fn describe() -> String {
    let labels: Vec<&str> = NodeLabel::ALL.iter().map(NodeLabel::as_str).collect();
    let mut out = format!("Node labels: {}\nRelationship types:\n", labels.join(", "));
    for rel in RelationType::ALL {
        let (source, target) = rel.endpoints();
        out.push_str(&format!("- ({source})-[:{rel}]->({target})\n"));
    }
    out
}
