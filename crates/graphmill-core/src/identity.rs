//! Deterministic entity identity.
//!
//! Ids are UUID v5 digests of a canonical string built from the node label
//! and its natural key. The namespace UUID is derived from a deployment
//! name, so two deployments never mint the same id for the same entity.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::graph::Properties;
use crate::schema::NodeLabel;

/// Fields that identify an entity on their own, in priority order.
pub const STRONG_IDENTIFIERS: &[&str] = &[
    "id",
    "employee_id",
    "email",
    "code",
    "project_id",
    "department_id",
    "skill_id",
    "certification_id",
];

/// Field that identifies an entity only together with its other properties.
pub const WEAK_IDENTIFIER: &str = "name";

pub const DEFAULT_NAMESPACE: &str = "graphmill";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityResolver {
    namespace: Uuid,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("urn:{namespace}:entity").as_bytes()),
        }
    }

    #[must_use]
    pub const fn namespace(&self) -> Uuid {
        self.namespace
    }

    #[must_use]
    pub fn entity_id(&self, label: NodeLabel, properties: &Properties) -> String {
        let canonical = canonical_key(label, properties);
        Uuid::new_v5(&self.namespace, canonical.as_bytes())
            .hyphenated()
            .to_string()
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

/// Entity id under the default namespace.
#[must_use]
pub fn generate_entity_id(label: NodeLabel, properties: &Properties) -> String {
    IdentityResolver::default().entity_id(label, properties)
}

/// Each identity rule yields a tagged JSON array, so no property value can
/// reproduce another rule's or another property set's key.
fn canonical_key(label: NodeLabel, properties: &Properties) -> String {
    for field in STRONG_IDENTIFIERS {
        if let Some(value) = properties.get(*field).and_then(normalize) {
            return json!(["strong", label.as_str(), value]).to_string();
        }
    }

    if let Some(name) = properties.get(WEAK_IDENTIFIER).and_then(normalize) {
        let rest = sorted_pairs(properties, Some(WEAK_IDENTIFIER));
        return json!(["weak", label.as_str(), name, rest]).to_string();
    }

    json!(["all", label.as_str(), sorted_pairs(properties, None)]).to_string()
}

// Properties is a BTreeMap, so iteration is already key-ordered.
fn sorted_pairs(properties: &Properties, skip: Option<&str>) -> Vec<(String, String)> {
    properties
        .iter()
        .filter(|(key, _)| Some(key.as_str()) != skip)
        .filter_map(|(key, value)| normalize(value).map(|v| (key.clone(), v)))
        .collect()
}

fn normalize(value: &Value) -> Option<String> {
    let rendered = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_lowercase(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string().trim().to_lowercase(),
    };

    if rendered.is_empty() {
        None
    } else {
        Some(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_deterministic() {
        let p = props(json!({"name": "Kim", "email": "kim@x.com"}));
        assert_eq!(
            generate_entity_id(NodeLabel::Employee, &p),
            generate_entity_id(NodeLabel::Employee, &p)
        );
    }

    #[test]
    fn test_insertion_order_independent() {
        let mut forward = Properties::new();
        forward.insert("name".into(), json!("Kim"));
        forward.insert("title".into(), json!("Engineer"));
        forward.insert("city".into(), json!("Seoul"));

        let mut backward = Properties::new();
        backward.insert("city".into(), json!("Seoul"));
        backward.insert("title".into(), json!("Engineer"));
        backward.insert("name".into(), json!("Kim"));

        assert_eq!(
            generate_entity_id(NodeLabel::Employee, &forward),
            generate_entity_id(NodeLabel::Employee, &backward)
        );
    }

    #[test]
    fn test_strong_identifier_dominates() {
        let a = props(json!({"employee_id": "E1", "email": "a@x.com"}));
        let b = props(json!({"employee_id": "E1", "email": "b@y.com"}));
        assert_eq!(
            generate_entity_id(NodeLabel::Employee, &a),
            generate_entity_id(NodeLabel::Employee, &b)
        );
    }

    #[test]
    fn test_weak_identifier_disambiguates() {
        let a = props(json!({"name": "Kim", "title": "Engineer"}));
        let b = props(json!({"name": "Kim", "title": "Designer"}));
        assert_ne!(
            generate_entity_id(NodeLabel::Employee, &a),
            generate_entity_id(NodeLabel::Employee, &b)
        );
    }

    #[test]
    fn test_email_is_strong() {
        // email outranks the weak name field, so these collapse
        let a = props(json!({"name": "Kim", "email": "a@x.com"}));
        let b = props(json!({"name": "Kimberly", "email": "a@x.com"}));
        assert_eq!(
            generate_entity_id(NodeLabel::Employee, &a),
            generate_entity_id(NodeLabel::Employee, &b)
        );

        let c = props(json!({"name": "Kim", "email": "b@y.com"}));
        assert_ne!(
            generate_entity_id(NodeLabel::Employee, &a),
            generate_entity_id(NodeLabel::Employee, &c)
        );
    }

    #[test]
    fn test_normalization() {
        let a = props(json!({"email": "  Kim@X.com "}));
        let b = props(json!({"email": "kim@x.com"}));
        assert_eq!(
            generate_entity_id(NodeLabel::Employee, &a),
            generate_entity_id(NodeLabel::Employee, &b)
        );
    }

    #[test]
    fn test_empty_strong_identifier_falls_through() {
        let a = props(json!({"id": "  ", "name": "Kim", "title": "Engineer"}));
        let b = props(json!({"name": "Kim", "title": "Engineer"}));
        assert_eq!(
            generate_entity_id(NodeLabel::Employee, &a),
            generate_entity_id(NodeLabel::Employee, &b)
        );
    }

    #[test]
    fn test_null_values_excluded() {
        let a = props(json!({"name": "Kim", "title": null, "phone": ""}));
        let b = props(json!({"name": "Kim"}));
        assert_eq!(
            generate_entity_id(NodeLabel::Employee, &a),
            generate_entity_id(NodeLabel::Employee, &b)
        );
    }

    #[test]
    fn test_label_participates() {
        let p = props(json!({"code": "RUST"}));
        assert_ne!(
            generate_entity_id(NodeLabel::Skill, &p),
            generate_entity_id(NodeLabel::Project, &p)
        );
    }

    #[test]
    fn test_fallback_uses_all_properties() {
        let a = props(json!({"title": "Engineer", "level": 3}));
        let b = props(json!({"title": "Engineer", "level": 4}));
        assert_ne!(
            generate_entity_id(NodeLabel::Position, &a),
            generate_entity_id(NodeLabel::Position, &b)
        );
    }

    #[test]
    fn test_separator_in_value_does_not_collide() {
        let packed = props(json!({"dept": "Sales|title=Lead"}));
        let split = props(json!({"dept": "Sales", "title": "Lead"}));
        assert_ne!(
            generate_entity_id(NodeLabel::Position, &packed),
            generate_entity_id(NodeLabel::Position, &split)
        );
    }

    #[test]
    fn test_rules_do_not_share_keys() {
        let strong = props(json!({"code": "title=engineer"}));
        let fallback = props(json!({"title": "Engineer"}));
        assert_ne!(
            generate_entity_id(NodeLabel::Position, &strong),
            generate_entity_id(NodeLabel::Position, &fallback)
        );

        let weak = props(json!({"name": "Kim"}));
        let named_fallback = props(json!({"alias": "Kim"}));
        assert_ne!(
            generate_entity_id(NodeLabel::Employee, &weak),
            generate_entity_id(NodeLabel::Employee, &named_fallback)
        );
    }

    #[test]
    fn test_namespace_isolation() {
        let p = props(json!({"employee_id": "E1"}));
        let ours = IdentityResolver::new("acme").entity_id(NodeLabel::Employee, &p);
        let theirs = IdentityResolver::new("globex").entity_id(NodeLabel::Employee, &p);
        assert_ne!(ours, theirs);
    }

    #[test]
    fn test_fixed_length_output() {
        let id = generate_entity_id(NodeLabel::Skill, &props(json!({"name": "Rust"})));
        assert_eq!(id.len(), 36);
        assert!(id.parse::<Uuid>().is_ok());
    }
}
