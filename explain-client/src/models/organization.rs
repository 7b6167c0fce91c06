use serde::{Deserialize, Serialize};

/// Group claim prefix marking organization membership.
pub const ORG_GROUP_PREFIX: &str = "org-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub display_name: String,
}

impl Organization {
    /// Build an organization from its id; `display_name` capitalizes the first
    /// character and turns the remaining hyphens into spaces.
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let display_name = display_name_for(&id);
        Self {
            name: id.clone(),
            id,
            display_name,
        }
    }

    /// The group claim that grants membership, e.g. `org-acme`.
    pub fn group_name(&self) -> String {
        format!("{}{}", ORG_GROUP_PREFIX, self.id)
    }
}

fn display_name_for(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => {
            let rest: String = chars.as_str().replace('-', " ");
            first.to_uppercase().chain(rest.chars()).collect()
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_is_capitalized_with_spaces() {
        let org = Organization::from_id("north-wind-traders");
        assert_eq!(org.display_name, "North wind traders");
        assert_eq!(org.name, "north-wind-traders");
        assert_eq!(org.group_name(), "org-north-wind-traders");
    }

    #[test]
    fn persisted_form_uses_camel_case() {
        let org = Organization::from_id("acme");
        let json = serde_json::to_value(&org).unwrap();
        assert_eq!(json["displayName"], "Acme");
    }
}
