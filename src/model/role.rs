use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Admin,
    /// Human resources staff
    Rrhh,
    Manager,
    Employee,
}

impl TryFrom<String> for Role {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Role {
    /// Text forms accepted by the `users.role` column.
    pub const NAMES: &'static [&'static str] = &["admin", "rrhh", "manager", "employee"];

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Rrhh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn text_form_round_trips_for_every_role() {
        for role in Role::iter() {
            let text = role.to_string();
            assert_eq!(text, text.to_lowercase());
            assert_eq!(Role::try_from(text).unwrap(), role);
        }
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Role::Rrhh).unwrap(), "\"rrhh\"");
        let parsed: Role = serde_json::from_str("\"manager\"").unwrap();
        assert_eq!(parsed, Role::Manager);
    }

    #[test]
    fn names_cover_every_role() {
        let names: Vec<String> = Role::iter().map(|r| r.to_string()).collect();
        assert_eq!(names, Role::NAMES);
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(Role::try_from("superuser".to_string()).is_err());
    }
}
