//! Abstract element descriptors
//!
//! A [`Descriptor`] says *which* element a step wants (by accessible role,
//! label, placeholder, visible text, ...) without committing to markup. The
//! driver turns it into a concrete query; the adapter turns the candidates
//! into exactly one actionable element.

use std::fmt;

use serde::{Deserialize, Serialize};

/// ARIA roles the workflow addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Button,
    Tab,
    MenuItem,
    Option,
    Checkbox,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Button => "button",
            Role::Tab => "tab",
            Role::MenuItem => "menuitem",
            Role::Option => "option",
            Role::Checkbox => "checkbox",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Descriptor {
    /// Accessible role plus accessible name
    Role {
        role: Role,
        name: String,
        #[serde(default)]
        exact: bool,
    },

    /// Form control associated with a label
    Label { label: String },

    /// Input whose placeholder contains the text
    Placeholder { text: String },

    /// Element whose visible text contains (or equals) the text
    Text {
        text: String,
        #[serde(default)]
        exact: bool,
    },

    /// Form control by its `name` attribute
    FieldName { name: String },

    /// Raw CSS selector; reserved for contracts the UI exposes no better way
    Css { selector: String },

    /// Descriptor scoped to the form section that contains `section` text
    Within {
        section: String,
        target: Box<Descriptor>,
    },
}

impl Descriptor {
    pub fn role(role: Role, name: impl Into<String>) -> Self {
        Descriptor::Role { role, name: name.into(), exact: false }
    }

    pub fn role_exact(role: Role, name: impl Into<String>) -> Self {
        Descriptor::Role { role, name: name.into(), exact: true }
    }

    pub fn button(name: impl Into<String>) -> Self {
        Self::role(Role::Button, name)
    }

    pub fn tab(name: impl Into<String>) -> Self {
        Self::role(Role::Tab, name)
    }

    pub fn menu_item(name: impl Into<String>) -> Self {
        Self::role(Role::MenuItem, name)
    }

    pub fn label(label: impl Into<String>) -> Self {
        Descriptor::Label { label: label.into() }
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        Descriptor::Placeholder { text: text.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Descriptor::Text { text: text.into(), exact: false }
    }

    pub fn field(name: impl Into<String>) -> Self {
        Descriptor::FieldName { name: name.into() }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Descriptor::Css { selector: selector.into() }
    }

    /// The `Open` toggle of the dropdown in the form section titled `section`
    pub fn dropdown(section: impl Into<String>) -> Self {
        Descriptor::Within {
            section: section.into(),
            target: Box::new(Descriptor::label("Open")),
        }
    }

    /// Name the candidate's accessible text is compared against, if the
    /// descriptor carries one.
    pub fn expected_name(&self) -> Option<&str> {
        match self {
            Descriptor::Role { name, .. } => Some(name),
            Descriptor::Text { text, .. } => Some(text),
            Descriptor::Label { label } => Some(label),
            Descriptor::Placeholder { text } => Some(text),
            Descriptor::Within { target, .. } => target.expected_name(),
            Descriptor::FieldName { .. } | Descriptor::Css { .. } => None,
        }
    }

    /// Whether the descriptor insists on an exact name match
    pub fn is_exact(&self) -> bool {
        match self {
            Descriptor::Role { exact, .. } | Descriptor::Text { exact, .. } => *exact,
            Descriptor::Within { target, .. } => target.is_exact(),
            _ => false,
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Role { role, name, exact } => {
                write!(f, "role={role}[name{}\"{name}\"]", if *exact { "=" } else { "~=" })
            }
            Descriptor::Label { label } => write!(f, "label=\"{label}\""),
            Descriptor::Placeholder { text } => write!(f, "placeholder~=\"{text}\""),
            Descriptor::Text { text, exact } => {
                write!(f, "text{}\"{text}\"", if *exact { "=" } else { "~=" })
            }
            Descriptor::FieldName { name } => write!(f, "[name=\"{name}\"]"),
            Descriptor::Css { selector } => write!(f, "css={selector}"),
            Descriptor::Within { section, target } => {
                write!(f, "section(\"{section}\") >> {target}")
            }
        }
    }
}

/// Accessible-name comparison shared by drivers and the adapter:
/// whitespace-normalized and case-insensitive; substring unless `exact`.
pub fn name_matches(actual: &str, expected: &str, exact: bool) -> bool {
    let actual = normalize(actual);
    let expected = normalize(expected);
    if exact {
        actual == expected
    } else {
        actual.contains(&expected)
    }
}

/// Exact comparison after normalization, used to break ties.
pub fn is_exact_name(actual: &str, expected: &str) -> bool {
    name_matches(actual, expected, true)
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Save", "save", false => true; "case insensitive")]
    #[test_case("Save and close", "Save", false => true; "substring")]
    #[test_case("Save and close", "Save", true => false; "exact rejects substring")]
    #[test_case("  Prov1 \n User1 ", "Prov1 User1", true => true; "whitespace normalized")]
    #[test_case("Female", "Male", false => true; "substring trap")]
    #[test_case("Female", "Male", true => false; "exact avoids trap")]
    fn test_name_matches(actual: &str, expected: &str, exact: bool) -> bool {
        name_matches(actual, expected, exact)
    }

    #[test]
    fn test_display() {
        assert_eq!(Descriptor::button("Save").to_string(), "role=button[name~=\"Save\"]");
        assert_eq!(
            Descriptor::dropdown("Provider Type").to_string(),
            "section(\"Provider Type\") >> label=\"Open\""
        );
        assert_eq!(
            Descriptor::role_exact(Role::Option, "Prov1 User1").to_string(),
            "role=option[name=\"Prov1 User1\"]"
        );
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_value(Descriptor::tab("Settings")).unwrap();
        assert_eq!(json["by"], "role");
        assert_eq!(json["role"], "tab");

        let back: Descriptor =
            serde_json::from_str(r#"{"by":"text","text":"Create"}"#).unwrap();
        assert_eq!(back, Descriptor::text("Create"));
    }

    #[test]
    fn test_expected_name_through_scope() {
        let d = Descriptor::dropdown("Gender *");
        assert_eq!(d.expected_name(), Some("Open"));
        assert!(!d.is_exact());
        assert_eq!(Descriptor::field("gender").expected_name(), None);
    }
}
