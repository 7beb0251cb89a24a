// ─── Platform Rules ───
// Decides whether a library applies to the running operating system.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRule {
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl LibraryRule {
    pub fn allow() -> Self {
        Self {
            action: RuleAction::Allow,
            os: None,
        }
    }

    pub fn disallow() -> Self {
        Self {
            action: RuleAction::Disallow,
            os: None,
        }
    }

    pub fn on(mut self, os_name: &str) -> Self {
        self.os = Some(OsRule {
            name: Some(os_name.to_string()),
        });
        self
    }

    fn matches(&self, current_os: &str) -> bool {
        match &self.os {
            None => true,
            Some(os) => match &os.name {
                None => true,
                Some(name) => name == current_os,
            },
        }
    }
}

/// Evaluate `rules` for `current_os`.
///
/// No rules means applicable. Otherwise start from "not applicable" and let
/// every rule whose OS constraint matches (or that has none) overwrite the
/// result with its action; rules for other systems are skipped. The last
/// matching rule wins.
pub fn applies(rules: &[LibraryRule], current_os: &str) -> bool {
    if rules.is_empty() {
        return true;
    }

    rules
        .iter()
        .filter(|rule| rule.matches(current_os))
        .fold(false, |_, rule| rule.action == RuleAction::Allow)
}

/// Mojang OS name for the current platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}
