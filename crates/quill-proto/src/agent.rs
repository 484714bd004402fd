//! Agent identities and identity attribution.
//!
//! The execution engine's raw feed is inconsistent about who is speaking:
//! some events carry an explicit agent id, some only a display name or a
//! session identifier, and some carry nothing at all. `RoleVocabulary`
//! resolves those hints into an [`Attribution`] with a strict precedence
//! order, so misattribution is detectable rather than silently guessed.

use serde::{Deserialize, Serialize};

/// Unique identifier for an agent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    /// Creates a new agent ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved agent identity: id plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: AgentId,
    pub name: String,
}

impl AgentIdentity {
    /// Creates an identity from an id and display name.
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// The generic fallback identity for events that carry identity
    /// information matching nothing in the vocabulary.
    pub fn system() -> Self {
        Self::new("system", "System")
    }

    /// The synthetic identity that inter-agent handoff entries are
    /// attributed to.
    pub fn router() -> Self {
        Self::new("router", "Router")
    }
}

/// Identity-bearing fields a raw engine event may carry. All optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityHints {
    /// Explicit agent id, when the engine bothered to include one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Display name, often the only clue on delta events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,

    /// Resource/session identifier, sometimes embeds the role name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl IdentityHints {
    /// Returns true if the event carried no identity information at all.
    pub fn is_empty(&self) -> bool {
        self.agent_id.is_none() && self.agent_name.is_none() && self.session.is_none()
    }
}

/// Result of resolving [`IdentityHints`] against a [`RoleVocabulary`].
///
/// Variants are listed in precedence order; resolution always picks the
/// first applicable one:
/// 1. `Explicit` — the event carried an agent id field.
/// 2. `RoleName` — the carried name matched a role alias by substring.
/// 3. `SessionRef` — the session identifier matched a role alias by substring.
/// 4. `System` — hints were present but matched nothing.
/// 5. `Unknown` — the event carried no identity information at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    Explicit(AgentIdentity),
    RoleName(AgentIdentity),
    SessionRef(AgentIdentity),
    System,
    Unknown,
}

impl Attribution {
    /// Converts the attribution into a concrete identity.
    ///
    /// `System` resolves to the generic system identity; `Unknown` has no
    /// identity and must be handled by the caller (active-agent fallback
    /// or drop).
    pub fn into_identity(self) -> Option<AgentIdentity> {
        match self {
            Attribution::Explicit(identity)
            | Attribution::RoleName(identity)
            | Attribution::SessionRef(identity) => Some(identity),
            Attribution::System => Some(AgentIdentity::system()),
            Attribution::Unknown => None,
        }
    }

    /// Short label for diagnostics.
    pub fn source_label(&self) -> &'static str {
        match self {
            Attribution::Explicit(_) => "explicit",
            Attribution::RoleName(_) => "role-name",
            Attribution::SessionRef(_) => "session-ref",
            Attribution::System => "system",
            Attribution::Unknown => "unknown",
        }
    }
}

/// A known role in the agent hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Role {
    id: AgentId,
    name: String,
    /// Lowercase substrings that identify this role in names and session ids.
    aliases: Vec<String>,
}

impl Role {
    fn identity(&self) -> AgentIdentity {
        AgentIdentity::new(self.id.clone(), self.name.clone())
    }

    fn matches(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        lowered.contains(self.id.as_str()) || self.aliases.iter().any(|a| lowered.contains(a))
    }
}

/// The known role vocabulary used for substring attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleVocabulary {
    roles: Vec<Role>,
}

impl Default for RoleVocabulary {
    /// The default hierarchy: a coordinator, a planner, and a line worker.
    fn default() -> Self {
        Self { roles: Vec::new() }
            .with_role("ceo", "CEO", &["chief executive", "coordinator"])
            .with_role("planner", "Planner", &["planning", "architect"])
            .with_role("worker", "Worker", &["line worker", "executor"])
    }
}

impl RoleVocabulary {
    /// Creates an empty vocabulary. Events will only ever resolve to
    /// `Explicit`, `System`, or `Unknown`.
    pub fn empty() -> Self {
        Self { roles: Vec::new() }
    }

    /// Adds a role with lowercase alias substrings.
    #[must_use]
    pub fn with_role(
        mut self,
        id: impl Into<AgentId>,
        name: impl Into<String>,
        aliases: &[&str],
    ) -> Self {
        self.roles.push(Role {
            id: id.into(),
            name: name.into(),
            aliases: aliases.iter().map(|a| a.to_lowercase()).collect(),
        });
        self
    }

    /// Resolves identity hints into an [`Attribution`].
    ///
    /// Precedence: explicit id, then name-against-vocabulary, then
    /// session-against-vocabulary, then the generic system identity.
    /// Hints that are entirely absent resolve to `Unknown`.
    pub fn resolve(&self, hints: &IdentityHints) -> Attribution {
        if hints.is_empty() {
            return Attribution::Unknown;
        }

        if let Some(id) = &hints.agent_id {
            let name = hints
                .agent_name
                .clone()
                .or_else(|| self.display_name(id))
                .unwrap_or_else(|| id.clone());
            return Attribution::Explicit(AgentIdentity::new(id.clone(), name));
        }

        if let Some(name) = &hints.agent_name {
            if let Some(role) = self.roles.iter().find(|r| r.matches(name)) {
                return Attribution::RoleName(role.identity());
            }
        }

        if let Some(session) = &hints.session {
            if let Some(role) = self.roles.iter().find(|r| r.matches(session)) {
                return Attribution::SessionRef(role.identity());
            }
        }

        Attribution::System
    }

    /// Returns the display name for a known role id.
    pub fn display_name(&self, id: &str) -> Option<String> {
        self.roles
            .iter()
            .find(|r| r.id.as_str() == id)
            .map(|r| r.name.clone())
    }
}
