//! Strongly typed primitives shared by every actor family.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Unique id of a model actor. Also the journal key.
    ActorId
);
string_id!(
    /// Tenant an actor belongs to.
    TenantId
);
string_id!(
    /// Correlation id of a command and its response.
    MessageId
);

impl MessageId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl ActorId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampUtc(pub DateTime<Utc>);

impl TimestampUtc {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    pub fn plus(&self, duration: Duration) -> Self {
        Self(self.0 + duration)
    }
}

impl Default for TimestampUtc {
    fn default() -> Self {
        Self::now()
    }
}

/// The user on whose behalf a command runs.
///
/// Token validation happens outside the engine; the identity arrives
/// already resolved to tenant roles and consent-group memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserIdentity {
    pub user_id: String,
    #[serde(default)]
    pub tenant_roles: BTreeSet<String>,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_tenant_role(mut self, role: impl Into<String>) -> Self {
        self.tenant_roles.insert(role.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }
}

/// Actor families known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Case,
    Tenant,
    ConsentGroup,
    TimerService,
    Board,
    ProcessTask,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Case => "Case",
            ActorType::Tenant => "Tenant",
            ActorType::ConsentGroup => "ConsentGroup",
            ActorType::TimerService => "TimerService",
            ActorType::Board => "Board",
            ActorType::ProcessTask => "ProcessTask",
        }
    }
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version stamp of the running engine, recorded in every actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineVersion {
    pub version: String,
    pub git_sha: String,
    pub fingerprint: String,
}

impl EngineVersion {
    pub fn new(version: &str, git_sha: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(version.as_bytes());
        hasher.update(b"@");
        hasher.update(git_sha.as_bytes());
        let digest = hasher.finalize();
        let fingerprint: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
        Self {
            version: version.to_string(),
            git_sha: git_sha.to_string(),
            fingerprint,
        }
    }

    /// The version compiled into this binary.
    pub fn current() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"), env!("CASE_ENGINE_GIT_SHA"))
    }
}

impl Default for EngineVersion {
    fn default() -> Self {
        Self::current()
    }
}
