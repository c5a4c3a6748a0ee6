//! Address-to-role lookup.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role held by a Filecoin address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Anyone else.
    User,
    /// Governance reviewer.
    GovernanceTeam,
    /// Root-Key-Holder signer.
    RootKeyHolder,
    /// Metadata allocator.
    MetadataAllocator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "USER",
            Self::GovernanceTeam => "GOVERNANCE_TEAM",
            Self::RootKeyHolder => "ROOT_KEY_HOLDER",
            Self::MetadataAllocator => "METADATA_ALLOCATOR",
        })
    }
}

/// Address lists backing the [`RoleResolver`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Governance team addresses.
    pub governance_review_addresses: Vec<String>,
    /// Root-Key-Holder addresses.
    pub rkh_addresses: Vec<String>,
    /// Metadata allocator addresses.
    pub ma_addresses: Vec<String>,
}

impl RoleConfig {
    /// Build from raw lists; entries are trimmed and lower-cased, blanks dropped.
    #[must_use]
    pub fn new(governance: &[&str], rkh: &[&str], ma: &[&str]) -> Self {
        Self {
            governance_review_addresses: normalize(governance.iter().copied()),
            rkh_addresses: normalize(rkh.iter().copied()),
            ma_addresses: normalize(ma.iter().copied()),
        }
    }

    /// Parse a comma separated address list.
    #[must_use]
    pub fn parse_list(raw: &str) -> Vec<String> {
        normalize(raw.split(','))
    }
}

fn normalize<'a>(addresses: impl Iterator<Item = &'a str>) -> Vec<String> {
    addresses
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect()
}

/// Resolves the role of an address from a static [`RoleConfig`].
///
/// Lookup is case-insensitive. An address listed under several roles gets
/// the first of governance team, Root-Key-Holder, metadata allocator.
///
/// # Example
///
/// ```
/// use filplus_application::role::{Role, RoleConfig, RoleResolver};
///
/// let resolver = RoleResolver::new(RoleConfig::new(&["f1Gov"], &["f1rkh", "f1gov"], &[]));
/// assert_eq!(resolver.role_of("F1GOV"), Role::GovernanceTeam);
/// assert_eq!(resolver.role_of("f1rkh"), Role::RootKeyHolder);
/// assert_eq!(resolver.role_of("f1nobody"), Role::User);
/// ```
#[derive(Clone, Debug)]
pub struct RoleResolver {
    config: RoleConfig,
}

impl RoleResolver {
    /// Create a resolver over `config`.
    #[must_use]
    pub const fn new(config: RoleConfig) -> Self {
        Self { config }
    }

    /// Role of `address`.
    #[must_use]
    pub fn role_of(&self, address: &str) -> Role {
        let address = address.trim().to_lowercase();
        let listed = |list: &[String]| list.iter().any(|a| *a == address);
        if listed(&self.config.governance_review_addresses) {
            Role::GovernanceTeam
        } else if listed(&self.config.rkh_addresses) {
            Role::RootKeyHolder
        } else if listed(&self.config.ma_addresses) {
            Role::MetadataAllocator
        } else {
            Role::User
        }
    }
}
