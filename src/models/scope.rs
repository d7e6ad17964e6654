use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static SITE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[A-Za-z0-9.-]+(:\d+)?(/[^\s?#]*)?$").expect("site url pattern is valid")
});

/// Level at which a setting lives
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    // Declaration order matters: tenant sorts before site.
    #[serde(rename = "tenant")]
    Tenant,
    #[serde(rename = "site")]
    Site,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Tenant => "tenant",
            ScopeKind::Site => "site",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "tenant" => Some(ScopeKind::Tenant),
            "site" => Some(ScopeKind::Site),
            _ => None,
        }
    }
}

/// The unit being audited: the tenant, or a single site identified by URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub id: String,
    pub kind: ScopeKind,
}

impl Scope {
    pub fn tenant(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ScopeKind::Tenant,
        }
    }

    pub fn site(url: impl Into<String>) -> Self {
        Self {
            id: url.into(),
            kind: ScopeKind::Site,
        }
    }

    pub fn is_tenant(&self) -> bool {
        self.kind == ScopeKind::Tenant
    }

    /// Tenant ids must be non-blank; site ids must be absolute http(s) URLs
    pub fn is_valid(&self) -> bool {
        match self.kind {
            ScopeKind::Tenant => !self.id.trim().is_empty(),
            ScopeKind::Site => SITE_URL.is_match(&self.id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}
