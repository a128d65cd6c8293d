use serde::{Deserialize, Serialize};

use super::LayerKind;

/// Caller role as supplied by the auth provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unauthenticated or anonymous caller: global content only.
    Guest,
    #[default]
    Member,
    Admin,
}

/// Who is asking. Supplied by the caller's auth layer; never computed here.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct VisibilityContext {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub role: Role,
    /// Restrict the query to the global layer.
    #[serde(default)]
    pub global_only: bool,
}

impl VisibilityContext {
    pub fn new(tenant_id: Option<&str>, owner_id: Option<&str>) -> Self {
        Self {
            tenant_id: tenant_id.map(str::to_string),
            owner_id: owner_id.map(str::to_string),
            role: Role::Member,
            global_only: false,
        }
    }

    pub fn global_only() -> Self {
        Self {
            global_only: true,
            ..Self::default()
        }
    }
}

/// Permission to read one concrete layer partition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "layer", rename_all = "snake_case")]
pub enum LayerGrant {
    Personal { owner_id: String },
    Tenant { tenant_id: String },
    Global,
}

impl LayerGrant {
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Personal { .. } => LayerKind::Personal,
            Self::Tenant { .. } => LayerKind::Tenant,
            Self::Global => LayerKind::Global,
        }
    }

    /// Whether a record with these visibility attributes falls inside this grant.
    pub fn admits(&self, layer: LayerKind, owner_id: &str, tenant_id: Option<&str>) -> bool {
        match self {
            Self::Personal { owner_id: granted } => {
                layer == LayerKind::Personal && owner_id == granted
            }
            Self::Tenant { tenant_id: granted } => {
                layer == LayerKind::Tenant && tenant_id == Some(granted.as_str())
            }
            Self::Global => layer == LayerKind::Global,
        }
    }
}

impl std::fmt::Display for LayerGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Personal { owner_id } => write!(f, "personal:{owner_id}"),
            Self::Tenant { tenant_id } => write!(f, "tenant:{tenant_id}"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// Priority-ordered set of grants a query may read.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct LayerSet {
    grants: Vec<LayerGrant>,
}

impl LayerSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Deduplicates and orders grants by layer priority.
    pub fn from_grants(grants: impl IntoIterator<Item = LayerGrant>) -> Self {
        let mut ordered: Vec<LayerGrant> = Vec::new();
        for grant in grants {
            if !ordered.contains(&grant) {
                ordered.push(grant);
            }
        }
        ordered.sort_by_key(|grant| grant.kind().priority());
        Self { grants: ordered }
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerGrant> {
        self.grants.iter()
    }

    pub fn grants(&self) -> &[LayerGrant] {
        &self.grants
    }

    pub fn admits(&self, layer: LayerKind, owner_id: &str, tenant_id: Option<&str>) -> bool {
        self.grants
            .iter()
            .any(|grant| grant.admits(layer, owner_id, tenant_id))
    }
}
