use crate::models::{LayerGrant, LayerSet, Role, VisibilityContext};

/// Maps a caller's visibility context onto the layers a query may read.
///
/// Fails closed: an incomplete context shrinks the grant set instead of
/// erroring, and never widens it to another tenant's data.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerResolver;

impl LayerResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, context: &VisibilityContext) -> LayerSet {
        if context.global_only || context.role == Role::Guest {
            return LayerSet::from_grants([LayerGrant::Global]);
        }

        let owner_id = non_blank(context.owner_id.as_deref());
        let tenant_id = non_blank(context.tenant_id.as_deref());

        let mut grants = Vec::new();

        if let Some(owner_id) = owner_id {
            grants.push(LayerGrant::Personal {
                owner_id: owner_id.to_string(),
            });
        }

        // Global content is only opened up to callers whose tenant membership is known.
        if let Some(tenant_id) = tenant_id {
            grants.push(LayerGrant::Tenant {
                tenant_id: tenant_id.to_string(),
            });
            grants.push(LayerGrant::Global);
        }

        let layers = LayerSet::from_grants(grants);
        if layers.is_empty() {
            tracing::debug!("Visibility context resolved to no layers");
        } else if tenant_id.is_none() {
            tracing::debug!("No tenant in visibility context, restricting to owner layer");
        }
        layers
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
