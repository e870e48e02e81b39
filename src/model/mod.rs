//! Typed shapes of the named blobs.
pub mod settings;
pub mod tenant;

pub use settings::{default_catalog, AiSettings, ModuleDescriptor};
pub use tenant::{default_tenants, Tenant, DEMO_TENANT_ID};

use uuid::Uuid;

/// Generates a unique record id of the form `<prefix>_<32 hex chars>`.
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_id_format_and_uniqueness() {
        let ids: HashSet<String> = (0..1000).map(|_| new_id("store")).collect();
        assert_eq!(ids.len(), 1000);
        let id = ids.iter().next().unwrap();
        assert_eq!(id.len(), "store_".len() + 32);
    }
}
