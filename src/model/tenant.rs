use std::time::{SystemTime, UNIX_EPOCH};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use crate::model::new_id;
use crate::Record;

/// Id of the store seeded into an empty database.
pub const DEMO_TENANT_ID: &str = "store_demo";

/// One tenant (store) and all of its business data.
///
/// The business collections are kept as raw JSON: the console screens own their
/// shape, this crate only moves them around. Fields this struct does not know
/// about are preserved in `extra` so a load/save cycle never drops data.
///
/// Only `id` is required. Any other known field holding a value of the wrong
/// shape (`null`, a string where a list is expected, ...) loads as its default,
/// so one odd tenant cannot make the whole collection unreadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub owner_email: String,
    #[serde(default = "default_currency", deserialize_with = "lenient_currency")]
    pub currency: String,
    /// Unix epoch milliseconds for tenants created here; older data may hold
    /// another representation, which is kept as is.
    #[serde(default)]
    pub created_at: Value,
    #[serde(default, deserialize_with = "lenient")]
    pub enabled_modules: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub products: Vec<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub sales: Vec<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub employees: Vec<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub customers: Vec<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub tickets: Vec<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub transactions: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_currency<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string).unwrap_or_else(default_currency))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl Tenant {
    /// Creates an empty tenant with a fresh unique id.
    pub fn new(name: impl Into<String>, owner_email: impl Into<String>) -> Self {
        Self::with_id(new_id("store"), name, owner_email)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>, owner_email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner_email: owner_email.into(),
            currency: default_currency(),
            created_at: Value::from(now_millis()),
            enabled_modules: Vec::new(),
            products: Vec::new(),
            sales: Vec::new(),
            employees: Vec::new(),
            customers: Vec::new(),
            tickets: Vec::new(),
            transactions: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Sum of `amount` over the ledger transactions. Entries without a numeric amount count as zero.
    pub fn balance(&self) -> f64 {
        self.transactions
            .iter()
            .filter_map(|t| t.get("amount").and_then(Value::as_f64))
            .sum()
    }

    /// Creation time in unix epoch milliseconds, if stored as a number.
    pub fn created_at_millis(&self) -> Option<u64> {
        self.created_at.as_u64()
    }

    pub fn has_module(&self, module_id: &str) -> bool {
        self.enabled_modules.iter().any(|m| m == module_id)
    }
}

impl Record for Tenant {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Collection used when the database holds no tenants yet.
pub fn default_tenants() -> Vec<Tenant> {
    let mut demo = Tenant::with_id(DEMO_TENANT_ID, "Demo Store", "owner@example.com");
    demo.enabled_modules = vec!["inventory".to_string(), "pos".to_string()];
    vec![demo]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_tenants_get_unique_ids() {
        let a = Tenant::new("A", "a@example.com");
        let b = Tenant::new("B", "b@example.com");
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("store_"));
        assert!(a.created_at_millis().unwrap() > 0);
    }

    #[test]
    fn test_balance_sums_amounts() {
        let mut t = Tenant::new("A", "");
        t.transactions = vec![
            json!({"amount": 100.5, "memo": "sale"}),
            json!({"amount": -20}),
            json!({"memo": "no amount"}),
        ];
        assert_eq!(t.balance(), 80.5);
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = json!({
            "id": "S1",
            "name": "Corner Shop",
            "sales": [{"total": 12}],
            "websiteDraft": {"title": "Hello"}
        });
        let tenant: Tenant = serde_json::from_value(raw).unwrap();
        assert_eq!(tenant.currency, "USD");
        assert_eq!(tenant.extra.get("websiteDraft"), Some(&json!({"title": "Hello"})));

        let back = serde_json::to_value(&tenant).unwrap();
        assert_eq!(back["websiteDraft"], json!({"title": "Hello"}));
        assert_eq!(back["sales"], json!([{"total": 12}]));
    }

    #[test]
    fn test_odd_field_shapes_load_as_defaults() {
        let raw = json!({
            "id": "S2",
            "name": "Kiosk",
            "currency": null,
            "createdAt": "2024-05-01T00:00:00Z",
            "products": null,
            "sales": {"total": 5},
            "enabledModules": ["pos", 7]
        });
        let tenant: Tenant = serde_json::from_value(raw).unwrap();
        assert_eq!(tenant.id, "S2");
        assert_eq!(tenant.currency, "USD");
        assert!(tenant.products.is_empty());
        assert!(tenant.sales.is_empty());
        assert!(tenant.enabled_modules.is_empty());
        assert_eq!(tenant.created_at_millis(), None);

        let back = serde_json::to_value(&tenant).unwrap();
        assert_eq!(back["createdAt"], json!("2024-05-01T00:00:00Z"));
    }

    #[test]
    fn test_id_is_required() {
        assert!(serde_json::from_value::<Tenant>(json!({"name": "No Id"})).is_err());
        assert!(serde_json::from_value::<Tenant>(json!({"id": 7})).is_err());
    }

    #[test]
    fn test_default_tenants() {
        let tenants = default_tenants();
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].id(), DEMO_TENANT_ID);
        assert!(tenants[0].has_module("pos"));
    }
}
