use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// Global settings for the generative-AI assistant, stored under `ai_settings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiSettings {
    pub model: String,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    /// Feature toggles keyed by feature name (e.g. `"salesInsights"`).
    pub enabled_features: BTreeMap<String, bool>,
    /// Free-text system instructions prepended to every prompt.
    pub instructions: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            enabled_features: BTreeMap::new(),
            instructions: String::new(),
        }
    }
}

impl AiSettings {
    /// Unlisted features are on.
    pub fn feature_enabled(&self, feature: &str) -> bool {
        self.enabled_features.get(feature).copied().unwrap_or(true)
    }
}

/// One entry of the `module_catalog` blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub enabled: bool,
}

impl ModuleDescriptor {
    fn new(id: &str, label: &str, price: f64, category: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            price,
            category: category.to_string(),
            enabled: true,
        }
    }
}

/// Catalog seeded into an empty database.
pub fn default_catalog() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::new("inventory", "Inventory", 0.0, "operations"),
        ModuleDescriptor::new("pos", "Point of Sale", 0.0, "operations"),
        ModuleDescriptor::new("hr", "Human Resources", 19.0, "people"),
        ModuleDescriptor::new("financials", "Financials", 29.0, "finance"),
        ModuleDescriptor::new("crm", "Customer Relations", 19.0, "sales"),
        ModuleDescriptor::new("support", "Support Tickets", 9.0, "sales"),
        ModuleDescriptor::new("website", "Website Builder", 24.0, "marketing"),
        ModuleDescriptor::new("assistant", "AI Assistant", 39.0, "intelligence"),
    ]
}
