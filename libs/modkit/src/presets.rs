//! Named starting points: a module list plus app-level defaults.

use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

use crate::registry::{ConfigMap, ModuleKey, ModuleRegistry, RegistryError};

#[derive(Debug, Clone, Serialize)]
pub struct Preset {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub modules: &'static [ModuleKey],
    /// App-level settings (theme, branding). Not merged into module config.
    pub default_config: ConfigMap,
    pub pages: &'static [&'static str],
    pub features: BTreeMap<&'static str, bool>,
}

impl Preset {
    /// Every listed module must exist in `registry`.
    pub fn validate(&self, registry: &ModuleRegistry) -> Result<(), RegistryError> {
        match self.modules.iter().find(|k| !registry.contains(**k)) {
            Some(&missing) => Err(RegistryError::UnknownModule(missing)),
            None => Ok(()),
        }
    }
}

fn object(value: serde_json::Value) -> ConfigMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => ConfigMap::new(),
    }
}

pub fn builtin_presets() -> Vec<Preset> {
    use ModuleKey::*;

    vec![
        Preset {
            key: "saas-starter",
            name: "SaaS Starter",
            description: "Complete SaaS with auth, teams, billing, and essential features",
            modules: &[Auth, Teams, Billing, Emails, AuditLog, Landing],
            default_config: object(json!({
                "theme": "dark",
                "branding": {
                    "appName": "My SaaS App",
                    "tagline": "Build something amazing",
                },
                "features": {
                    "emailVerification": true,
                    "teamInvitations": true,
                    "stripeIntegration": true,
                    "auditLogging": true,
                },
            })),
            pages: &[
                "/",
                "/pricing",
                "/features",
                "/login",
                "/signup",
                "/dashboard",
                "/teams",
                "/teams/:id",
                "/billing",
                "/audit-log",
                "/settings",
                "/profile",
            ],
            features: BTreeMap::from([
                ("multiTenancy", true),
                ("subscriptions", true),
                ("apiKeys", false),
                ("webhooks", false),
            ]),
        },
        Preset {
            key: "ai-app",
            name: "AI Application",
            description: "AI-powered app with usage tracking and file uploads",
            modules: &[Auth, AiFeatures, FileUploads, AuditLog, Landing],
            default_config: object(json!({
                "theme": "dark",
                "branding": {
                    "appName": "AI Assistant",
                    "tagline": "Powered by Claude",
                },
                "ai": {
                    "provider": "anthropic",
                    "defaultModel": "claude-sonnet-4",
                    "maxTokens": 4096,
                },
                "features": {
                    "usageTracking": true,
                    "quotaManagement": true,
                    "fileUploads": true,
                    "historyTracking": true,
                },
            })),
            pages: &[
                "/",
                "/login",
                "/signup",
                "/dashboard",
                "/ai",
                "/ai/history",
                "/files",
                "/audit-log",
                "/settings",
                "/profile",
            ],
            features: BTreeMap::from([
                ("multiTenancy", false),
                ("subscriptions", false),
                ("aiIntegration", true),
                ("usageMetrics", true),
            ]),
        },
        Preset {
            key: "internal-tool",
            name: "Internal Tool",
            description: "Simple internal tool with authentication and audit logging",
            modules: &[Auth, AuditLog, FileUploads],
            default_config: object(json!({
                "theme": "light",
                "branding": {
                    "appName": "Internal Dashboard",
                    "tagline": "Team productivity tool",
                },
                "features": {
                    "emailVerification": false,
                    "publicSignup": false,
                    "auditLogging": true,
                },
            })),
            pages: &[
                "/login",
                "/dashboard",
                "/audit-log",
                "/files",
                "/settings",
                "/profile",
            ],
            features: BTreeMap::from([
                ("multiTenancy", false),
                ("subscriptions", false),
                ("publicAccess", false),
                ("adminOnly", true),
            ]),
        },
    ]
}

pub fn preset(key: &str) -> Option<Preset> {
    builtin_presets().into_iter().find(|p| p.key == key)
}
