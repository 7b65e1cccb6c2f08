//! Built-in module catalog.

use serde_json::json;

use crate::registry::{ModuleDefinition, ModuleKey};

pub fn builtin_definitions() -> Vec<ModuleDefinition> {
    use ModuleKey::*;

    vec![
        ModuleDefinition::new(
            Auth,
            "Authentication",
            "User authentication & authorization",
        )
        .routes(&["/login", "/signup", "/profile"])
        .migrations(&["001_auth_setup.sql"])
        .default_config(json!({
            "emailVerification": true,
            "passwordReset": true,
            "socialAuth": false,
        })),
        ModuleDefinition::new(
            Teams,
            "Teams & Workspaces",
            "Multi-tenant team management and member invitations",
        )
        .depends_on(&[Auth])
        .routes(&[
            "/teams",
            "/teams/:id",
            "/teams/:id/settings",
            "/teams/:id/members",
        ])
        .migrations(&["002_teams_setup.sql"])
        .default_config(json!({
            "maxMembersPerTeam": 10,
            "allowInvitations": true,
            "roles": ["owner", "admin", "member"],
        })),
        ModuleDefinition::new(
            Billing,
            "Stripe Billing",
            "Subscription management and payments with Stripe",
        )
        .depends_on(&[Auth, Teams])
        .routes(&["/billing", "/billing/plans", "/billing/portal"])
        .migrations(&["003_billing_setup.sql"])
        .premium(true)
        .default_config(json!({
            "provider": "stripe",
            "billingInterval": "monthly",
            "trialDays": 14,
        })),
        ModuleDefinition::new(
            Emails,
            "Transactional Emails",
            "Email notifications and transactional emails",
        )
        .depends_on(&[Auth])
        .migrations(&["004_email_templates.sql"])
        .default_config(json!({
            "provider": "resend",
            "fromEmail": "noreply@example.com",
            "fromName": "Your App",
        })),
        ModuleDefinition::new(AuditLog, "Audit Log", "Activity tracking and audit trail")
            .depends_on(&[Auth, Teams])
            .routes(&["/audit-log"])
            .migrations(&["005_audit_log_setup.sql"])
            .premium(true)
            .default_config(json!({
                "retentionDays": 90,
                "trackEvents": [
                    "user.login",
                    "user.logout",
                    "team.created",
                    "team.member.added",
                ],
            })),
        ModuleDefinition::new(
            FileUploads,
            "File Uploads",
            "File upload and storage management",
        )
        .depends_on(&[Auth, Teams])
        .routes(&["/files"])
        .migrations(&["006_file_storage_setup.sql"])
        .default_config(json!({
            "maxFileSize": 10_485_760,
            "allowedTypes": ["image/png", "image/jpeg", "application/pdf"],
            "storage": "supabase",
        })),
        ModuleDefinition::new(
            Landing,
            "Landing & Pricing Pages",
            "Marketing landing page and pricing tables",
        )
        .routes(&["/", "/pricing", "/features"])
        .default_config(json!({
            "showPricing": true,
            "showTestimonials": true,
            "showFAQ": true,
        })),
        ModuleDefinition::new(
            AiFeatures,
            "AI Features",
            "AI capabilities with usage tracking and quotas",
        )
        .depends_on(&[Auth])
        .routes(&["/ai", "/ai/history"])
        .migrations(&["007_ai_setup.sql"])
        .premium(true)
        .default_config(json!({
            "provider": "anthropic",
            "defaultModel": "claude-sonnet-4",
            "quotaPerMonth": 100,
        })),
    ]
}
