use anyhow::{anyhow, bail, Context, Result};
use modkit::{
    builtin_presets, preset, ConfigMap, FlagsError, InstallError, InstallReport, Installer,
    MigrationPlan, ModuleKey, ModuleRegistry, Mutation,
};
use modkit_db::{SqlMigrationLedger, SqlScriptExecutor};
use runtime::AppConfig;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::bootstrap::{parse_modules, AdminContext};
use crate::regen::CommandRegenerator;
use crate::{ModulesCmd, PresetsCmd};

pub async fn check(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");

    let registry = ModuleRegistry::builtin().context("module registry is invalid")?;
    let order = registry.resolver().validate()?;
    parse_modules(&config.features.default_modules)
        .context("invalid features.default_modules")?;
    for p in builtin_presets() {
        p.validate(&registry)
            .with_context(|| format!("preset '{}' is invalid", p.key))?;
    }

    let migrations_dir = config.resolve_path(&config.installer.migrations_dir);
    if !migrations_dir.is_dir() {
        tracing::warn!(dir = %migrations_dir.display(), "Migrations directory does not exist");
    }

    println!("Configuration check passed");
    println!("Modules (dependency order): {}", join(&order));
    println!("{}", config.to_yaml()?);
    Ok(())
}

pub async fn modules(ctx: &AdminContext, cmd: ModulesCmd) -> Result<()> {
    match cmd {
        ModulesCmd::List { json } => list_modules(ctx, json).await,
        ModulesCmd::Enable {
            key,
            config_json,
            yes,
        } => enable_module(ctx, &key, config_json.as_deref(), yes).await,
        ModulesCmd::Disable { key, yes } => disable_module(ctx, &key, yes).await,
        ModulesCmd::Apply { key, seed, yes } => apply_migrations(ctx, key.as_deref(), seed, yes).await,
    }
}

pub async fn snapshot(ctx: &AdminContext) -> Result<()> {
    let snapshot = ctx.flags.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

pub async fn presets(ctx: &AdminContext, cmd: PresetsCmd) -> Result<()> {
    match cmd {
        PresetsCmd::List => {
            for p in builtin_presets() {
                println!("{:<14} {:<20} {}", p.key, p.name, join(p.modules));
                println!("{:<14} {}", "", p.description);
            }
            Ok(())
        }
        PresetsCmd::Apply { key, yes } => {
            let p = preset(&key).ok_or_else(|| anyhow!("unknown preset '{key}'"))?;
            println!("Preset {} enables: {}", p.key, join(p.modules));
            if !confirm(yes, &format!("Apply preset {}?", p.key)).await? {
                println!("Aborted");
                return Ok(());
            }
            match ctx.flags.apply_preset(&p).await? {
                Mutation::Applied(report) => {
                    let newly: Vec<ModuleKey> = report
                        .modules
                        .iter()
                        .flat_map(|r| r.newly_enabled.iter().copied())
                        .collect();
                    println!("Applied preset {}; newly enabled: {}", report.preset, join(&newly));
                }
                Mutation::NotApplied(reason) => println!("Not applied: {reason}"),
            }
            Ok(())
        }
    }
}

async fn list_modules(ctx: &AdminContext, as_json: bool) -> Result<()> {
    let resolved = ctx.flags.resolve().await;

    if as_json {
        let rows: Vec<_> = ctx
            .registry
            .all()
            .iter()
            .map(|def| {
                let flag = resolved.get(def.key);
                json!({
                    "key": def.key,
                    "name": def.name,
                    "description": def.description,
                    "enabled": flag.is_some_and(|f| f.enabled),
                    "source": flag.map(|f| f.source),
                    "premium": def.premium,
                    "dependencies": def.dependencies,
                    "migrations": def.migrations,
                    "config": flag.map(|f| &f.config).unwrap_or(&def.default_config),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    match ctx.flags.current_project().await {
        Some(project) => println!("Project: {project}"),
        None => println!("Project: (none)"),
    }
    println!(
        "{:<14} {:<8} {:<11} {:<8} DEPENDS ON",
        "MODULE", "ENABLED", "SOURCE", "PREMIUM"
    );
    for def in ctx.registry.all() {
        let flag = resolved.get(def.key);
        let source = flag.map_or("-", |f| f.source.as_str());
        println!(
            "{:<14} {:<8} {:<11} {:<8} {}",
            def.key.as_str(),
            if flag.is_some_and(|f| f.enabled) { "yes" } else { "no" },
            source,
            if def.premium { "yes" } else { "no" },
            join(def.dependencies),
        );
    }
    Ok(())
}

async fn enable_module(
    ctx: &AdminContext,
    raw_key: &str,
    config_json: Option<&str>,
    yes: bool,
) -> Result<()> {
    let key: ModuleKey = raw_key.parse()?;
    let config = config_json.map(parse_config).transpose()?;

    let check = ctx.flags.can_enable(key).await;
    if ctx.flags.is_enabled(key).await {
        println!("{key} is already enabled");
    } else if !check.allowed {
        println!("{key} requires: {}", join(&check.missing));
        println!("These will be enabled too.");
    }
    if !confirm(yes, &format!("Enable {key}?")).await? {
        println!("Aborted");
        return Ok(());
    }

    match ctx.flags.enable(key, config).await? {
        Mutation::Applied(report) => {
            println!("Enabled {} (record {})", report.module, report.record_id);
            if !report.newly_enabled.is_empty() {
                println!("Newly enabled: {}", join(&report.newly_enabled));
            }
        }
        Mutation::NotApplied(reason) => println!("Not applied: {reason}"),
    }
    Ok(())
}

async fn disable_module(ctx: &AdminContext, raw_key: &str, yes: bool) -> Result<()> {
    let key: ModuleKey = raw_key.parse()?;
    if key.is_root() {
        return Err(FlagsError::RootModuleLocked(key).into());
    }

    let impact = ctx.flags.impact_of_disabling(key).await;
    let cascade = ctx.flags.cascade_of_disabling(key).await;
    if !cascade.is_empty() {
        println!("Modules depending on {key}: {}", join(&impact));
        println!("Will also disable: {}", join(&cascade));
    }
    if !confirm(yes, &format!("Disable {key}?")).await? {
        println!("Aborted");
        return Ok(());
    }

    match ctx.flags.disable(key).await? {
        Mutation::Applied(report) => println!("Disabled: {}", join(&report.disabled)),
        Mutation::NotApplied(reason) => println!("Not applied: {reason}"),
    }
    Ok(())
}

async fn apply_migrations(
    ctx: &AdminContext,
    raw_key: Option<&str>,
    seed: bool,
    yes: bool,
) -> Result<()> {
    let keys: Vec<ModuleKey> = match raw_key {
        Some(raw) => vec![raw.parse()?],
        None => ctx.flags.get_enabled_modules().await.into_iter().collect(),
    };
    let plan = MigrationPlan::for_modules(&ctx.registry, keys, &ctx.config.installer.core_migrations)?;
    if plan.is_empty() {
        println!("Nothing to apply");
        return Ok(());
    }

    println!("Modules: {}", join(&plan.modules));
    for step in &plan.steps {
        println!("  {step}");
    }
    if !confirm(yes, "Apply these migrations?").await? {
        println!("Aborted");
        return Ok(());
    }

    let db = ctx.require_db()?;
    let root = ctx.config.resolve_path(&ctx.config.installer.migrations_dir);
    let mut installer = Installer::new(
        Arc::new(SqlMigrationLedger::new(db)),
        Arc::new(SqlScriptExecutor::new(db, root)),
    )
    .with_seed(seed)
    .for_project(ctx.flags.current_project().await);
    if let Some(cmd) = ctx
        .config
        .installer
        .regenerate_command
        .as_deref()
        .filter(|c| !c.trim().is_empty())
    {
        installer = installer.with_regenerator(Arc::new(CommandRegenerator::new(
            cmd,
            &ctx.config.home_dir,
        )));
    }

    match installer.run(&plan).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(err) => {
            let InstallError::Migration { report, .. } = &err;
            print_report(report);
            Err(err.into())
        }
    }
}

fn print_report(report: &InstallReport) {
    for step in &report.applied {
        println!("applied  {step}");
    }
    for step in &report.skipped {
        println!("skipped  {step}");
    }
    for module in &report.seeded {
        println!("seeded   {module}");
    }
    if report.regenerated {
        println!("schema types regenerated");
    }
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
}

fn parse_config(raw: &str) -> Result<ConfigMap> {
    match serde_json::from_str(raw).context("--config is not valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("--config must be a JSON object, got {other}"),
    }
}

async fn confirm(yes: bool, prompt: &str) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn join(keys: &[ModuleKey]) -> String {
    if keys.is_empty() {
        return "-".to_string();
    }
    keys.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_requires_object() {
        assert_eq!(parse_config(r#"{"trialDays": 30}"#).unwrap()["trialDays"], 30);
        assert!(parse_config("[1, 2]").is_err());
        assert!(parse_config("not json").is_err());
    }

    #[test]
    fn test_join_keys() {
        assert_eq!(join(&[]), "-");
        assert_eq!(join(&[ModuleKey::Auth, ModuleKey::AuditLog]), "auth, audit-log");
    }

    #[tokio::test]
    async fn test_confirm_skipped_with_yes() {
        assert!(confirm(true, "ignored").await.unwrap());
    }
}
