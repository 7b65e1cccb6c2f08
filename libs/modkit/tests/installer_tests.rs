use async_trait::async_trait;
use modkit::{
    InMemoryLedger, InstallError, Installer, MigrationExecutor, MigrationLedger, MigrationPlan,
    MigrationStep, ModuleKey, ModuleRegistry, ProjectId, SchemaRegenerator,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Records every call; fails on the listed files and seeds.
#[derive(Default)]
struct RecordingExecutor {
    fail_on: Vec<String>,
    seeds_for: Vec<ModuleKey>,
    failing_seed: Option<ModuleKey>,
    applied: Mutex<Vec<String>>,
}

#[async_trait]
impl MigrationExecutor for RecordingExecutor {
    async fn apply(&self, step: &MigrationStep) -> anyhow::Result<()> {
        if self.fail_on.contains(&step.file) {
            anyhow::bail!("syntax error near CREATE");
        }
        self.applied.lock().push(step.file.clone());
        Ok(())
    }

    async fn seed(&self, module: ModuleKey) -> anyhow::Result<bool> {
        if self.failing_seed == Some(module) {
            anyhow::bail!("duplicate key value");
        }
        Ok(self.seeds_for.contains(&module))
    }
}

#[derive(Default)]
struct FlagRegenerator {
    fail: bool,
    called: AtomicBool,
}

#[async_trait]
impl SchemaRegenerator for FlagRegenerator {
    async fn regenerate(&self) -> anyhow::Result<()> {
        self.called.store(true, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("gen:types exited with status 1");
        }
        Ok(())
    }
}

/// Ledger that cannot be read or written, like a first run before core setup.
struct MissingLedger;

#[async_trait]
impl MigrationLedger for MissingLedger {
    async fn is_applied(&self, _: &MigrationStep) -> anyhow::Result<bool> {
        anyhow::bail!("no such table: module_migrations")
    }

    async fn record_applied(&self, _: &MigrationStep, _: Option<&ProjectId>) -> anyhow::Result<()> {
        anyhow::bail!("no such table: module_migrations")
    }
}

fn billing_plan() -> MigrationPlan {
    let reg = ModuleRegistry::builtin().unwrap();
    MigrationPlan::for_modules(
        &reg,
        [ModuleKey::Billing],
        &["003_projects_modules_setup.sql".to_string()],
    )
    .unwrap()
}

#[tokio::test]
async fn test_applies_in_order_and_records() {
    let ledger = Arc::new(InMemoryLedger::new());
    let exec = Arc::new(RecordingExecutor::default());
    let regen = Arc::new(FlagRegenerator::default());

    let report = Installer::new(ledger.clone(), exec.clone())
        .with_regenerator(regen.clone())
        .run(&billing_plan())
        .await
        .unwrap();

    assert_eq!(
        *exec.applied.lock(),
        vec![
            "003_projects_modules_setup.sql",
            "001_auth_setup.sql",
            "002_teams_setup.sql",
            "003_billing_setup.sql",
        ]
    );
    assert_eq!(report.applied.len(), 4);
    assert!(report.skipped.is_empty());
    assert!(report.regenerated);
    assert!(regen.called.load(Ordering::SeqCst));
    assert_eq!(ledger.applied().len(), 4);
}

#[tokio::test]
async fn test_second_run_skips_everything() {
    let ledger = Arc::new(InMemoryLedger::new());
    let plan = billing_plan();

    Installer::new(ledger.clone(), Arc::new(RecordingExecutor::default()))
        .run(&plan)
        .await
        .unwrap();

    let exec = Arc::new(RecordingExecutor::default());
    let report = Installer::new(ledger, exec.clone()).run(&plan).await.unwrap();
    assert!(exec.applied.lock().is_empty());
    assert_eq!(report.skipped.len(), plan.steps.len());
}

#[tokio::test]
async fn test_stops_on_first_failure_and_keeps_earlier_work() {
    let ledger = Arc::new(InMemoryLedger::new());
    let exec = Arc::new(RecordingExecutor {
        fail_on: vec!["002_teams_setup.sql".into()],
        ..Default::default()
    });
    let regen = Arc::new(FlagRegenerator::default());

    let err = Installer::new(ledger.clone(), exec.clone())
        .with_regenerator(regen.clone())
        .run(&billing_plan())
        .await
        .unwrap_err();

    let InstallError::Migration { step, report, .. } = err;
    assert_eq!(step.file, "002_teams_setup.sql");
    assert_eq!(step.module, Some(ModuleKey::Teams));
    assert_eq!(report.applied.len(), 2);
    assert!(!exec.applied.lock().contains(&"003_billing_setup.sql".to_string()));
    assert_eq!(
        ledger.applied(),
        vec!["001_auth_setup.sql", "003_projects_modules_setup.sql"]
    );
    assert!(!regen.called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_ledger_errors_do_not_block_the_run() {
    let exec = Arc::new(RecordingExecutor::default());
    let report = Installer::new(Arc::new(MissingLedger), exec.clone())
        .run(&billing_plan())
        .await
        .unwrap();

    assert_eq!(exec.applied.lock().len(), 4);
    assert_eq!(report.warnings.len(), 4);
}

#[tokio::test]
async fn test_seed_and_regeneration_failures_are_warnings() {
    let exec = Arc::new(RecordingExecutor {
        seeds_for: vec![ModuleKey::Teams],
        failing_seed: Some(ModuleKey::Billing),
        ..Default::default()
    });
    let regen = Arc::new(FlagRegenerator {
        fail: true,
        ..Default::default()
    });

    let report = Installer::new(Arc::new(InMemoryLedger::new()), exec)
        .with_seed(true)
        .with_regenerator(regen)
        .run(&billing_plan())
        .await
        .unwrap();

    assert_eq!(report.seeded, vec![ModuleKey::Teams]);
    assert!(!report.regenerated);
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings.iter().any(|w| w.contains("billing")));
}

#[tokio::test]
async fn test_seeds_are_skipped_unless_requested() {
    let exec = Arc::new(RecordingExecutor {
        seeds_for: vec![ModuleKey::Teams],
        ..Default::default()
    });
    let report = Installer::new(Arc::new(InMemoryLedger::new()), exec)
        .run(&billing_plan())
        .await
        .unwrap();
    assert!(report.seeded.is_empty());
}
