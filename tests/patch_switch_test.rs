//! Integration tests for PatchOrchestrator - live resource-set switching.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use modhost_core::host::{HostError, HostProcess};
use modhost_core::mods::{
    BuiltinCodeLoader, CodeCache, DescriptorStore, Facet, ModCode, ModContext, ModuleDescriptor,
};
use modhost_core::patch::{
    CatalogEntry, CatalogError, CatalogSource, ModCatalog, PatchIdentity, PatchObserver,
    PatchOrchestrator, ResourceLayout, ResourceRoots, SwitchError, SwitchOutcome, SwitchState,
};

type Journal = Arc<Mutex<Vec<String>>>;

fn id(raw: &str) -> PatchIdentity {
    PatchIdentity::parse(raw).unwrap()
}

struct RecordingHost {
    journal: Journal,
    fail_load: AtomicBool,
}

impl RecordingHost {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail_load: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl HostProcess for RecordingHost {
    async fn unload_all_mods(&self) -> Result<(), HostError> {
        self.journal.lock().push("unload".to_string());
        Ok(())
    }

    async fn set_resource_roots(&self, roots: &ResourceRoots) -> Result<(), HostError> {
        self.journal
            .lock()
            .push(format!("roots {}", roots.module_root.display()));
        Ok(())
    }

    async fn load_all_mods(&self) -> Result<(), HostError> {
        self.journal.lock().push("load".to_string());
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(HostError::Rejected("load failed".to_string()));
        }
        Ok(())
    }
}

/// Blocks inside `unload_all_mods` until released.
#[derive(Default)]
struct BlockingHost {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl HostProcess for BlockingHost {
    async fn unload_all_mods(&self) -> Result<(), HostError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }

    async fn set_resource_roots(&self, _roots: &ResourceRoots) -> Result<(), HostError> {
        Ok(())
    }

    async fn load_all_mods(&self) -> Result<(), HostError> {
        Ok(())
    }
}

struct Recorder {
    journal: Journal,
}

impl PatchObserver for Recorder {
    fn on_patch_changing(&self, from: &PatchIdentity, to: &PatchIdentity) {
        self.journal.lock().push(format!("changing {} -> {}", from, to));
    }

    fn on_patch_changed(&self, from: &PatchIdentity, to: &PatchIdentity) {
        self.journal.lock().push(format!("changed {} -> {}", from, to));
    }

    fn on_switch_failed(&self, _from: &PatchIdentity, to: &PatchIdentity, error: &str) {
        self.journal.lock().push(format!("failed {}: {}", to, error));
    }
}

struct StaticCatalog {
    entries: Vec<CatalogEntry>,
    requested: Mutex<Vec<String>>,
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn fetch(&self, url: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.requested.lock().push(url.to_string());
        Ok(self.entries.clone())
    }
}

struct Noop;

impl ModCode for Noop {
    fn create_global(&self, _ctx: &ModContext) -> Result<Option<Box<dyn Facet>>, String> {
        Ok(None)
    }
}

fn setup(initial: &str) -> (PatchOrchestrator, Arc<CodeCache>, Arc<StaticCatalog>) {
    let source = Arc::new(StaticCatalog {
        entries: vec![CatalogEntry::new("alpha"), CatalogEntry::new("Beta")],
        requested: Mutex::new(Vec::new()),
    });
    let code_cache = Arc::new(CodeCache::new());
    let orchestrator = PatchOrchestrator::new(
        ResourceLayout::new("/game", id("34.04 Omni")),
        id(initial),
        code_cache.clone(),
        Arc::new(ModCatalog::new(source.clone())),
    )
    .unwrap();
    (orchestrator, code_cache, source)
}

fn observe(orchestrator: &PatchOrchestrator, journal: &Journal) {
    orchestrator.observers().subscribe(Arc::new(Recorder {
        journal: journal.clone(),
    }));
}

fn as_host(host: &dyn HostProcess) -> Option<&dyn HostProcess> {
    Some(host)
}

#[tokio::test]
async fn test_switch_runs_steps_in_order() {
    let (orchestrator, _, _) = setup("34.04 Omni");
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let host = RecordingHost::new(journal.clone());
    observe(&orchestrator, &journal);

    let outcome = orchestrator
        .switch_patch(id("100.02 Starscape"), as_host(&host))
        .await
        .unwrap();

    let SwitchOutcome::Switched(record) = outcome else {
        panic!("expected a switch");
    };
    assert_eq!(record.from, id("34.04 Omni"));
    assert_eq!(record.to, id("100.02 Starscape"));

    assert_eq!(
        *journal.lock(),
        vec![
            "changing 34.04 Omni -> 100.02 Starscape",
            "unload",
            "roots /game/patch100/mods",
            "load",
            "changed 34.04 Omni -> 100.02 Starscape",
        ]
    );
    assert_eq!(orchestrator.current_identity(), id("100.02 Starscape"));
    assert_eq!(orchestrator.state(), SwitchState::Stable);
}

#[test]
fn test_switch_to_active_patch_is_a_no_op() {
    let (orchestrator, code_cache, _) = setup("34.04 Omni");
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let host = RecordingHost::new(journal.clone());
    observe(&orchestrator, &journal);
    let epoch = code_cache.epoch();

    let outcome =
        tokio_test::block_on(orchestrator.switch_patch(id("34.04 Omni"), as_host(&host))).unwrap();

    assert!(matches!(outcome, SwitchOutcome::Unchanged));
    assert!(journal.lock().is_empty());
    assert_eq!(code_cache.epoch(), epoch);
    assert!(orchestrator.last_switch().is_none());
}

#[tokio::test]
async fn test_search_path_follows_active_patch() {
    let (orchestrator, _, _) = setup("34.04 Omni");
    assert_eq!(
        orchestrator.search_path().entries(),
        vec![PathBuf::from("/game/node_modules")]
    );

    orchestrator.switch_patch(id("100.02 Starscape"), None).await.unwrap();
    assert_eq!(
        orchestrator.search_path().entries(),
        vec![
            PathBuf::from("/game/patch100/node_modules"),
            PathBuf::from("/game/node_modules"),
        ]
    );

    orchestrator.switch_patch(id("101.00 Aurora"), None).await.unwrap();
    assert_eq!(
        orchestrator.search_path().entries(),
        vec![
            PathBuf::from("/game/patch101/node_modules"),
            PathBuf::from("/game/node_modules"),
        ]
    );

    orchestrator.switch_patch(id("34.04 Omni"), None).await.unwrap();
    assert_eq!(
        orchestrator.search_path().entries(),
        vec![PathBuf::from("/game/node_modules")]
    );
}

#[tokio::test]
async fn test_switch_invalidates_code_and_catalog_caches() {
    let (orchestrator, code_cache, source) = setup("34.04 Omni");

    let loader = BuiltinCodeLoader::new();
    loader.register("alpha", |_, _| Ok(Arc::new(Noop) as Arc<dyn ModCode>));
    let descriptor = ModuleDescriptor::new("alpha").unwrap();
    let (_, first_epoch) = code_cache
        .get_or_load(&descriptor, Path::new("/game/mods/alpha"), &loader)
        .unwrap();

    orchestrator
        .catalog()
        .entries(&orchestrator.module_list_url(), false)
        .await
        .unwrap();
    assert!(orchestrator.catalog().is_cached());

    let outcome = orchestrator
        .switch_patch(id("100.02 Starscape"), None)
        .await
        .unwrap();
    let SwitchOutcome::Switched(record) = outcome else {
        panic!("expected a switch");
    };

    assert_eq!(record.evicted, 1);
    assert!(record.epoch > first_epoch);
    assert_eq!(code_cache.epoch(), record.epoch);
    assert!(code_cache.is_empty());
    assert!(!orchestrator.catalog().is_cached());

    let mut installed = DescriptorStore::new();
    installed.insert(ModuleDescriptor::new("beta").unwrap());
    let installable = orchestrator.installable_mods(&installed, false).await.unwrap();
    assert_eq!(installable.len(), 1);
    assert_eq!(installable[0].name, "alpha");

    let requested = source.requested.lock().clone();
    assert_eq!(requested.len(), 2);
    assert!(requested[0].ends_with("moduleList-3404.json"));
    assert!(requested[1].ends_with("moduleList-10002.json"));
}

#[tokio::test]
async fn test_concurrent_switch_rejected() {
    let (orchestrator, _, _) = setup("34.04 Omni");
    let orchestrator = Arc::new(orchestrator);
    let host = Arc::new(BlockingHost::default());

    let task = {
        let orchestrator = orchestrator.clone();
        let host = host.clone();
        tokio::spawn(async move {
            let host: &dyn HostProcess = host.as_ref();
            orchestrator
                .switch_patch(id("100.02 Starscape"), Some(host))
                .await
        })
    };

    host.entered.notified().await;
    assert!(orchestrator.is_switching());

    let err = orchestrator
        .switch_patch(id("101.00 Aurora"), None)
        .await
        .unwrap_err();
    match err {
        SwitchError::InProgress { from, to } => {
            assert_eq!(from, "34.04 Omni");
            assert_eq!(to, "100.02 Starscape");
        }
        other => panic!("unexpected error: {}", other),
    }

    // A request for the in-flight target is rejected as well.
    assert!(matches!(
        orchestrator.switch_patch(id("100.02 Starscape"), None).await,
        Err(SwitchError::InProgress { .. })
    ));

    host.release.notify_one();
    let outcome = task.await.unwrap().unwrap();
    assert!(matches!(outcome, SwitchOutcome::Switched(_)));
    assert_eq!(orchestrator.current_identity(), id("100.02 Starscape"));
    assert!(!orchestrator.is_switching());
}

#[tokio::test]
async fn test_failed_load_degrades_then_retry_succeeds() {
    let (orchestrator, _, _) = setup("34.04 Omni");
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let host = RecordingHost::new(journal.clone());
    host.fail_load.store(true, Ordering::SeqCst);
    observe(&orchestrator, &journal);

    let err = orchestrator
        .switch_patch(id("100.02 Starscape"), as_host(&host))
        .await
        .unwrap_err();
    assert!(matches!(err, SwitchError::Load(HostError::Rejected(_))));

    // No rollback: the host already points at the target.
    assert!(orchestrator.is_degraded());
    assert_eq!(orchestrator.current_identity(), id("100.02 Starscape"));
    assert_eq!(
        orchestrator.roots().module_root,
        PathBuf::from("/game/patch100/mods")
    );
    assert!(journal
        .lock()
        .last()
        .is_some_and(|e| e.starts_with("failed 100.02 Starscape: Failed to load mods")));
    assert!(!journal.lock().iter().any(|e| e.starts_with("changed")));

    journal.lock().clear();
    host.fail_load.store(false, Ordering::SeqCst);
    let outcome = orchestrator
        .switch_patch(id("100.02 Starscape"), as_host(&host))
        .await
        .unwrap();

    assert!(matches!(outcome, SwitchOutcome::Switched(_)));
    assert_eq!(orchestrator.state(), SwitchState::Stable);
    assert_eq!(
        *journal.lock(),
        vec![
            "changing 100.02 Starscape -> 100.02 Starscape",
            "unload",
            "roots /game/patch100/mods",
            "load",
            "changed 100.02 Starscape -> 100.02 Starscape",
        ]
    );
}

#[tokio::test]
async fn test_interrupted_switch_marks_degraded() {
    let (orchestrator, _, _) = setup("34.04 Omni");
    let host = BlockingHost::default();

    let result = tokio::time::timeout(
        Duration::from_millis(20),
        orchestrator.switch_patch(id("100.02 Starscape"), as_host(&host)),
    )
    .await;
    assert!(result.is_err());

    match orchestrator.state() {
        SwitchState::Degraded { error } => assert_eq!(error, "switch interrupted"),
        other => panic!("unexpected state: {:?}", other),
    }

    // A new request is accepted after the interruption.
    let outcome = orchestrator
        .switch_patch(id("100.02 Starscape"), None)
        .await
        .unwrap();
    assert!(matches!(outcome, SwitchOutcome::Switched(_)));
    assert_eq!(orchestrator.state(), SwitchState::Stable);
}

#[tokio::test]
async fn test_unnumbered_target_rejected_before_any_step() {
    let (orchestrator, _, _) = setup("34.04 Omni");
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let host = RecordingHost::new(journal.clone());
    observe(&orchestrator, &journal);

    let err = orchestrator
        .switch_patch(id("Classic"), as_host(&host))
        .await
        .unwrap_err();

    assert!(matches!(err, SwitchError::Identity(_)));
    assert!(journal.lock().is_empty());
    assert_eq!(orchestrator.state(), SwitchState::Stable);
}
