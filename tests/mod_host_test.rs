//! End-to-end tests: a runtime over an on-disk mod tree, switched live.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use modhost_core::health::HealthState;
use modhost_core::host::HostError;
use modhost_core::mods::{
    BuiltinCodeLoader, DispatchId, Facet, ModCode, ModContext, SessionId, MANIFEST_FILE,
};
use modhost_core::patch::{
    FileCatalogSource, PatchIdentity, ResourceLayout, SwitchError, SwitchOutcome,
};
use modhost_core::{Runtime, RuntimeConfig};

type Journal = Arc<Mutex<Vec<String>>>;

fn id(raw: &str) -> PatchIdentity {
    PatchIdentity::parse(raw).unwrap()
}

fn write_mod(mods_root: &Path, dir: &str, json: &str) {
    let path = mods_root.join(dir);
    fs::create_dir_all(&path).unwrap();
    fs::write(path.join(MANIFEST_FILE), json).unwrap();
}

struct JournalFacet {
    label: String,
    journal: Journal,
}

impl Facet for JournalFacet {
    fn install(&mut self) {
        self.journal.lock().push(format!("install {}", self.label));
    }

    fn destroy(&mut self) {
        self.journal.lock().push(format!("destroy {}", self.label));
    }
}

struct JournalCode {
    name: String,
    journal: Journal,
}

impl JournalCode {
    fn facet(&self, label: String) -> Option<Box<dyn Facet>> {
        self.journal.lock().push(format!("create {}", label));
        Some(Box::new(JournalFacet {
            label,
            journal: self.journal.clone(),
        }))
    }
}

impl ModCode for JournalCode {
    fn create_global(&self, _ctx: &ModContext) -> Result<Option<Box<dyn Facet>>, String> {
        Ok(self.facet(format!("{} global", self.name)))
    }

    fn create_client(
        &self,
        _ctx: &ModContext,
        session: SessionId,
    ) -> Result<Option<Box<dyn Facet>>, String> {
        Ok(self.facet(format!("{} client {}", self.name, session.id())))
    }

    fn create_network(
        &self,
        _ctx: &ModContext,
        dispatch: DispatchId,
    ) -> Result<Option<Box<dyn Facet>>, String> {
        Ok(self.facet(format!("{} network {}", self.name, dispatch.id())))
    }
}

fn journal_loader(journal: &Journal, names: &[&str]) -> BuiltinCodeLoader {
    let loader = BuiltinCodeLoader::new();
    for name in names {
        let journal = journal.clone();
        loader.register(name, move |descriptor, _dir| {
            Ok(Arc::new(JournalCode {
                name: descriptor.key().to_string(),
                journal: journal.clone(),
            }) as Arc<dyn ModCode>)
        });
    }
    loader
}

fn runtime(base: &Path, journal: &Journal) -> Runtime {
    let config = RuntimeConfig {
        layout: ResourceLayout::new(base, id("34.04 Omni")),
        initial_patch: id("34.04 Omni"),
        ..RuntimeConfig::default()
    };
    let loader = journal_loader(journal, &["core", "alpha", "beta"]);
    Runtime::new(config, Arc::new(loader), Arc::new(FileCatalogSource::new())).unwrap()
}

fn position(journal: &Journal, entry: &str) -> usize {
    journal
        .lock()
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("{} not in journal", entry))
}

#[tokio::test]
async fn test_switch_reloads_mods_and_reattaches_sessions() {
    let tmp = tempfile::tempdir().unwrap();
    write_mod(&tmp.path().join("mods"), "core", r#"{"core": true}"#);
    write_mod(&tmp.path().join("mods"), "alpha", r#"{"dependencies": ["core"]}"#);
    write_mod(&tmp.path().join("patch100/mods"), "core", r#"{"core": true}"#);
    write_mod(&tmp.path().join("patch100/mods"), "beta", r#"{"name": "Beta"}"#);

    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let runtime = runtime(tmp.path(), &journal);

    let report = runtime.start().await;
    assert_eq!(report.loaded, vec!["core", "alpha"]);

    let session = SessionId::new(7);
    assert_eq!(runtime.host.attach_session(session).await, 2);

    let outcome = runtime.switch_patch(id("100.02 Starscape")).await.unwrap();
    assert!(matches!(outcome, SwitchOutcome::Switched(_)));

    let snapshot = runtime.host.snapshot().await;
    assert_eq!(snapshot.roots.module_root, tmp.path().join("patch100/mods"));
    assert_eq!(snapshot.sessions, 1);

    let (names, beta_attached) = runtime
        .host
        .with_manager(|m| {
            let names: Vec<String> = m.loaded_names().into_iter().map(str::to_string).collect();
            let attached = m.get("beta").map(|i| i.has_client(session));
            (names, attached)
        })
        .await;
    assert_eq!(names, vec!["core", "beta"]);
    assert_eq!(beta_attached, Some(true));

    // Non-core facets go down before core ones and come up after them.
    assert!(position(&journal, "destroy alpha client 7") < position(&journal, "destroy core client 7"));
    assert!(position(&journal, "destroy alpha global") < position(&journal, "destroy core global"));
    let last_core_client = journal
        .lock()
        .iter()
        .rposition(|e| e == "create core client 7")
        .unwrap();
    assert!(last_core_client < position(&journal, "create beta client 7"));
    assert!(position(&journal, "create beta client 7") < position(&journal, "install beta client 7"));

    let health = runtime.health().await;
    assert_eq!(health.state, HealthState::Healthy);
    assert_eq!(health.patch, "100.02 Starscape");
    assert_eq!(health.mods_loaded, 2);

    runtime.shutdown().await;
    assert_eq!(runtime.host.snapshot().await.loaded, 0);
}

fn last_position(journal: &Journal, entry: &str) -> usize {
    journal
        .lock()
        .iter()
        .rposition(|e| e == entry)
        .unwrap_or_else(|| panic!("{} not in journal", entry))
}

#[tokio::test]
async fn test_dispatch_facets_survive_switch_and_detach_core_last() {
    let tmp = tempfile::tempdir().unwrap();
    write_mod(&tmp.path().join("mods"), "core", r#"{"core": true}"#);
    write_mod(&tmp.path().join("mods"), "alpha", "{}");
    write_mod(&tmp.path().join("patch100/mods"), "core", r#"{"core": true}"#);
    write_mod(&tmp.path().join("patch100/mods"), "beta", "{}");

    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let runtime = runtime(tmp.path(), &journal);
    runtime.start().await;

    let session = SessionId::new(7);
    let dispatch = DispatchId::new(3);
    assert_eq!(runtime.host.attach_session(session).await, 2);
    assert_eq!(runtime.host.attach_dispatch(dispatch).await, 2);
    assert_eq!(runtime.host.attach_dispatch(dispatch).await, 0);
    assert_eq!(runtime.host.snapshot().await.dispatches, 1);
    assert!(position(&journal, "create core network 3") < position(&journal, "create alpha network 3"));

    runtime.switch_patch(id("100.02 Starscape")).await.unwrap();

    // Teardown runs network, then client, then global, core last in each.
    assert!(position(&journal, "destroy alpha network 3") < position(&journal, "destroy core network 3"));
    assert!(position(&journal, "destroy core network 3") < position(&journal, "destroy alpha client 7"));
    assert!(position(&journal, "destroy core client 7") < position(&journal, "destroy alpha global"));
    assert!(position(&journal, "destroy alpha global") < position(&journal, "destroy core global"));

    assert!(last_position(&journal, "create core network 3") < position(&journal, "create beta network 3"));
    let beta_network = runtime
        .host
        .with_manager(|m| m.get("beta").map(|i| i.has_network(dispatch)))
        .await;
    assert_eq!(beta_network, Some(true));

    assert_eq!(runtime.host.detach_dispatch(dispatch).await, 2);
    assert_eq!(runtime.host.detach_dispatch(dispatch).await, 0);
    assert!(last_position(&journal, "destroy beta network 3") < last_position(&journal, "destroy core network 3"));
    assert_eq!(runtime.host.snapshot().await.dispatches, 0);
    assert!(runtime.host.with_manager(|m| m.is_loaded("beta")).await);
}

#[tokio::test]
async fn test_missing_mod_folder_degrades_until_retried() {
    let tmp = tempfile::tempdir().unwrap();
    write_mod(&tmp.path().join("mods"), "alpha", "{}");

    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let runtime = runtime(tmp.path(), &journal);
    runtime.start().await;

    let err = runtime.switch_patch(id("92.03 Eclipse")).await.unwrap_err();
    assert!(matches!(err, SwitchError::Load(HostError::ModuleRootMissing(_))));

    let health = runtime.health().await;
    assert_eq!(health.state, HealthState::Unhealthy);
    assert!(!health.ready);
    assert_eq!(health.patch, "92.03 Eclipse");
    assert_eq!(health.mods_loaded, 0);

    write_mod(&tmp.path().join("patch92/mods"), "beta", "{}");
    let outcome = runtime.switch_patch(id("92.03 Eclipse")).await.unwrap();
    assert!(matches!(outcome, SwitchOutcome::Switched(_)));

    let health = runtime.health().await;
    assert_eq!(health.state, HealthState::Healthy);
    assert_eq!(health.mods_loaded, 1);
    assert!(runtime.host.with_manager(|m| m.is_loaded("beta")).await);
}

#[tokio::test]
async fn test_switch_back_to_baseline_restores_original_mods() {
    let tmp = tempfile::tempdir().unwrap();
    write_mod(&tmp.path().join("mods"), "alpha", "{}");
    write_mod(&tmp.path().join("patch100/mods"), "beta", "{}");

    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let runtime = runtime(tmp.path(), &journal);
    runtime.start().await;

    runtime.switch_patch(id("100.02 Starscape")).await.unwrap();
    runtime.switch_patch(id("34.04 Omni")).await.unwrap();

    let loaded = runtime
        .host
        .with_manager(|m| m.loaded_names().into_iter().map(str::to_string).collect::<Vec<_>>())
        .await;
    assert_eq!(loaded, vec!["alpha"]);
    assert_eq!(
        runtime.orchestrator.roots().module_root,
        tmp.path().join("mods")
    );
    let record = runtime.orchestrator.last_switch().unwrap();
    assert_eq!(record.to, id("34.04 Omni"));
}
