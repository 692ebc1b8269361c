use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use immuno_plugin_api::{
    IM_ERR_INVALID_HANDLE, IM_PLUGIN_INIT_FAILED, ImHostVTable, ImMetadata, ImModuleHandle, ImStr,
};

use super::*;
use crate::registry::{Metadata, StoreId};
use crate::status::Method;
use crate::types::TypeKind;
use crate::value::Value;
use crate::variable::{Backing, VariableDecl};

thread_local! {
    static HOST: Cell<*const ImHostVTable> = const { Cell::new(ptr::null()) };
    static EVENTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static DELTA: Cell<ImModuleHandle> = Cell::new(ImModuleHandle::default());
}

fn event(text: impl Into<String>) {
    EVENTS.with(|events| events.borrow_mut().push(text.into()));
}

fn take_events() -> Vec<String> {
    EVENTS.with(|events| std::mem::take(&mut *events.borrow_mut()))
}

unsafe extern "C" fn bind_host(host: *const ImHostVTable) {
    HOST.with(|cell| cell.set(host));
}

fn host() -> &'static ImHostVTable {
    // SAFETY: bound by `bind_host` before every initializer runs.
    unsafe { &*HOST.with(Cell::get) }
}

fn register(name: &str) -> Option<ImModuleHandle> {
    let host = host();
    let metadata = ImMetadata {
        name: ImStr::from_str(name),
        version: ImStr::from_str("1.0.0"),
        description: ImStr::null(),
        author: ImStr::null(),
    };
    let mut out = ImModuleHandle::default();
    let code = (host.register_module?)(host.user_data, &metadata, &mut out);
    (code == IM_OK).then_some(out)
}

extern "C" fn alpha_teardown(_: ImModuleHandle) {
    event("alpha teardown");
}

unsafe extern "C" fn alpha_init() -> i32 {
    let Some(module) = register("alpha") else {
        return IM_PLUGIN_INIT_FAILED;
    };
    let host = host();
    host.module_set_teardown
        .map_or(IM_PLUGIN_INIT_FAILED, |set| set(host.user_data, module, Some(alpha_teardown)))
}

unsafe extern "C" fn alpha_exit() {
    event("alpha exit");
}

unsafe extern "C" fn beta_init() -> i32 {
    register("beta").map_or(IM_PLUGIN_INIT_FAILED, |_| IM_OK)
}

unsafe extern "C" fn refusing_init() -> i32 {
    register("gamma");
    IM_PLUGIN_INIT_FAILED
}

unsafe extern "C" fn silent_init() -> i32 {
    IM_OK
}

unsafe extern "C" fn twin_init() -> i32 {
    register("twin-a");
    register("twin-b");
    IM_OK
}

unsafe extern "C" fn delta_init() -> i32 {
    let Some(module) = register("delta") else {
        return IM_PLUGIN_INIT_FAILED;
    };
    DELTA.with(|cell| cell.set(module));
    IM_OK
}

/// Records whether the module registered by `delta_init` is still reachable through the host.
unsafe extern "C" fn delta_exit() {
    let host = host();
    let mut metadata = ImMetadata {
        name: ImStr::null(),
        version: ImStr::null(),
        description: ImStr::null(),
        author: ImStr::null(),
    };
    let code = host.module_metadata.map_or(IM_ERR_INVALID_HANDLE, |metadata_of| {
        metadata_of(host.user_data, DELTA.with(Cell::get), &mut metadata)
    });
    event(format!("delta exit {code}"));
}

type Symbols = HashMap<&'static str, *mut c_void>;

fn plugin(init: ImPluginInit, exit: Option<ImPluginExit>) -> Symbols {
    let mut symbols = Symbols::new();
    symbols.insert(IMMUNO_PLUGIN_BIND_HOST_SYMBOL, bind_host as ImPluginBindHost as *mut c_void);
    symbols.insert(IMMUNO_PLUGIN_INIT_SYMBOL, init as *mut c_void);
    if let Some(exit) = exit {
        symbols.insert(IMMUNO_PLUGIN_EXIT_SYMBOL, exit as *mut c_void);
    }
    symbols
}

fn alpha() -> Symbols {
    plugin(alpha_init, Some(alpha_exit))
}

fn beta() -> Symbols {
    plugin(beta_init, None)
}

struct MockLibrary {
    path: PathBuf,
    symbols: Symbols,
    closed: Rc<RefCell<Vec<PathBuf>>>,
}

impl SharedLibrary for MockLibrary {
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        self.symbols.get(name).and_then(|ptr| NonNull::new(*ptr))
    }

    fn close(self) -> std::result::Result<(), LoaderError> {
        self.closed.borrow_mut().push(self.path);
        Ok(())
    }
}

#[derive(Default)]
struct MockPlatform {
    entries: Option<Vec<PathBuf>>,
    libraries: HashMap<PathBuf, Symbols>,
    closed: Rc<RefCell<Vec<PathBuf>>>,
}

impl MockPlatform {
    fn with_dir(entries: &[&str]) -> Self {
        Self {
            entries: Some(entries.iter().map(|entry| dir().join(entry)).collect()),
            ..Self::default()
        }
    }

    fn library(mut self, name: &str, symbols: Symbols) -> Self {
        self.libraries.insert(dir().join(name), symbols);
        self
    }
}

impl Platform for MockPlatform {
    type Library = MockLibrary;
    type Entries = std::vec::IntoIter<PathBuf>;

    fn open_library(&self, path: &Path) -> std::result::Result<MockLibrary, LoaderError> {
        let symbols = self
            .libraries
            .get(path)
            .cloned()
            .ok_or_else(|| LoaderError::Failed("invalid ELF header".to_string()))?;
        Ok(MockLibrary {
            path: path.to_path_buf(),
            symbols,
            closed: self.closed.clone(),
        })
    }

    fn open_dir(&self, _: &Path) -> std::result::Result<Self::Entries, LoaderError> {
        self.entries
            .clone()
            .map(Vec::into_iter)
            .ok_or(LoaderError::NotFound)
    }
}

fn dir() -> PathBuf {
    PathBuf::from("/opt/immuno/plugins")
}

fn manager(platform: MockPlatform) -> (PluginManager<MockPlatform>, Rc<RefCell<Vec<PathBuf>>>) {
    take_events();
    let closed = platform.closed.clone();
    let config = RuntimeConfig::new(dir()).with_suffix("so");
    (PluginManager::with_platform(config, platform), closed)
}

fn names(manager: &PluginManager<MockPlatform>) -> Vec<String> {
    manager.loaded_plugins().into_iter().map(|p| p.name).collect()
}

/// A builtin that provides the only setting store and records its lifecycle.
fn json_store() -> BuiltinPlugin {
    BuiltinPlugin::new("json-store", |registry| {
        let module = registry
            .register_module(Metadata::new("json-store", "1.0.0"))
            .map_err(|error| error.to_string())?;
        let store = registry
            .register_store(module)
            .map_err(|error| error.to_string())?;
        registry
            .set_store_save(
                store,
                Some(Box::new(|registry: &mut Registry, _: StoreId, module: ModuleId| {
                    let name = registry.metadata(module).map(|m| m.name.clone());
                    event(format!("save {}", name.unwrap_or_default()));
                })),
            )
            .map_err(|error| error.to_string())?;
        registry
            .set_store_dump(
                store,
                Some(Box::new(|_: &mut Registry, _: StoreId| {
                    event("dump");
                    true
                })),
            )
            .map_err(|error| error.to_string())?;
        registry
            .set_teardown(
                module,
                Some(Box::new(|_: &mut Registry, _: ModuleId| event("json-store teardown"))),
            )
            .map_err(|error| error.to_string())
    })
    .with_exit(|_| event("json-store exit"))
}

#[test]
fn missing_directory_is_fatal() {
    let (mut manager, _) = manager(MockPlatform::default());
    let error = manager.start().unwrap_err();
    assert!(matches!(error, Error::PluginDirNotFound { .. }), "{error}");
    assert_eq!(error.code(), immuno_plugin_api::IM_PLUGIN_DIR_NOT_FOUND);
    assert_eq!(manager.init_status(), InitStatus::PluginDirNotFound);
    assert_eq!(manager.state(), ManagerState::Idle);
}

#[test]
fn empty_directory_starts_without_plugins() {
    let (mut manager, _) = manager(MockPlatform::with_dir(&[]));
    let report = manager.start().unwrap();
    assert!(report.loaded.is_empty());
    assert_eq!(manager.state(), ManagerState::Ready);
    assert_eq!(manager.init_status(), InitStatus::Success);
}

#[test]
fn candidates_load_in_name_order_and_other_files_are_skipped() {
    let platform = MockPlatform::with_dir(&["libbeta.so", "notes.txt", "libalpha.SO"])
        .library("libalpha.SO", alpha())
        .library("libbeta.so", beta());
    let (mut manager, _) = manager(platform);

    let report = manager.start().unwrap();
    assert_eq!(names(&manager), vec!["alpha", "beta"]);
    assert_eq!(report.skipped, vec![dir().join("notes.txt")]);
    assert_eq!(report.loaded[0].library_path, Some(dir().join("libalpha.SO")));
    assert_eq!(manager.registry().module_count(), 2);
}

#[test]
fn open_failure_unloads_earlier_plugins() {
    let platform = MockPlatform::with_dir(&["liba.so", "libb.so"]).library("liba.so", alpha());
    let (mut manager, closed) = manager(platform);

    let error = manager.start().unwrap_err();
    assert!(matches!(error, Error::PluginOpen { .. }), "{error}");
    assert_eq!(manager.init_status(), InitStatus::PluginOpenFailed);
    assert_eq!(manager.registry().module_count(), 0);
    assert!(manager.loaded_plugins().is_empty());
    assert_eq!(take_events(), vec!["alpha teardown", "alpha exit"]);
    assert_eq!(*closed.borrow(), vec![dir().join("liba.so")]);
}

#[test]
fn missing_entry_point_closes_the_library() {
    let mut no_init = beta();
    no_init.remove(IMMUNO_PLUGIN_INIT_SYMBOL);
    let platform = MockPlatform::with_dir(&["libbroken.so"]).library("libbroken.so", no_init);
    let (mut manager, closed) = manager(platform);

    let error = manager.start().unwrap_err();
    assert!(
        matches!(error, Error::PluginEntryMissing { symbol, .. } if symbol == "immuno_plugin_init")
    );
    assert_eq!(manager.init_status(), InitStatus::PluginEntryMissing);
    assert_eq!(*closed.borrow(), vec![dir().join("libbroken.so")]);
    assert_eq!(manager.registry().module_count(), 0);
}

#[test]
fn failed_initializer_discards_what_it_registered() {
    let platform = MockPlatform::with_dir(&["libgamma.so"])
        .library("libgamma.so", plugin(refusing_init, None));
    let (mut manager, closed) = manager(platform);

    let error = manager.start().unwrap_err();
    assert!(matches!(error, Error::PluginInitFailed { .. }), "{error}");
    assert_eq!(manager.init_status(), InitStatus::PluginInitFailed);
    assert_eq!(manager.registry().find_module("gamma"), None);
    assert_eq!(closed.borrow().len(), 1);
}

#[test]
fn each_plugin_registers_exactly_one_module() {
    for init in [silent_init as ImPluginInit, twin_init] {
        let platform =
            MockPlatform::with_dir(&["libodd.so"]).library("libodd.so", plugin(init, None));
        let (mut manager, _) = manager(platform);

        let error = manager.start().unwrap_err();
        assert!(matches!(error, Error::PluginInitFailed { .. }), "{error}");
        assert_eq!(manager.registry().module_count(), 0);
    }
}

#[test]
fn builtins_load_before_libraries_and_unload_with_them() {
    let platform = MockPlatform::with_dir(&["liba.so", "libbroken.so"])
        .library("liba.so", alpha())
        .library("libbroken.so", plugin(silent_init, None));
    let (mut manager, _) = manager(platform);
    manager.add_builtin(json_store()).unwrap();

    manager.start().unwrap_err();
    assert_eq!(
        take_events(),
        vec!["json-store teardown", "alpha teardown", "alpha exit", "json-store exit"]
    );
}

#[test]
fn lifecycle_calls_are_checked_against_the_state() {
    let platform = MockPlatform::with_dir(&["liba.so"]).library("liba.so", alpha());
    let (mut manager, _) = manager(platform);
    manager.add_builtin(json_store()).unwrap();
    manager.start().unwrap();
    assert_eq!(names(&manager), vec!["json-store", "alpha"]);

    let error = manager.start().unwrap_err();
    assert!(matches!(
        error,
        Error::InvalidState {
            expected: ManagerState::Idle,
            actual: ManagerState::Ready
        }
    ));
    assert!(manager.add_builtin(json_store()).is_err());
}

#[test]
fn persist_saves_every_module_and_dumps_once() {
    let platform = MockPlatform::with_dir(&["liba.so"]).library("liba.so", alpha());
    let (mut manager, _) = manager(platform);
    manager.add_builtin(json_store()).unwrap();
    manager.start().unwrap();

    assert_eq!(manager.persist(), 1);
    assert_eq!(take_events(), vec!["save json-store", "save alpha", "dump"]);
}

#[test]
fn shutdown_flushes_before_teardown_and_exits_in_reverse() {
    let platform = MockPlatform::with_dir(&["liba.so"]).library("liba.so", alpha());
    let (mut manager, closed) = manager(platform);
    manager.add_builtin(json_store()).unwrap();
    manager.start().unwrap();
    manager.registry_mut().save_settings();
    take_events();

    manager.shutdown();
    assert_eq!(
        take_events(),
        vec![
            "dump",
            "json-store teardown",
            "alpha teardown",
            "alpha exit",
            "json-store exit"
        ]
    );
    assert_eq!(manager.state(), ManagerState::Idle);
    assert_eq!(manager.registry().module_count(), 0);
    assert_eq!(*closed.borrow(), vec![dir().join("liba.so")]);

    manager.shutdown();
    assert!(take_events().is_empty());
}

#[test]
fn describe_json_lists_loaded_modules() {
    let platform = MockPlatform::with_dir(&["liba.so"]).library("liba.so", alpha());
    let (mut manager, _) = manager(platform);
    manager.start().unwrap();

    let json: serde_json::Value = serde_json::from_str(&manager.describe_json().unwrap()).unwrap();
    assert_eq!(json["modules"][0]["name"], "alpha");
    assert_eq!(json["settings_status"]["init"], "success");
}

/// A builtin whose first initialization fails to allocate a setting and records how many
/// attempts were made.
fn flaky_allocator(attempts: Rc<Cell<u32>>) -> BuiltinPlugin {
    BuiltinPlugin::new("flaky", move |registry| {
        attempts.set(attempts.get() + 1);
        let module = registry
            .register_module(Metadata::new("flaky", "1.0.0"))
            .map_err(|error| error.to_string())?;
        if attempts.get() == 1 {
            let huge =
                VariableDecl::new(TypeKind::I64, "history", Backing::Growable, usize::MAX / 2);
            // The failure is left to the handshake to notice.
            let _ = registry.register_setting(module, huge);
        }
        Ok(())
    })
}

/// A builtin with one unsigned setting that receives a negative value while loading once.
fn sloppy_loader(attempts: Rc<Cell<u32>>) -> BuiltinPlugin {
    BuiltinPlugin::new("sloppy", move |registry| {
        attempts.set(attempts.get() + 1);
        let module = registry
            .register_module(Metadata::new("sloppy", "1.0.0"))
            .map_err(|error| error.to_string())?;
        let decl = VariableDecl::new(TypeKind::U8, "levels", Backing::Growable, 0);
        let levels = registry
            .register_setting(module, decl)
            .map_err(|error| error.to_string())?;
        if attempts.get() == 1 {
            let _ = registry.set(levels, 0, Value::I64(-1));
        }
        Ok(())
    })
}

#[test]
fn restart_after_shutdown_begins_with_a_clean_status() {
    let (mut manager, _) = manager(MockPlatform::with_dir(&[]));
    let attempts = Rc::new(Cell::new(0));
    manager.add_builtin(sloppy_loader(attempts.clone())).unwrap();

    manager.start().unwrap();
    assert_eq!(manager.init_status(), InitStatus::CompletedWithIgnored);
    manager.shutdown();

    manager.start().unwrap();
    assert_eq!(attempts.get(), 2);
    assert_eq!(manager.init_status(), InitStatus::Success);
    assert_eq!(manager.registry().settings_status().outcome(Method::Set).high, None);
}

#[test]
fn restart_after_allocation_failure_loads_clean_plugins() {
    let (mut manager, _) = manager(MockPlatform::with_dir(&[]));
    let attempts = Rc::new(Cell::new(0));
    manager.add_builtin(flaky_allocator(attempts.clone())).unwrap();

    let error = manager.start().unwrap_err();
    assert!(matches!(error, Error::AllocationFailure { .. }), "{error}");
    assert_eq!(manager.init_status(), InitStatus::OutOfMemory);
    assert_eq!(manager.state(), ManagerState::Idle);

    let report = manager.start().unwrap();
    assert_eq!(attempts.get(), 2);
    assert_eq!(report.loaded.len(), 1);
    assert_eq!(manager.init_status(), InitStatus::Success);
}

#[test]
fn exits_run_after_every_module_is_gone() {
    let platform = MockPlatform::with_dir(&["libdelta.so"])
        .library("libdelta.so", plugin(delta_init, Some(delta_exit)));
    let (mut manager, _) = manager(platform);
    manager.add_builtin(
        BuiltinPlugin::new("epsilon", |registry| {
            registry
                .register_module(Metadata::new("epsilon", "1.0.0"))
                .map(|_| ())
                .map_err(|error| error.to_string())
        })
        .with_exit(|registry| event(format!("epsilon exit {}", registry.module_count()))),
    )
    .unwrap();
    manager.start().unwrap();
    assert_eq!(manager.registry().module_count(), 2);

    manager.shutdown();
    assert_eq!(
        take_events(),
        vec![format!("delta exit {IM_ERR_INVALID_HANDLE}"), "epsilon exit 0".to_string()]
    );
}
