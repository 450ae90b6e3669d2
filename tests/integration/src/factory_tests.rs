//! Factory and Module Tests
//!
//! These tests exercise creation through class factories and the hosting
//! module:
//! - CreateInstance outcomes and their HRESULTs
//! - Server locks and instance counts keeping the module resident
//! - Class lookup and instance limits

mod common;

use com_core::{
    hresult, iid, Aggregation, ClassFactory, ComError, ComObject, IClassFactory, ModuleConfig,
    ServerLock, ServerModule,
};
use common::*;

fn module_with_classes(drops: &DropTracker, config: ModuleConfig) -> std::sync::Arc<ServerModule> {
    let module = ServerModule::new(config);
    let widget_drops = drops.clone();
    module
        .register_class(move || Ok(Widget::new(&widget_drops)), Aggregation::Supported)
        .unwrap();
    let outer_drops = drops.clone();
    module
        .register_class(move || Ok(Outer::new(&outer_drops)), Aggregation::NotSupported)
        .unwrap();
    module
}

/// Test: the Widget scenario through a factory
#[test]
fn test_create_widget() {
    init_logging();

    let drops = DropTracker::new();
    let module = module_with_classes(&drops, ModuleConfig::new("widgets"));
    let factory = module.class_factory(&CLSID_WIDGET).unwrap();

    let a = factory.create::<dyn IA>().unwrap();
    assert_eq!(ref_count(&a), 1);
    let b = a.query::<dyn IB>().unwrap();
    assert_eq!(ref_count(&a), 2);

    drop(a);
    drop(b);
    assert_eq!(drops.drops(), 1);
    assert_eq!(module.instance_count(), 0);
}

/// Test: creating for an unsupported IID fails and the new object does not leak
#[test]
fn test_create_unsupported_capability() {
    let drops = DropTracker::new();
    let module = module_with_classes(&drops, ModuleConfig::default());
    let factory = module.class_factory(&CLSID_WIDGET).unwrap();

    let result = factory.create::<dyn IOuter>();
    assert_eq!(hresult::from_result(&result), hresult::E_NOINTERFACE);
    assert_eq!(drops.drops(), 1);
    assert_eq!(module.instance_count(), 0);
}

/// Test: the HRESULTs of the creation outcomes are distinct
#[test]
fn test_creation_outcomes_have_distinct_codes() {
    let drops = DropTracker::new();
    let module = module_with_classes(&drops, ModuleConfig::default());
    let widgets = module.class_factory(&CLSID_WIDGET).unwrap();
    let outers = module.class_factory(&CLSID_OUTER).unwrap();
    let failing = ClassFactory::<Widget>::new(|| {
        Err(ComError::ConstructionFailed("no backing store".to_string()))
    })
    .into_object()
    .unwrap();

    let ok = hresult::from_result(&widgets.create::<dyn IA>());
    let no_interface = hresult::from_result(&widgets.create::<dyn IOuter>());
    let outer = outers.create::<dyn IOuter>().unwrap();
    let no_aggregation =
        hresult::from_result(&outers.create_aggregate(&outer.identity().unwrap()));
    let construction = hresult::from_result(&failing.create::<dyn IA>());

    assert_eq!(ok, hresult::S_OK);
    assert_eq!(no_interface, hresult::E_NOINTERFACE);
    assert_eq!(no_aggregation, hresult::CLASS_E_NOAGGREGATION);
    assert_eq!(construction, hresult::E_FAIL);
    assert!(hresult::failed(construction));

    assert_eq!(hresult::check(no_aggregation), Err(ComError::NoAggregation));
    assert!(hresult::check(hresult::S_FALSE).is_ok());
}

/// Test: class lookup by CLSID
#[test]
fn test_get_class_object() {
    let drops = DropTracker::new();
    let module = module_with_classes(&drops, ModuleConfig::default());
    assert_eq!(module.registered_classes().len(), 2);

    let object = module
        .get_class_object(&CLSID_WIDGET, &iid::ICLASSFACTORY)
        .unwrap();
    let factory = object.query::<dyn IClassFactory>().unwrap();
    assert!(factory.create::<dyn IB>().is_ok());

    assert!(module.get_class_object(&CLSID_WIDGET, &iid::IUNKNOWN).is_ok());
    assert_eq!(
        module.get_class_object(&CLSID_WIDGET, &IID_IA).unwrap_err(),
        ComError::NoInterface(IID_IA)
    );

    let missing = module.get_class_object(&IID_UNSUPPORTED, &iid::ICLASSFACTORY);
    assert_eq!(hresult::from_result(&missing), hresult::CLASS_E_CLASSNOTAVAILABLE);
}

/// Test: locks and live instances keep the module resident independently
#[test]
fn test_locks_and_instances_keep_module_loaded() {
    let drops = DropTracker::new();
    let module = module_with_classes(&drops, ModuleConfig::default());
    let factory = module.class_factory(&CLSID_WIDGET).unwrap();
    assert!(module.can_unload_now());

    let lock = factory.lock().unwrap();
    assert_eq!(module.lock_count(), 1);
    assert_eq!(module.instance_count(), 0);
    assert!(!module.can_unload_now());

    let a = factory.create::<dyn IA>().unwrap();
    drop(lock);
    assert_eq!(module.lock_count(), 0);
    assert!(!module.can_unload_now());

    drop(a);
    assert!(module.can_unload_now());
}

/// Test: balanced LockServer calls return to the initial state; extra unlocks do not wrap
#[test]
fn test_lock_server_balance() {
    let drops = DropTracker::new();
    let module = module_with_classes(&drops, ModuleConfig::default());
    let factory = module.class_factory(&CLSID_WIDGET).unwrap();

    for _ in 0..5 {
        factory.lock_server(true).unwrap();
    }
    assert_eq!(module.lock_count(), 5);
    for _ in 0..5 {
        factory.lock_server(false).unwrap();
    }
    assert_eq!(module.lock_count(), 0);

    factory.lock_server(false).unwrap();
    assert_eq!(module.lock_count(), 0);
    assert!(module.can_unload_now());

    let local = ClassFactory::new(|| Ok(Widget::new(&DropTracker::new())));
    local.lock_server(true).unwrap();
    assert_eq!(local.lock_state(), ServerLock::Locked(1));
    local.lock_server(false).unwrap();
    local.lock_server(false).unwrap();
    assert_eq!(local.lock_state(), ServerLock::Unlocked);
}

/// Test: an aggregated instance counts against the module like any other
#[test]
fn test_aggregate_counts_as_instance() {
    let drops = DropTracker::new();
    let module = module_with_classes(&drops, ModuleConfig::default());
    let factory = module.class_factory(&CLSID_WIDGET).unwrap();

    let outer = ComObject::create::<dyn IOuter>(Outer::new(&drops)).unwrap();
    outer
        .attach(factory.create_aggregate(&outer.identity().unwrap()).unwrap())
        .unwrap();
    assert_eq!(module.instance_count(), 1);

    drop(outer);
    assert_eq!(module.instance_count(), 0);
    assert_eq!(drops.drops(), 2);
}

/// Test: the instance limit is a construction failure
#[test]
fn test_instance_limit() {
    let drops = DropTracker::new();
    let module = module_with_classes(&drops, ModuleConfig::new("bounded").with_max_instances(3));
    let widgets = module.class_factory(&CLSID_WIDGET).unwrap();
    let outers = module.class_factory(&CLSID_OUTER).unwrap();

    let held: Vec<_> = (0..3).map(|_| widgets.create::<dyn IA>().unwrap()).collect();
    assert_eq!(outers.create::<dyn IOuter>().unwrap_err(), ComError::OutOfMemory);
    assert_eq!(module.instance_count(), 3);

    drop(held);
    assert!(outers.create::<dyn IOuter>().is_ok());
    assert_eq!(module.instance_count(), 0);
}

/// Test: unregistering a class makes it unavailable
#[test]
fn test_unregister_class() {
    let drops = DropTracker::new();
    let module = module_with_classes(&drops, ModuleConfig::default());
    let factory = module.class_factory(&CLSID_OUTER).unwrap();

    assert!(module.unregister_class(&CLSID_OUTER));
    assert!(!module.unregister_class(&CLSID_OUTER));
    assert_eq!(
        module.class_factory(&CLSID_OUTER).unwrap_err(),
        ComError::ClassNotAvailable(CLSID_OUTER)
    );

    // Factories already handed out keep working.
    assert!(factory.create::<dyn IOuter>().is_ok());
}

/// Test: every lookup of one CLSID reaches the same class object
#[test]
fn test_class_object_identity() {
    let drops = DropTracker::new();
    let module = module_with_classes(&drops, ModuleConfig::default());

    let first = module.class_factory(&CLSID_WIDGET).unwrap();
    let second = module.class_factory(&CLSID_WIDGET).unwrap();
    let by_iid = module
        .get_class_object(&CLSID_WIDGET, &iid::ICLASSFACTORY)
        .unwrap();
    assert!(first.is_same_object(&second));
    assert!(first.is_same_object(&by_iid));
    assert!(first.ptr_eq(&second));

    let other = module.class_factory(&CLSID_OUTER).unwrap();
    assert!(!other.is_same_object(&first));
}

/// Test: locks taken and released through different handles balance out
#[test]
fn test_lock_balance_across_handles() {
    let drops = DropTracker::new();
    let module = module_with_classes(&drops, ModuleConfig::default());

    let locking = module.class_factory(&CLSID_WIDGET).unwrap();
    locking.lock_server(true).unwrap();
    locking.lock_server(true).unwrap();
    drop(locking);
    assert_eq!(module.lock_count(), 2);

    let unlocking = module
        .get_class_object(&CLSID_WIDGET, &iid::ICLASSFACTORY)
        .unwrap()
        .query::<dyn IClassFactory>()
        .unwrap();
    unlocking.lock_server(false).unwrap();
    assert!(!module.can_unload_now());
    module
        .class_factory(&CLSID_WIDGET)
        .unwrap()
        .lock_server(false)
        .unwrap();
    drop(unlocking);

    assert_eq!(module.lock_count(), 0);
    assert!(module.can_unload_now());
}
