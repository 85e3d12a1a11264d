//! End-to-end binding scenarios against the native store.

use std::sync::Arc;

use ndarray::arr2;
use rustyhdf5_bind::{
    AttributeBinding, AttributeOwner, BindConfig, BindState, BindingEngine, Container,
    ElementType, Error, FieldKey, FieldOptions, MissingPolicy, NativeStore, ObjectStore, OpenMode,
    Schema,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn volatile() -> Arc<NativeStore> {
    Arc::new(NativeStore::volatile())
}

struct Weather {
    schema: Schema,
    temperature: FieldKey<f64, 2>,
    names: FieldKey<String, 1>,
}

fn weather_schema() -> Weather {
    let mut b = Schema::builder();
    let temperature = b.field::<f64, 2>(
        "temperature",
        FieldOptions::new()
            .shape(&[200, 5])
            .attribute(AttributeBinding::new("units").with_default("celsius")),
    );
    let names = b.field::<String, 1>("names", FieldOptions::new().shape(&[5]));
    b.attribute(AttributeBinding::new("station_count").with_default(5i32));
    Weather {
        schema: b.build().unwrap(),
        temperature,
        names,
    }
}

// ---------------------------------------------------------------------------
// Open-or-create
// ---------------------------------------------------------------------------

#[test]
fn counter_survives_rebinding() {
    let store = volatile();
    let mut b = Schema::builder();
    let counter = b.field::<i32, 1>("counter", FieldOptions::new());
    let schema = b.build().unwrap();
    let engine = BindingEngine::default();

    {
        let file = Container::open(store.clone(), "counter", OpenMode::CreateExclusive).unwrap();
        let bound = engine.bind(&schema, file.root()).unwrap();
        bound.get(&counter).unwrap().set(0, 42).unwrap();
    }
    assert!(!store.is_container_open("counter"));

    let file = Container::open(store.clone(), "counter", OpenMode::ReadWrite).unwrap();
    let bound = engine.bind(&schema, file.root()).unwrap();
    let ds = bound.get(&counter).unwrap();
    assert_eq!(ds.dims().unwrap(), vec![1]);
    assert_eq!(ds.get(0).unwrap(), 42);
}

#[test]
fn weather_scenario() {
    let store = volatile();
    let w = weather_schema();
    let engine = BindingEngine::default();

    let file = Container::open(store.clone(), "weather", OpenMode::CreateExclusive).unwrap();
    {
        let bound = engine.bind(&w.schema, file.root()).unwrap();
        assert_eq!(bound.state(), BindState::Bound);
        let temps = bound.get(&w.temperature).unwrap();
        let names = bound.get(&w.names).unwrap();
        assert_eq!(temps.dims().unwrap(), vec![200, 5]);
        assert_eq!(names.dims().unwrap(), vec![5]);
        names.set(0, "Chicago".to_string()).unwrap();
        temps.set(199, 4, -3.5).unwrap();

        let units = bound.field_attribute("temperature", "units").unwrap();
        assert_eq!(units.read::<String>().unwrap(), "celsius");
        assert_eq!(bound.attribute("station_count").unwrap().read::<i32>().unwrap(), 5);
    }

    let bound = engine.bind(&w.schema, file.root()).unwrap();
    assert_eq!(bound.get(&w.names).unwrap().get(0).unwrap(), "Chicago");
    assert_eq!(bound.get(&w.temperature).unwrap().get(199, 4).unwrap(), -3.5);
    assert_eq!(
        file.root().list_datasets().unwrap(),
        vec!["names".to_string(), "temperature".to_string()]
    );
}

#[test]
fn renamed_location_and_nested_groups() {
    let store = volatile();
    let file = Container::open(store, "nested", OpenMode::CreateExclusive).unwrap();
    file.root().create_group("raw").unwrap();

    let mut b = Schema::builder();
    let k = b.field::<i64, 1>("samples", FieldOptions::new().location("raw/samples").shape(&[3]));
    let schema = b.build().unwrap();
    let bound = BindingEngine::default().bind(&schema, file.root()).unwrap();

    let ds = bound.get(&k).unwrap();
    assert_eq!(ds.path(), "/raw/samples");
    assert!(file.root().exists("raw/samples").unwrap());
    assert!(!file.root().exists("samples").unwrap());
}

// ---------------------------------------------------------------------------
// Read-only containers
// ---------------------------------------------------------------------------

#[test]
fn read_only_leaves_missing_fields_unbound() {
    let store = volatile();
    {
        let file = Container::open(store.clone(), "ro", OpenMode::CreateExclusive).unwrap();
        file.root().create_dataset::<f64, 2>("temperature", &[200, 5], None).unwrap();
    }

    let w = weather_schema();
    let file = Container::open(store.clone(), "ro", OpenMode::ReadOnly).unwrap();
    let bound = BindingEngine::default().bind(&w.schema, file.root()).unwrap();
    assert!(bound.get(&w.temperature).is_some());
    assert!(bound.get(&w.names).is_none());
    assert!(bound.field_attribute("temperature", "units").is_none());

    let root = file.root();
    assert!(matches!(root.create_group("g"), Err(Error::InvalidState(_))));
    assert!(matches!(
        root.create_dataset::<i32, 1>("x", &[1], None),
        Err(Error::InvalidState(_))
    ));
    let temps = bound.get(&w.temperature).unwrap();
    assert!(matches!(temps.set(0, 0, 1.0), Err(Error::InvalidState(_))));
    assert!(matches!(temps.resize(&[1, 5]), Err(Error::InvalidState(_))));
}

#[test]
fn read_only_fail_policy() {
    let store = volatile();
    Container::open(store.clone(), "ro-fail", OpenMode::CreateExclusive)
        .unwrap()
        .close()
        .unwrap();
    let engine = BindingEngine::new(BindConfig::from_toml_str("missing_on_readonly = \"fail\"").unwrap());
    let file = Container::open(store, "ro-fail", OpenMode::ReadOnly).unwrap();
    assert!(matches!(
        engine.bind(&weather_schema().schema, file.root()),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn container_config_drives_default_engine() {
    let store = volatile();
    let config = BindConfig {
        default_string_width: 32,
        missing_on_readonly: MissingPolicy::Fail,
        ..BindConfig::default()
    };
    let w = weather_schema();
    {
        let file =
            Container::open_with_config(store.clone(), "cfg", OpenMode::CreateExclusive, config.clone())
                .unwrap();
        let bound = BindingEngine::default().bind(&w.schema, file.root()).unwrap();
        let bound_type = bound.dataset("names").unwrap().element_type().unwrap();
        let direct = file.root().create_dataset::<String, 1>("extra", &[1], None).unwrap();
        assert_eq!(bound_type, ElementType::FixedString { width: 32 });
        assert_eq!(direct.element_type().unwrap(), bound_type);
        drop(bound);
        file.root().delete_dataset("names").unwrap();
    }

    let file = Container::open_with_config(store.clone(), "cfg", OpenMode::ReadOnly, config).unwrap();
    assert!(matches!(
        BindingEngine::default().bind(&w.schema, file.root()),
        Err(Error::InvalidState(_))
    ));
    // A pinned engine config overrides the container's.
    let bound = BindingEngine::new(BindConfig::default())
        .bind(&w.schema, file.root())
        .unwrap();
    assert!(!bound.is_bound("names"));
}

// ---------------------------------------------------------------------------
// Arrays
// ---------------------------------------------------------------------------

#[test]
fn resize_against_bounded_axis() {
    let store = volatile();
    let file = Container::open(store, "resize", OpenMode::CreateExclusive).unwrap();
    let ds = file
        .root()
        .create_dataset::<f64, 2>("m", &[3, 2], Some(&[6, -1]))
        .unwrap();
    ds.set_values(&arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]])).unwrap();

    ds.resize(&[6, 5]).unwrap();
    assert_eq!(ds.dims().unwrap(), vec![6, 5]);
    assert_eq!(ds.row(2).unwrap(), vec![5.0, 6.0, 0.0, 0.0, 0.0]);
    assert!(matches!(ds.resize(&[7, 5]), Err(Error::IndexOutOfRange(_))));

    ds.resize(&[2, 2]).unwrap();
    assert_eq!(ds.dims().unwrap(), vec![2, 2]);
    assert_eq!(ds.values().unwrap(), arr2(&[[1.0, 2.0], [3.0, 4.0]]));
}

#[test]
fn huge_extents_are_errors() {
    let store = volatile();
    let file = Container::open(store, "huge", OpenMode::CreateExclusive).unwrap();
    let root = file.root();
    assert!(matches!(
        root.create_dataset::<i32, 2>("m", &[u64::MAX / 2, 3], None),
        Err(Error::IndexOutOfRange(_))
    ));
    assert!(matches!(
        root.create_dataset::<i8, 1>("v", &[1 << 40], None),
        Err(Error::IndexOutOfRange(_))
    ));
    assert!(!root.exists("m").unwrap());

    let ds = root.create_dataset::<f64, 2>("d", &[3, 2], Some(&[-1, -1])).unwrap();
    ds.set(2, 1, 7.5).unwrap();
    assert!(matches!(ds.resize(&[u64::MAX / 2, 4]), Err(Error::IndexOutOfRange(_))));
    assert_eq!(ds.dims().unwrap(), vec![3, 2]);
    assert_eq!(ds.get(2, 1).unwrap(), 7.5);
    assert_eq!(ds.len().unwrap(), 6);
}

#[test]
fn rows_and_elements_agree() {
    let store = volatile();
    let file = Container::open(store, "rows", OpenMode::CreateExclusive).unwrap();
    let ds = file.root().create_dataset::<i32, 2>("g", &[4, 3], None).unwrap();
    for i in 0..4 {
        for j in 0..3 {
            ds.set(i, j, (i * 10 + j) as i32).unwrap();
        }
    }
    let rows: Vec<Vec<i32>> = ds.rows().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r.len() == 3));
    assert_eq!(rows[2], vec![20, 21, 22]);

    let elements: Vec<i32> = ds.elements().unwrap().collect::<Result<_, _>>().unwrap();
    let flattened: Vec<i32> = rows.into_iter().flatten().collect();
    assert_eq!(elements, flattened);
}

#[test]
fn field_views_share_one_handle() {
    let store = volatile();
    let file = Container::open(store, "share", OpenMode::CreateExclusive).unwrap();
    let w = weather_schema();
    let mut bound = BindingEngine::default().bind(&w.schema, file.root()).unwrap();
    let a = bound.get(&w.names).unwrap();
    let b = bound.get(&w.names).unwrap();
    a.set(3, "Oslo".into()).unwrap();
    assert_eq!(b.get(3).unwrap(), "Oslo");

    bound.close().unwrap();
    assert!(!a.is_open());
    assert!(matches!(b.get(3), Err(Error::InvalidState(_))));
}

// ---------------------------------------------------------------------------
// Attributes and failures
// ---------------------------------------------------------------------------

#[test]
fn existing_attribute_is_not_overwritten() {
    let store = volatile();
    let file = Container::open(store, "attrs", OpenMode::CreateExclusive).unwrap();
    file.root()
        .set_attribute("station_count", ElementType::I32, Some(&9i32.into()))
        .unwrap();
    let bound = BindingEngine::default()
        .bind(&weather_schema().schema, file.root())
        .unwrap();
    assert_eq!(bound.attribute("station_count").unwrap().read::<i32>().unwrap(), 9);
}

#[test]
fn failed_binding_leaves_no_open_handles() {
    let store = volatile();
    let file = Container::open(store.clone(), "fail", OpenMode::CreateExclusive).unwrap();
    file.root().create_dataset::<i8, 3>("names", &[1, 1, 1], None).unwrap();
    let before = store.open_handle_count();

    let err = BindingEngine::default()
        .bind(&weather_schema().schema, file.root())
        .unwrap_err();
    assert!(matches!(err, Error::RankMismatch { .. }));
    assert_eq!(store.open_handle_count(), before);
}

#[test]
fn disk_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weather.rhb");
    let location = path.to_str().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(NativeStore::new());
    let w = weather_schema();

    {
        let file = Container::open(store.clone(), location, OpenMode::CreateExclusive).unwrap();
        let bound = BindingEngine::default().bind(&w.schema, file.root()).unwrap();
        bound.get(&w.names).unwrap().set(4, "Lima".into()).unwrap();
    }
    assert!(path.exists());

    let file = Container::open(store, location, OpenMode::ReadOnly).unwrap();
    let bound = BindingEngine::default().bind(&w.schema, file.root()).unwrap();
    assert_eq!(bound.get(&w.names).unwrap().get(4).unwrap(), "Lima");
    assert_eq!(
        bound.field_attribute("temperature", "units").unwrap().read::<String>().unwrap(),
        "celsius"
    );
}
