mod common;

use canopyfuse::config::{ALOS_COLLECTION, LANDSAT_COLLECTION};
use canopyfuse::{AccessConfig, BoundingBox, DataAccessor, MissingReason, Retrieval};
use common::{init_logging, rect_item, MockArchive, MockCatalog, SyntheticRasters};

const AOI: [f64; 4] = [77.0, 12.0, 77.5, 12.5];

fn accessor(catalog: MockCatalog) -> DataAccessor {
    let bbox = BoundingBox::new(AOI[0], AOI[1], AOI[2], AOI[3]).unwrap();
    let config = AccessConfig::new(bbox, "2021-01-01", "2021-03-01")
        .unwrap()
        .with_cloud_cover(20)
        .with_resolution(5000.0);
    DataAccessor::with_ports(
        config,
        Box::new(catalog),
        Box::new(SyntheticRasters),
        Box::new(MockArchive::default()),
    )
}

#[test]
fn test_empty_catalog_returns_missing() {
    init_logging();
    let accessor = accessor(MockCatalog::default());

    match accessor.get_landsat().expect("Search should not fail") {
        Retrieval::Missing(reason) => assert_eq!(reason.code(), "no_landsat_scenes"),
        Retrieval::Found(scene) => panic!("unexpected scene {}", scene.item_id),
    }

    let alos = accessor.get_alos().expect("Search should not fail");
    assert_eq!(alos.missing_reason(), Some(MissingReason::NoAlosMosaics));
    assert_eq!(alos.missing_reason().unwrap().code(), "no_alos_mosaics");
}

#[test]
fn test_only_landsat_8_and_9_are_considered() {
    let catalog = MockCatalog::default().with(
        LANDSAT_COLLECTION,
        vec![
            rect_item("LE07_L2SP_144051_20210110_02_T1", AOI, Some(0.5)),
            rect_item("LT05_L2SP_144051_20210110_02_T1", AOI, Some(0.0)),
        ],
    );

    let result = accessor(catalog).get_landsat().unwrap();
    assert_eq!(result.missing_reason(), Some(MissingReason::NoLandsatScenes));
}

#[test]
fn test_clearest_scene_wins() {
    let catalog = MockCatalog::default().with(
        LANDSAT_COLLECTION,
        vec![
            rect_item("LC08_L2SP_144051_20210118_02_T1", AOI, Some(12.0)),
            rect_item("LC09_L2SP_144051_20210126_02_T1", AOI, None),
            rect_item("LC09_L2SP_144051_20210211_02_T1", AOI, Some(5.0)),
        ],
    );

    let scene = accessor(catalog)
        .get_landsat()
        .unwrap()
        .found()
        .expect("Expected a scene");
    assert_eq!(scene.item_id, "LC09_L2SP_144051_20210211_02_T1");
    assert_eq!(scene.cloud_cover, Some(5.0));
    assert_eq!(
        scene.raster.band_names(),
        ["blue", "green", "nir08", "red", "swir16", "swir22", "lwir11"]
    );
    assert_eq!(scene.footprint["type"], "Polygon");
}

#[test]
fn test_search_parameters() {
    let catalog = MockCatalog::default()
        .with(LANDSAT_COLLECTION, vec![rect_item("LC09_A", AOI, Some(8.0))])
        .with(ALOS_COLLECTION, vec![rect_item("N12E077_21", AOI, None)]);
    let requests = catalog.requests.clone();
    let accessor = accessor(catalog);

    accessor.get_landsat().unwrap();
    accessor.get_alos().unwrap();

    let requests = requests.borrow();
    assert_eq!(requests.len(), 2);

    let landsat = &requests[0];
    assert_eq!(landsat.collection(), Some(LANDSAT_COLLECTION));
    assert_eq!(landsat.bbox, Some(AOI));
    assert_eq!(landsat.datetime.as_deref(), Some("2021-01-01/2021-03-01"));
    assert_eq!(landsat.max_items, Some(20));

    let body = serde_json::to_value(landsat).unwrap();
    assert_eq!(body["query"]["eo:cloud_cover"]["lt"], 20);
    assert!(body.get("max_items").is_none());

    let alos = &requests[1];
    assert_eq!(alos.collection(), Some(ALOS_COLLECTION));
    assert_eq!(alos.datetime.as_deref(), Some("2021/2021"));
    assert!(alos.query.is_none());
}

#[test]
fn test_alos_footprint_comes_from_first_tile() {
    let catalog = MockCatalog::default().with(
        ALOS_COLLECTION,
        vec![
            rect_item("N12E077_21_MOS_F02DAR", [77.0, 12.0, 77.25, 12.5], None),
            rect_item("N12E077_21_MOS_F02DAR_B", [77.25, 12.0, 77.5, 12.5], None),
        ],
    );

    let scene = accessor(catalog).get_alos().unwrap().found().unwrap();
    assert_eq!(scene.item_id, "N12E077_21_MOS_F02DAR");
    assert_eq!(scene.footprint["coordinates"][0][1][0], 77.25);
    assert_eq!(scene.raster.band_names(), ["HH", "HV"]);
    // mosaic grid spans both tiles
    let (min_x, _, max_x, _) = scene.raster.bounds();
    assert!(max_x - min_x > 50_000.0);
}

#[test]
fn test_max_items_caps_the_search() {
    let catalog = MockCatalog::default().with(
        LANDSAT_COLLECTION,
        vec![
            rect_item("LC08_L2SP_144051_20210118_02_T1", AOI, Some(12.0)),
            rect_item("LC09_L2SP_144051_20210211_02_T1", AOI, Some(5.0)),
        ],
    );
    let requests = catalog.requests.clone();

    let bbox = BoundingBox::new(AOI[0], AOI[1], AOI[2], AOI[3]).unwrap();
    let config = AccessConfig::new(bbox, "2021-01-01", "2021-03-01")
        .unwrap()
        .with_max_items(1)
        .with_resolution(5000.0);
    let accessor = DataAccessor::with_ports(
        config,
        Box::new(catalog),
        Box::new(SyntheticRasters),
        Box::new(MockArchive::default()),
    );

    // the clearer scene lies beyond the cap, so only the first is ranked
    let scene = accessor.get_landsat().unwrap().found().expect("Expected a scene");
    assert_eq!(scene.item_id, "LC08_L2SP_144051_20210118_02_T1");

    let requests = requests.borrow();
    assert_eq!(requests[0].max_items, Some(1));
    assert_eq!(requests[0].limit, Some(1));
}
