use canopyfuse::io::gedi::{read_footprints, write_csv, GediGranule, BEAMS};
use std::path::PathBuf;

/// Point CANOPYFUSE_GEDI_GRANULE at a downloaded GEDI02_B .h5 file to run this test
fn granule_path() -> Option<PathBuf> {
    let path = PathBuf::from(std::env::var("CANOPYFUSE_GEDI_GRANULE").ok()?);
    path.exists().then_some(path)
}

#[test]
fn test_read_real_gedi_granule() {
    let Some(path) = granule_path() else {
        println!("GEDI granule not found, skipping test");
        return;
    };

    let granule = GediGranule::open(&path).expect("Failed to open GEDI granule");
    let rows = read_footprints(&granule).expect("Failed to read footprints");
    println!("Read {} shots from {}", rows.len(), path.display());

    assert!(!rows.is_empty(), "No shots read from granule");
    assert!(rows.iter().all(|f| BEAMS.contains(&f.beam.as_str())));
    assert!(rows
        .iter()
        .all(|f| (-90.0..=90.0).contains(&f.latitude) && (-180.0..=180.0).contains(&f.longitude)));

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("gedi_file_0.csv");
    write_csv(&csv_path, &rows[..rows.len().min(1000)]).expect("Failed to write CSV");
    assert!(csv_path.exists());
}
