use medley_core::{
    AlbumRecord, Catalog, DeviceId, DirectoryRecord, FieldPolicy, Location, MemoryCatalog,
    ScanType, ScannerConfig, TrackRecord,
};

#[test]
fn test_device_id_sentinel() {
    assert!(DeviceId::NONE.is_none());
    assert!(DeviceId::default().is_none());
    assert!(!DeviceId::new(3).is_none());
    assert_eq!(DeviceId::NONE.to_string(), "-1");
}

#[test]
fn test_scan_type_field_policy() {
    assert_eq!(ScanType::Full.field_policy(), FieldPolicy::Replace);
    assert_eq!(ScanType::UpdateScan.field_policy(), FieldPolicy::Merge);
    assert_eq!(ScanType::PartialUpdateScan.field_policy(), FieldPolicy::Merge);
    assert_eq!(
        "update-scan".parse::<ScanType>().unwrap(),
        ScanType::UpdateScan
    );
}

#[test]
fn test_update_scan_fills_missing_statistics_only() {
    let catalog = MemoryCatalog::new();
    let dir = catalog
        .upsert_directory(&Location::new(DeviceId::NONE, "m/a"), 1)
        .unwrap();
    let location = Location::new(DeviceId::NONE, "m/a/x.flac");

    let mut first = TrackRecord::new("uid", "/m/a/x.flac");
    first.rating = Some(4.0);
    first.genre = Some("Jazz".into());
    catalog
        .upsert_track(dir, &location, &first, FieldPolicy::Replace)
        .unwrap();

    let mut update = TrackRecord::new("uid", "/m/a/x.flac");
    update.rating = Some(1.0);
    update.score = Some(50.0);
    catalog
        .upsert_track(dir, &location, &update, FieldPolicy::Merge)
        .unwrap();

    let stored = catalog.track_by_uid("uid").unwrap().record;
    assert_eq!(stored.rating, Some(4.0));
    assert_eq!(stored.score, Some(50.0));
    assert_eq!(stored.genre.as_deref(), Some("Jazz"));
}

#[test]
fn test_full_scan_clears_unreported_tags() {
    let catalog = MemoryCatalog::new();
    let dir = catalog
        .upsert_directory(&Location::new(DeviceId::NONE, "m/a"), 1)
        .unwrap();
    let location = Location::new(DeviceId::NONE, "m/a/x.flac");

    let mut first = TrackRecord::new("uid", "/m/a/x.flac");
    first.genre = Some("Jazz".into());
    first.compilation = true;
    catalog
        .upsert_track(dir, &location, &first, FieldPolicy::Merge)
        .unwrap();

    let rescanned = TrackRecord::new("uid", "/m/a/x.flac");
    catalog
        .upsert_track(dir, &location, &rescanned, FieldPolicy::Replace)
        .unwrap();

    let stored = catalog.track_by_uid("uid").unwrap().record;
    assert_eq!(stored.genre, None);
    assert!(!stored.compilation);
}

#[test]
fn test_directory_record_builders() {
    let dir = DirectoryRecord::new("/m/a", 5)
        .with_album(AlbumRecord::new("Live").with_track(TrackRecord::new("u", "/m/a/1.ogg")))
        .with_playlist("/m/a/all.m3u");

    assert!(!dir.skipped);
    assert_eq!(dir.track_count(), 1);
    assert_eq!(dir.playlists.len(), 1);
    assert!(DirectoryRecord::new("/m/b", 1).skipped().skipped);
}

#[test]
fn test_default_config() {
    let config = ScannerConfig::default();
    assert_eq!(config.max_restarts, 40);
    assert!(config.recursive);
    assert!(!config.monitor_changes);
    assert_eq!(config.watch_interval().as_secs(), 60);
    assert_eq!(config.version_check_delay().as_secs(), 30);
    assert!(
        config
            .scanner_path
            .to_string_lossy()
            .contains(medley_core::SCANNER_BINARY)
    );
}
