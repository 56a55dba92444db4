use contextd_domain::Config;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contextd.toml");

    let cfg = Config::load_or_default(&path).expect("default config");
    assert_eq!(cfg.server.bind_addr, "127.0.0.1:8765");
    assert_eq!(cfg.fold.spawn_progress_ceiling, 90);
    assert_eq!(cfg.watcher.sources.len(), 4);
}

#[test]
fn partial_file_overrides_only_given_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contextd.toml");
    std::fs::write(
        &path,
        r#"
        [server]
        bind_addr = "0.0.0.0:9000"
        "#,
    )
    .unwrap();

    let cfg = Config::load_or_default(&path).expect("parsed config");
    assert_eq!(cfg.server.bind_addr, "0.0.0.0:9000");
    // untouched sections keep their defaults
    assert_eq!(cfg.memory.rrf_k, 60.0);
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contextd.toml");
    std::fs::write(&path, "not valid toml {{{").unwrap();

    assert!(Config::load_or_default(&path).is_err());
}
