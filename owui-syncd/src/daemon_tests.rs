use super::*;
use std::collections::HashMap;
use tempfile::tempdir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

const REQUIRED: [(&str, &str); 3] = [
    ("OPENWEBUI_API_URL", "http://localhost:3000"),
    ("OPENWEBUI_API_KEY", "sk-test"),
    ("OPENWEBUI_KNOWLEDGE_ID", "kb-1"),
];

#[test]
fn expands_tilde_to_home() {
    let home = PathBuf::from("/tmp/home-user");
    assert_eq!(
        expand_with_home("~/notes", Some(&home)),
        PathBuf::from("/tmp/home-user/notes")
    );
    assert_eq!(expand_with_home("~", Some(&home)), home);
    assert_eq!(expand_with_home("~/notes", None), PathBuf::from("~/notes"));
    assert_eq!(expand_with_home("/abs", Some(&home)), PathBuf::from("/abs"));
}

#[test]
fn numbers_and_flags_fall_back_to_defaults() {
    assert_eq!(read_u64(None, 30), 30);
    assert_eq!(read_u64(Some("0".into()), 30), 30);
    assert_eq!(read_u64(Some("abc".into()), 30), 30);
    assert_eq!(read_u64(Some(" 5 ".into()), 30), 5);
    assert!(!read_bool(None, false));
    assert!(read_bool(Some("Yes".into()), false));
    assert!(!read_bool(Some("off".into()), true));
}

#[test]
fn missing_required_variable_is_an_error() {
    let err = DaemonConfig::from_lookup(lookup_from(&REQUIRED[..2])).unwrap_err();
    assert!(err.to_string().contains("OPENWEBUI_KNOWLEDGE_ID"));

    let mut blank = REQUIRED.to_vec();
    blank[1] = ("OPENWEBUI_API_KEY", "   ");
    let err = DaemonConfig::from_lookup(lookup_from(&blank)).unwrap_err();
    assert!(err.to_string().contains("OPENWEBUI_API_KEY"));
}

#[test]
fn optional_settings_use_defaults() {
    let config = DaemonConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
    assert_eq!(config.api_url, "http://localhost:3000");
    assert_eq!(config.knowledge_id, "kb-1");
    assert_eq!(config.scan_root, PathBuf::from("."));
    assert_eq!(config.ledger_path, PathBuf::from(".upload.json"));
    assert_eq!(config.extensions, ExtensionFilter::allow_all());
    assert_eq!(config.sync_period, Duration::from_secs(30));
    assert_eq!(config.request_timeout, Duration::from_secs(60));
    assert_eq!(config.engine, EngineConfig::default());
    assert!(!format!("{config:?}").contains("sk-test"));
}

#[test]
fn reads_optional_settings() {
    let mut pairs = REQUIRED.to_vec();
    pairs.extend([
        ("ALLOWED_FILE_EXTENSIONS", "md, .TXT"),
        ("OWUI_SCAN_DIR", "/srv/docs"),
        ("OWUI_SYNC_PERIOD_SECS", "5"),
        ("OWUI_LEDGER_PATH", "/var/lib/owui/ledger.json"),
        ("OWUI_NAMING_POLICY", "collision-aware"),
        ("OWUI_UPDATE_STRATEGY", "content-update"),
        ("OWUI_EVICT_DUPLICATES", "true"),
    ]);
    let config = DaemonConfig::from_lookup(lookup_from(&pairs)).unwrap();
    assert_eq!(config.scan_root, PathBuf::from("/srv/docs"));
    assert_eq!(config.ledger_path, PathBuf::from("/var/lib/owui/ledger.json"));
    assert!(config.extensions.matches(Path::new("/srv/docs/a.txt")));
    assert!(!config.extensions.matches(Path::new("/srv/docs/a.pdf")));
    assert_eq!(config.sync_period, Duration::from_secs(5));
    assert_eq!(
        config.engine,
        EngineConfig {
            naming: NamingPolicy::CollisionAware,
            update_strategy: UpdateStrategy::ContentUpdate,
            evict_duplicates: true,
        }
    );
}

#[test]
fn invalid_policy_falls_back_to_default() {
    let mut pairs = REQUIRED.to_vec();
    pairs.push(("OWUI_NAMING_POLICY", "shortest"));
    let config = DaemonConfig::from_lookup(lookup_from(&pairs)).unwrap();
    assert_eq!(config.engine.naming, NamingPolicy::FullPath);
}

#[tokio::test]
async fn bootstrapped_runtime_uploads_once_and_skips_its_ledger() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/files/"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "id": "f1", "filename": "a.md" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/knowledge/kb-1/file/add"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "kb-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.md"), "# notes").unwrap();
    let ledger_path = dir.path().join(".upload.json");
    let config = DaemonConfig {
        api_url: server.uri(),
        api_key: "sk-test".into(),
        knowledge_id: "kb-1".into(),
        scan_root: dir.path().to_path_buf(),
        ledger_path: ledger_path.clone(),
        extensions: ExtensionFilter::allow_all(),
        sync_period: Duration::from_secs(30),
        request_timeout: Duration::from_secs(5),
        engine: EngineConfig::default(),
    };

    let mut runtime = DaemonRuntime::bootstrap(config).await.unwrap();
    let first = runtime.run_once().await;
    assert_eq!(first.created, 1);
    assert!(first.persisted);
    assert!(ledger_path.exists());

    let second = runtime.run_once().await;
    assert_eq!(second.scanned, 1);
    assert_eq!(second.unchanged, 1);
    assert_eq!(runtime.engine().ledger().len(), 1);
}
