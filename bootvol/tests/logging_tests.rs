//! Log file output. Separate binary since it installs the global subscriber.

use std::sync::Arc;

use bootvol::{BootvolOptions, DirHost, Provisioner, ProvisioningRequest, init_logging};
use tempfile::TempDir;

#[tokio::test]
async fn test_log_file_flushed_when_guard_drops() {
    let home = TempDir::new().unwrap();
    let options = BootvolOptions {
        home_dir: home.path().to_path_buf(),
        ..Default::default()
    };

    let guard = init_logging(&options).unwrap();
    assert!(guard.is_some());
    assert!(init_logging(&options).unwrap().is_none());

    let host = DirHost::open(options.pools_dir()).unwrap();
    host.define_pool("default").unwrap();
    Provisioner::new(Arc::new(host))
        .provision(&ProvisioningRequest::new(
            "node1",
            "default",
            r#"{"ignition":{"version":"3.0.0"}}"#,
        ))
        .await
        .unwrap();

    drop(guard);

    let mut contents = String::new();
    for entry in std::fs::read_dir(options.logs_dir()).unwrap() {
        contents.push_str(&std::fs::read_to_string(entry.unwrap().path()).unwrap());
    }
    assert!(contents.contains("Provisioned volume"), "log file: {contents}");
}
