//! Scenario: config keys nothing reads are reported.
//!
//! # Invariants under test
//! - Warn policy reports unused leaves without failing.
//! - Fail policy errors with CONFIG_UNUSED_KEYS.
//! - Every documented settings key counts as consumed.
//! - Reported pointers are sorted.

use mnt_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

const FULL_YAML: &str = r#"
chain:
  rpc_url_env: MNT_RPC_URL
  contract_address: "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
  chain_id: 11155111
  gas_limit: 300000
  gas_price_wei: 2000000000
  receipt_poll_ms: 500
  mined_timeout_secs: 120
signer:
  private_key_env: MNT_SIGNER_PRIVATE_KEY
nonce:
  resync_interval_secs: 60
  resync_retry_secs: 5
reconcile:
  batch_size: 50
  interval_secs: 300
database:
  url_env: MNT_DATABASE_URL
"#;

#[test]
fn full_config_is_clean() {
    let loaded = load_layered_yaml_from_strings(&[FULL_YAML]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean(), "{:?}", report.unused_leaf_pointers);
    loaded.settings().unwrap();
}

#[test]
fn empty_config_is_clean() {
    let loaded = load_layered_yaml_from_strings(&[]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());
}

#[test]
fn warn_reports_typos_without_error() {
    let yaml = r#"
reconcile:
  batchsize: 10
chain:
  gas_limit: 1
  gas_limt: 2
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn).unwrap();
    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/chain/gas_limt".to_string(), "/reconcile/batchsize".to_string()]
    );
}

#[test]
fn fail_policy_errors_on_unused() {
    let yaml = "legacy:\n  menu: true\n";
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let err = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail)
        .unwrap_err()
        .to_string();
    assert!(err.contains("CONFIG_UNUSED_KEYS"), "{err}");
    assert!(err.contains("/legacy/menu"), "{err}");
}
