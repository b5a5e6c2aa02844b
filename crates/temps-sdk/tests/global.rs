mod common;

use std::sync::Arc;

use common::{production_options, RecordingRequest};
use serial_test::serial;
use temps_sdk::{Client, Exception};

#[tokio::test]
#[serial]
async fn test_free_functions_without_client_return_false() {
    temps_sdk::set_current_client(None);

    assert!(temps_sdk::current_client().is_none());
    assert!(!temps_sdk::capture_exception(Exception::new("nobody listening"), None));
    assert!(!temps_sdk::capture_performance("FCP", 10.0, None));
    assert!(!temps_sdk::flush().await);
}

#[tokio::test]
#[serial]
async fn test_init_installs_current_client() {
    let request = RecordingRequest::new();
    let client = temps_sdk::init(production_options(request.clone())).unwrap();

    let current = temps_sdk::current_client().unwrap();
    assert!(Arc::ptr_eq(&client, &current));

    assert!(temps_sdk::capture_exception(Exception::new("global"), None));
    assert!(temps_sdk::capture_performance("TTFB", 87.0, None));
    assert!(temps_sdk::flush().await);

    let sent = request.delivered_json();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0]["message"], "global");
    assert_eq!(sent[1]["metric"], "TTFB");

    temps_sdk::set_current_client(None);
}

#[tokio::test]
#[serial]
async fn test_set_current_client_returns_previous() {
    let first = Client::new(production_options(RecordingRequest::new())).unwrap();
    let second = Client::new(production_options(RecordingRequest::new())).unwrap();

    temps_sdk::set_current_client(Some(first.clone()));
    let previous = temps_sdk::set_current_client(Some(second.clone())).unwrap();

    assert!(Arc::ptr_eq(&previous, &first));
    assert!(Arc::ptr_eq(&temps_sdk::current_client().unwrap(), &second));

    temps_sdk::set_current_client(None);
}
