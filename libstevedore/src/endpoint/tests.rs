use super::*;

#[test]
fn test_api_version_display() {
    assert_eq!(ApiVersion::V1.to_string(), "v1");
    assert_eq!(ApiVersion::V2.to_string(), "v2");
    assert_eq!(ApiVersion::default(), ApiVersion::V1);
}

#[test]
fn test_scan_for_api_version() {
    assert_eq!(scan_for_api_version("example.com"), ("example.com", None));
    assert_eq!(
        scan_for_api_version("example.com/v1"),
        ("example.com", Some(ApiVersion::V1))
    );
    assert_eq!(
        scan_for_api_version("example.com/v2/"),
        ("example.com", Some(ApiVersion::V2))
    );
    assert_eq!(
        scan_for_api_version("example.com/path/v2"),
        ("example.com/path", Some(ApiVersion::V2))
    );
    // Unrecognized trailing segments are left alone.
    assert_eq!(
        scan_for_api_version("example.com/v3"),
        ("example.com/v3", None)
    );
}

#[test]
fn test_endpoint_new_defaults() {
    let endpoint = Endpoint::new("0.0.0.0:5000", false).unwrap();
    assert_eq!(endpoint.to_string(), "https://0.0.0.0:5000/v1/");
    assert_eq!(endpoint.version, ApiVersion::V1);

    let endpoint = Endpoint::new("http://0.0.0.0:5000", false).unwrap();
    assert_eq!(endpoint.to_string(), "http://0.0.0.0:5000/v1/");

    let endpoint = Endpoint::new("0.0.0.0:5000/v2", false).unwrap();
    assert_eq!(endpoint.to_string(), "https://0.0.0.0:5000/v2/");
    assert_eq!(endpoint.version, ApiVersion::V2);

    let endpoint = Endpoint::new("http://0.0.0.0:5000/v2/", false).unwrap();
    assert_eq!(endpoint.to_string(), "http://0.0.0.0:5000/v2/");
}

#[test]
fn test_endpoint_new_rejects_http_on_secure_index() {
    let err = Endpoint::new("http://example.com", true).unwrap_err();
    assert!(err.to_string().contains("insecure-registry"));

    // https on a secure index is fine.
    assert!(Endpoint::new("https://example.com", true).is_ok());
}

#[test]
fn test_official_index_endpoint() {
    let endpoint = Endpoint::new(crate::config::INDEX_SERVER_ADDRESS, true).unwrap();
    assert!(endpoint.is_official_index());
    assert_eq!(endpoint.to_string(), crate::config::INDEX_SERVER_ADDRESS);

    let endpoint = Endpoint::new("https://example.com", true).unwrap();
    assert!(!endpoint.is_official_index());
}

#[tokio::test]
async fn test_ping_defaults_when_body_is_unparseable() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/_ping")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let endpoint = Endpoint::new(&server.url(), false).unwrap();
    let http_client = new_http_client(5).unwrap();
    let result = endpoint.ping(&http_client).await.unwrap();

    assert!(result.standalone);
    assert_eq!(result.version, None);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_ping_headers_override_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/_ping")
        .with_status(200)
        .with_header("X-Docker-Registry-Version", "0.8.1")
        .with_header("X-Docker-Registry-Standalone", "false")
        .with_body(r#"{"standalone": true, "version": "ignored"}"#)
        .create_async()
        .await;

    let endpoint = Endpoint::new(&server.url(), false).unwrap();
    let http_client = new_http_client(5).unwrap();
    let result = endpoint.ping(&http_client).await.unwrap();

    assert_eq!(result.version.as_deref(), Some("0.8.1"));
    assert!(!result.standalone);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_ping_standalone_header_ignores_case() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/_ping")
        .with_status(200)
        .with_header("X-Docker-Registry-Standalone", "True")
        .with_body(r#"{"standalone": false}"#)
        .create_async()
        .await;

    let endpoint = Endpoint::new(&server.url(), false).unwrap();
    let http_client = new_http_client(5).unwrap();
    let result = endpoint.ping(&http_client).await.unwrap();

    assert!(result.standalone);
}

#[tokio::test]
async fn test_ping_body_standalone() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/_ping")
        .with_status(200)
        .with_body(r#"{"standalone": false}"#)
        .create_async()
        .await;

    let endpoint = Endpoint::new(&server.url(), false).unwrap();
    let http_client = new_http_client(5).unwrap();
    let result = endpoint.ping(&http_client).await.unwrap();

    assert!(!result.standalone);
}

#[tokio::test]
async fn test_ping_skips_official_index() {
    let endpoint = Endpoint::new(crate::config::INDEX_SERVER_ADDRESS, true).unwrap();
    let http_client = new_http_client(5).unwrap();

    // Resolves without any network traffic.
    let result = endpoint.ping(&http_client).await.unwrap();
    assert!(!result.standalone);
}

#[tokio::test]
async fn test_resolve_insecure_index_over_http() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/_ping")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    // Local mock servers are plain http; an insecure index may use them.
    let host = server.url().trim_start_matches("http://").to_string();
    let index = crate::config::IndexInfo {
        name: host,
        mirrors: Vec::new(),
        secure: false,
        official: false,
    };

    let http_client = new_http_client(5).unwrap();
    let endpoint = Endpoint::resolve(&index, &http_client).await.unwrap();
    assert!(endpoint.to_string().starts_with("http://"));
    assert_eq!(endpoint.version, ApiVersion::V1);
}

#[tokio::test]
async fn test_resolve_secure_index_never_downgrades() {
    // Nothing listens on this port over https, and the index is secure,
    // so resolution must fail with the insecure-registry hint.
    let index = crate::config::IndexInfo {
        name: "127.0.0.1:1".to_string(),
        mirrors: Vec::new(),
        secure: true,
        official: false,
    };

    let http_client = new_http_client(1).unwrap();
    let err = Endpoint::resolve(&index, &http_client).await.unwrap_err();
    assert!(err.to_string().contains("insecure-registry"));
}
