use super::*;
use crate::endpoint::new_http_client;

fn client_for(server: &mockito::Server) -> Client {
    let endpoint = Endpoint::new(&format!("{}/v2", server.url()), false).unwrap();
    Client::new(new_http_client(5).unwrap(), endpoint, Some("signature=123abc".to_string()))
        .unwrap()
}

#[test]
fn test_route_format_substitutes_values() {
    let route = HttpRoute::new("/path/{foo}/here");
    let path = route.format(&HashMap::from([("foo", "to")])).unwrap();
    assert_eq!(path, "/path/to/here");
}

#[test]
fn test_route_format_strips_regex_part() {
    let path = MANIFESTS_ROUTE
        .format(&HashMap::from([
            ("imagename", "fooo/bar"),
            ("tagname", "latest"),
        ]))
        .unwrap();
    assert_eq!(path, "/v2/manifest/fooo/bar/latest");
}

#[test]
fn test_route_format_handles_nested_braces_in_regex() {
    let path = DOWNLOAD_BLOB_ROUTE
        .format(&HashMap::from([
            ("imagename", "fooo/bar"),
            ("sumtype", "tarsum+sha256"),
            ("sum", "deadbeef"),
        ]))
        .unwrap();
    assert_eq!(path, "/v2/blob/fooo/bar/tarsum+sha256/deadbeef");
}

#[test]
fn test_route_format_leaves_unknown_placeholders() {
    let route = HttpRoute::new("/path/{foo}/{bar}");
    let path = route.format(&HashMap::from([("foo", "to")])).unwrap();
    assert_eq!(path, "/path/to/{bar}");
}

#[test]
fn test_route_format_without_placeholders() {
    assert_eq!(VERSION_ROUTE.format(&HashMap::new()).unwrap(), "/v2/version");
}

#[test]
fn test_route_rest_placeholder_must_be_last() {
    let route = HttpRoute::new("/path/{rest:.*}/more");
    assert!(route.format(&HashMap::from([("rest", "x")])).is_err());

    let route = HttpRoute::new("/path/{rest:.*}");
    assert_eq!(
        route.format(&HashMap::from([("rest", "a/b/c")])).unwrap(),
        "/path/a/b/c"
    );
}

#[test]
fn test_route_keys() {
    assert!(VERSION_ROUTE.keys().is_empty());
    assert_eq!(MANIFESTS_ROUTE.keys(), vec!["imagename", "tagname"]);
    assert_eq!(
        DOWNLOAD_BLOB_ROUTE.keys(),
        vec!["imagename", "sumtype", "sum"]
    );
    assert_eq!(MOUNT_BLOB_ROUTE.keys(), vec!["imagename", "sumtype", "sum"]);
}

#[test]
fn test_client_requires_v2_endpoint() {
    let endpoint = Endpoint::new("https://registry.example.com/v1", true).unwrap();
    let err = Client::new(new_http_client(5).unwrap(), endpoint, None).unwrap_err();
    assert!(matches!(err, StevedoreError::IncorrectApiVersion { .. }));
}

#[tokio::test]
async fn test_get_version() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v2/version")
        .match_header("Authorization", "Token signature=123abc")
        .with_status(200)
        .with_body(r#"{"version": "0.0.1", "standalone": true}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let info = client.get_version().await.unwrap();
    assert_eq!(info.version.as_deref(), Some("0.0.1"));
    assert!(info.standalone);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_get_manifest() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v2/manifest/fooo/bar/latest")
        .with_status(200)
        .with_body(r#"{"name": "fooo/bar", "tag": "latest"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let manifest = client.get_manifest("fooo/bar", "latest").await.unwrap();
    assert_eq!(manifest, br#"{"name": "fooo/bar", "tag": "latest"}"#);
}

#[tokio::test]
async fn test_get_manifest_unauthorized() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v2/manifest/fooo/bar/latest")
        .with_status(401)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.get_manifest("fooo/bar", "latest").await.unwrap_err();
    assert!(err.is_login_required());
}

#[tokio::test]
async fn test_put_manifest_accepts_200_and_201() {
    let mut server = mockito::Server::new_async().await;
    let _created = server
        .mock("PUT", "/v2/manifest/fooo/bar/latest")
        .match_body("manifest body")
        .with_status(201)
        .create_async()
        .await;

    let client = client_for(&server);
    client
        .put_manifest("fooo/bar", "latest", b"manifest body")
        .await
        .unwrap();

    let _ok = server
        .mock("PUT", "/v2/manifest/fooo/bar/v2.0")
        .with_status(200)
        .create_async()
        .await;
    client
        .put_manifest("fooo/bar", "v2.0", b"manifest body")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_manifest() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("DELETE", "/v2/manifest/fooo/bar/latest")
        .with_status(200)
        .create_async()
        .await;

    let client = client_for(&server);
    client.delete_manifest("fooo/bar", "latest").await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_get_tags() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v2/tags/fooo/bar")
        .with_status(200)
        .with_body(r#"{"name": "fooo/bar", "tags": ["latest", "1.0"]}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let tags = client.get_tags("fooo/bar").await.unwrap();
    assert_eq!(tags, vec!["latest".to_string(), "1.0".to_string()]);
}

#[tokio::test]
async fn test_mount_blob_three_way() {
    let mut server = mockito::Server::new_async().await;
    let _present = server
        .mock("POST", "/v2/mountblob/fooo/bar/tarsum+sha256/aaaa")
        .with_status(200)
        .create_async()
        .await;
    let _missing = server
        .mock("POST", "/v2/mountblob/fooo/bar/tarsum+sha256/bbbb")
        .with_status(300)
        .create_async()
        .await;
    let _broken = server
        .mock("POST", "/v2/mountblob/fooo/bar/tarsum+sha256/cccc")
        .with_status(500)
        .create_async()
        .await;

    let client = client_for(&server);
    assert_eq!(
        client.mount_blob("fooo/bar", "tarsum+sha256", "aaaa").await.unwrap(),
        BlobMount::AlreadyPresent
    );
    assert_eq!(
        client.mount_blob("fooo/bar", "tarsum+sha256", "bbbb").await.unwrap(),
        BlobMount::NeedsUpload
    );
    let err = client
        .mount_blob("fooo/bar", "tarsum+sha256", "cccc")
        .await
        .unwrap_err();
    match err {
        StevedoreError::RegistryHttp { status_code, .. } => assert_eq!(status_code, 500),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_get_blob() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v2/blob/fooo/bar/tarsum+sha256/deadbeef")
        .with_status(200)
        .with_body("blob bytes")
        .create_async()
        .await;

    let client = client_for(&server);
    let blob = client
        .get_blob("fooo/bar", "tarsum+sha256", "deadbeef")
        .await
        .unwrap();
    assert_eq!(blob, b"blob bytes");
}

#[tokio::test]
async fn test_put_blob_confirms_server_checksum() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/v2/blob/fooo/bar/tarsum+sha256")
        .match_body("blob bytes")
        .with_status(201)
        .with_body(r#"{"checksum": "tarsum+sha256:deadbeef"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let checksum = client
        .put_blob(
            "fooo/bar",
            "tarsum+sha256",
            &b"blob bytes"[..],
            "tarsum+sha256:deadbeef",
        )
        .await
        .unwrap();
    assert_eq!(checksum, "tarsum+sha256:deadbeef");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_put_blob_checksum_mismatch_is_fatal() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("PUT", "/v2/blob/fooo/bar/tarsum+sha256")
        .with_status(201)
        .with_body(r#"{"checksum": "tarsum+sha256:different"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .put_blob(
            "fooo/bar",
            "tarsum+sha256",
            &b"blob bytes"[..],
            "tarsum+sha256:deadbeef",
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("checksum mismatch"));
}
