use hive::http::request::{BodyKind, Method, RequestBuilder};

#[test]
fn test_request_field_retrieval() {
    let req = RequestBuilder::new()
        .resource("/")
        .field("Host", "example.com")
        .field("Content-Type", "application/json")
        .build();

    assert_eq!(req.field("Host"), Some("example.com"));
    assert_eq!(req.field("Content-Type"), Some("application/json"));
    assert_eq!(req.field("Missing"), None);
    assert!(req.has_field("Host"));
    assert!(!req.has_field("host"));
}

#[test]
fn test_request_builder_validity() {
    let valid = RequestBuilder::new().method(Method::POST).resource("/api").build();
    assert!(valid.is_valid);
    assert!(valid.is_method(Method::POST));

    let empty = RequestBuilder::new().resource("").build();
    assert!(!empty.is_valid);
    assert_eq!(empty.resource(), None);

    let missing = RequestBuilder::new().build();
    assert!(!missing.is_valid);
}

#[test]
fn test_request_content_accessors() {
    let req = RequestBuilder::new().resource("/").content("payload").build();
    assert!(req.has_content());
    assert_eq!(req.content(), Some("payload"));
    assert_eq!(req.body_kind(), BodyKind::Unknown);

    let bare = RequestBuilder::new().resource("/").build();
    assert!(!bare.has_content());
    assert_eq!(bare.content(), None);
}

#[test]
fn test_request_form_accessors() {
    let req = RequestBuilder::new()
        .method(Method::POST)
        .resource("/upload")
        .boundary("XYZ")
        .form("name", "hive")
        .build();

    assert!(req.is_multipart());
    assert_eq!(req.body_kind(), BodyKind::Multipart);
    assert!(req.has_form("name"));
    assert_eq!(req.form("name"), Some("hive"));
    assert_eq!(req.form("other"), None);
}

#[test]
fn test_method_tokens_round_trip_names() {
    for token in ["OPTIONS", "GET", "HEAD", "POST", "PUT", "DELETE", "TRACE", "CONNECT"] {
        assert_eq!(Method::from_token(token).as_str(), token);
    }
    assert_eq!(Method::from_token("PATCH"), Method::UNKNOWN);
    assert_eq!(Method::from_token(""), Method::UNKNOWN);
}
