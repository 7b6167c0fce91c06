mod common;

use common::{settings, signed_in_session, token};
use explain_client::models::JobName;
use explain_client::services::backend_client::BackendClient;
use explain_client::services::local_store::MemoryLocalStore;
use explain_client::services::poller::JobTransport;
use explain_client::services::search::{IndexClient, SearchClient};
use explain_client::services::session::{Session, SessionEvent};
use explain_core::error::AppError;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, session: Session) -> BackendClient {
    BackendClient::new(&settings(&server.uri()).backend, session).unwrap()
}

#[tokio::test]
async fn requests_carry_bearer_token_and_organization() {
    let server = MockServer::start().await;
    let id_token = token(&["org-acme", "org-globex"]);
    let session = signed_in_session(&id_token);
    session.tenants().select(&id_token, "globex").unwrap();

    Mock::given(method("POST"))
        .and(path("/api/search"))
        .and(header("Authorization", format!("Bearer {}", id_token).as_str()))
        .and(header("X-Organization-Id", "globex"))
        .and(header_exists("x-request-id"))
        .and(body_json(json!({ "query": "late invoices", "company": "globex" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [{
                "score": 3.2,
                "id": "chunk-1",
                "document_name": "inv-7.pdf",
                "chunk_content": "Payment due 30 days"
            }],
            "total_hits": 1,
            "filters_used": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let search = SearchClient::new(client(&server, session));
    let response = search.search("late invoices", "globex").await.unwrap();

    assert_eq!(response.total_hits, 1);
    assert_eq!(response.hits[0].document_name, "inv-7.pdf");
}

#[tokio::test]
async fn job_start_posts_prefix() {
    let server = MockServer::start().await;
    let session = signed_in_session(&token(&["org-acme"]));

    Mock::given(method("POST"))
        .and(path("/api/parse/general-ledger/start/"))
        .and(body_json(json!({ "prefix": "acme/FY24/General Ledger/" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "workflow_key": "wf-gl-1" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = client(&server, session);
    let started = backend
        .start_job(JobName::GeneralLedger, "acme/FY24/General Ledger/")
        .await
        .unwrap();

    assert_eq!(started.workflow_key, "wf-gl-1");
}

#[tokio::test]
async fn unauthorized_response_expires_session() {
    let server = MockServer::start().await;
    let session = signed_in_session(&token(&["org-acme"]));
    let mut events = session.subscribe();

    Mock::given(method("POST"))
        .and(path("/api/search/check-files"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let index = IndexClient::new(client(&server, session.clone()));
    let err = index.check_files("acme/FY24/").await.unwrap_err();

    assert!(matches!(err, AppError::SessionExpired));
    assert!(!session.tokens().has_token());
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::Expired { .. }
    ));
}

#[tokio::test]
async fn error_status_surfaces_backend_detail() {
    let server = MockServer::start().await;
    let session = signed_in_session(&token(&["org-acme"]));

    Mock::given(method("POST"))
        .and(path("/api/search/delete-files"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "detail": "prefix must end with /" })),
        )
        .mount(&server)
        .await;

    let index = IndexClient::new(client(&server, session));
    let err = index.delete_files("acme/FY24").await.unwrap_err();

    match err {
        AppError::Transport {
            operation, status, ..
        } => {
            assert_eq!(operation, "delete indexed files");
            assert_eq!(status, Some(422));
        }
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn error_status_without_body_reports_http_status() {
    let server = MockServer::start().await;
    let session = signed_in_session(&token(&["org-acme"]));

    Mock::given(method("POST"))
        .and(path("/api/parse/source-docs/status/"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let backend = client(&server, session);
    let err = backend
        .job_status(JobName::SourceDocs, "acme/FY24/Source Documents/")
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Failed to check source documents parsing status: HTTP 502 Bad Gateway"
    );
}

#[tokio::test]
async fn missing_organization_fails_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let session = signed_in_session(&token(&["admins"]));
    let search = SearchClient::new(client(&server, session));

    let err = search.search("q", "acme").await.unwrap_err();
    assert!(matches!(err, AppError::NoOrganization));
}

#[tokio::test]
async fn missing_token_is_unauthenticated() {
    let server = MockServer::start().await;
    let session = Session::new(Arc::new(MemoryLocalStore::new()));
    let search = SearchClient::new(client(&server, session));

    let err = search.search("q", "acme").await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated(_)));
}
