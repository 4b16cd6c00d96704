use culligan::{Action, AuthFailure, AuthState, CulliganApi, Error, Session};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BEARER: &str = "Bearer cws-access-token-1";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn client_for(server: &MockServer) -> CulliganApi {
    CulliganApi::new_with_base_url(
        "test@example.com",
        "password123",
        "app-1",
        None,
        &server.uri(),
    )
}

async fn mount_login(server: &MockServer, body: &str) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn signed_in_client(server: &MockServer) -> CulliganApi {
    init_logging();
    mount_login(server, include_str!("fixtures/auth_success.json")).await;
    let client = client_for(server);
    client.sign_in().await.unwrap();
    client
}

async fn softener(server: &MockServer, client: &CulliganApi) -> culligan::Device {
    Mock::given(method("GET"))
        .and(path("/device/registry"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/registry.json")),
        )
        .mount(server)
        .await;

    client
        .get_devices()
        .await
        .unwrap()
        .into_iter()
        .find(|d| d.is_softener())
        .unwrap()
}

#[tokio::test]
async fn test_full_authentication_flow_with_mock_server() {
    init_logging();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({
            "email": "test@example.com",
            "password": "password123",
            "appId": "app-1"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/auth_success.json")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    client.sign_in().await.unwrap();

    assert!(client.check_auth(true).is_ok());
    assert_eq!(client.auth_state(), AuthState::Authenticated);
    assert_eq!(client.auth_header().unwrap()["Authorization"], BEARER);

    let linked = client.export_linked_credentials().unwrap();
    assert_eq!(linked.access_token, "ayla-access-token-1");
    assert_eq!(linked.refresh_token, "ayla-refresh-token-1");
    assert_eq!(linked.expires_in, 86400);
}

#[tokio::test]
async fn test_authentication_failures_with_mock_server() {
    init_logging();

    for (status, reason) in [
        (401, AuthFailure::Unauthorized),
        (404, AuthFailure::NotFound),
        (422, AuthFailure::Unprocessable),
    ] {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_string(include_str!("fixtures/auth_failure.json")),
            )
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let result = client.sign_in().await;

        match result {
            Err(Error::Auth { reason: got, message }) => {
                assert_eq!(got, reason);
                assert!(message.contains("Invalid email or password"));
            }
            other => panic!("expected auth error for {}, got {:?}", status, other),
        }
        assert_eq!(client.auth_state(), AuthState::Unauthenticated);
        assert!(matches!(client.auth_header(), Err(Error::NotAuthed)));
    }
}

#[tokio::test]
async fn test_login_without_data_envelope() {
    init_logging();
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let result = client.sign_in().await;
    assert!(matches!(
        result,
        Err(Error::Auth {
            reason: AuthFailure::MalformedResponse,
            ..
        })
    ));
}

#[tokio::test]
async fn test_expiring_token_needs_refresh() {
    init_logging();
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, include_str!("fixtures/auth_expiring.json")).await;

    Mock::given(method("PUT"))
        .and(path("/auth/login"))
        .and(body_json(json!({
            "refreshToken": "cws-refresh-token-1",
            "appId": "app-1"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(include_str!("fixtures/auth_refreshed.json")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    client.sign_in().await.unwrap();

    let err = client.check_auth(true).unwrap_err();
    assert!(err.is_auth_expiring());
    assert_eq!(client.auth_state(), AuthState::ExpiringSoon);
    // still usable for plain requests
    assert!(client.auth_header().is_ok());

    client.refresh_auth().await.unwrap();
    assert!(client.check_auth(true).is_ok());
    assert_eq!(
        client.auth_header().unwrap()["Authorization"],
        "Bearer cws-access-token-2"
    );
}

#[tokio::test]
async fn test_refresh_without_sign_in() {
    let mock_server = MockServer::start().await;
    let client = client_for(&mock_server);
    assert!(matches!(client.refresh_auth().await, Err(Error::NotAuthed)));
}

#[tokio::test]
async fn test_sign_out_is_local() {
    let mock_server = MockServer::start().await;
    let client = signed_in_client(&mock_server).await;

    client.sign_out();

    assert_eq!(client.auth_state(), AuthState::Unauthenticated);
    assert!(client.export_linked_credentials().is_none());
    assert!(matches!(
        client.get_device_registry().await,
        Err(Error::NotAuthed)
    ));
    // only the sign-in ever reached the server
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_devices_with_mock_server() {
    let mock_server = MockServer::start().await;
    let client = signed_in_client(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/device/registry"))
        .and(header("Authorization", BEARER))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/registry.json")),
        )
        .mount(&mock_server)
        .await;

    let devices = client.get_devices().await.unwrap();
    assert_eq!(devices.len(), 2);

    assert_eq!(devices[0].serial_number, "AC000W012345678");
    assert!(devices[0].is_softener());
    let info = devices[0].softener().unwrap();
    assert_eq!(info.model.as_deref(), Some("HE"));
    assert_eq!(info.software_version.as_deref(), Some("2.1.4"));
    assert_eq!(info.region.as_deref(), Some("US"));
    assert!(info.online);

    assert_eq!(devices[1].name, "Aquasential RO");
    assert!(!devices[1].is_softener());

    assert_eq!(
        client.tracked_serials(),
        vec!["AC000W012345678", "RO000W998877665"]
    );
}

#[tokio::test]
async fn test_repeated_registry_fetches_track_each_serial_once() {
    let mock_server = MockServer::start().await;
    let client = signed_in_client(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/device/registry"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"devices": [{"serialNumber": "A", "name": "Smart HE"}]}
        })))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/device/registry"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"devices": [
                {"serialNumber": "A", "name": "Smart HE"},
                {"serialNumber": "B", "name": "Smart HE"}
            ]}
        })))
        .mount(&mock_server)
        .await;

    assert_eq!(client.get_devices().await.unwrap().len(), 1);
    assert_eq!(client.get_devices().await.unwrap().len(), 2);
    assert_eq!(client.tracked_serials(), vec!["A", "B"]);
}

#[tokio::test]
async fn test_registry_no_cache_header() {
    let mock_server = MockServer::start().await;
    let client = signed_in_client(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/device/registry"))
        .and(header("Cache-Control", "no-cache"))
        .and(header("Authorization", BEARER))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/registry.json")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let entries = client
        .get_device_registry_with_headers(Session::no_cache_header())
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn test_refresh_properties_replaces_snapshot() {
    let mock_server = MockServer::start().await;
    let client = signed_in_client(&mock_server).await;
    let mut device = softener(&mock_server, &client).await;

    Mock::given(method("GET"))
        .and(path("/device/data"))
        .and(query_param("serialNumber", "AC000W012345678"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/device_data.json")),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/device/data"))
        .and(query_param("serialNumber", "AC000W012345678"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(include_str!("fixtures/device_data_partial.json")),
        )
        .mount(&mock_server)
        .await;

    assert!(matches!(
        device.get_property("salt_level"),
        Err(Error::KeyNotFound(_))
    ));

    assert!(client.refresh_properties(&mut device).await.unwrap());
    assert_eq!(device.get_property("salt_level").unwrap(), &json!(38));
    assert_eq!(device.get_property("regen_time").unwrap(), &json!("02:00"));

    assert!(client.refresh_properties(&mut device).await.unwrap());
    assert_eq!(device.get_property("salt_level").unwrap(), &json!(37));
    assert_eq!(device.get_property("vacation_mode").unwrap(), &json!(1));
    assert!(matches!(
        device.get_property("regen_time"),
        Err(Error::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn test_unauthorized_read_becomes_auth_error() {
    let mock_server = MockServer::start().await;
    let client = signed_in_client(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/device/data"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "jwt expired"}})),
        )
        .mount(&mock_server)
        .await;

    let result = client.get_device_data("AC000W012345678").await;
    match result {
        Err(Error::Auth { reason, message }) => {
            assert_eq!(reason, AuthFailure::Unauthorized);
            assert_eq!(message, "jwt expired");
        }
        other => panic!("expected auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_user_profile_and_metadata() {
    let mock_server = MockServer::start().await;
    let client = signed_in_client(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .and(header("Authorization", BEARER))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/profile.json")),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/metadata/user"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/metadata.json")),
        )
        .mount(&mock_server)
        .await;

    let profile = client.get_user_profile().await.unwrap();
    assert_eq!(profile["email"], "test@example.com");

    let metadata = client.get_user_metadata().await.unwrap();
    assert_eq!(metadata["CWS-onboarding-survey"]["householdSize"], 4);
    assert_eq!(metadata["whatsNewSeen"], "2.1");
}

#[tokio::test]
async fn test_vacation_mode_command() {
    let mock_server = MockServer::start().await;
    let client = signed_in_client(&mock_server).await;
    let device = softener(&mock_server, &client).await;

    Mock::given(method("POST"))
        .and(path("/device/command"))
        .and(header("Authorization", BEARER))
        .and(body_json(json!({
            "command": "awayMode.set",
            "serialNumber": "AC000W012345678",
            "protocolVersion": 1,
            "params": {"active": 1}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(include_str!("fixtures/command_success.json")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    assert!(client.start_vacation_mode(&device).await.unwrap());
}

#[tokio::test]
async fn test_timed_bypass_and_telemetry_payloads() {
    let mock_server = MockServer::start().await;
    let client = signed_in_client(&mock_server).await;
    let device = softener(&mock_server, &client).await;

    Mock::given(method("POST"))
        .and(path("/device/command"))
        .and(body_json(json!({
            "command": "bypass.timed.on",
            "serialNumber": "AC000W012345678",
            "protocolVersion": 1,
            "params": {"active": 1, "duration": 45}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/device/command"))
        .and(body_json(json!({
            "command": "telemetry.get",
            "serialNumber": "AC000W012345678",
            "protocolVersion": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    assert!(client.start_bypass_timed_mode(&device, 45).await.unwrap());
    assert!(client.get_telemetry(&device).await.unwrap());
}

#[tokio::test]
async fn test_rejected_command_returns_false() {
    let mock_server = MockServer::start().await;
    let client = signed_in_client(&mock_server).await;
    let device = softener(&mock_server, &client).await;

    Mock::given(method("POST"))
        .and(path("/device/command"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(include_str!("fixtures/command_rejected.json")),
        )
        .mount(&mock_server)
        .await;

    assert!(!client.perform(&device, Action::StopBypassMode, 60).await.unwrap());
}

#[tokio::test]
async fn test_unsupported_command_never_hits_the_network() {
    let mock_server = MockServer::start().await;
    let client = signed_in_client(&mock_server).await;
    let device = softener(&mock_server, &client).await;

    Mock::given(method("POST"))
        .and(path("/device/command"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(0)
        .mount(&mock_server)
        .await;

    assert!(!client
        .dispatch(&device, "not.a.command", true, 60)
        .await
        .unwrap());

    let generic = client
        .get_devices()
        .await
        .unwrap()
        .into_iter()
        .find(|d| !d.is_softener())
        .unwrap();
    assert!(!client.get_telemetry(&generic).await.unwrap());
}
