//! End-to-end tests against a mocked EC2 endpoint.
//!
//! A wiremock server answers the EC2 query protocol (form-encoded POST,
//! XML responses); the session's endpoint override routes every client
//! at it. This exercises the real command path: selector -> SDK call ->
//! display -> resource-id cache.

use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use awsh::aws::AwsCredentials;
use awsh::commands::{self, Command as _};
use awsh::config::Config;
use awsh::error::CmdError;
use awsh::session::Session;

const REGIONS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DescribeRegionsResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <requestId>00000000-0000-0000-0000-000000000001</requestId>
  <regionInfo>
    <item>
      <regionName>us-east-1</regionName>
      <regionEndpoint>ec2.us-east-1.amazonaws.com</regionEndpoint>
    </item>
  </regionInfo>
</DescribeRegionsResponse>"#;

const VOLUMES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DescribeVolumesResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <requestId>00000000-0000-0000-0000-000000000002</requestId>
  <volumeSet>
    <item>
      <volumeId>vol-0a1b2c3d</volumeId>
      <size>8</size>
      <availabilityZone>us-east-1a</availabilityZone>
      <status>available</status>
      <createTime>2024-04-06T10:15:00.000Z</createTime>
      <volumeType>gp2</volumeType>
      <attachmentSet/>
    </item>
    <item>
      <volumeId>vol-0f9e8d7c</volumeId>
      <size>100</size>
      <availabilityZone>us-east-1b</availabilityZone>
      <status>in-use</status>
      <createTime>2024-05-01T08:00:00.000Z</createTime>
      <volumeType>gp2</volumeType>
      <attachmentSet>
        <item>
          <volumeId>vol-0f9e8d7c</volumeId>
          <instanceId>i-0123456789abcdef0</instanceId>
          <device>/dev/sdf</device>
          <status>attached</status>
        </item>
      </attachmentSet>
    </item>
  </volumeSet>
</DescribeVolumesResponse>"#;

const UNAUTHORIZED_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Errors>
    <Error>
      <Code>UnauthorizedOperation</Code>
      <Message>You are not authorized to perform this operation.</Message>
    </Error>
  </Errors>
  <RequestID>00000000-0000-0000-0000-000000000003</RequestID>
</Response>"#;

fn test_creds() -> AwsCredentials {
    AwsCredentials {
        key_id: "AKIATESTTESTTEST".to_string(),
        secret: "testsecret".to_string(),
        source_file: None,
        name: None,
    }
}

async fn mock_regions(server: &MockServer) {
    Mock::given(method("POST"))
        .and(body_string_contains("Action=DescribeRegions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(REGIONS_XML, "text/xml"))
        .mount(server)
        .await;
}

fn test_session(server: &MockServer) -> Session {
    Session::with_endpoint_url(
        test_creds(),
        "us-east-1".to_string(),
        false,
        Config::default(),
        server.uri(),
    )
}

#[tokio::test]
async fn vol_listing_fills_the_completion_cache() {
    let server = MockServer::start().await;
    mock_regions(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=DescribeVolumes"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(VOLUMES_XML, "text/xml"))
        .mount(&server)
        .await;

    let mut session = test_session(&server);
    let registry = commands::registry();
    let vol = registry.get("vol").expect("vol command registered");

    vol.run(&mut session, vec!["-a".to_string(), "-l".to_string()])
        .await
        .expect("listing succeeds");

    let cache = session.cache();
    let cache = cache.lock().unwrap();
    assert_eq!(cache.lookup("vol", "0a"), vec!["0a1b2c3d".to_string()]);
    assert_eq!(cache.lookup("vol", "0f"), vec!["0f9e8d7c".to_string()]);
}

#[tokio::test]
async fn vol_without_selection_does_not_call_the_service() {
    let server = MockServer::start().await;
    mock_regions(&server).await;

    let mut session = test_session(&server);
    let registry = commands::registry();
    let vol = registry.get("vol").expect("vol command registered");

    // No ids, no -a, no filters: by design a no-op.
    vol.run(&mut session, Vec::new()).await.expect("no-op");

    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn service_errors_surface_code_and_message() {
    let server = MockServer::start().await;
    mock_regions(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=DescribeVolumes"))
        .respond_with(ResponseTemplate::new(403).set_body_raw(UNAUTHORIZED_XML, "text/xml"))
        .mount(&server)
        .await;

    let mut session = test_session(&server);
    let registry = commands::registry();
    let vol = registry.get("vol").expect("vol command registered");

    let err = vol
        .run(&mut session, vec!["-a".to_string()])
        .await
        .expect_err("listing fails");
    match err {
        CmdError::Service { service, code, .. } => {
            assert_eq!(service, "EC2");
            assert_eq!(code, "UnauthorizedOperation");
        }
        other => panic!("expected a service error, got: {other}"),
    }
}

#[tokio::test]
async fn tag_filters_reach_the_wire() {
    let server = MockServer::start().await;
    mock_regions(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=DescribeVolumes"))
        .and(body_string_contains("tag%3AName"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(VOLUMES_XML, "text/xml"))
        .mount(&server)
        .await;

    let mut session = test_session(&server);
    let registry = commands::registry();
    let vol = registry.get("vol").expect("vol command registered");

    // Last tag filter wins; the request carries tag:Name=bar.
    vol.run(
        &mut session,
        vec!["-q".to_string(), "Name=foo".to_string(), "-q".to_string(), "Name=bar".to_string()],
    )
    .await
    .expect("filtered listing succeeds");

    let requests = server.received_requests().await.unwrap();
    let describe = requests
        .iter()
        .find(|r| String::from_utf8_lossy(&r.body).contains("Action=DescribeVolumes"))
        .expect("DescribeVolumes was called");
    let body = String::from_utf8_lossy(&describe.body);
    assert!(body.contains("bar"));
    assert!(!body.contains("foo"));
}
