//local shortcuts
use crate::*;

//third-party shortcuts
use serde_json::json;
use simplehub::*;

//standard shortcuts
use std::time::Duration;

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn token_only_auth_assigns_canonical_name()
{
    let server = start_server(&[("alice", "T")]).await;

    // literal wire exchange
    let mut probe = raw_connect(&server).await;
    raw_send(&mut probe, &Frame::Auth{ token: "T".into(), name: None }).await;
    let RawEvent::Frame(Frame::AuthSuccess{ name }) = raw_next_non_heartbeat(&mut probe).await
    else { panic!("expected auth_success"); };
    assert_eq!(name, "alice");

    expect_server_notification(&server, ServerNotification::ClientConnected("alice".into())).await;
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn client_adopts_server_assigned_name()
{
    let server = start_server(&[("alice", "T")]).await;

    let client = connect_client(&server, "T").await;
    assert_eq!(client.name(), Some("alice".into()));
    assert!(client.is_connected());

    client.disconnect().await;
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn auth_with_matching_name_succeeds()
{
    let server = start_server(&[("alice", "T")]).await;

    let mut config = client_config(&server, "T");
    config.name = Some("alice".into());
    let client = Client::connect(config).await.unwrap();
    assert_eq!(client.name(), Some("alice".into()));

    client.disconnect().await;
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn auth_with_mismatched_name_fails()
{
    let server = start_server(&[("alice", "T")]).await;

    let mut config = client_config(&server, "T");
    config.name = Some("bob".into());
    let result = Client::connect(config).await;
    assert!(matches!(result, Err(HubError::Authentication(_))));
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn unknown_token_closes_with_1008()
{
    let server = start_server(&[("alice", "T")]).await;

    let mut probe = raw_connect(&server).await;
    raw_send(&mut probe, &Frame::Auth{ token: "nope".into(), name: None }).await;
    let RawEvent::Closed{ code, .. } = raw_next_non_heartbeat(&mut probe).await
    else { panic!("expected closure"); };
    assert_eq!(code, Some(CLOSE_POLICY_VIOLATION));
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn first_frame_other_than_auth_closes_with_1008()
{
    let server = start_server(&[("alice", "T")]).await;

    let mut probe = raw_connect(&server).await;
    raw_send(&mut probe, &Frame::Request{ id: "1".into(), function_name: "add".into(), data: json!({}) }).await;
    let RawEvent::Closed{ code, reason } = raw_next_non_heartbeat(&mut probe).await
    else { panic!("expected closure"); };
    assert_eq!(code, Some(CLOSE_POLICY_VIOLATION));
    assert_eq!(reason, "Authentication required");
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn malformed_first_frame_closes_with_1008()
{
    let server = start_server(&[("alice", "T")]).await;

    let mut probe = raw_connect(&server).await;
    raw_send_text(&mut probe, "this is not json").await;
    let RawEvent::Closed{ code, .. } = raw_next_non_heartbeat(&mut probe).await
    else { panic!("expected closure"); };
    assert_eq!(code, Some(CLOSE_POLICY_VIOLATION));
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn reconnect_with_same_name_displaces_prior_session()
{
    let server = start_server(&[("alice", "T")]).await;

    let first = connect_client(&server, "T").await;
    expect_server_notification(&server, ServerNotification::ClientConnected("alice".into())).await;

    // second connection claims the same name; the first session is retired
    let second = connect_client(&server, "T").await;
    expect_server_notification(&server, ServerNotification::ClientDisconnected("alice".into())).await;
    expect_server_notification(&server, ServerNotification::ClientConnected("alice".into())).await;

    expect_client_notification(
            &first,
            ClientNotification::Disconnected{ code: CLOSE_NORMAL, reason: "Displaced by new connection".into() },
        ).await;

    // displacement is an intentional close: the displaced client must not reconnect
    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert_eq!(first.state(), ConnectionState::Disconnected);
    assert!(second.is_connected());

    second.disconnect().await;
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn removing_a_user_evicts_its_session()
{
    let server = start_server(&[("alice", "T")]).await;

    let client = connect_client(&server, "T").await;
    expect_server_notification(&server, ServerNotification::ClientConnected("alice".into())).await;

    assert!(server.remove_user("alice").await);
    expect_server_notification(&server, ServerNotification::ClientDisconnected("alice".into())).await;

    // the name can no longer authenticate
    let result = Client::connect(client_config(&server, "T")).await;
    assert!(matches!(result, Err(HubError::Authentication(_))));

    drop(client);
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn connections_beyond_the_cap_are_rejected_with_1013()
{
    let config = ServerConfig{ max_connections: 1, ..fast_server_config() };
    let server = start_server_with(&[("alice", "T")], config).await;

    let mut first = raw_connect(&server).await;
    raw_authenticate(&mut first, "T", None).await;

    let mut second = raw_connect(&server).await;
    let RawEvent::Closed{ code, reason } = raw_next_non_heartbeat(&mut second).await
    else { panic!("expected closure"); };
    assert_eq!(code, Some(CLOSE_TRY_AGAIN_LATER));
    assert_eq!(reason, "Server at capacity");
}

//-------------------------------------------------------------------------------------------------------------------
