//local shortcuts
use crate::*;

//third-party shortcuts
use serde_json::json;
use simplehub::*;

//standard shortcuts
use std::time::Duration;

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn request_gets_exactly_one_response()
{
    // default heartbeat timings: the probe never answers probes, and must not be evicted mid-assertion
    let server = start_server_with(&[("alice", "T")], ServerConfig::default()).await;
    server.add_handler("add", |data, _caller| async move
    {
        let sum = data["a"].as_i64().unwrap_or(0) + data["b"].as_i64().unwrap_or(0);
        Ok(json!(sum))
    });

    let mut probe = raw_connect(&server).await;
    raw_authenticate(&mut probe, "T", None).await;

    raw_send(&mut probe, &Frame::Request{ id: "1".into(), function_name: "add".into(), data: json!({"a": 2, "b": 3}) }).await;

    let RawEvent::Frame(Frame::Response{ id, success, data, error, .. }) = raw_next_non_heartbeat(&mut probe).await
    else { panic!("expected response"); };
    assert_eq!(id, "1");
    assert!(success);
    assert_eq!(data, Some(json!(5)));
    assert_eq!(error, None);

    // exactly one response per request
    raw_expect_silence(&mut probe, Duration::from_millis(300)).await;
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn missing_handler_rejects_with_handler_not_found()
{
    let server = start_server(&[("alice", "T")]).await;
    let client = connect_client(&server, "T").await;

    let message = match client.request("missing", json!({})).await
    {
        Err(HubError::HandlerNotFound(message)) => message,
        other => panic!("expected handler-not-found, received {:?}", other),
    };
    assert_eq!(message, "Handler not found");

    client.disconnect().await;
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn handler_error_is_surfaced_to_the_caller()
{
    let server = start_server(&[("alice", "T")]).await;
    server.add_handler("explode", |_data, _caller| async { Err("boom".into()) });

    let client = connect_client(&server, "T").await;
    let message = match client.request("explode", json!({})).await
    {
        Err(HubError::Remote(message)) => message,
        other => panic!("expected remote error, received {:?}", other),
    };
    assert_eq!(message, "boom");

    // the session survives the handler failure
    server.add_handler("ok", |_data, _caller| async { Ok(json!("fine")) });
    assert_eq!(client.request("ok", json!({})).await.unwrap(), json!("fine"));

    client.disconnect().await;
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn handler_receives_the_caller_name()
{
    let server = start_server(&[("alice", "T")]).await;
    server.add_handler("whoami", |_data, caller| async move { Ok(json!(caller)) });

    let client = connect_client(&server, "T").await;
    assert_eq!(client.request("whoami", json!({})).await.unwrap(), json!("alice"));

    client.disconnect().await;
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn handler_registration_is_last_writer_wins()
{
    let server = start_server(&[("alice", "T")]).await;
    server.add_handler("f", |_data, _caller| async { Ok(json!(1)) });
    server.add_handler("f", |_data, _caller| async { Ok(json!(2)) });

    let client = connect_client(&server, "T").await;
    assert_eq!(client.request("f", json!({})).await.unwrap(), json!(2));

    assert!(server.remove_handler("f"));
    let result = client.request("f", json!({})).await;
    assert!(matches!(result, Err(HubError::HandlerNotFound(_))));

    client.disconnect().await;
}

//-------------------------------------------------------------------------------------------------------------------
