//local shortcuts
use crate::*;

//third-party shortcuts
use serde_json::json;
use simplehub::*;

//standard shortcuts
use std::time::Duration;
use tokio::time::Instant;

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn slow_handler_rejects_with_timeout_and_late_reply_is_dropped()
{
    // default heartbeat timings: a handler that stalls the session's read loop must not get it evicted here
    let server = start_server_with(&[("alice", "T")], ServerConfig::default()).await;
    server.add_handler("slow", |_data, _caller| async
    {
        tokio::time::sleep(Duration::from_millis(400)).await;
        Ok(json!("late"))
    });
    server.add_handler("add", |data, _caller| async move
    {
        let sum = data["a"].as_i64().unwrap_or(0) + data["b"].as_i64().unwrap_or(0);
        Ok(json!(sum))
    });

    let mut config = client_config(&server, "T");
    config.request_timeout = Duration::from_millis(100);
    let client = Client::connect(config).await.unwrap();

    let started = Instant::now();
    let result = client.request("slow", json!({})).await;
    let elapsed = started.elapsed();

    let deadline = match result
    {
        Err(HubError::Timeout(deadline)) => deadline,
        other => panic!("expected timeout, received {:?}", other),
    };
    assert_eq!(deadline, Duration::from_millis(100));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(350));

    // let the late reply arrive; it must be dropped without disturbing later requests
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.request("add", json!({"a": 2, "b": 3})).await.unwrap(), json!(5));

    client.disconnect().await;
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn disconnect_settles_in_flight_requests_promptly()
{
    let server = start_server_with(&[("alice", "T")], ServerConfig::default()).await;
    server.add_handler("stall", |_data, _caller| async
    {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(json!("never"))
    });

    let client = connect_client(&server, "T").await;

    let started = Instant::now();
    let (result, _) = tokio::join!(
            client.request("stall", json!({})),
            async
            {
                tokio::time::sleep(Duration::from_millis(100)).await;
                client.disconnect().await;
            }
        );

    assert!(matches!(result, Err(HubError::Connection(_))));
    assert!(started.elapsed() < Duration::from_millis(800));
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn request_ids_are_sequential_decimal_strings()
{
    let server = start_server_with(&[("alice", "TA"), ("bob", "TB")], ServerConfig::default()).await;
    let alice = connect_client(&server, "TA").await;

    let mut bob = raw_connect(&server).await;
    raw_authenticate(&mut bob, "TB", None).await;

    // the peer observes the ids alice allocates: a fresh connection starts at "1" and counts up
    let responder = tokio::spawn(async move
    {
        for expected in 1u64..=2
        {
            let RawEvent::Frame(Frame::ClientRequest{ id, data, from_client, .. }) =
                raw_next_non_heartbeat(&mut bob).await
            else { panic!("expected client_request at the peer"); };
            assert_eq!(id, expected.to_string());

            raw_send(&mut bob, &Frame::Response{
                    id,
                    success              : true,
                    data                 : Some(data),
                    error                : None,
                    original_from_client : from_client,
                }).await;
        }
    });

    assert_eq!(alice.request_client("bob", "echo", json!(1)).await.unwrap(), json!(1));
    assert_eq!(alice.request_client("bob", "echo", json!(2)).await.unwrap(), json!(2));
    responder.await.unwrap();

    alice.disconnect().await;
}

//-------------------------------------------------------------------------------------------------------------------
