//local shortcuts
use crate::*;

//third-party shortcuts
use simplehub::*;

//standard shortcuts
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn graceful_shutdown_announces_drains_and_hard_closes()
{
    // grace window 300ms
    let server = Arc::new(start_server(&[("alice", "T")]).await);

    let mut probe = raw_connect(&server).await;
    raw_authenticate(&mut probe, "T", None).await;

    let started = Instant::now();
    let server_clone = server.clone();
    let shutdown = tokio::spawn(async move { server_clone.graceful_shutdown("maint").await; });

    // the announcement arrives immediately, carrying the reason and the grace period
    let RawEvent::Frame(Frame::Shutdown{ reason, grace_period }) = raw_next_non_heartbeat(&mut probe).await
    else { panic!("expected shutdown frame"); };
    assert_eq!(reason, Some("maint".into()));
    assert_eq!(grace_period, Some(300));

    // connections arriving inside the drain window are turned away with 1013
    let mut late = raw_connect(&server).await;
    let RawEvent::Closed{ code, reason } = raw_next_non_heartbeat(&mut late).await
    else { panic!("expected closure for late connection"); };
    assert_eq!(code, Some(CLOSE_TRY_AGAIN_LATER));
    assert_eq!(reason, "Server is shutting down");

    // after the window the surviving transport is hard-closed with 1001
    let RawEvent::Closed{ code, reason } = raw_next_non_heartbeat(&mut probe).await
    else { panic!("expected hard close"); };
    assert_eq!(code, Some(CLOSE_GOING_AWAY));
    assert_eq!(reason, "Server shutting down");
    assert!(started.elapsed() >= Duration::from_millis(300));

    shutdown.await.unwrap();
    expect_server_notification(&server, ServerNotification::Closed).await;
    assert!(server.is_shutting_down());
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_shutdown_calls_share_one_completion()
{
    let server = start_server(&[("alice", "T")]).await;

    let mut probe = raw_connect(&server).await;
    raw_authenticate(&mut probe, "T", None).await;

    // both callers return; only the first runs the sequence
    tokio::join!(server.graceful_shutdown("first"), server.graceful_shutdown("second"));

    // the transport observed exactly one shutdown frame before the hard close
    let mut shutdown_frames = 0u32;
    loop
    {
        match raw_next_non_heartbeat(&mut probe).await
        {
            RawEvent::Frame(Frame::Shutdown{ reason, .. }) =>
            {
                assert_eq!(reason, Some("first".into()));
                shutdown_frames += 1;
            }
            RawEvent::Closed{ code, .. } =>
            {
                assert_eq!(code, Some(CLOSE_GOING_AWAY));
                break;
            }
            other => panic!("unexpected frame during shutdown: {:?}", other),
        }
    }
    assert_eq!(shutdown_frames, 1);

    expect_server_notification(&server, ServerNotification::Closed).await;
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn client_closes_itself_after_the_announced_grace_period()
{
    let server = Arc::new(start_server(&[("alice", "T")]).await);
    let client = connect_client(&server, "T").await;

    let server_clone = server.clone();
    let shutdown = tokio::spawn(async move { server_clone.graceful_shutdown("maint").await; });

    expect_client_notification(
            &client,
            ClientNotification::ServerShutdown{ reason: Some("maint".into()), grace_period: Duration::from_millis(300) },
        ).await;

    shutdown.await.unwrap();

    // a server shutdown is an intentional close; the client goes down and stays down
    let settled = tokio::time::timeout(Duration::from_secs(4), async
    {
        loop
        {
            if client.state() == ConnectionState::Disconnected { return; }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "client did not settle after server shutdown");

    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

//-------------------------------------------------------------------------------------------------------------------
