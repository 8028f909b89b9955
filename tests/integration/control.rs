use std::time::Duration;

use swarm_core::ModuleAction;

use crate::*;

#[tokio::test]
async fn test_ping_handshake() {
    let a = spawn_node(PASSPHRASE, None, &[]).await.unwrap();
    let ctl = Controller::new(PASSPHRASE).await.unwrap();

    let reply = ctl.request(a.addr(), ControlMessage::PingReq).await.unwrap();
    assert_eq!(reply, ControlMessage::PingAck);
    // Controllers are answered, never adopted as peers.
    assert!(a.node.roster.is_empty());

    a.stop().await;
}

#[tokio::test]
async fn test_wrong_passphrase_gets_no_answer() {
    let a = spawn_node(PASSPHRASE, None, &[]).await.unwrap();
    let ctl = Controller::new("guess").await.unwrap();

    ctl.send(a.addr(), Payload::Message(ControlMessage::PingReq.to_text()))
        .await
        .unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(1), ctl.recv_message()).await;
    assert!(reply.is_err(), "node answered a stranger");

    a.stop().await;
}

#[tokio::test]
async fn test_list_peers() {
    let a = spawn_node(PASSPHRASE, None, &[]).await.unwrap();
    let b = spawn_node(PASSPHRASE, Some(&a), &[]).await.unwrap();
    assert!(
        wait_for(Duration::from_secs(5), || async { a.node.roster.contains(&b.id()) }).await,
        "b never joined a"
    );

    let ctl = Controller::new(PASSPHRASE).await.unwrap();
    let reply = ctl.request(a.addr(), ControlMessage::ListPeers).await.unwrap();
    assert_eq!(reply, ControlMessage::ListResponse(vec![b.id()]));

    b.stop().await;
    a.stop().await;
}

#[tokio::test]
async fn test_signal_acknowledged() {
    let a = spawn_node(PASSPHRASE, None, &[]).await.unwrap();
    let ctl = Controller::new(PASSPHRASE).await.unwrap();

    let signal = ControlMessage::Signal {
        target: "web".into(),
        action: ModuleAction::Install,
    };
    assert_eq!(
        ctl.request(a.addr(), signal).await.unwrap(),
        ControlMessage::DeployAck
    );

    ctl.send(a.addr(), Payload::Message("__SIGNAL web".into()))
        .await
        .unwrap();
    assert_eq!(ctl.recv_message().await.unwrap(), ControlMessage::DeployError);

    a.stop().await;
}
