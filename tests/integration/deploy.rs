use std::time::Duration;

use swarm_core::crypto::content_hash;
use swarm_core::wire::Deployment;

use crate::*;

async fn joined_pair(files: &[(&str, &[u8])]) -> (TestNode, TestNode) {
    let a = spawn_node(PASSPHRASE, None, files).await.unwrap();
    let b = spawn_node(PASSPHRASE, Some(&a), &[]).await.unwrap();
    let joined = wait_for(Duration::from_secs(5), || async {
        a.node.roster.contains(&b.id()) && b.node.roster.contains(&a.id())
    })
    .await;
    assert!(joined, "nodes never joined");
    (a, b)
}

/// Deploying on one node pulls the file onto its peer in 1024-byte parts.
#[tokio::test]
async fn test_deploy_spreads_file() {
    let module: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 251) as u8).collect();
    let (a, b) = joined_pair(&[("web.swm", &module)]).await;

    let ctl = Controller::new(PASSPHRASE).await.unwrap();
    ctl.send(
        a.addr(),
        Payload::Deployment(Deployment {
            hash: content_hash(&module),
        }),
    )
    .await
    .unwrap();
    assert_eq!(ctl.recv_message().await.unwrap(), ControlMessage::DeployAck);

    let landed = b.share_dir().join("web.swm");
    let arrived = wait_for(Duration::from_secs(10), || async {
        std::fs::read(&landed).map(|d| d == module).unwrap_or(false)
    })
    .await;
    assert!(arrived, "file never reached b");

    // Staging is cleaned up once the file is assembled.
    let parts = b.dir.path().join("parts");
    let cleaned = wait_for(Duration::from_secs(2), || async {
        std::fs::read_dir(&parts).map(|d| d.count() == 0).unwrap_or(true)
    })
    .await;
    assert!(cleaned, "parts left behind in {}", parts.display());

    b.stop().await;
    a.stop().await;
}

/// Files in subdirectories keep their relative path on the receiver.
#[tokio::test]
async fn test_deploy_keeps_relative_path() {
    let module = b"#!/bin/sh\necho nested\n".to_vec();
    let (a, b) = joined_pair(&[("tools/nested.swm", &module)]).await;

    let ctl = Controller::new(PASSPHRASE).await.unwrap();
    ctl.send(
        a.addr(),
        Payload::Deployment(Deployment {
            hash: content_hash(&module),
        }),
    )
    .await
    .unwrap();
    assert_eq!(ctl.recv_message().await.unwrap(), ControlMessage::DeployAck);

    let landed = b.share_dir().join("tools").join("nested.swm");
    let arrived = wait_for(Duration::from_secs(10), || async {
        std::fs::read(&landed).map(|d| d == module).unwrap_or(false)
    })
    .await;
    assert!(arrived, "file never reached b");

    b.stop().await;
    a.stop().await;
}

/// Deploying a hash nobody holds is refused.
#[tokio::test]
async fn test_deploy_unknown_file_errors() {
    let (a, b) = joined_pair(&[]).await;

    let ctl = Controller::new(PASSPHRASE).await.unwrap();
    ctl.send(
        a.addr(),
        Payload::Deployment(Deployment {
            hash: content_hash(b"nobody has this"),
        }),
    )
    .await
    .unwrap();
    assert_eq!(ctl.recv_message().await.unwrap(), ControlMessage::DeployError);

    b.stop().await;
    a.stop().await;
}
