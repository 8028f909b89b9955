use std::time::Duration;

use crate::*;

/// Two nodes find each other through a single bootstrap request.
#[tokio::test]
async fn test_bootstrap_pair() {
    let a = spawn_node(PASSPHRASE, None, &[]).await.unwrap();
    let b = spawn_node(PASSPHRASE, Some(&a), &[]).await.unwrap();

    let joined = wait_for(Duration::from_secs(5), || async {
        a.node.roster.contains(&b.id()) && b.node.roster.contains(&a.id())
    })
    .await;
    assert!(joined, "a: {:?}, b: {:?}", a.node.roster.snapshot(), b.node.roster.snapshot());

    b.stop().await;
    a.stop().await;
}

/// A request relayed through the seed reaches nodes the requester never
/// contacted, so three nodes end up fully meshed.
#[tokio::test]
async fn test_three_nodes_mesh() {
    let a = spawn_node(PASSPHRASE, None, &[]).await.unwrap();
    let b = spawn_node(PASSPHRASE, Some(&a), &[]).await.unwrap();
    assert!(
        wait_for(Duration::from_secs(5), || async { b.node.roster.contains(&a.id()) }).await,
        "b never joined a"
    );
    let c = spawn_node(PASSPHRASE, Some(&a), &[]).await.unwrap();

    let meshed = wait_for(Duration::from_secs(10), || async {
        a.node.roster.len() == 2 && b.node.roster.len() == 2 && c.node.roster.len() == 2
    })
    .await;
    assert!(
        meshed,
        "a: {:?}, b: {:?}, c: {:?}",
        a.node.roster.snapshot(),
        b.node.roster.snapshot(),
        c.node.roster.snapshot()
    );
    assert!(c.node.roster.contains(&b.id()));

    for n in [c, b, a] {
        n.stop().await;
    }
}

/// Nodes with a different passphrase cannot read each other and never join.
#[tokio::test]
async fn test_wrong_passphrase_is_isolated() {
    let a = spawn_node(PASSPHRASE, None, &[]).await.unwrap();
    let stranger = spawn_node("not the passphrase", Some(&a), &[]).await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(a.node.roster.is_empty());
    assert!(stranger.node.roster.is_empty());

    stranger.stop().await;
    a.stop().await;
}

/// A node that goes away is evicted after three unanswered pings.
#[tokio::test]
async fn test_silent_peer_is_evicted() {
    let a = spawn_node(PASSPHRASE, None, &[]).await.unwrap();
    let b = spawn_node(PASSPHRASE, Some(&a), &[]).await.unwrap();
    assert!(
        wait_for(Duration::from_secs(5), || async { a.node.roster.contains(&b.id()) }).await,
        "b never joined a"
    );

    let gone = b.id();
    b.stop().await;

    // First ping at 0.5 s, then one every 0.3-0.6 s: three misses and the
    // evicting cycle fit well inside 5 s.
    let evicted = wait_for(Duration::from_secs(5), || async { !a.node.roster.contains(&gone) }).await;
    assert!(evicted, "a still lists {gone}");

    a.stop().await;
}
