//! swarm-ctl: command-line controller for a local swarmd.
//!
//! Talks to the daemon over its own encrypted UDP port, using the
//! passphrase from the shared config.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::net::UdpSocket;

use swarm_core::config::SwarmConfig;
use swarm_core::crypto::{self, Hasher, SharedKey};
use swarm_core::node::outbound_ip;
use swarm_core::wire::{Deployment, FileHash, MAX_PACKET_SIZE};
use swarm_core::{ControlMessage, ModuleAction, Node, Packet, Payload};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const REPORT_INTERVAL: Duration = Duration::from_secs(30);

// ── Link ──────────────────────────────────────────────────────────────────────

struct Link {
    socket: UdpSocket,
    daemon: SocketAddr,
    key: SharedKey,
}

impl Link {
    async fn open(port: u16, key: SharedKey) -> Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .context("failed to bind control socket")?;
        Ok(Self {
            socket,
            daemon: SocketAddr::from(([127, 0, 0, 1], port)),
            key,
        })
    }

    async fn send(&self, packet: &Packet) -> Result<()> {
        let bytes = packet.encode()?;
        let sealed = crypto::encrypt_packet(&self.key, &bytes)?;
        self.socket
            .send_to(&sealed, self.daemon)
            .await
            .with_context(|| format!("failed to reach swarmd at {}", self.daemon))?;
        Ok(())
    }

    /// Next control message from the daemon.
    async fn recv_message(&self) -> Result<ControlMessage> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE + 64];
        let len = tokio::time::timeout(REPLY_TIMEOUT, self.socket.recv(&mut buf))
            .await
            .with_context(|| format!("no reply from swarmd at {}, is it running?", self.daemon))??;

        let plain = crypto::decrypt_packet(&self.key, &buf[..len])
            .context("cannot decrypt reply, passphrase mismatch?")?;
        let packet = Packet::decode(&plain).context("malformed reply")?;
        match packet.payload {
            Payload::Message(text) => Ok(ControlMessage::parse(&text)),
            other => bail!("unexpected {:?} reply", other.packet_type()),
        }
    }

    async fn request(&self, message: ControlMessage) -> Result<ControlMessage> {
        self.send(&Packet::message(message.to_text())).await?;
        self.recv_message().await
    }

    /// Every session starts here. Anything but a ping ack is fatal.
    async fn handshake(&self) -> Result<()> {
        match self.request(ControlMessage::PingReq).await? {
            ControlMessage::PingAck => Ok(()),
            other => bail!("handshake failed, swarmd answered {:?}", other.to_text()),
        }
    }
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_ping(link: &Link) -> Result<()> {
    println!("swarmd at {} is alive.", link.daemon);
    Ok(())
}

async fn cmd_peers(link: &Link) -> Result<()> {
    let peers = list_peers(link).await?;
    if peers.is_empty() {
        println!("No peers yet.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Peers ({})", peers.len());
    println!("═══════════════════════════════════════");
    for peer in &peers {
        println!("  {peer}");
    }
    Ok(())
}

fn hash_path(path: &Path) -> Result<FileHash> {
    use std::io::Read;

    let mut file =
        std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

async fn cmd_deploy(link: &Link, config: &SwarmConfig, target: &str, source: &str) -> Result<()> {
    if target.is_empty() || target.contains(['/', '\\']) || target.starts_with('.') {
        bail!("bad target name {target:?}");
    }

    let share = config.share_dir();
    std::fs::create_dir_all(&share)
        .with_context(|| format!("failed to create {}", share.display()))?;
    let dest = share.join(format!("{target}.swm"));
    std::fs::copy(source, &dest)
        .with_context(|| format!("failed to copy {source} to {}", dest.display()))?;

    let hash = hash_path(&dest)?;
    println!("Deploying {} ({})", dest.display(), hex::encode(hash));

    link.send(&Packet::new(Payload::Deployment(Deployment { hash })))
        .await?;
    match link.recv_message().await? {
        ControlMessage::DeployAck => {
            println!("Deployment accepted.");
            Ok(())
        }
        ControlMessage::DeployError => bail!("swarmd rejected the deployment"),
        other => bail!("unexpected reply {:?}", other.to_text()),
    }
}

async fn cmd_signal(link: &Link, target: &str, action: &str) -> Result<()> {
    let action: ModuleAction = action
        .parse()
        .map_err(|()| anyhow::anyhow!("unknown action {action:?}, expected start|stop|install|uninstall"))?;
    let signal = ControlMessage::Signal {
        target: target.to_string(),
        action,
    };
    match link.request(signal).await? {
        ControlMessage::DeployAck => {
            println!("Signal '{action}' sent to {target}.");
            Ok(())
        }
        ControlMessage::DeployError => bail!("swarmd rejected the signal"),
        other => bail!("unexpected reply {:?}", other.to_text()),
    }
}

/// Body of a check-in POST.
#[derive(Debug, Serialize)]
struct CheckIn {
    peers: Vec<String>,
    #[serde(rename = "self")]
    self_addr: String,
}

fn check_in_url(server: &str) -> String {
    format!("http://{server}/checkIn")
}

async fn list_peers(link: &Link) -> Result<Vec<Node>> {
    match link.request(ControlMessage::ListPeers).await? {
        ControlMessage::ListResponse(peers) => Ok(peers),
        other => bail!("unexpected reply {:?}", other.to_text()),
    }
}

/// Post the daemon's peer list to a check-in server until interrupted.
async fn cmd_report(link: &Link, config: &SwarmConfig, server: &str) -> Result<()> {
    let ip = outbound_ip().context("failed to find this machine's outbound address")?;
    let self_addr = format!("{ip}:{}", config.network.local_port);
    let url = check_in_url(server);
    let client = reqwest::Client::new();
    println!("Reporting {self_addr} to {url} every {}s.", REPORT_INTERVAL.as_secs());

    let mut ticker = tokio::time::interval(REPORT_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            r = tokio::signal::ctrl_c() => {
                r.context("failed to listen for ctrl-c")?;
                return Ok(());
            }
        }

        let peers = match list_peers(link).await {
            Ok(peers) => peers,
            Err(e) => {
                eprintln!("Skipping check-in: {e:#}");
                continue;
            }
        };
        let body = CheckIn {
            peers: peers.iter().map(Node::to_string).collect(),
            self_addr: self_addr.clone(),
        };
        let resp = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to reach check-in server at {url}"))?;
        println!("Checked in {} peers: {}", body.peers.len(), resp.status());
    }
}

fn print_usage() {
    println!("Usage: swarm-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  ping                     Check that swarmd answers");
    println!("  peers                    List the daemon's peers");
    println!("  deploy <target> <file>   Share <file> as <target>.swm and announce it");
    println!("  signal <target> <action> Send start|stop|install|uninstall to a module");
    println!("  report <host:port>       POST the peer list to http://<host:port>/checkIn every 30s");
    println!();
    println!("Options:");
    println!("  --port <port>   swarmd UDP port (default: from config)");
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Apply leading options to `config` and return the command words.
fn parse_options(args: &[String], config: &mut SwarmConfig) -> Result<Vec<String>> {
    let mut remaining = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            config.network.local_port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(args[i].clone());
        }
        i += 1;
    }
    Ok(remaining)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut config = SwarmConfig::load().context("failed to load config")?;
    let words = parse_options(&args, &mut config)?;
    let remaining: Vec<&str> = words.iter().map(String::as_str).collect();

    if matches!(remaining.as_slice(), ["help"] | ["--help"] | ["-h"]) {
        print_usage();
        return Ok(());
    }

    let link = Link::open(
        config.network.local_port,
        crypto::make_key(&config.security.passphrase),
    )
    .await?;
    link.handshake().await?;

    match remaining.as_slice() {
        ["ping"] | [] => cmd_ping(&link).await,
        ["peers"] => cmd_peers(&link).await,
        ["deploy", target, source] => cmd_deploy(&link, &config, target, source).await,
        ["signal", target, action] => cmd_signal(&link, target, action).await,
        ["report", server] => cmd_report(&link, &config, server).await,
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
