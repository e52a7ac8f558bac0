//! WolfGrid - WireGuard Site Topology Manager
//!
//! Command line driver: administers sites and peers, edits connection
//! tables, checks integrity and writes the per-peer configs.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use ipnet::IpNet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfgrid::config::Settings;
use wolfgrid::editor::{comment_lines, ExternalEditor};
use wolfgrid::error::{Error, Result};
use wolfgrid::keys::WgKeyProvider;
use wolfgrid::manager::SiteManager;
use wolfgrid::storage::FsStorage;

/// WolfGrid - WireGuard Site Topology Manager
#[derive(Parser)]
#[command(name = "wolfgrid")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to settings file
    #[arg(short, long, default_value = "wolfgrid.json")]
    settings: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to the settings verbosity
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a settings file with default values
    Init {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },

    /// Manage sites
    Site {
        #[command(subcommand)]
        action: SiteCommand,
    },

    /// Manage peers of a site
    Peer {
        #[command(subcommand)]
        action: PeerCommand,
    },

    /// Edit the connection table of a site in the configured editor
    Connections {
        site: String,

        /// Print the table instead of editing it
        #[arg(long)]
        show: bool,
    },

    /// Validate the sites document and print every problem found
    Check {
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Write the WireGuard configs of a site
    Generate {
        site: String,

        /// Print the configs instead of writing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove the generated configs of a site
    Clean { site: String },
}

#[derive(Subcommand)]
enum SiteCommand {
    /// Create a site
    Add {
        name: String,

        /// Network in CIDR notation (repeatable)
        #[arg(short, long = "network", required = true)]
        networks: Vec<IpNet>,

        /// DNS server (repeatable)
        #[arg(short, long = "dns")]
        dns: Vec<IpAddr>,
    },
    /// Delete a site and its configs
    Delete { name: String },
    /// List sites and their peers
    List,
}

#[derive(Subcommand)]
enum PeerCommand {
    /// Add a peer with new keys
    Add { site: String, name: String },
    /// Delete a peer and its connections
    Delete { site: String, name: String },
    /// Issue new keys for a peer
    Rekey { site: String, name: String },
    /// Print a peer record
    Show { site: String, name: String },
    /// Change peer attributes
    Set(PeerSettings),
}

#[derive(Args)]
struct PeerSettings {
    site: String,
    name: String,

    /// Hostname or address other peers dial
    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// DNS servers, replacing the current list (empty to inherit the site list)
    #[arg(long, num_args = 0..)]
    dns: Option<Vec<IpAddr>>,

    /// Extra networks routed into the tunnel, replacing the current list
    #[arg(long = "allowed-ip", num_args = 0..)]
    allowed_ips: Option<Vec<IpNet>>,

    #[arg(long)]
    keep_alive: Option<bool>,

    #[arg(long)]
    redirect_ipv4: Option<bool>,

    #[arg(long)]
    redirect_ipv6: Option<bool>,

    #[arg(long)]
    ipv6_routing_fix: Option<bool>,

    #[arg(long)]
    post_up: Option<String>,

    #[arg(long)]
    post_down: Option<String>,
}

type Manager = SiteManager<FsStorage, WgKeyProvider>;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (settings, settings_report) = Settings::load(&FsStorage, &cli.settings)?;

    // Initialize logging
    init_logging(cli.log_level.as_deref().unwrap_or(settings.log_level()));

    if !settings_report.is_empty() {
        eprintln!("Settings {}:", cli.settings.display());
        eprint!("{}", settings_report);
    }

    match cli.command {
        Commands::Init { force } => run_init(&cli.settings, force),
        Commands::Site { action } => run_site(settings, action),
        Commands::Peer { action } => run_peer(settings, action),
        Commands::Connections { site, show } => run_connections(settings, &site, show),
        Commands::Check { strict } => run_check(settings, strict),
        Commands::Generate { site, dry_run } => run_generate(settings, &site, dry_run),
        Commands::Clean { site } => {
            let manager = open(settings)?;
            manager.delete_configs(&site)?;
            println!("Removed configs of site {}", site);
            Ok(())
        }
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load the sites document, printing any problems found on the way
fn open(settings: Settings) -> Result<Manager> {
    let keys = WgKeyProvider::new(settings.wg_executable.clone());
    let mut manager = SiteManager::new(FsStorage, keys, settings);
    let report = manager.load()?;
    if report.message_count() > 0 {
        eprint!("{}", report);
    }
    Ok(manager)
}

fn run_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists, use --force to overwrite",
            path.display()
        )));
    }
    Settings::default().save(&FsStorage, path)?;
    println!("Settings file created: {}", path.display());
    println!("Then add a site with: wolfgrid site add <name> --network 10.0.0.0/24");
    Ok(())
}

fn run_site(settings: Settings, action: SiteCommand) -> Result<()> {
    let mut manager = open(settings)?;
    match action {
        SiteCommand::Add { name, networks, dns } => {
            manager.add_site(&name, networks, dns)?;
            manager.save()?;
            println!("✓ Site {} created", name);
        }
        SiteCommand::Delete { name } => {
            manager.delete_site(&name)?;
            manager.save()?;
            println!("✓ Site {} deleted", name);
        }
        SiteCommand::List => {
            for (name, site) in manager.sites() {
                let networks: Vec<String> = site.ip_networks.iter().map(IpNet::to_string).collect();
                println!("{} ({})", name, networks.join(", "));
                for (peer_name, peer) in &site.peers {
                    let main = peer.main_peer.as_deref().unwrap_or("-");
                    println!(
                        "  {:<16} out: {:<3} in: {:<3} main: {}",
                        peer_name,
                        peer.outgoing_connected_peers.len(),
                        peer.ingoing_connected_peers.len(),
                        main
                    );
                }
            }
        }
    }
    Ok(())
}

fn run_peer(settings: Settings, action: PeerCommand) -> Result<()> {
    if matches!(action, PeerCommand::Add { .. } | PeerCommand::Rekey { .. }) {
        WgKeyProvider::new(settings.wg_executable.clone()).check_available()?;
    }
    let mut manager = open(settings)?;
    match action {
        PeerCommand::Add { site, name } => {
            manager.add_peer(&site, &name)?;
            manager.save()?;
            println!("✓ Peer {} added to {}", name, site);
        }
        PeerCommand::Delete { site, name } => {
            manager.delete_peer(&site, &name)?;
            manager.save()?;
            println!("✓ Peer {} deleted from {}", name, site);
        }
        PeerCommand::Rekey { site, name } => {
            manager.rekey_peer(&site, &name)?;
            manager.save()?;
            println!("✓ Peer {} has new keys", name);
        }
        PeerCommand::Show { site, name } => {
            let peer = manager.peer(&site, &name)?;
            println!("{}", serde_json::to_string_pretty(peer)?);
        }
        PeerCommand::Set(changes) => {
            let site = changes.site.clone();
            let name = changes.name.clone();
            manager.update_peer(&site, &name, |peer| {
                if let Some(endpoint) = changes.endpoint {
                    peer.endpoint = endpoint;
                }
                if let Some(port) = changes.port {
                    peer.port = port;
                }
                if let Some(dns) = changes.dns {
                    peer.dns = dns;
                }
                if let Some(allowed_ips) = changes.allowed_ips {
                    peer.additional_allowed_ips = allowed_ips;
                }
                if let Some(keep_alive) = changes.keep_alive {
                    peer.persistent_keep_alive = keep_alive;
                }
                if let Some(ipv4) = changes.redirect_ipv4 {
                    peer.redirect_all_traffic.ipv4 = ipv4;
                }
                if let Some(ipv6) = changes.redirect_ipv6 {
                    peer.redirect_all_traffic.ipv6 = ipv6;
                }
                if let Some(fix) = changes.ipv6_routing_fix {
                    peer.ipv6_routing_fix = fix;
                }
                if let Some(post_up) = changes.post_up {
                    peer.post_up = post_up;
                }
                if let Some(post_down) = changes.post_down {
                    peer.post_down = post_down;
                }
            })?;

            let report = manager.check()?;
            if let Some(peer_report) = report.get(&site).and_then(|r| r.peer(&name)) {
                for message in peer_report.messages() {
                    eprintln!("{}", message);
                }
                if !peer_report.is_success(false) {
                    return Err(Error::Integrity(format!("peer {} not saved", name)));
                }
            }
            manager.save()?;
            println!("✓ Peer {} updated", name);
        }
    }
    Ok(())
}

fn run_connections(settings: Settings, site: &str, show: bool) -> Result<()> {
    let editor = ExternalEditor::new(settings.editor.clone());
    let mut manager = open(settings)?;
    if show {
        let (graph, repairs) = manager.connection_graph(site)?;
        println!("{}{}", graph.serialize(), comment_lines(&repairs));
        return Ok(());
    }
    manager.edit_connections(site, &editor)?;
    manager.save()?;
    println!("✓ Connections of {} updated", site);
    Ok(())
}

fn run_check(settings: Settings, strict: bool) -> Result<()> {
    let manager = open(settings)?;
    let report = manager.check()?;
    if report.is_success(strict) {
        println!("✓ {} site(s) valid", manager.sites().len());
        Ok(())
    } else {
        eprint!("{}", report);
        Err(Error::Integrity(format!("{} message(s)", report.message_count())))
    }
}

fn run_generate(settings: Settings, site: &str, dry_run: bool) -> Result<()> {
    let manager = open(settings)?;
    if dry_run {
        for document in manager.compile(site)? {
            println!("### {}", document.file_name);
            println!("{}", document.render());
        }
        return Ok(());
    }
    for path in manager.generate_configs(site)? {
        println!("✓ {}", path.display());
    }
    Ok(())
}
