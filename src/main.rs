// Entry point for the overlay node CLI
use clap::Parser;
use data_encoding::HEXLOWER;
use log::{error, info, warn, LevelFilter};
use overlay_node::{Command, KeyPair, Node, NodeConfig, Opt};
use std::io::{self, BufRead};
use std::process;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::StartNode { node } => {
            let config = node.to_config()?;
            let node = start_node(config)?;

            println!("{}", node.routing_table());
            println!("Serving; close stdin (Ctrl-D) to stop.");
            // blocks until EOF
            for line in io::stdin().lock().lines() {
                if line?.trim() == "table" {
                    println!("{}", node.routing_table());
                }
            }

            node.stop_listener()?;
            println!("{}", node.routing_table());
        }
        Command::SendTx { node, data } => {
            let config = node.to_config()?;
            let node = start_node(config)?;

            let key = KeyPair::generate()?;
            let report = node.broadcast_transaction(&key, data.into_bytes())?;
            for port in &report.delivered {
                println!("Delivered to {port}");
            }
            for (port, e) in &report.failed {
                println!("Failed to deliver to {port}: {e}");
            }

            node.stop_listener()?;
        }
        Command::Keygen => {
            let key = KeyPair::generate()?;
            println!("Public key: {}", HEXLOWER.encode(key.public_key()));
        }
    }
    Ok(())
}

/// Bind the listener and join the overlay. A missing snapshot is not fatal;
/// the node keeps serving with whatever table it has.
fn start_node(config: NodeConfig) -> Result<Node, Box<dyn std::error::Error>> {
    let wait = config.broadcast_wait();
    let node = Node::new(config)?;
    node.start_listener()?;

    if node.is_seed() {
        info!("Running as seed");
    }
    match node.join_network() {
        Ok(()) => {
            if let Err(e) = node.wait_for_discovery(wait) {
                warn!("Discovery incomplete: {e}");
            }
        }
        Err(e) => warn!("Failed to reach the seed: {e}"),
    }
    Ok(node)
}
