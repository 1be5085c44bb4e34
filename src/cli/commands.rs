use crate::config::NodeConfig;
use crate::error::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "overlay-node")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

/// Where a node listens and how it finds the seed
#[derive(Args, Debug, Clone, Default)]
pub struct NodeArgs {
    #[arg(long, help = "Listener port (the client port is the next one up)")]
    pub port: Option<u16>,
    #[arg(long = "seed-port", help = "Listener port of the seed node")]
    pub seed_port: Option<u16>,
    #[arg(long, help = "TOML configuration file")]
    pub config: Option<PathBuf>,
}

impl NodeArgs {
    /// Settings from the config file and environment, with flags on top
    pub fn to_config(&self) -> Result<NodeConfig> {
        let mut config = NodeConfig::load(self.config.as_deref())?;
        if let Some(port) = self.port {
            config.listener_port = port;
        }
        if let Some(seed_port) = self.seed_port {
            config.seed_port = seed_port;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        name = "startnode",
        about = "Start a node, join through the seed and serve until stdin closes"
    )]
    StartNode {
        #[command(flatten)]
        node: NodeArgs,
    },
    #[command(
        name = "sendtx",
        about = "Join the overlay and broadcast a signed transaction payload"
    )]
    SendTx {
        #[command(flatten)]
        node: NodeArgs,
        #[arg(long, help = "Transaction payload")]
        data: String,
    },
    #[command(name = "keygen", about = "Generate a key pair and print its public key")]
    Keygen,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_startnode() {
        let opt = Opt::try_parse_from([
            "overlay-node",
            "startnode",
            "--port",
            "7000",
            "--seed-port",
            "65000",
        ])
        .unwrap();

        match opt.command {
            Command::StartNode { node } => {
                assert_eq!(node.port, Some(7000));
                assert_eq!(node.seed_port, Some(65000));
                assert!(node.config.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_sendtx_requires_data() {
        assert!(Opt::try_parse_from(["overlay-node", "sendtx", "--port", "7000"]).is_err());

        let opt = Opt::try_parse_from([
            "overlay-node",
            "sendtx",
            "--port",
            "7000",
            "--data",
            "hello",
        ])
        .unwrap();
        assert!(matches!(opt.command, Command::SendTx { ref data, .. } if data == "hello"));
    }

    // The only test that reads the environment, so the variables it sets
    // cannot leak into another test running in parallel.
    #[test]
    fn test_settings_precedence() {
        use crate::config::settings::{NODE_PORT_KEY, SEED_PORT_KEY};
        use crate::error::NodeError;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"listener_port = 7100\nseed_port = 7200\n").unwrap();

        std::env::set_var(NODE_PORT_KEY, "7300");
        std::env::set_var(SEED_PORT_KEY, "7400");

        // environment beats the file
        let config = NodeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.listener_port, 7300);
        assert_eq!(config.seed_port, 7400);

        // flags beat the environment
        let args = NodeArgs {
            port: Some(7500),
            seed_port: None,
            config: Some(file.path().to_path_buf()),
        };
        let config = args.to_config().unwrap();
        assert_eq!(config.listener_port, 7500);
        assert_eq!(config.seed_port, 7400);

        std::env::set_var(NODE_PORT_KEY, "abc");
        let result = NodeConfig::load(Some(file.path()));

        std::env::remove_var(NODE_PORT_KEY);
        std::env::remove_var(SEED_PORT_KEY);
        assert!(matches!(result, Err(NodeError::Config(_))));

        // without overrides the file values stand
        let config = NodeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.listener_port, 7100);
        assert_eq!(config.seed_port, 7200);
    }
}
