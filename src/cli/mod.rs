use std::net::SocketAddrV4;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "glimpse")]
#[command(about = "Periodic screenshot agent and collector", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture the local screen and stream it to a collector
    Agent {
        /// Collector address as <ipv4>:<port>
        #[arg(long)]
        srv: SocketAddrV4,

        /// Seconds between screenshots
        #[arg(long, value_parser = clap::value_parser!(u64).range(0..=86_400))]
        period: u64,
    },

    /// Run a collector that persists screenshots from many agents
    Collect {
        /// Port to listen on
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agent_args() {
        let cli = Cli::try_parse_from(["glimpse", "agent", "--srv", "10.0.0.1:9000", "--period", "30"])
            .unwrap();
        match cli.command {
            Commands::Agent { srv, period } => {
                assert_eq!(srv.to_string(), "10.0.0.1:9000");
                assert_eq!(period, 30);
            }
            _ => panic!("expected agent subcommand"),
        }
    }

    #[test]
    fn rejects_non_ipv4_server() {
        assert!(Cli::try_parse_from(["glimpse", "agent", "--srv", "[::1]:9000", "--period", "30"]).is_err());
        assert!(Cli::try_parse_from(["glimpse", "agent", "--srv", "example.com:9000", "--period", "30"]).is_err());
    }

    #[test]
    fn rejects_out_of_range_period() {
        assert!(Cli::try_parse_from(["glimpse", "agent", "--srv", "10.0.0.1:9000", "--period", "86401"]).is_err());
    }

    #[test]
    fn rejects_port_zero() {
        assert!(Cli::try_parse_from(["glimpse", "collect", "--port", "0"]).is_err());
    }
}
