//! Command-line interface definitions and parsing

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug)]
#[command(author, version, about = "Peer-to-peer ASCII video chat", long_about = None)]
#[command(group(ArgGroup::new("mode").args(["host", "connect"])))]
pub struct Cli {
    /// Wait for an incoming connection (the default unless the
    /// configuration names a peer)
    #[arg(long)]
    pub host: bool,

    /// Connect to a waiting host
    #[arg(long, value_name = "HOST")]
    pub connect: Option<String>,

    /// Port to listen on or connect to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind in host mode
    #[arg(long)]
    pub bind: Option<String>,

    /// Your display name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Color of your chat lines
    #[arg(long)]
    pub chat_color: Option<String>,

    /// Theme color shown to the peer
    #[arg(long)]
    pub theme_color: Option<String>,

    /// Width of the test-pattern video in characters
    #[arg(short, long)]
    pub width: Option<u16>,

    /// Target frames per second for outgoing video
    #[arg(long)]
    pub fps: Option<u32>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Print a sample configuration file and exit
    #[arg(long)]
    pub print_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_mode() {
        let cli = Cli::try_parse_from(["asciichat", "--host", "--port", "6000"]).unwrap();
        assert!(cli.host);
        assert_eq!(cli.connect, None);
        assert_eq!(cli.port, Some(6000));
    }

    #[test]
    fn test_connect_mode_with_identity() {
        let cli = Cli::try_parse_from([
            "asciichat",
            "--connect",
            "192.168.1.20",
            "--name",
            "bob",
            "--chat-color",
            "cyan",
        ])
        .unwrap();
        assert!(!cli.host);
        assert_eq!(cli.connect.as_deref(), Some("192.168.1.20"));
        assert_eq!(cli.name.as_deref(), Some("bob"));
        assert_eq!(cli.chat_color.as_deref(), Some("cyan"));
    }

    #[test]
    fn test_modes_are_exclusive() {
        assert!(Cli::try_parse_from(["asciichat"]).is_ok());
        assert!(Cli::try_parse_from(["asciichat", "--host", "--connect", "10.0.0.1"]).is_err());
    }

    #[test]
    fn test_port_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["asciichat", "--host", "--port", "70000"]).is_err());
    }
}
