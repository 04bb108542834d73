//! Command line interface for the wiregate binary.

use clap::Parser;

/// Command line arguments for the `wiregate` binary.
#[derive(Debug, Parser)]
#[command(name = "wiregate", version, about = "Persistent gateway client runner")]
pub struct Cli {
    /// Authentication token presented at identify time.
    #[arg(short, long)]
    pub token: String,

    /// Gateway host to dial.
    #[arg(long)]
    pub host: String,

    /// Gateway port.
    #[arg(long, default_value_t = 443)]
    pub port: u16,

    /// Event-subscription intents bitmask.
    #[arg(long, default_value_t = 0)]
    pub intents: u64,

    /// Total number of shards to run.
    #[arg(long, default_value_t = 1)]
    pub shards: u32,

    /// Use the compact binary envelope encoding instead of JSON.
    #[arg(long)]
    pub cbor: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn parses_connection_options() {
        let cli = Cli::parse_from([
            "wiregate", "--token", "tok", "--host", "gw.test", "--shards", "2", "--cbor",
        ]);
        assert_eq!(cli.token, "tok");
        assert_eq!(cli.host, "gw.test");
        assert_eq!(cli.port, 443);
        assert_eq!(cli.shards, 2);
        assert!(cli.cbor);
    }
}
