//! Process-level configuration: the bind address, the debug flag, and the application target
//! string, parsed once from argv at startup.

use clap::Parser;

/// `<bin> <target> [--host HOST] [--port PORT] [--debug]`, the Rust-side shape of the source's
/// `argparse` surface.
#[derive(Debug, Parser)]
#[command(name = "skein", about = "Experimental HTTP/1.1 + WebSocket application server")]
struct Args {
    /// Application target, e.g. `demos.chat:app`.
    target: String,

    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8000)]
    port: u16,

    #[arg(long)]
    debug: bool,
}

/// Immutable configuration built once from CLI args at process start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub target: String,
}

impl ServerConfig {
    pub fn from_args() -> Self {
        let args = Args::parse();
        Self { host: args.host, port: args.port, debug: args.debug, target: args.target }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_satisfy_clap_invariants() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_match_source_surface() {
        let args = Args::parse_from(["skein", "demos.chat:app"]);
        assert_eq!(args.host, "0.0.0.0");
        assert_eq!(args.port, 8000);
        assert!(!args.debug);
        assert_eq!(args.target, "demos.chat:app");
    }

    #[test]
    fn overrides_are_applied() {
        let args = Args::parse_from(["skein", "demos.chat:app", "--host", "127.0.0.1", "--port", "9001", "--debug"]);
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 9001);
        assert!(args.debug);
    }
}
