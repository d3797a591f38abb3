use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use tel_types::{ActorKind, EventType, Severity};

#[derive(Parser)]
#[command(name = "tel", about = "Tamper-evident audit ledger", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding ledger.wal, signing.key and keyring.json
    #[arg(short = 'd', long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// TOML server/ledger configuration
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate the ledger signing key
    Keygen(KeygenArgs),
    /// Append one audit event
    Append(AppendArgs),
    /// Verify integrity of a range of entries
    Verify(RangeArgs),
    /// List entries matching a filter
    Search(SearchArgs),
    /// Export a verified snapshot, optionally anchoring it
    Export(ExportArgs),
    /// Serve the HTTP API
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct KeygenArgs {
    /// Replace an existing key; the new key takes over on next open
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct AppendArgs {
    /// Read the whole event draft as JSON from a file ("-" for stdin)
    #[arg(long, value_name = "PATH", conflicts_with_all = ["event_type", "actor", "resource_type", "resource_id", "action"])]
    pub from_json: Option<PathBuf>,

    #[arg(long = "type", value_parser = parse_enum::<EventType>, required_unless_present = "from_json")]
    pub event_type: Option<EventType>,

    #[arg(long, value_parser = parse_enum::<Severity>, default_value = "info")]
    pub severity: Severity,

    #[arg(long, required_unless_present = "from_json")]
    pub actor: Option<String>,

    #[arg(long, value_parser = parse_enum::<ActorKind>, default_value = "user")]
    pub actor_kind: ActorKind,

    #[arg(long, required_unless_present = "from_json")]
    pub resource_type: Option<String>,

    #[arg(long, required_unless_present = "from_json")]
    pub resource_id: Option<String>,

    #[arg(long, required_unless_present = "from_json")]
    pub action: Option<String>,

    #[arg(long)]
    pub session: Option<String>,

    #[arg(long)]
    pub ip: Option<String>,

    #[arg(long)]
    pub user_agent: Option<String>,

    /// key=value; the value is parsed as JSON when it can be
    #[arg(long = "detail", value_name = "KEY=VALUE")]
    pub details: Vec<String>,

    #[arg(long = "meta", value_name = "KEY=VALUE")]
    pub metadata: Vec<String>,
}

#[derive(Args)]
pub struct RangeArgs {
    #[arg(long)]
    pub start: Option<u64>,
    #[arg(long)]
    pub end: Option<u64>,
}

#[derive(Args)]
pub struct SearchArgs {
    #[arg(long)]
    pub actor: Option<String>,
    #[arg(long = "type", value_parser = parse_enum::<EventType>)]
    pub event_type: Option<EventType>,
    #[arg(long, value_parser = parse_enum::<Severity>)]
    pub severity: Option<Severity>,
    #[arg(long, value_parser = parse_enum::<Severity>)]
    pub min_severity: Option<Severity>,
    #[arg(long)]
    pub resource_type: Option<String>,
    #[arg(long)]
    pub resource_id: Option<String>,
    /// Inclusive lower bound, milliseconds since the epoch
    #[arg(long)]
    pub since: Option<u64>,
    /// Inclusive upper bound, milliseconds since the epoch
    #[arg(long)]
    pub until: Option<u64>,
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
}

#[derive(Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub range: RangeArgs,
    /// Write the bundle here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Anchor the bundle into this directory
    #[arg(long)]
    pub anchor_dir: Option<PathBuf>,
    /// Anchor even if verification failed
    #[arg(long, requires = "anchor_dir")]
    pub allow_invalid: bool,
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

/// Parse a snake_case name into any of the event model's enums.
fn parse_enum<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown value `{s}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keygen() {
        let cli = Cli::try_parse_from(["tel", "keygen", "--force"]).unwrap();
        assert!(matches!(cli.command, Command::Keygen(KeygenArgs { force: true })));
    }

    #[test]
    fn parse_append_fields() {
        let cli = Cli::try_parse_from([
            "tel", "-d", "/tmp/l", "append", "--type", "data_access", "--severity", "high",
            "--actor", "alice", "--resource-type", "secret", "--resource-id", "db",
            "--action", "read", "--detail", "rows=3",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/l")));
        let Command::Append(args) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.event_type, Some(EventType::DataAccess));
        assert_eq!(args.severity, Severity::High);
        assert_eq!(args.actor_kind, ActorKind::User);
        assert_eq!(args.details, vec!["rows=3".to_string()]);
    }

    #[test]
    fn append_requires_fields_without_json() {
        assert!(Cli::try_parse_from(["tel", "append", "--actor", "alice"]).is_err());
        assert!(Cli::try_parse_from(["tel", "append", "--from-json", "-"]).is_ok());
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(Cli::try_parse_from(["tel", "search", "--type", "gossip"]).is_err());
    }

    #[test]
    fn parse_export_with_anchor() {
        let cli = Cli::try_parse_from([
            "tel", "export", "--start", "2", "--anchor-dir", "/tmp/a",
        ])
        .unwrap();
        let Command::Export(args) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.range.start, Some(2));
        assert_eq!(args.range.end, None);
        assert_eq!(args.anchor_dir, Some(PathBuf::from("/tmp/a")));
        assert!(Cli::try_parse_from(["tel", "export", "--allow-invalid"]).is_err());
    }

    #[test]
    fn parse_serve_bind() {
        let cli = Cli::try_parse_from(["tel", "serve", "--bind", "0.0.0.0:9000"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.bind, Some("0.0.0.0:9000".parse().unwrap()));
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["tel", "--format", "json", "verify"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
