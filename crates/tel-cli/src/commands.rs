use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use tel_crypto::SigningKey;
use tel_ledger::{AuditLedger, Finding, QueryFilter, VerificationReport};
use tel_server::{DataDir, ServerConfig, TelServer};
use tel_store::DirectoryAnchorSink;
use tel_types::{Actor, EventDraft, Fields, LedgerEntry, Origin, Resource, Timestamp};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Keygen(args) => cmd_keygen(&config, args),
        Command::Append(args) => cmd_append(&config, args, &format).await,
        Command::Verify(args) => cmd_verify(&config, args, &format).await,
        Command::Search(args) => cmd_search(&config, args, &format),
        Command::Export(args) => cmd_export(&config, args).await,
        Command::Serve(args) => cmd_serve(config, args).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    tracing::debug!(?config, "resolved configuration");
    Ok(config)
}

fn open_ledger(config: &ServerConfig) -> anyhow::Result<AuditLedger> {
    DataDir::new(&config.data_dir)
        .open_ledger(config.sync_mode, config.ledger.clone())
        .with_context(|| format!("opening ledger in {}", config.data_dir.display()))
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_keygen(config: &ServerConfig, args: KeygenArgs) -> anyhow::Result<()> {
    let data = DataDir::new(&config.data_dir);
    let key = SigningKey::generate();
    data.write_signing_key(&key, args.force)
        .context("use --force to replace the existing key")?;
    println!(
        "{} Signing key {} written to {}",
        "✓".green().bold(),
        key.verifying_key().key_id().yellow(),
        data.signing_key_path().display()
    );
    if args.force && data.wal_path().exists() {
        println!("  The ledger registers it as a rotation on next open.");
    }
    Ok(())
}

async fn cmd_append(config: &ServerConfig, args: AppendArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let draft = build_draft(args)?;
    let ledger = open_ledger(config)?;
    let entry = ledger.append(draft).await?;
    match format {
        OutputFormat::Json => print_json(&entry),
        OutputFormat::Text => {
            println!(
                "{} Appended #{} {}",
                "✓".green().bold(),
                entry.sequence_number.to_string().bold(),
                entry.event.event_id.to_string().dimmed()
            );
            println!("  Digest: {}", entry.current_digest().to_hex().cyan());
            println!("  Root:   {}", entry.merkle_root.to_hex().cyan());
            Ok(())
        }
    }
}

fn build_draft(args: AppendArgs) -> anyhow::Result<EventDraft> {
    if let Some(path) = args.from_json {
        let text = if path == PathBuf::from("-") {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        } else {
            std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?
        };
        return serde_json::from_str(&text).context("parsing event draft");
    }

    let (Some(event_type), Some(actor), Some(resource_type), Some(resource_id), Some(action)) = (
        args.event_type,
        args.actor,
        args.resource_type,
        args.resource_id,
        args.action,
    ) else {
        bail!("--type, --actor, --resource-type, --resource-id and --action are required");
    };

    Ok(EventDraft {
        event_type,
        severity: args.severity,
        actor: Actor {
            kind: args.actor_kind,
            id: actor,
        },
        origin: Origin {
            session_id: args.session,
            ip_address: args.ip,
            user_agent: args.user_agent,
        },
        resource: Resource::new(resource_type, resource_id),
        action,
        details: parse_fields(&args.details)?,
        metadata: parse_fields(&args.metadata)?,
    })
}

/// `key=value` pairs; values that parse as JSON keep their type.
fn parse_fields(pairs: &[String]) -> anyhow::Result<Fields> {
    let mut fields = Fields::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("expected KEY=VALUE, got `{pair}`");
        };
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

async fn cmd_verify(config: &ServerConfig, args: RangeArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let report = ledger.verify(args.start, args.end).await?;
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_report(&report),
    }
    if !report.valid {
        bail!("ledger failed verification");
    }
    Ok(())
}

fn print_report(report: &VerificationReport) {
    if report.valid {
        println!(
            "{} Verified {} entries ({}..={})",
            "✓".green().bold(),
            report.checked_count,
            report.start,
            report.end
        );
        println!("  Root: {}", report.root_digest.to_hex().cyan());
        return;
    }
    println!(
        "{} {} findings in {}..={}, first at #{}",
        "✗".red().bold(),
        report.broken_checks.len(),
        report.start,
        report.end,
        report
            .first_broken_sequence
            .map(|s| s.to_string())
            .unwrap_or_default()
            .bold()
    );
    for finding in &report.broken_checks {
        let line = match finding {
            Finding::ChainBreak { sequence, reason } => format!("#{sequence} chain break: {reason}"),
            Finding::SignatureInvalid { sequence } => format!("#{sequence} signature invalid"),
            Finding::RootMismatch { sequence, stored, computed } => format!(
                "#{sequence} root mismatch: stored {} computed {}",
                stored.short_hex(),
                computed.short_hex()
            ),
        };
        println!("  {}", line.red());
    }
}

fn cmd_search(config: &ServerConfig, args: SearchArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let filter = QueryFilter {
        actor_id: args.actor,
        event_type: args.event_type,
        severity: args.severity,
        min_severity: args.min_severity,
        resource_type: args.resource_type,
        resource_id: args.resource_id,
        time_from: args.since.map(Timestamp),
        time_to: args.until.map(Timestamp),
    };
    let entries = ledger.search(filter, Some(args.limit))?;
    match format {
        OutputFormat::Json => print_json(&entries),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No matching entries.");
            }
            for entry in &entries {
                print_entry(entry);
            }
            Ok(())
        }
    }
}

fn print_entry(entry: &LedgerEntry) {
    let event = &entry.event;
    println!(
        "{} {} {} {} {}/{} {}",
        format!("#{}", entry.sequence_number).yellow(),
        event.timestamp.to_string().dimmed(),
        event.severity.as_str().bold(),
        event.actor.id.cyan(),
        event.resource.resource_type,
        event.resource.resource_id,
        event.action
    );
}

async fn cmd_export(config: &ServerConfig, args: ExportArgs) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let bundle = ledger.export(args.range.start, args.range.end).await?;

    let bytes = bundle.to_bytes()?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "{} Exported {} entries to {}",
                if bundle.valid { "✓".green().bold() } else { "!".yellow().bold() },
                bundle.entries.len(),
                path.display()
            );
        }
        None => print_json(&bundle)?,
    }

    if let Some(dir) = args.anchor_dir {
        if !bundle.valid && !args.allow_invalid {
            bail!("export failed verification; not anchoring (pass --allow-invalid to anchor anyway)");
        }
        let sink = DirectoryAnchorSink::new(dir);
        let receipt = ledger.anchor(&bundle, &sink).await?;
        eprintln!(
            "{} Anchored as {} ({})",
            "✓".green().bold(),
            receipt.content_id.to_hex().yellow(),
            sink.path_for(&receipt.content_id).display()
        );
    } else if !bundle.valid {
        bail!("exported range failed verification");
    }
    Ok(())
}

async fn cmd_serve(mut config: ServerConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    let server = TelServer::open(config)?;
    println!(
        "tel server on {} (data: {})",
        server.config().bind_addr.to_string().bold(),
        server.config().data_dir.display()
    );
    server.serve().await?;
    Ok(())
}
