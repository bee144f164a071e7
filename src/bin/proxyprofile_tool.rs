//! Command line access to the profile codec and config compiler.
//!
//! Usage:
//! ```
//! cargo run --bin proxyprofile_tool -- decode 'husi://hysteria?...'
//! cargo run --bin proxyprofile_tool -- --settings settings.json compile <link> <link>
//! ```

use std::path::PathBuf;

use anyhow::Context;
use rust_lib_proxyprofile::codec::decode_link;
use rust_lib_proxyprofile::config::{build_config, export_config, CompileContext};
use rust_lib_proxyprofile::models::ProxyRecord;
use rust_lib_proxyprofile::outbound::build_outbound;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::FmtSubscriber;

enum Command {
    Decode(String),
    Outbound(String),
    Compile(Vec<String>),
    Export(String),
}

struct Args {
    settings: Option<PathBuf>,
    for_test: bool,
    verbose: bool,
    command: Command,
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    init_tracing(args.verbose);

    let ctx = match &args.settings {
        Some(path) => CompileContext::load(path)?,
        None => CompileContext::default(),
    };

    match args.command {
        Command::Decode(link) => {
            let profile = decode_link(&link).context("decoding link")?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Outbound(link) => {
            let profile = decode_link(&link).context("decoding link")?;
            let outbound = build_outbound(&profile, &ctx)?;
            println!("{}", serde_json::to_string_pretty(&outbound)?);
        }
        Command::Compile(links) => {
            let chain = links
                .iter()
                .enumerate()
                .map(|(index, link)| {
                    let mut record = ProxyRecord::new(decode_link(link)?);
                    record.id = index as i64 + 1;
                    Ok::<_, anyhow::Error>(record)
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let result = build_config(&chain, &ctx, args.for_test)?;
            println!("{}", result.config);
            for chain in &result.external_index {
                for (port, record) in &chain.entries {
                    tracing::info!("helper for {} on port {}", record.display_name(), port);
                }
            }
        }
        Command::Export(link) => {
            let record = ProxyRecord::new(decode_link(&link).context("decoding link")?);
            let exported = export_config(&record, &ctx)?;
            eprintln!("# {}", exported.file_name);
            println!("{}", exported.content);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr) // stdout carries the documents
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn print_help() {
    eprintln!("Proxy profile tool");
    eprintln!();
    eprintln!("Usage: proxyprofile_tool [OPTIONS] <COMMAND> <LINK>...");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  decode <LINK>         Print the profile a link carries");
    eprintln!("  outbound <LINK>       Print the core outbound for a link");
    eprintln!("  compile <LINK>...     Compile links (first hop first) into a core config");
    eprintln!("  export <LINK>         Print the shareable config export");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --settings <PATH>     Compile settings JSON file");
    eprintln!("  --for-test            Compile without the local inbound");
    eprintln!("  --verbose, -v         Debug logging on stderr");
    eprintln!("  --help, -h            Show this help");
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut settings = None;
    let mut for_test = false;
    let mut verbose = false;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--settings" => {
                let path = args.next().context("--settings needs a path")?;
                settings = Some(PathBuf::from(path));
            }
            "--for-test" => for_test = true,
            "--verbose" | "-v" => verbose = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let name = positional.next().unwrap_or_default();
    let rest: Vec<String> = positional.collect();
    let single = |rest: &[String]| -> anyhow::Result<String> {
        match rest {
            [link] => Ok(link.clone()),
            _ => anyhow::bail!("{} takes exactly one link", name),
        }
    };

    let command = match name.as_str() {
        "decode" => Command::Decode(single(&rest)?),
        "outbound" => Command::Outbound(single(&rest)?),
        "export" => Command::Export(single(&rest)?),
        "compile" if !rest.is_empty() => Command::Compile(rest),
        "compile" => anyhow::bail!("compile needs at least one link"),
        _ => {
            print_help();
            anyhow::bail!("unknown command: {:?}", name);
        }
    };

    Ok(Args {
        settings,
        for_test,
        verbose,
        command,
    })
}
