//! kas_alias rewrites an `nm -n` listing of a kernel image so that every
//! duplicated symbol name gains an extra, uniquely named alias entry at the
//! same address. kallsyms consumers (ftrace, kprobes) can then attach to any
//! occurrence by name instead of only the one the kernel happens to pick.

use crate::args::Action;
use crate::args::Args;
use crate::error::Result;
use crate::store::SymbolStore;
use anyhow::Context;
use std::fs::File;
use std::io::BufReader;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub(crate) mod a2l;
pub(crate) mod alias;
pub mod args;
pub mod error;
pub(crate) mod filters;
pub(crate) mod listing;
pub(crate) mod store;
pub(crate) mod symbol;

pub fn run_from_args<S: AsRef<str>, I: Iterator<Item = S>>(input: I) -> Result {
    match args::parse(input)? {
        Action::Augment(args) => {
            init_tracing(&args);
            run(&args)
        }
        Action::Version => {
            println!("kas_alias {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Action::Help => {
            print!("{}", args::USAGE);
            Ok(())
        }
    }
}

/// Diagnostics go to stderr so the listing can flow to stdout. `--verbose`
/// lowers the default threshold to info; RUST_LOG still overrides both ways.
fn init_tracing(args: &Args) {
    let default_level = if args.verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[tracing::instrument(skip_all, name = "Augment")]
pub fn run(args: &Args) -> Result {
    let filter = filters::NameFilter::new(args.alias_data_all)?;

    let input = File::open(&args.nm_data)
        .with_context(|| format!("Failed to open nm data `{}`", args.nm_data.display()))?;
    let (mut store, already_processed) = alias::ingest(BufReader::new(input))?;

    if already_processed {
        tracing::info!("Listing already carries aliases; passing it through");
    } else {
        let mut session = match (&args.addr2line, &args.vmlinux) {
            (Some(tool), Some(image)) => Some(a2l::Addr2LineSession::spawn(tool, image)?),
            _ => None,
        };
        let added = alias::add_aliases(&mut store, &filter, session.as_mut(), args.alias_data)?;
        tracing::info!(aliases = added, "Applied suffixes");
    }

    write_output(args, &store)
}

fn write_output(args: &Args, store: &SymbolStore) -> Result {
    match &args.outfile {
        Some(path) => {
            let out = File::create(path)
                .with_context(|| format!("Failed to create output file `{}`", path.display()))?;
            listing::write_listing(out, store.iter())
        }
        None => listing::write_listing(std::io::stdout().lock(), store.iter()),
    }
}
