//! A handwritten parser for our arguments.
//!
//! The invoker is the kernel build system, which hands us a small fixed flag
//! set; a parsing library would cost more than the loop below. Long options
//! are accepted with either one or two dashes and values may be attached
//! with `=` or passed as the following argument, matching what the various
//! build wrappers emit.

use crate::error::Result;
use anyhow::anyhow;
use anyhow::bail;
use anyhow::ensure;
use std::path::PathBuf;

pub const USAGE: &str = "\
Usage: kas_alias [options]
  -n, --nmdata <file>      nm -n listing of the image (required)
  -a, --addr2line <path>   addr2line binary used for source-based suffixes
  -v, --vmlinux <file>     ELF image handed to addr2line
  -o, --outfile <file>     augmented listing destination (stdout when omitted)
  -d, --alias-data         also alias duplicated data symbols (b/B/d/D/r/R)
      --alias-data-all     disable all but the baseline never-alias filters
      --verbose            report progress on stderr
      --version            print version and exit
  -h, --help               show this help
";

#[derive(Debug)]
pub enum Action {
    Augment(Args),
    Version,
    Help,
}

#[derive(Debug)]
pub struct Args {
    pub nm_data: PathBuf,
    pub addr2line: Option<PathBuf>,
    pub vmlinux: Option<PathBuf>,
    pub outfile: Option<PathBuf>,
    pub alias_data: bool,
    pub alias_data_all: bool,
    pub verbose: bool,
}

// Parse the supplied input arguments, which should not include the program
// name.
pub fn parse<S: AsRef<str>, I: Iterator<Item = S>>(mut input: I) -> Result<Action> {
    let mut nm_data = None;
    let mut addr2line = None;
    let mut vmlinux = None;
    let mut outfile = None;
    let mut alias_data = false;
    let mut alias_data_all = false;
    let mut verbose = false;

    while let Some(arg) = input.next() {
        let arg = arg.as_ref();
        let stripped = arg
            .strip_prefix("--")
            .or_else(|| arg.strip_prefix('-'))
            .filter(|s| !s.is_empty());
        let Some(stripped) = stripped else {
            bail!("Unexpected argument `{arg}`; run with --help for usage");
        };

        let (flag, inline_value) = match stripped.split_once('=') {
            Some((flag, value)) => (flag, Some(value.to_owned())),
            None => (stripped, None),
        };

        match flag {
            "n" | "nmdata" => nm_data = Some(path_value(flag, inline_value, &mut input)?),
            "a" | "addr2line" => addr2line = Some(path_value(flag, inline_value, &mut input)?),
            "v" | "vmlinux" => vmlinux = Some(path_value(flag, inline_value, &mut input)?),
            "o" | "outfile" => outfile = Some(path_value(flag, inline_value, &mut input)?),
            "d" | "alias-data" => alias_data = switch(flag, inline_value)?,
            "alias-data-all" => alias_data_all = switch(flag, inline_value)?,
            "verbose" => verbose = switch(flag, inline_value)?,
            "version" => return Ok(Action::Version),
            "h" | "help" => return Ok(Action::Help),
            other => bail!("Unrecognized option `{other}`; run with --help for usage"),
        }
    }

    let Some(nm_data) = nm_data else {
        bail!("Missing required option --nmdata; run with --help for usage");
    };
    ensure!(
        addr2line.is_some() == vmlinux.is_some(),
        "--addr2line and --vmlinux must be supplied together"
    );

    Ok(Action::Augment(Args {
        nm_data,
        addr2line,
        vmlinux,
        outfile,
        alias_data,
        alias_data_all,
        verbose,
    }))
}

fn path_value<S: AsRef<str>, I: Iterator<Item = S>>(
    flag: &str,
    inline_value: Option<String>,
    input: &mut I,
) -> Result<PathBuf> {
    let value = match inline_value {
        Some(value) => value,
        None => input
            .next()
            .map(|s| s.as_ref().to_owned())
            .ok_or_else(|| anyhow!("Missing value for option `{flag}`"))?,
    };
    Ok(PathBuf::from(value))
}

fn switch(flag: &str, inline_value: Option<String>) -> Result<bool> {
    ensure!(
        inline_value.is_none(),
        "Option `{flag}` does not take a value"
    );
    Ok(true)
}
