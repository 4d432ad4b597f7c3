use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use selflike::RunOptions;

const HELP: &str = "selflike - Spot posts whose authors liked their own post.

  --page <file>        HTML snapshot of the feed to watch (required)
  --config <file>      Config file (default: ~/.config/selflike/config.yaml)
  --cycles <n>         Stop after n poll cycles instead of running forever
  --out <file>         Write the annotated page here after a bounded run
  --version, -V        Show version and exit
  --help,    -h        Show this help message";

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Some(options)) => options,
        Ok(None) => return,
        Err(err) => {
            eprintln!("error: {err:#}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    if let Err(err) = selflike::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

/// Returns `None` when a flag was handled and there is nothing left to run.
fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<RunOptions>> {
    let mut options = RunOptions::default();
    let mut page = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("selflike {}", selflike::VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(None);
            }
            "--page" => page = Some(PathBuf::from(value(&mut args, "--page")?)),
            "--config" => options.config_file = Some(PathBuf::from(value(&mut args, "--config")?)),
            "--out" => options.output = Some(PathBuf::from(value(&mut args, "--out")?)),
            "--cycles" => {
                let raw = value(&mut args, "--cycles")?;
                let cycles = raw
                    .parse::<u64>()
                    .with_context(|| format!("--cycles expects a number, got {raw:?}"))?;
                options.cycles = Some(cycles);
            }
            other => bail!("unknown argument {other:?}"),
        }
    }

    options.page = page.context("--page is required")?;
    if options.output.is_some() && options.cycles.is_none() {
        bail!("--out needs --cycles");
    }
    Ok(Some(options))
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .with_context(|| format!("{flag} expects a value"))
}
