use std::{env, path::PathBuf, process};

use anyhow::{bail, Result};
use log::{error, info};
use sdk_avatars::{
    adapt::{self, AdaptOptions},
    conversion::Scene,
};

const USAGE: &str = "Usage: sdk_avatars [--] <input_file.glb> [--output <output_file.glb>]";

/// Command line arguments. Everything before a `--` separator is ignored, so
/// the tool can be invoked the same way as host application scripts.
#[derive(Debug, PartialEq)]
struct Args {
    input: PathBuf,
    /// Where to write the result. Defaults to overwriting the input.
    output: Option<PathBuf>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let args: Vec<String> = args.into_iter().collect();
        let args = match args.iter().position(|arg| arg == "--") {
            Some(separator) => &args[separator + 1..],
            None => &args[..],
        };

        let mut input = None;
        let mut output = None;
        let mut args = args.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-o" | "--output" => match args.next() {
                    Some(path) => output = Some(PathBuf::from(path)),
                    None => bail!("Missing the path after {}", arg),
                },
                _ if input.is_none() => input = Some(PathBuf::from(arg)),
                _ => {}
            }
        }

        match input {
            Some(input) => Ok(Self { input, output }),
            None => bail!("Missing the input file"),
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match Args::parse(env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            error!("{}\n{}", err, USAGE);
            process::exit(1);
        }
    };
    info!("Processing SDK avatar: {}", args.input.display());

    let mut scene = Scene::default();
    if let Err(err) = adapt::import(&args.input, &mut scene) {
        error!("Failed to import GLB file: {:#}", err);
        process::exit(1);
    }
    info!("Successfully imported GLB file");

    adapt::adapt(&mut scene, &AdaptOptions::default());

    let output = args.output.as_deref().unwrap_or(args.input.as_path());
    if let Err(err) = adapt::export(&scene, output) {
        error!("Failed to export GLB file: {:#}", err);
        process::exit(1);
    }
    info!("Successfully exported adapted GLB file");

    info!("SDK avatar adaptation complete!");
}
