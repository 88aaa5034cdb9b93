//! A command-line front-end for the engine client, for offline
//! development against an engine module.
//!
//! ## About
//!
//! The WebAssembly engine module to host is passed with the `--binary`
//! flag; the operation to invoke with `--operation`; arguments, in order,
//! as JSON literals with repeated `--argument` flags.  The decoded
//! outcome is printed to stdout as JSON.
//!
//! To see verbose output of what is happening, set `RUST_LOG=info` before
//! executing.
//!
//! ## Authors
//!
//! The AsyncWasm Host Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE_MIT.markdown` file in the repository root for
//! information on licensing and copyright.

use call_protocol::ArgValue;
use clap::{Arg, ArgAction};
use engine_client::EngineClient;
use execution_engine::{EngineConfig, WasmEngine};
use log::{error, info};
use std::{error::Error, path::PathBuf, sync::Arc, time::Instant};

////////////////////////////////////////////////////////////////////////////////
// Constants.
////////////////////////////////////////////////////////////////////////////////

/// About the application.
const ABOUT: &str = "engine-client: a command-line facade over the asynchronous WebAssembly \
                     execution engine.  Hosts an engine module, invokes one exported operation \
                     with the given arguments, and prints the decoded outcome.";
/// The name of the application.
const APPLICATION_NAME: &str = "engine-client";
/// The authors list.
const AUTHORS: &str = "The AsyncWasm Host Development Team.";
/// Application version number.
const VERSION: &str = "pre-alpha";

////////////////////////////////////////////////////////////////////////////////
// Command line options and parsing.
////////////////////////////////////////////////////////////////////////////////

/// A struct capturing all of the command line options passed to the
/// program.
struct CommandLineOptions {
    /// Path to the engine module to host.
    binary: PathBuf,
    /// Wire identifier of the operation to invoke.
    operation: String,
    /// The ordered argument list.
    args: Vec<ArgValue>,
    /// Number of module instantiations to keep warm.
    pool_size: usize,
    /// Whether the call carries a premium entitlement.
    premium: bool,
}

/// Parses the command line options, building a `CommandLineOptions`
/// struct out of them.  If required options are not present, or if any
/// options are malformed, this will abort the program.
fn parse_command_line() -> Result<CommandLineOptions, Box<dyn Error>> {
    let matches = clap::Command::new(APPLICATION_NAME)
        .version(VERSION)
        .author(AUTHORS)
        .about(ABOUT)
        .arg(
            Arg::new("binary")
                .short('b')
                .long("binary")
                .value_name("FILE")
                .help("Path to the WebAssembly engine module to host.")
                .required(true),
        )
        .arg(
            Arg::new("operation")
                .short('o')
                .long("operation")
                .value_name("ID")
                .help(
                    "Wire identifier of the operation to invoke, e.g. \
                     ENGINE_CALL_ID_GET_VERSION.",
                )
                .required(true),
        )
        .arg(
            Arg::new("argument")
                .short('a')
                .long("argument")
                .value_name("JSON")
                .help(
                    "An argument for the operation, as a JSON literal.  Repeat the flag to pass \
                     several; order is preserved.",
                )
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("pool-size")
                .long("pool-size")
                .value_name("N")
                .help("Number of module instantiations to keep warm."),
        )
        .arg(
            Arg::new("premium")
                .long("premium")
                .action(ArgAction::SetTrue)
                .help("Mark the call as carrying a premium entitlement."),
        )
        .get_matches();

    let binary = matches
        .get_one::<String>("binary")
        .map(PathBuf::from)
        .ok_or("no engine module path passed")?;
    let operation = matches
        .get_one::<String>("operation")
        .cloned()
        .ok_or("no operation identifier passed")?;
    let mut args = Vec::new();
    if let Some(values) = matches.get_many::<String>("argument") {
        for raw in values {
            args.push(ArgValue::from(serde_json::from_str::<serde_json::Value>(
                raw,
            )?));
        }
    }
    let pool_size = match matches.get_one::<String>("pool-size") {
        Some(raw) => raw.parse::<usize>()?,
        None => EngineConfig::default().pool_size,
    };
    Ok(CommandLineOptions {
        binary,
        operation,
        args,
        pool_size,
        premium: matches.get_flag("premium"),
    })
}

////////////////////////////////////////////////////////////////////////////////
// Entry point.
////////////////////////////////////////////////////////////////////////////////

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let options = parse_command_line()?;
    info!("hosting engine module {:?}", options.binary);
    let engine = WasmEngine::from_file(
        &options.binary,
        EngineConfig {
            pool_size: options.pool_size,
        },
    )?;
    let mut client = EngineClient::new(Arc::new(engine));
    client.set_premium(options.premium);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()?;
    let started = Instant::now();
    let outcome = runtime.block_on(
        client.invoke_json::<serde_json::Value>(&options.operation, options.args),
    );
    info!("operation completed in {:?}", started.elapsed());
    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            Err(Box::new(e))
        }
    }
}
