/*++

Licensed under the Apache-2.0 license.

File Name:

    main.rs

Abstract:

    File contains main entrypoint for the CHAOS emulator.

--*/

use clap::{arg, value_parser, ArgAction, Command};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::path::PathBuf;

mod config;
mod run;
mod sign;

fn key_config_arg() -> clap::Arg {
    arg!(--"key-config" <FILE> "Key Configuration file")
        .required(true)
        .value_parser(value_parser!(PathBuf))
}

/// Entry point
fn main() {
    let sub_cmds = vec![
        Command::new("sign")
            .about("Sign a code blob into a firmware image")
            .arg(key_config_arg())
            .arg(
                arg!(--"code" <FILE> "Raw firmware code")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"out" <FILE> "Output file")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            ),
        Command::new("run")
            .about("Load an image into an emulated device and execute one request")
            .arg(key_config_arg())
            .arg(
                arg!(--"device-config" <FILE> "Device Configuration file")
                    .required(false)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"image" <FILE> "Signed firmware image; the built-in firmware when omitted")
                    .required(false)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"algo" <NAME> "Request algorithm")
                    .required(true)
                    .value_parser(run::algorithm_names().collect::<Vec<_>>()),
            )
            .arg(
                arg!(--"input" <HEX> "Input bytes")
                    .required(true)
                    .value_parser(value_parser!(String)),
            )
            .arg(
                arg!(--"key" <HEX> "Key bytes")
                    .required(false)
                    .value_parser(value_parser!(String)),
            )
            .arg(
                arg!(--"out-size" <U32> "Output buffer size")
                    .required(false)
                    .value_parser(value_parser!(u32)),
            )
            .arg(
                arg!(--"in-process" "Run the firmware logic on the device thread instead of a sandbox")
                    .action(ArgAction::SetTrue),
            ),
    ];

    let cmd = Command::new("chaos-emu")
        .arg_required_else_help(true)
        .arg(
            arg!(--"log-level" <LEVEL> "Log level")
                .required(false)
                .global(true)
                .default_value("info")
                .value_parser(value_parser!(LevelFilter)),
        )
        .subcommands(sub_cmds)
        .about("CHAOS virtual accelerator emulator")
        .get_matches();

    let level = cmd
        .get_one::<LevelFilter>("log-level")
        .copied()
        .unwrap_or(LevelFilter::Info);
    let _ = SimpleLogger::new().with_level(level).init();

    let result = match cmd.subcommand() {
        Some(("sign", args)) => sign::run_cmd(args),
        Some(("run", args)) => run::run_cmd(args),
        _ => unreachable!(),
    };

    result.unwrap_or_else(|e| {
        log::error!("Error: {:#}", e);
        std::process::exit(1);
    });
}
