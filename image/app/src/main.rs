/*++

Licensed under the Apache-2.0 license.

File Name:

   main.rs

Abstract:

    Main entry point of the WPR imaging application

--*/
use std::path::PathBuf;

use clap::{arg, value_parser, ArgAction, Command};

mod create;
mod verify;

/// Entry point
fn main() {
    let sub_cmds = vec![
        Command::new("create")
            .about("Create a WPR image from a configuration file")
            .arg(
                arg!(--"config" <FILE> "WPR Configuration file")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"out" <FILE> "Output file")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            ),
        Command::new("verify")
            .about("Verify and scrub a WPR image in the emulator")
            .arg(
                arg!(--"image" <FILE> "WPR image")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"salt" <HEX> "Master salt, 16 bytes hex encoded")
                    .required(true)
                    .value_parser(value_parser!(String)),
            )
            .arg(
                arg!(--"ls-ucode-end" <U32> "End of the LS ucode area, image size when absent")
                    .required(false)
                    .value_parser(value_parser!(u32)),
            )
            .arg(
                arg!(--"unsigned" <U32> "Legacy falcon allowed to be unsigned")
                    .required(false)
                    .action(ArgAction::Append)
                    .value_parser(value_parser!(u32)),
            )
            .arg(arg!(--"debug" "Select debug signatures"))
            .arg(arg!(--"non-production" "Run with a non-production policy"))
            .arg(arg!(--"no-signatures" "Skip signature verification"))
            .arg(arg!(--"skip-gap-scrub" "Leave gaps untouched on non-production parts"))
            .arg(
                arg!(--"out" <FILE> "Write the scrubbed image")
                    .required(false)
                    .value_parser(value_parser!(PathBuf)),
            ),
    ];

    let cmd = Command::new("acr-image-app")
        .arg_required_else_help(true)
        .subcommands(sub_cmds)
        .about("LS firmware WPR imaging tools")
        .get_matches();

    let result = match cmd.subcommand() {
        Some(("create", args)) => create::run_cmd(args),
        Some(("verify", args)) => verify::run_cmd(args),
        _ => unreachable!(),
    };

    if let Err(err) = result {
        eprintln!("Error: {err:?}");
        std::process::exit(-1);
    }
}
