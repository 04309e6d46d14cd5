use clap::{arg, command};

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("tangle")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("tangle")
        .arg(arg!(-q --"quiet" "Suppress banner and progress output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("crawl")
                .about(
                    "Crawls the relation neighborhood of a seed entity into a directed \
                graph document.",
                )
                .arg(arg!(<SEED> "Key of the entity to crawl from"))
                .arg(
                    arg!(-a --"api" <PATH>)
                        .required(true)
                        .help("Path to the endpoint configuration JSON"),
                )
                .arg(
                    arg!(-l --"level" <LEVEL>)
                        .required(false)
                        .help("Crawl level: 1 (star), 1.5 (ring closure), 2 (two rings)")
                        .value_parser(["1", "1.5", "2"])
                        .default_value("1"),
                )
                .arg(
                    arg!(-d --"direction" <DIRECTION>)
                        .required(false)
                        .help("Which relation(s) to walk")
                        .value_parser(["out", "in", "both"])
                        .default_value("out"),
                )
                .arg(
                    arg!(-m --"max" <N>)
                        .required(false)
                        .help("Cap each per-vertex enumeration at N related items")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"include-extras")
                        .required(false)
                        .help("Also collect the extended attribute set")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-u --"user" <NAME>)
                        .required(false)
                        .help("Username for the basic-auth credential header")
                        .requires("secret"),
                )
                .arg(
                    arg!(-s --"secret" <SECRET>)
                        .required(false)
                        .help("Secret for the basic-auth credential header")
                        .requires("user"),
                )
                .arg(
                    arg!(--"timeout-ms" <MS>)
                        .required(false)
                        .help("Per-request timeout in milliseconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10000"),
                )
                .arg(
                    arg!(--"retries" <N>)
                        .required(false)
                        .help("Retry attempts for transient request failures")
                        .value_parser(clap::value_parser!(u32))
                        .default_value("3"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Write the graph document to a file (default: stdout)"),
                ),
        )
}
