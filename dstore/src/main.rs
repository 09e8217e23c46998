use clap::{Arg, ArgMatches, Command, arg, command, crate_name, value_parser};

mod cli;

fn uri_arg() -> Arg {
    arg!(-u --uri <URI>).required(true).help("Dstore URI, e.g. http://localhost:5000")
}

#[tokio::main]
async fn main() {
    let cli = command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .subcommand(Command::new(cli::VERSION_SUBCOMMAND).about(cli::VERSION_DESCRIPTION))
        .subcommand(Command::new(cli::BUGREPORT_SUBCOMMAND).about(cli::BUGREPORT_DESCRIPTION))
        .subcommand(Command::new(cli::SERVER_SUBCOMMAND).about(cli::SERVER_DESCRIPTION))
        .subcommand(
            Command::new(cli::UPLOAD_SUBCOMMAND)
                .about(cli::UPLOAD_DESCRIPTION)
                .arg(uri_arg())
                .arg(
                    arg!(-f --file <FILE>)
                        .required(true)
                        .help("Path to file to upload"),
                )
                .arg(
                    arg!(-t --"type" <TYPE>)
                        .required(false)
                        .help("Content type hint. Guessed from the file name when omitted"),
                ),
        )
        .subcommand(
            Command::new(cli::LIST_SUBCOMMAND)
                .about(cli::LIST_DESCRIPTION)
                .arg(uri_arg())
                .arg(
                    arg!(-n --name <NAME>)
                        .required(false)
                        .help("Case-insensitive substring of the file name"),
                )
                .arg(
                    arg!(-t --"type" <TYPE>)
                        .required(false)
                        .help("Content type (image/png), top-level type (image) or extension (png)"),
                )
                .arg(
                    arg!(--"min-size" <BYTES>)
                        .required(false)
                        .value_parser(value_parser!(u64))
                        .help("Minimum file size in bytes"),
                )
                .arg(
                    arg!(--"max-size" <BYTES>)
                        .required(false)
                        .value_parser(value_parser!(u64))
                        .help("Maximum file size in bytes"),
                )
                .arg(
                    arg!(--"start-date" <DATE>)
                        .required(false)
                        .value_parser(cli::client::parse_start_date)
                        .help("Uploaded at or after, RFC 3339 or YYYY-MM-DD"),
                )
                .arg(
                    arg!(--"end-date" <DATE>)
                        .required(false)
                        .value_parser(cli::client::parse_end_date)
                        .help("Uploaded at or before, RFC 3339 or YYYY-MM-DD"),
                )
                .arg(
                    arg!(-o --ordering <ORDER>)
                        .required(false)
                        .value_parser(cli::client::parse_ordering)
                        .help("newest (default), oldest, name_asc, name_desc, size_asc or size_desc"),
                ),
        )
        .subcommand(
            Command::new(cli::STATS_SUBCOMMAND)
                .about(cli::STATS_DESCRIPTION)
                .arg(uri_arg()),
        )
        .subcommand(
            Command::new(cli::DELETE_SUBCOMMAND)
                .about(cli::DELETE_DESCRIPTION)
                .arg(uri_arg())
                .arg(
                    arg!(-i --id <ID>)
                        .required(true)
                        .value_parser(value_parser!(i64))
                        .help("File id"),
                ),
        )
        .arg_required_else_help(true)
        .disable_version_flag(true)
        .get_matches();

    match cli.subcommand() {
        Some((cli::VERSION_SUBCOMMAND, _)) => cli::version::run(),
        Some((cli::BUGREPORT_SUBCOMMAND, _)) => cli::bugreport::run(),
        Some((cli::SERVER_SUBCOMMAND, _)) => cli::server::run().await,
        Some((cli::UPLOAD_SUBCOMMAND, matches)) => cli::client::upload(uri(matches), matches).await,
        Some((cli::LIST_SUBCOMMAND, matches)) => cli::client::list(uri(matches), matches).await,
        Some((cli::STATS_SUBCOMMAND, matches)) => cli::client::stats(uri(matches)).await,
        Some((cli::DELETE_SUBCOMMAND, matches)) => cli::client::delete(uri(matches), matches).await,
        _ => {}
    }
}

fn uri(matches: &ArgMatches) -> &str {
    matches
        .get_one::<String>("uri")
        .map(String::as_str)
        .unwrap_or_default()
}
