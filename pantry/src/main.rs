use colored::Colorize;
use pantry::commands::command_argument_builder;
use pantry::handlers::{handle_run, handle_scrape, handle_transform, init_tracing};
use pantry_core::print_banner;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        return;
    }

    init_tracing(quiet);

    let result = match chosen_command.subcommand() {
        Some(("scrape", primary_command)) => handle_scrape(primary_command, quiet).await,
        Some(("transform", primary_command)) => handle_transform(primary_command, quiet).await,
        Some(("run", primary_command)) => handle_run(primary_command, quiet).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
