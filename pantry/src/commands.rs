use crate::CLAP_STYLING;
use clap::{Arg, arg, command};
use pantry_core::classifier::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use pantry_core::config::{DEFAULT_CATALOG_URL, DEFAULT_OUTPUT_DIR, PROMPT_FILE};
use url::Url;

const DEFAULT_PRODUCTS_PATH: &str = "scraped/products.csv";
const DEFAULT_SNAPSHOT_PATH: &str = "scraped/ingredients.txt";

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("pantry")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("pantry")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("scrape")
                .about(
                    "Collects the product catalog and reads ingredients and nutrition values \
                from every product page.",
                )
                .args(scrape_args()),
        )
        .subcommand(
            command!("transform")
                .about(
                    "Normalizes scraped ingredients through the classifier and decodes the \
                nutrition tables.",
                )
                .arg(
                    arg!(-i --"input" <PATH>)
                        .required(false)
                        .help("Products CSV written by the scrape step")
                        .default_value(DEFAULT_PRODUCTS_PATH),
                )
                .arg(
                    arg!(--"no-progress")
                        .required(false)
                        .help("Disable progress bars")
                        .action(clap::ArgAction::SetTrue),
                )
                .args(transform_args()),
        )
        .subcommand(
            command!("run")
                .about("Scrapes the catalog, then transforms the result")
                .args(scrape_args())
                .args(transform_args()),
        )
}

fn scrape_args() -> Vec<Arg> {
    vec![
        arg!(-u --"url" <URL>)
            .required(false)
            .help("The catalog page listing the products")
            .value_parser(clap::value_parser!(Url))
            .default_value(DEFAULT_CATALOG_URL),
        arg!(-t --"threads" <NUM_PAGES>)
            .required(false)
            .help("Maximum number of product pages open at the same time")
            .value_parser(clap::value_parser!(usize))
            .default_value("6"),
        arg!(--"timeout" <SECONDS>)
            .required(false)
            .help("Navigation timeout for each product page")
            .value_parser(clap::value_parser!(u64))
            .default_value("30"),
        arg!(--"catalog-timeout" <SECONDS>)
            .required(false)
            .help("Navigation timeout for the catalog page")
            .value_parser(clap::value_parser!(u64))
            .default_value("60"),
        arg!(-o --"output" <PATH>)
            .required(false)
            .help("Where to save the products CSV")
            .default_value(DEFAULT_PRODUCTS_PATH),
        arg!(--"no-progress")
            .required(false)
            .help("Disable progress bars")
            .action(clap::ArgAction::SetTrue),
    ]
}

fn transform_args() -> Vec<Arg> {
    vec![
        arg!(-s --"snapshot" <PATH>)
            .required(false)
            .help("Previous ingredient lists used when classification fails; each run rewrites <out-dir>/ingredients.txt")
            .default_value(DEFAULT_SNAPSHOT_PATH),
        arg!(-p --"prompt-file" <PATH>)
            .required(false)
            .help("Prompt prepended to every ingredient text")
            .default_value(PROMPT_FILE),
        arg!(-d --"out-dir" <PATH>)
            .required(false)
            .help("Directory for the frequency table, nutrition table and cleaned lists")
            .default_value(DEFAULT_OUTPUT_DIR),
        arg!(-m --"model" <MODEL>)
            .required(false)
            .help("Classifier model name")
            .default_value(DEFAULT_MODEL),
        arg!(--"base-url" <URL>)
            .required(false)
            .help("Classifier API base URL")
            .value_parser(clap::value_parser!(Url))
            .default_value(DEFAULT_BASE_URL),
        arg!(--"attempts" <NUM>)
            .required(false)
            .help("Classifier attempts per record before falling back to the snapshot")
            .value_parser(clap::value_parser!(usize))
            .default_value("3"),
        arg!(--"retry-delay" <SECONDS>)
            .required(false)
            .help("Wait between classifier attempts")
            .value_parser(clap::value_parser!(u64))
            .default_value("1"),
        arg!(--"record-delay" <SECONDS>)
            .required(false)
            .help("Minimum time between the start of two records")
            .value_parser(clap::value_parser!(u64))
            .default_value("5"),
    ]
}
