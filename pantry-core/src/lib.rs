pub mod classifier;
pub mod config;
pub mod error;
pub mod frequency;
pub mod literal;
pub mod normalize;
pub mod nutrition;
pub mod scrape;
pub mod store;
pub mod transform;

use colored::Colorize;

pub use error::{PipelineError, Result};

pub fn print_banner() {
    let banner = r#"
    ____              __
   / __ \____ _____  / /________  __
  / /_/ / __ `/ __ \/ __/ ___/ / / /
 / ____/ /_/ / / / / /_/ /  / /_/ /
/_/    \__,_/_/ /_/\__/_/   \__, /
                           /____/
"#;
    println!("{}", banner.bright_yellow().bold());
    println!(
        "  {} {}\n",
        "catalog harvester".bright_white(),
        env!("CARGO_PKG_VERSION").bright_black()
    );
}
