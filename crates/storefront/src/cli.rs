use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "storefront", version, about = "Storefront order form tool")]
pub struct Cli {
    /// Locale of the phone dictionary, overrides the configured one
    #[arg(long, global = true)]
    pub locale: Option<String>,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Cmd {
    /// Validate order data against a form definition
    Check {
        /// JSON5 form definition, the bundled order form when omitted
        #[arg(long)]
        form: Option<PathBuf>,
        /// JSON5 object of field values by key
        #[arg(long)]
        values: PathBuf,
    },
    /// Print the fields, groups and layout of a form definition
    Describe {
        #[arg(long)]
        form: Option<PathBuf>,
    },
    /// Format a phone number with its national mask
    Phone {
        digits: String,
        /// Country key to format with instead of resolving it from the number
        #[arg(long)]
        country: Option<String>,
    },
}
